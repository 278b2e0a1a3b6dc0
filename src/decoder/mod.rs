//! Video decoding
//!
//! [`DecodePipeline`] owns one codec context at a time and turns H.264 access units
//! into pictures. The codec library sits behind [`CodecLibrary`]; [`FfmpegLibrary`]
//! is the shipped implementation.

mod backend;
mod error;
mod ffmpeg;
mod negotiate;
mod pipeline;
mod state;

#[cfg(test)]
pub(crate) mod mock;

pub use backend::{
    CodecContext, CodecDescriptor, CodecLibrary, DecodedPicture, HwDevice, HwDeviceFactory,
    HwDeviceKind, Picture, PixelFormat, SoftwareOnly,
};
pub use error::{CodecFailure, DecodeError, HwAccelError};
pub use ffmpeg::{FfmpegContext, FfmpegLibrary};
pub use negotiate::FormatNegotiator;
pub use pipeline::DecodePipeline;
pub use state::DecoderState;
