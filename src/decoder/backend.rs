//! Seams towards the codec library
//!
//! The pipeline drives any library implementing [`CodecLibrary`]; the FFmpeg
//! binding lives in [`super::ffmpeg`].

use super::error::{CodecFailure, HwAccelError};
use super::negotiate::FormatNegotiator;

/// Platform decode hardware a codec context can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HwDeviceKind {
    VideoToolbox,
    Vaapi,
    D3d11va,
    Cuda,
}

impl std::fmt::Display for HwDeviceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HwDeviceKind::VideoToolbox => write!(f, "videotoolbox"),
            HwDeviceKind::Vaapi => write!(f, "vaapi"),
            HwDeviceKind::D3d11va => write!(f, "d3d11va"),
            HwDeviceKind::Cuda => write!(f, "cuda"),
        }
    }
}

/// Output pixel layout of decoded pictures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Yuv420p,
    Nv12,
    /// Surfaces living on a hardware device
    Hardware(HwDeviceKind),
    Other(&'static str),
}

impl PixelFormat {
    pub fn is_hardware(&self) -> bool {
        matches!(self, PixelFormat::Hardware(_))
    }

    /// Maps an FFmpeg pixel format name.
    pub fn from_name(name: &'static str) -> Self {
        match name {
            // full range differs in levels only, not in layout
            "yuv420p" | "yuvj420p" => PixelFormat::Yuv420p,
            "nv12" => PixelFormat::Nv12,
            "videotoolbox_vld" => PixelFormat::Hardware(HwDeviceKind::VideoToolbox),
            "vaapi" | "vaapi_vld" => PixelFormat::Hardware(HwDeviceKind::Vaapi),
            "d3d11" | "d3d11va_vld" => PixelFormat::Hardware(HwDeviceKind::D3d11va),
            "cuda" => PixelFormat::Hardware(HwDeviceKind::Cuda),
            other => PixelFormat::Other(other),
        }
    }
}

/// Decoded pixel data as reported by the codec.
///
/// `width` and `height` come from the decoder and are authoritative for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Picture {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Planes packed back to back, stride padding stripped
    pub data: Vec<u8>,
}

/// A picture tagged with its position in the decoded video sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPicture {
    pub index: u64,
    pub picture: Picture,
}

/// A decoder the library knows about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecDescriptor {
    pub name: String,
}

/// Entry point into a video codec library.
pub trait CodecLibrary {
    type Context: CodecContext;

    /// Looks a decoder up by name.
    fn find_decoder(&self, name: &str) -> Option<CodecDescriptor>;

    /// Allocates and opens a context for `codec`.
    ///
    /// The library keeps `negotiator` for the lifetime of the context and calls it
    /// whenever the codec has to pick an output format.
    fn open(
        &self,
        codec: &CodecDescriptor,
        negotiator: FormatNegotiator,
    ) -> Result<Self::Context, CodecFailure>;
}

/// An open decoding session. Dropping it closes and frees the context.
pub trait CodecContext {
    fn send_packet(&mut self, packet: &[u8]) -> Result<(), CodecFailure>;

    fn receive_picture(&mut self) -> Result<Picture, CodecFailure>;
}

/// A hardware acceleration device context. Dropping it releases the device.
pub trait HwDevice: Send {
    fn kind(&self) -> HwDeviceKind;
}

/// Creates hardware device contexts on demand.
pub trait HwDeviceFactory: Send + Sync {
    /// Device kind the negotiator asks for, `None` when hardware decoding is off.
    fn preferred(&self) -> Option<HwDeviceKind>;

    fn create(&self, kind: HwDeviceKind) -> Result<Box<dyn HwDevice>, HwAccelError>;
}

/// Factory for builds without any hardware device support.
#[derive(Debug, Default, Clone, Copy)]
pub struct SoftwareOnly;

impl HwDeviceFactory for SoftwareOnly {
    fn preferred(&self) -> Option<HwDeviceKind> {
        None
    }

    fn create(&self, kind: HwDeviceKind) -> Result<Box<dyn HwDevice>, HwAccelError> {
        Err(HwAccelError(format!("no {} device support in this build", kind)))
    }
}
