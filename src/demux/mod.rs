//! Stream demultiplexing
//!
//! Turns the raw byte stream coming from a caster into an ordered queue of typed
//! frames. Delivery granularity is arbitrary; frames only leave once complete.

mod accumulator;
mod demuxer;
pub mod frame;

pub use accumulator::ByteAccumulator;
pub use demuxer::{DemuxError, FrameDemuxer};
pub use frame::{
    Frame, FrameHeader, FrameType, HEADER_SIZE, PayloadError, VideoDimensions, encode_frame,
    parse_sample_rate,
};
