//! Wire-level frame types
//!
//! Every frame on the wire is laid out as:
//!
//! ```text
//! ┌────────────┬─────────────┬──────────────────────┐
//! │ Type (4B)  │ Length (4B) │ Payload              │
//! │ u32 LE     │ u32 LE      │ (Length bytes)       │
//! └────────────┴─────────────┴──────────────────────┘
//! ```
//!
//! Frames follow each other back to back with no padding.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Frame header: type tag (4) + payload length (4) = 8 bytes.
pub const HEADER_SIZE: usize = 8;

pub const TAG_VIDEO_DIMENSION: u32 = 0;
pub const TAG_VIDEO_DATA: u32 = 1;
pub const TAG_AUDIO_SAMPLE_RATE: u32 = 2;
pub const TAG_AUDIO_DATA: u32 = 3;

/// Kind of payload carried by a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
    /// Width and height of the video stream
    VideoDimension,
    /// One encoded H.264 access unit
    VideoData,
    /// Audio sample rate in Hz
    AudioSampleRate,
    /// Encoded audio samples
    AudioData,
    /// A tag this receiver does not know, kept verbatim
    Unrecognized(u32),
}

impl FrameType {
    pub fn tag(self) -> u32 {
        match self {
            FrameType::VideoDimension => TAG_VIDEO_DIMENSION,
            FrameType::VideoData => TAG_VIDEO_DATA,
            FrameType::AudioSampleRate => TAG_AUDIO_SAMPLE_RATE,
            FrameType::AudioData => TAG_AUDIO_DATA,
            FrameType::Unrecognized(tag) => tag,
        }
    }
}

impl From<u32> for FrameType {
    fn from(tag: u32) -> Self {
        match tag {
            TAG_VIDEO_DIMENSION => FrameType::VideoDimension,
            TAG_VIDEO_DATA => FrameType::VideoData,
            TAG_AUDIO_SAMPLE_RATE => FrameType::AudioSampleRate,
            TAG_AUDIO_DATA => FrameType::AudioData,
            other => FrameType::Unrecognized(other),
        }
    }
}

impl From<FrameType> for u32 {
    fn from(kind: FrameType) -> Self {
        kind.tag()
    }
}

impl std::fmt::Display for FrameType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameType::VideoDimension => write!(f, "VideoDimension"),
            FrameType::VideoData => write!(f, "VideoData"),
            FrameType::AudioSampleRate => write!(f, "AudioSampleRate"),
            FrameType::AudioData => write!(f, "AudioData"),
            FrameType::Unrecognized(tag) => write!(f, "Unrecognized({})", tag),
        }
    }
}

/// Fixed-size prefix of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub kind: FrameType,
    pub length: u32,
}

impl FrameHeader {
    /// Reads a header from the first [`HEADER_SIZE`] bytes of `src`.
    pub fn parse(src: &[u8]) -> Option<Self> {
        if src.len() < HEADER_SIZE {
            return None;
        }
        let tag = read_u32_le(&src[0..4]);
        let length = read_u32_le(&src[4..8]);
        Some(Self {
            kind: FrameType::from(tag),
            length,
        })
    }

    /// Header plus declared payload, `None` if that does not fit in `usize`.
    pub fn frame_size(&self) -> Option<usize> {
        usize::try_from(self.length).ok()?.checked_add(HEADER_SIZE)
    }
}

/// One fully buffered, type-tagged payload unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: FrameType,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(kind: FrameType, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    pub fn video_dimension(width: u32, height: u32) -> Self {
        let mut payload = BytesMut::with_capacity(8);
        payload.put_u32_le(width);
        payload.put_u32_le(height);
        Self::new(FrameType::VideoDimension, payload.freeze())
    }

    pub fn audio_sample_rate(rate: u32) -> Self {
        Self::new(FrameType::AudioSampleRate, Bytes::copy_from_slice(&rate.to_le_bytes()))
    }

    /// The total wire size of this frame (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Appends this frame in wire format to `dst`.
    pub fn encode(&self, dst: &mut BytesMut) -> Result<(), PayloadError> {
        encode_frame(self.kind, &self.payload, dst)
    }
}

/// Encode a frame into the wire format.
pub fn encode_frame(kind: FrameType, payload: &[u8], dst: &mut BytesMut) -> Result<(), PayloadError> {
    let length = u32::try_from(payload.len()).map_err(|_| PayloadError::TooLarge {
        size: payload.len(),
    })?;
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_u32_le(kind.tag());
    dst.put_u32_le(length);
    dst.put_slice(payload);
    Ok(())
}

/// Problems with the content of a well-framed payload.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("{kind} payload too short: {actual} bytes, need {expected}")]
    Truncated {
        kind: FrameType,
        expected: usize,
        actual: usize,
    },
    #[error("invalid video dimension {width}x{height}")]
    InvalidDimension { width: i32, height: i32 },
    #[error("payload of {size} bytes does not fit a u32 length prefix")]
    TooLarge { size: usize },
}

/// Parsed `VideoDimension` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoDimensions {
    pub width: u32,
    pub height: u32,
}

impl VideoDimensions {
    pub fn parse(payload: &[u8]) -> Result<Self, PayloadError> {
        ensure_len(FrameType::VideoDimension, payload, 8)?;
        // Signed on purpose: a negative value on the wire is a data error, not a huge u32
        let width = read_u32_le(&payload[0..4]) as i32;
        let height = read_u32_le(&payload[4..8]) as i32;
        if width <= 0 || height <= 0 {
            return Err(PayloadError::InvalidDimension { width, height });
        }
        Ok(Self {
            width: width as u32,
            height: height as u32,
        })
    }
}

/// Parses an `AudioSampleRate` payload into Hz.
pub fn parse_sample_rate(payload: &[u8]) -> Result<u32, PayloadError> {
    ensure_len(FrameType::AudioSampleRate, payload, 4)?;
    Ok(read_u32_le(&payload[0..4]))
}

fn ensure_len(kind: FrameType, payload: &[u8], expected: usize) -> Result<(), PayloadError> {
    if payload.len() < expected {
        return Err(PayloadError::Truncated {
            kind,
            expected,
            actual: payload.len(),
        });
    }
    Ok(())
}

#[inline]
fn read_u32_le(src: &[u8]) -> u32 {
    u32::from_le_bytes([src[0], src[1], src[2], src[3]])
}
