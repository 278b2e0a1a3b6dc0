use thiserror::Error;

/// Failure reported by the codec library for a single call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CodecFailure {
    /// The codec needs more input before it can output a picture
    #[error("resource temporarily unavailable, more input needed")]
    Again,
    #[error("invalid data found when processing input: {0}")]
    InvalidData(String),
    #[error("cannot allocate memory")]
    OutOfMemory,
    #[error("{0}")]
    Other(String),
}

/// Errors raised by the decode pipeline.
///
/// Only [`DecodeError::ResourceExhausted`] is fatal; everything else leaves the
/// pipeline in a well defined state and the stream can go on.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("video codec '{0}' is not available")]
    CodecUnavailable(String),
    #[error("failed to initialize codec context: {0}")]
    ContextInitFailed(String),
    #[error("decoder already started")]
    AlreadyStarted,
    #[error("decoder not started")]
    NotStarted,
    #[error("packet {packet} rejected by the decoder: {reason}")]
    SubmitRejected { packet: u64, reason: CodecFailure },
    #[error("no picture for packet {packet}: {reason}")]
    NoPicture { packet: u64, reason: CodecFailure },
    #[error("decoder ran out of resources: {0}")]
    ResourceExhausted(String),
}

impl DecodeError {
    /// True when the host should tear the pipeline down instead of feeding more packets.
    pub fn is_fatal(&self) -> bool {
        matches!(self, DecodeError::ResourceExhausted(_))
    }

    /// True for the per-packet failures expected during normal streaming.
    pub fn is_packet_error(&self) -> bool {
        matches!(
            self,
            DecodeError::SubmitRejected { .. } | DecodeError::NoPicture { .. }
        )
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("hardware acceleration unavailable: {0}")]
pub struct HwAccelError(pub String);
