use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use log::{debug, info};
use thiserror::Error;

use super::accumulator::ByteAccumulator;
use super::frame::Frame;
use crate::pipeline::health::PipelineHealth;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DemuxError {
    #[error("no completed frame to pop")]
    QueueEmpty,
}

struct DemuxState {
    accumulator: ByteAccumulator,
    completed: VecDeque<Frame>,
    first_frame_at: Option<Instant>,
}

/// Splits the incoming byte stream into typed frames.
///
/// Delivery (`add_data`) and consumption (`pop_frame`) may happen on different threads.
/// Accumulator and queue sit behind one mutex so an append+extract pass is never
/// observed half done.
pub struct FrameDemuxer {
    state: Mutex<DemuxState>,
    health: Option<Arc<PipelineHealth>>,
}

impl Default for FrameDemuxer {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDemuxer {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(DemuxState {
                accumulator: ByteAccumulator::new(),
                completed: VecDeque::new(),
                first_frame_at: None,
            }),
            health: None,
        }
    }

    /// Report received bytes and demuxed frames to `health`.
    pub fn with_health(mut self, health: Arc<PipelineHealth>) -> Self {
        self.health = Some(health);
        self
    }

    /// Feed one chunk of the stream.
    ///
    /// Extracts every frame that became complete and returns how many there were.
    pub fn add_data(&self, chunk: &[u8]) -> usize {
        let mut state = self.lock();
        state.accumulator.append(chunk);

        let mut extracted = 0;
        while let Some(frame) = state.accumulator.try_extract_frame() {
            if state.first_frame_at.is_none() {
                info!("Demuxer: first frame received ({})", frame.kind);
                state.first_frame_at = Some(Instant::now());
            }
            debug!("Demuxer: {} frame, {} bytes", frame.kind, frame.payload.len());
            state.completed.push_back(frame);
            extracted += 1;
        }

        if let Some(health) = &self.health {
            health.record_bytes_received(chunk.len());
            health.record_frames_demuxed(extracted);
        }

        extracted
    }

    pub fn has_completed_frame(&self) -> bool {
        !self.lock().completed.is_empty()
    }

    /// Number of completed frames waiting to be popped.
    pub fn pending_frames(&self) -> usize {
        self.lock().completed.len()
    }

    /// Takes the oldest completed frame.
    pub fn pop_frame(&self) -> Result<Frame, DemuxError> {
        self.lock().completed.pop_front().ok_or(DemuxError::QueueEmpty)
    }

    /// Bytes received that do not yet form a complete frame.
    pub fn buffered_bytes(&self) -> usize {
        self.lock().accumulator.buffered_len()
    }

    /// When the first frame of this session was extracted.
    pub fn first_frame_at(&self) -> Option<Instant> {
        self.lock().first_frame_at
    }

    fn lock(&self) -> MutexGuard<'_, DemuxState> {
        // a panicking holder cannot leave the queue torn: every mutation is a single push/pop
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
