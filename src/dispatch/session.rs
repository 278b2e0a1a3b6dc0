use std::collections::BTreeMap;

use crate::config::SessionDefaults;
use crate::demux::Frame;

/// Audio frames kept by sequence index, oldest first.
///
/// The dispatcher only appends; pruning is left to whoever consumes the audio.
#[derive(Debug, Default)]
pub struct AudioCache {
    frames: BTreeMap<u64, Frame>,
}

impl AudioCache {
    pub(crate) fn insert(&mut self, index: u64, frame: Frame) {
        self.frames.insert(index, frame);
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn get(&self, index: u64) -> Option<&Frame> {
        self.frames.get(&index)
    }

    /// Cached frames in arrival order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, &Frame)> {
        self.frames.iter().map(|(index, frame)| (*index, frame))
    }

    pub fn first_index(&self) -> Option<u64> {
        self.frames.keys().next().copied()
    }

    pub fn last_index(&self) -> Option<u64> {
        self.frames.keys().next_back().copied()
    }

    /// Removes and returns every cached frame, oldest first.
    pub fn drain(&mut self) -> Vec<(u64, Frame)> {
        std::mem::take(&mut self.frames).into_iter().collect()
    }

    /// Drops frames with an index below `index`. Returns how many were dropped.
    pub fn prune_before(&mut self, index: u64) -> usize {
        let kept = self.frames.split_off(&index);
        let dropped = self.frames.len();
        self.frames = kept;
        dropped
    }
}

/// Stream parameters and counters owned by the dispatcher.
#[derive(Debug)]
pub struct SessionState {
    pub width: u32,
    pub height: u32,
    pub audio_sample_rate: u32,
    /// VideoData frames handed to the decoder so far
    pub video_frame_index: u64,
    /// Index the next AudioData frame is cached under
    pub audio_frame_index: u64,
    pub audio_cache: AudioCache,
}

impl SessionState {
    pub fn new(defaults: SessionDefaults) -> Self {
        Self {
            width: defaults.width,
            height: defaults.height,
            audio_sample_rate: defaults.audio_sample_rate,
            video_frame_index: 0,
            audio_frame_index: 0,
            audio_cache: AudioCache::default(),
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new(SessionDefaults::default())
    }
}
