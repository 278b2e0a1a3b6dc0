use std::sync::Arc;

use log::{debug, info, warn};

use super::session::SessionState;
use crate::config::SessionDefaults;
use crate::decoder::{CodecLibrary, DecodeError, DecodePipeline, DecodedPicture};
use crate::demux::{Frame, FrameDemuxer, FrameType, VideoDimensions, parse_sample_rate};
use crate::pipeline::health::PipelineHealth;

/// Receives every decoded picture, e.g. to convert and display it.
pub trait PictureSink {
    fn present(&mut self, picture: DecodedPicture);
}

impl<F: FnMut(DecodedPicture)> PictureSink for F {
    fn present(&mut self, picture: DecodedPicture) {
        self(picture)
    }
}

/// Outcome of one dispatch tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Frames taken off the demuxer queue
    pub frames: usize,
    /// Pictures handed to the sink
    pub pictures: usize,
}

/// Routes completed frames to session state, the decoder and the audio cache.
pub struct FrameDispatcher<L: CodecLibrary, S: PictureSink> {
    demuxer: Arc<FrameDemuxer>,
    decoder: DecodePipeline<L>,
    session: SessionState,
    sink: S,
    health: Option<Arc<PipelineHealth>>,
}

impl<L: CodecLibrary, S: PictureSink> FrameDispatcher<L, S> {
    pub fn new(
        demuxer: Arc<FrameDemuxer>,
        decoder: DecodePipeline<L>,
        defaults: SessionDefaults,
        sink: S,
    ) -> Self {
        Self {
            demuxer,
            decoder,
            session: SessionState::new(defaults),
            sink,
            health: None,
        }
    }

    pub fn with_health(mut self, health: Arc<PipelineHealth>) -> Self {
        self.health = Some(health);
        self
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    /// Mutable access for collaborators draining or pruning the audio cache.
    pub fn session_mut(&mut self) -> &mut SessionState {
        &mut self.session
    }

    pub fn decoder(&self) -> &DecodePipeline<L> {
        &self.decoder
    }

    pub fn decoder_mut(&mut self) -> &mut DecodePipeline<L> {
        &mut self.decoder
    }

    /// Drains the frames completed before this call.
    ///
    /// Frames completed while the tick runs wait for the next one. Only a fatal
    /// decoder error ends the tick early; the remaining frames stay queued.
    pub fn tick(&mut self) -> Result<TickReport, DecodeError> {
        let batch = self.demuxer.pending_frames();
        let mut report = TickReport::default();

        for _ in 0..batch {
            let Ok(frame) = self.demuxer.pop_frame() else {
                break;
            };
            report.frames += 1;
            if let Some(health) = &self.health {
                health.record_frame_dispatched();
            }

            match self.dispatch(frame) {
                Ok(true) => report.pictures += 1,
                Ok(false) => {}
                Err(e) => return Err(e),
            }
        }

        Ok(report)
    }

    /// Routes one frame. Returns whether a picture reached the sink.
    pub fn dispatch(&mut self, frame: Frame) -> Result<bool, DecodeError> {
        match frame.kind {
            FrameType::VideoDimension => {
                self.on_video_dimension(&frame);
                Ok(false)
            }
            FrameType::VideoData => self.on_video_data(&frame),
            FrameType::AudioSampleRate => {
                self.on_sample_rate(&frame);
                Ok(false)
            }
            FrameType::AudioData => {
                let index = self.session.audio_frame_index;
                self.session.audio_cache.insert(index, frame);
                self.session.audio_frame_index += 1;
                Ok(false)
            }
            FrameType::Unrecognized(tag) => {
                warn!(
                    "Dispatcher: dropping frame with unknown type {} ({} bytes)",
                    tag,
                    frame.payload.len()
                );
                self.record_health(|h| h.record_unknown_frame());
                Ok(false)
            }
        }
    }

    fn on_video_dimension(&mut self, frame: &Frame) {
        match VideoDimensions::parse(&frame.payload) {
            Ok(dims) => {
                info!("Dispatcher: video dimension {}x{}", dims.width, dims.height);
                self.session.width = dims.width;
                self.session.height = dims.height;
            }
            Err(e) => {
                warn!("Dispatcher: {}", e);
                self.record_health(|h| h.record_malformed_frame());
            }
        }
    }

    fn on_sample_rate(&mut self, frame: &Frame) {
        match parse_sample_rate(&frame.payload) {
            Ok(rate) => {
                info!("Dispatcher: audio sample rate {} Hz", rate);
                self.session.audio_sample_rate = rate;
            }
            Err(e) => {
                warn!("Dispatcher: {}", e);
                self.record_health(|h| h.record_malformed_frame());
            }
        }
    }

    fn on_video_data(&mut self, frame: &Frame) -> Result<bool, DecodeError> {
        self.session.video_frame_index += 1;

        match self.decoder.submit(&frame.payload) {
            Ok(decoded) => {
                let picture = &decoded.picture;
                if (picture.width, picture.height) != (self.session.width, self.session.height) {
                    debug!(
                        "Dispatcher: picture {} is {}x{}, stream announced {}x{}",
                        decoded.index,
                        picture.width,
                        picture.height,
                        self.session.width,
                        self.session.height
                    );
                }
                self.sink.present(decoded);
                Ok(true)
            }
            Err(e) if e.is_fatal() => Err(e),
            Err(e @ DecodeError::NoPicture { .. }) => {
                debug!("Dispatcher: {}", e);
                Ok(false)
            }
            Err(e) => {
                warn!("Dispatcher: {}", e);
                Ok(false)
            }
        }
    }

    fn record_health(&self, f: impl FnOnce(&PipelineHealth)) {
        if let Some(health) = &self.health {
            f(health);
        }
    }
}
