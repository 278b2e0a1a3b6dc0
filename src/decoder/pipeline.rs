use std::sync::Arc;

use log::{info, warn};

use super::backend::{
    CodecContext, CodecLibrary, DecodedPicture, HwDeviceFactory, HwDeviceKind,
};
use super::error::{CodecFailure, DecodeError};
use super::negotiate::{FormatNegotiator, SharedHwState, active_hw, release_hw};
use super::state::DecoderState;
use crate::config::DecoderConfig;
use crate::pipeline::health::PipelineHealth;

enum Failed {
    Send(CodecFailure),
    Receive(CodecFailure),
}

struct OpenSession<C> {
    context: C,
    hw: SharedHwState,
}

/// Owns the codec context and drives it one packet at a time.
///
/// The context and its hardware device are released by [`DecodePipeline::stop`],
/// which also runs on drop.
pub struct DecodePipeline<L: CodecLibrary> {
    library: L,
    codec_name: String,
    hw_accel: Option<HwDeviceKind>,
    hw_factory: Arc<dyn HwDeviceFactory>,
    state: DecoderState,
    session: Option<OpenSession<L::Context>>,
    packets_submitted: u64,
    next_picture_index: u64,
    health: Option<Arc<PipelineHealth>>,
}

impl<L: CodecLibrary> DecodePipeline<L> {
    /// `hw_factory` decides which hardware device, if any, negotiation asks for.
    pub fn new(library: L, config: &DecoderConfig, hw_factory: Arc<dyn HwDeviceFactory>) -> Self {
        Self {
            library,
            codec_name: config.codec.clone(),
            hw_accel: hw_factory.preferred(),
            hw_factory,
            state: DecoderState::Uninitialized,
            session: None,
            packets_submitted: 0,
            next_picture_index: 0,
            health: None,
        }
    }

    pub fn with_health(mut self, health: Arc<PipelineHealth>) -> Self {
        self.health = Some(health);
        self
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// The hardware device backing the open context, if negotiation picked one.
    pub fn hardware_device(&self) -> Option<HwDeviceKind> {
        self.session.as_ref().and_then(|s| active_hw(&s.hw))
    }

    /// Opens the codec context.
    ///
    /// Calling it on an open pipeline changes nothing and reports
    /// [`DecodeError::AlreadyStarted`].
    pub fn start(&mut self) -> Result<(), DecodeError> {
        if self.state.is_open() {
            warn!("Decoder: start requested while {}", self.state);
            return Err(DecodeError::AlreadyStarted);
        }

        let codec = self
            .library
            .find_decoder(&self.codec_name)
            .ok_or_else(|| DecodeError::CodecUnavailable(self.codec_name.clone()))?;

        let hw = SharedHwState::default();
        let negotiator = FormatNegotiator::new(self.hw_accel, self.hw_factory.clone(), hw.clone());

        let context = match self.library.open(&codec, negotiator) {
            Ok(context) => context,
            Err(failure) => {
                // the codec may have negotiated a device before failing to open
                release_hw(&hw);
                return Err(match failure {
                    CodecFailure::OutOfMemory => {
                        DecodeError::ResourceExhausted(failure.to_string())
                    }
                    other => DecodeError::ContextInitFailed(other.to_string()),
                });
            }
        };

        self.session = Some(OpenSession { context, hw });
        self.transition(DecoderState::Ready);
        info!("Decoder: '{}' context opened", codec.name);
        Ok(())
    }

    /// Pushes one packet and tries to pull one picture out.
    ///
    /// Rejected packets and codec buffering both surface as errors but leave the
    /// pipeline ready for the next packet.
    pub fn submit(&mut self, packet: &[u8]) -> Result<DecodedPicture, DecodeError> {
        let Some(session) = self.session.as_mut() else {
            return Err(DecodeError::NotStarted);
        };

        self.packets_submitted += 1;
        let packet_no = self.packets_submitted;

        self.state = DecoderState::Decoding;
        let outcome = session
            .context
            .send_packet(packet)
            .map_err(Failed::Send)
            .and_then(|()| session.context.receive_picture().map_err(Failed::Receive));
        self.state = DecoderState::Ready;

        match outcome {
            Ok(picture) => {
                let index = self.next_picture_index;
                self.next_picture_index += 1;
                self.record(|h| h.record_picture(picture.data.len()));
                Ok(DecodedPicture { index, picture })
            }
            Err(Failed::Send(reason)) => {
                self.record(|h| h.record_submit_failure());
                Err(packet_error(reason, |reason| DecodeError::SubmitRejected {
                    packet: packet_no,
                    reason,
                }))
            }
            Err(Failed::Receive(reason)) => {
                self.record(|h| h.record_receive_failure());
                Err(packet_error(reason, |reason| DecodeError::NoPicture {
                    packet: packet_no,
                    reason,
                }))
            }
        }
    }

    /// Releases the hardware device, then the codec context.
    ///
    /// Safe to call in any state; only the first call after a start does anything.
    pub fn stop(&mut self) {
        let Some(OpenSession { context, hw }) = self.session.take() else {
            return;
        };

        // the device is referenced by the codec context, it goes first
        if let Some(kind) = release_hw(&hw) {
            info!("Decoder: {} device released", kind);
        }
        drop(context);

        self.transition(DecoderState::Stopped);
        info!(
            "Decoder: stopped ({} packets, {} pictures)",
            self.packets_submitted, self.next_picture_index
        );
    }

    fn transition(&mut self, target: DecoderState) {
        debug_assert!(
            self.state.can_transition_to(&target),
            "invalid decoder transition {} -> {}",
            self.state,
            target
        );
        self.state = target;
    }

    fn record(&self, f: impl FnOnce(&PipelineHealth)) {
        if let Some(health) = &self.health {
            f(health);
        }
    }
}

impl<L: CodecLibrary> Drop for DecodePipeline<L> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn packet_error(
    reason: CodecFailure,
    wrap: impl FnOnce(CodecFailure) -> DecodeError,
) -> DecodeError {
    match reason {
        CodecFailure::OutOfMemory => DecodeError::ResourceExhausted(reason.to_string()),
        other => wrap(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::backend::{PixelFormat, SoftwareOnly};
    use crate::decoder::mock::{
        CORRUPT_MARKER, MockHwFactory, MockLibrary, buffering_packet, video_packet,
    };

    fn h264_config() -> DecoderConfig {
        DecoderConfig {
            codec: "h264".to_string(),
        }
    }

    #[test]
    fn test_stop_before_start_is_noop() {
        let library = MockLibrary::new();
        let mut pipeline = DecodePipeline::new(library.clone(), &h264_config(), Arc::new(SoftwareOnly));

        pipeline.stop();
        assert_eq!(pipeline.state(), DecoderState::Uninitialized);
        assert_eq!(library.open_contexts(), 0);
    }

    #[test]
    fn test_double_start_keeps_one_context() {
        let library = MockLibrary::new();
        let mut pipeline = DecodePipeline::new(library.clone(), &h264_config(), Arc::new(SoftwareOnly));

        pipeline.start().unwrap();
        assert!(matches!(pipeline.start(), Err(DecodeError::AlreadyStarted)));
        assert_eq!(pipeline.state(), DecoderState::Ready);
        assert_eq!(library.open_contexts(), 1);
        assert_eq!(library.opened_total(), 1);

        pipeline.stop();
        assert_eq!(pipeline.state(), DecoderState::Stopped);
        assert_eq!(library.open_contexts(), 0);
    }

    #[test]
    fn test_unknown_codec() {
        let library = MockLibrary::new();
        let config = DecoderConfig {
            codec: "vp9".to_string(),
        };
        let mut pipeline = DecodePipeline::new(library.clone(), &config, Arc::new(SoftwareOnly));

        assert!(matches!(pipeline.start(), Err(DecodeError::CodecUnavailable(name)) if name == "vp9"));
        assert_eq!(pipeline.state(), DecoderState::Uninitialized);
        assert_eq!(library.open_contexts(), 0);
    }

    #[test]
    fn test_open_failure_releases_negotiated_device() {
        let library = MockLibrary::new()
            .offering(vec![PixelFormat::Hardware(HwDeviceKind::Vaapi), PixelFormat::Yuv420p])
            .failing_open(CodecFailure::Other("no context".into()));
        let factory = Arc::new(MockHwFactory::working());
        let mut pipeline = DecodePipeline::new(library.clone(), &h264_config(), factory.clone());

        assert!(matches!(pipeline.start(), Err(DecodeError::ContextInitFailed(_))));
        assert_eq!(pipeline.state(), DecoderState::Uninitialized);
        assert_eq!(factory.created(), 1);
        assert_eq!(factory.released(), 1);
        assert_eq!(library.open_contexts(), 0);
    }

    #[test]
    fn test_out_of_memory_on_open_is_fatal() {
        let library = MockLibrary::new().failing_open(CodecFailure::OutOfMemory);
        let mut pipeline = DecodePipeline::new(library, &h264_config(), Arc::new(SoftwareOnly));

        let err = pipeline.start().unwrap_err();
        assert!(matches!(err, DecodeError::ResourceExhausted(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_submit_before_start() {
        let mut pipeline = DecodePipeline::new(MockLibrary::new(), &h264_config(), Arc::new(SoftwareOnly));
        assert!(matches!(pipeline.submit(&video_packet(16, 16)), Err(DecodeError::NotStarted)));
    }

    #[test]
    fn test_decode_failure_isolation() {
        let mut pipeline = DecodePipeline::new(MockLibrary::new(), &h264_config(), Arc::new(SoftwareOnly));
        pipeline.start().unwrap();

        let err = pipeline.submit(&[CORRUPT_MARKER, 1, 2, 3]).unwrap_err();
        assert!(matches!(err, DecodeError::SubmitRejected { packet: 1, .. }));
        assert!(err.is_packet_error() && !err.is_fatal());
        assert_eq!(pipeline.state(), DecoderState::Ready);

        let decoded = pipeline.submit(&video_packet(64, 32)).unwrap();
        assert_eq!(decoded.index, 0);
        assert_eq!((decoded.picture.width, decoded.picture.height), (64, 32));
        assert_eq!(decoded.picture.format, PixelFormat::Yuv420p);
    }

    #[test]
    fn test_buffering_is_a_receive_failure() {
        let health = Arc::new(PipelineHealth::new());
        let mut pipeline = DecodePipeline::new(MockLibrary::new(), &h264_config(), Arc::new(SoftwareOnly))
            .with_health(health.clone());
        pipeline.start().unwrap();

        let err = pipeline.submit(&buffering_packet()).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::NoPicture {
                reason: CodecFailure::Again,
                ..
            }
        ));
        assert_eq!(pipeline.state(), DecoderState::Ready);

        pipeline.submit(&video_packet(8, 8)).unwrap();
        assert_eq!(health.receive_failures(), 1);
        assert_eq!(health.pictures_decoded(), 1);
    }

    #[test]
    fn test_picture_indices_increase() {
        let mut pipeline = DecodePipeline::new(MockLibrary::new(), &h264_config(), Arc::new(SoftwareOnly));
        pipeline.start().unwrap();

        let indices: Vec<u64> = (0..4)
            .filter_map(|i| {
                let packet = if i == 1 { buffering_packet() } else { video_packet(8, 8) };
                pipeline.submit(&packet).ok()
            })
            .map(|decoded| decoded.index)
            .collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_hardware_negotiated_and_released_before_context() {
        let library = MockLibrary::new().offering(vec![
            PixelFormat::Hardware(HwDeviceKind::Vaapi),
            PixelFormat::Yuv420p,
        ]);
        let factory = Arc::new(MockHwFactory::working_with_log(library.event_log()));
        let mut pipeline = DecodePipeline::new(library.clone(), &h264_config(), factory.clone());

        pipeline.start().unwrap();
        assert_eq!(pipeline.hardware_device(), Some(HwDeviceKind::Vaapi));

        let decoded = pipeline.submit(&video_packet(32, 32)).unwrap();
        assert_eq!(decoded.picture.format, PixelFormat::Hardware(HwDeviceKind::Vaapi));

        pipeline.stop();
        assert_eq!(library.events(), vec!["hw_released", "context_closed"]);
        assert_eq!(factory.released(), 1);
    }

    #[test]
    fn test_hardware_failure_falls_back_to_software() {
        let library = MockLibrary::new().offering(vec![
            PixelFormat::Hardware(HwDeviceKind::Vaapi),
            PixelFormat::Yuv420p,
        ]);
        let mut pipeline =
            DecodePipeline::new(library, &h264_config(), Arc::new(MockHwFactory::broken()));

        pipeline.start().unwrap();
        assert_eq!(pipeline.hardware_device(), None);
        let decoded = pipeline.submit(&video_packet(32, 32)).unwrap();
        assert_eq!(decoded.picture.format, PixelFormat::Yuv420p);
    }

    #[test]
    fn test_software_only_never_asks_for_hardware() {
        let library = MockLibrary::new().offering(vec![
            PixelFormat::Hardware(HwDeviceKind::Vaapi),
            PixelFormat::Yuv420p,
        ]);
        let mut pipeline = DecodePipeline::new(library, &h264_config(), Arc::new(SoftwareOnly));

        pipeline.start().unwrap();
        assert_eq!(pipeline.hardware_device(), None);
        let decoded = pipeline.submit(&video_packet(16, 16)).unwrap();
        assert_eq!(decoded.picture.format, PixelFormat::Yuv420p);
    }

    #[test]
    fn test_drop_releases_everything_once() {
        let library = MockLibrary::new().offering(vec![PixelFormat::Hardware(HwDeviceKind::Vaapi)]);
        let factory = Arc::new(MockHwFactory::working());
        {
            let mut pipeline = DecodePipeline::new(library.clone(), &h264_config(), factory.clone());
            pipeline.start().unwrap();
            pipeline.stop();
            pipeline.stop();
        }
        assert_eq!(factory.released(), 1);
        assert_eq!(library.open_contexts(), 0);

        {
            let mut pipeline = DecodePipeline::new(library.clone(), &h264_config(), factory.clone());
            pipeline.start().unwrap();
        }
        assert_eq!(factory.released(), 2);
        assert_eq!(library.open_contexts(), 0);
    }

    #[test]
    fn test_restart_after_stop() {
        let library = MockLibrary::new();
        let mut pipeline = DecodePipeline::new(library.clone(), &h264_config(), Arc::new(SoftwareOnly));

        pipeline.start().unwrap();
        pipeline.stop();
        pipeline.start().unwrap();
        assert_eq!(pipeline.state(), DecoderState::Ready);
        assert_eq!(library.opened_total(), 2);
        assert_eq!(library.open_contexts(), 1);
    }
}
