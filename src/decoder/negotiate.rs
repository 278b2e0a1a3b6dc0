use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{info, warn};

use super::backend::{HwDevice, HwDeviceFactory, HwDeviceKind, PixelFormat};

/// Hardware acceleration context shared between the pipeline and its negotiator.
#[derive(Default)]
pub(crate) struct HwAccelState {
    device: Option<Box<dyn HwDevice>>,
    /// Device creation is tried at most once per session
    attempted: bool,
}

pub(crate) type SharedHwState = Arc<Mutex<HwAccelState>>;

pub(crate) fn lock_hw(state: &SharedHwState) -> MutexGuard<'_, HwAccelState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Drops the hardware device, if any. Returns the kind that was released.
pub(crate) fn release_hw(state: &SharedHwState) -> Option<HwDeviceKind> {
    let device = lock_hw(state).device.take()?;
    let kind = device.kind();
    drop(device);
    Some(kind)
}

pub(crate) fn active_hw(state: &SharedHwState) -> Option<HwDeviceKind> {
    lock_hw(state).device.as_ref().map(|d| d.kind())
}

/// Output format strategy handed to the codec library.
///
/// Picks the hardware surface format when the codec offers it and a device can be
/// created, otherwise the codec's software default. It never fails.
pub struct FormatNegotiator {
    preferred: Option<HwDeviceKind>,
    factory: Arc<dyn HwDeviceFactory>,
    state: SharedHwState,
}

impl FormatNegotiator {
    pub(crate) fn new(
        preferred: Option<HwDeviceKind>,
        factory: Arc<dyn HwDeviceFactory>,
        state: SharedHwState,
    ) -> Self {
        Self {
            preferred,
            factory,
            state,
        }
    }

    /// Chooses one of `candidates` (or YUV 4:2:0 if the list is empty).
    pub fn negotiate(&mut self, candidates: &[PixelFormat]) -> PixelFormat {
        if let Some(kind) = self.preferred {
            let hw_format = PixelFormat::Hardware(kind);
            if candidates.contains(&hw_format) && self.ensure_device(kind) {
                return hw_format;
            }
        }
        software_default(candidates)
    }

    fn ensure_device(&self, kind: HwDeviceKind) -> bool {
        let mut state = lock_hw(&self.state);
        if state.device.is_some() {
            return true;
        }
        if state.attempted {
            return false;
        }
        state.attempted = true;

        match self.factory.create(kind) {
            Ok(device) => {
                info!("Decoder: {} hardware acceleration enabled", kind);
                state.device = Some(device);
                true
            }
            Err(e) => {
                warn!("Decoder: {}, falling back to software decoding", e);
                false
            }
        }
    }
}

fn software_default(candidates: &[PixelFormat]) -> PixelFormat {
    candidates
        .iter()
        .copied()
        .find(|format| !format.is_hardware())
        .unwrap_or(PixelFormat::Yuv420p)
}
