//! In-memory codec library for exercising the pipeline without FFmpeg.
//!
//! Packet convention: `[width u32 LE][height u32 LE][pixels..]` decodes to one picture,
//! a packet starting with [`CORRUPT_MARKER`] is rejected on send, a packet starting with
//! [`BUFFERING_MARKER`] is accepted but yields no picture and [`OOM_MARKER`] fails
//! as if the codec could not allocate.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::backend::{
    CodecContext, CodecDescriptor, CodecLibrary, HwDevice, HwDeviceFactory, HwDeviceKind,
    Picture, PixelFormat,
};
use super::error::{CodecFailure, HwAccelError};
use super::negotiate::FormatNegotiator;

pub(crate) const CORRUPT_MARKER: u8 = 0xFF;
pub(crate) const BUFFERING_MARKER: u8 = 0xBB;
pub(crate) const OOM_MARKER: u8 = 0xEE;

pub(crate) type EventLog = Arc<Mutex<Vec<&'static str>>>;

pub(crate) fn video_packet(width: u32, height: u32) -> Vec<u8> {
    let mut packet = Vec::with_capacity(12);
    packet.extend_from_slice(&width.to_le_bytes());
    packet.extend_from_slice(&height.to_le_bytes());
    packet.extend_from_slice(&[0x10, 0x80, 0x80, 0x10]);
    packet
}

pub(crate) fn buffering_packet() -> Vec<u8> {
    vec![BUFFERING_MARKER, 0, 0, 0, 0, 0, 0, 0]
}

#[derive(Clone)]
pub(crate) struct MockLibrary {
    candidates: Vec<PixelFormat>,
    fail_open: Option<CodecFailure>,
    open_contexts: Arc<AtomicUsize>,
    opened_total: Arc<AtomicUsize>,
    events: EventLog,
}

impl MockLibrary {
    pub fn new() -> Self {
        Self {
            candidates: vec![PixelFormat::Yuv420p],
            fail_open: None,
            open_contexts: Arc::new(AtomicUsize::new(0)),
            opened_total: Arc::new(AtomicUsize::new(0)),
            events: EventLog::default(),
        }
    }

    pub fn offering(mut self, candidates: Vec<PixelFormat>) -> Self {
        self.candidates = candidates;
        self
    }

    pub fn failing_open(mut self, failure: CodecFailure) -> Self {
        self.fail_open = Some(failure);
        self
    }

    pub fn open_contexts(&self) -> usize {
        self.open_contexts.load(Ordering::SeqCst)
    }

    pub fn opened_total(&self) -> usize {
        self.opened_total.load(Ordering::SeqCst)
    }

    pub fn event_log(&self) -> EventLog {
        self.events.clone()
    }

    pub fn events(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().clone()
    }
}

impl CodecLibrary for MockLibrary {
    type Context = MockContext;

    fn find_decoder(&self, name: &str) -> Option<CodecDescriptor> {
        (name == "h264").then(|| CodecDescriptor {
            name: name.to_string(),
        })
    }

    fn open(
        &self,
        _codec: &CodecDescriptor,
        mut negotiator: FormatNegotiator,
    ) -> Result<MockContext, CodecFailure> {
        let format = negotiator.negotiate(&self.candidates);
        if let Some(failure) = &self.fail_open {
            return Err(failure.clone());
        }

        self.open_contexts.fetch_add(1, Ordering::SeqCst);
        self.opened_total.fetch_add(1, Ordering::SeqCst);
        Ok(MockContext {
            format,
            pending: None,
            _negotiator: negotiator,
            open_contexts: self.open_contexts.clone(),
            events: self.events.clone(),
        })
    }
}

pub(crate) struct MockContext {
    format: PixelFormat,
    pending: Option<Vec<u8>>,
    _negotiator: FormatNegotiator,
    open_contexts: Arc<AtomicUsize>,
    events: EventLog,
}

impl CodecContext for MockContext {
    fn send_packet(&mut self, packet: &[u8]) -> Result<(), CodecFailure> {
        match packet.first() {
            Some(&CORRUPT_MARKER) | None => {
                Err(CodecFailure::InvalidData("corrupt bitstream".to_string()))
            }
            Some(&OOM_MARKER) => Err(CodecFailure::OutOfMemory),
            Some(_) if packet.len() < 8 => {
                Err(CodecFailure::InvalidData("truncated packet".to_string()))
            }
            Some(_) => {
                self.pending = Some(packet.to_vec());
                Ok(())
            }
        }
    }

    fn receive_picture(&mut self) -> Result<Picture, CodecFailure> {
        let packet = self.pending.take().ok_or(CodecFailure::Again)?;
        if packet[0] == BUFFERING_MARKER {
            return Err(CodecFailure::Again);
        }
        let width = u32::from_le_bytes([packet[0], packet[1], packet[2], packet[3]]);
        let height = u32::from_le_bytes([packet[4], packet[5], packet[6], packet[7]]);
        Ok(Picture {
            width,
            height,
            format: self.format,
            data: packet[8..].to_vec(),
        })
    }
}

impl Drop for MockContext {
    fn drop(&mut self) {
        self.open_contexts.fetch_sub(1, Ordering::SeqCst);
        self.events.lock().unwrap().push("context_closed");
    }
}

struct MockDevice {
    kind: HwDeviceKind,
    released: Arc<AtomicUsize>,
    events: EventLog,
}

impl HwDevice for MockDevice {
    fn kind(&self) -> HwDeviceKind {
        self.kind
    }
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
        self.events.lock().unwrap().push("hw_released");
    }
}

pub(crate) struct MockHwFactory {
    works: bool,
    attempts: AtomicUsize,
    created: AtomicUsize,
    released: Arc<AtomicUsize>,
    events: EventLog,
}

impl MockHwFactory {
    pub fn working() -> Self {
        Self::working_with_log(EventLog::default())
    }

    pub fn working_with_log(events: EventLog) -> Self {
        Self {
            works: true,
            attempts: AtomicUsize::new(0),
            created: AtomicUsize::new(0),
            released: Arc::new(AtomicUsize::new(0)),
            events,
        }
    }

    pub fn broken() -> Self {
        Self {
            works: false,
            ..Self::working()
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

impl HwDeviceFactory for MockHwFactory {
    fn preferred(&self) -> Option<HwDeviceKind> {
        Some(HwDeviceKind::Vaapi)
    }

    fn create(&self, kind: HwDeviceKind) -> Result<Box<dyn HwDevice>, HwAccelError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if !self.works {
            return Err(HwAccelError(format!("no {} device present", kind)));
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockDevice {
            kind,
            released: self.released.clone(),
            events: self.events.clone(),
        }))
    }
}
