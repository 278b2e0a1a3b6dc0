//! Health monitoring and metrics for the receiver

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;

fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or_default()
}

/// Health metrics for the receiver
///
/// Counters are updated by the demuxer, the dispatcher and the decode pipeline.
/// All fields use atomic operations for thread-safe access.
pub struct PipelineHealth {
    /// Raw stream bytes handed to the demuxer
    pub bytes_received: AtomicU64,

    /// Frames extracted from the stream
    pub frames_demuxed: AtomicU64,

    /// Frames routed by the dispatcher
    pub frames_dispatched: AtomicU64,

    /// Pictures produced by the decoder
    pub pictures_decoded: AtomicU64,

    /// Total bytes of decoded pixel data
    pub picture_bytes: AtomicU64,

    /// Packets the decoder rejected
    pub submit_failures: AtomicU64,

    /// Packets accepted without a picture coming out
    pub receive_failures: AtomicU64,

    /// Frames dropped for an unknown type tag
    pub unknown_frames: AtomicU64,

    /// Control frames whose payload could not be parsed
    pub malformed_frames: AtomicU64,

    /// Timestamp (as Unix microseconds) of the last decoded picture
    pub last_picture_time: AtomicU64,
}

impl PipelineHealth {
    pub fn new() -> Self {
        Self {
            bytes_received: AtomicU64::new(0),
            frames_demuxed: AtomicU64::new(0),
            frames_dispatched: AtomicU64::new(0),
            pictures_decoded: AtomicU64::new(0),
            picture_bytes: AtomicU64::new(0),
            submit_failures: AtomicU64::new(0),
            receive_failures: AtomicU64::new(0),
            unknown_frames: AtomicU64::new(0),
            malformed_frames: AtomicU64::new(0),
            last_picture_time: AtomicU64::new(now_micros()),
        }
    }

    pub fn record_bytes_received(&self, size: usize) {
        self.bytes_received.fetch_add(size as u64, Ordering::Relaxed);
    }

    pub fn record_frames_demuxed(&self, count: usize) {
        self.frames_demuxed.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_frame_dispatched(&self) {
        self.frames_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successfully decoded picture
    pub fn record_picture(&self, size: usize) {
        self.last_picture_time.store(now_micros(), Ordering::Relaxed);
        self.pictures_decoded.fetch_add(1, Ordering::Relaxed);
        self.picture_bytes.fetch_add(size as u64, Ordering::Relaxed);
    }

    pub fn record_submit_failure(&self) {
        self.submit_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_receive_failure(&self) {
        self.receive_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unknown_frame(&self) {
        self.unknown_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed_frame(&self) {
        self.malformed_frames.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }

    pub fn frames_demuxed(&self) -> u64 {
        self.frames_demuxed.load(Ordering::Relaxed)
    }

    pub fn frames_dispatched(&self) -> u64 {
        self.frames_dispatched.load(Ordering::Relaxed)
    }

    pub fn pictures_decoded(&self) -> u64 {
        self.pictures_decoded.load(Ordering::Relaxed)
    }

    pub fn picture_bytes(&self) -> u64 {
        self.picture_bytes.load(Ordering::Relaxed)
    }

    pub fn submit_failures(&self) -> u64 {
        self.submit_failures.load(Ordering::Relaxed)
    }

    pub fn receive_failures(&self) -> u64 {
        self.receive_failures.load(Ordering::Relaxed)
    }

    pub fn unknown_frames(&self) -> u64 {
        self.unknown_frames.load(Ordering::Relaxed)
    }

    pub fn malformed_frames(&self) -> u64 {
        self.malformed_frames.load(Ordering::Relaxed)
    }

    /// Submit and receive failures together
    pub fn decode_failures(&self) -> u64 {
        self.submit_failures() + self.receive_failures()
    }

    /// Check if decoding has stalled (no picture for given duration)
    ///
    /// A stream that has not produced its first picture yet is never stalled.
    pub fn is_stalled(&self, threshold: Duration) -> bool {
        if self.pictures_decoded() == 0 {
            return false;
        }
        let last = self.last_picture_time.load(Ordering::Relaxed);
        now_micros().saturating_sub(last) > threshold.as_micros() as u64
    }

    /// Get a summary of health metrics
    pub fn summary(&self) -> HealthSummary {
        HealthSummary {
            bytes_received: self.bytes_received(),
            frames_demuxed: self.frames_demuxed(),
            frames_dispatched: self.frames_dispatched(),
            pictures_decoded: self.pictures_decoded(),
            submit_failures: self.submit_failures(),
            receive_failures: self.receive_failures(),
            unknown_frames: self.unknown_frames(),
            malformed_frames: self.malformed_frames(),
        }
    }
}

impl Default for PipelineHealth {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of health metrics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthSummary {
    pub bytes_received: u64,
    pub frames_demuxed: u64,
    pub frames_dispatched: u64,
    pub pictures_decoded: u64,
    pub submit_failures: u64,
    pub receive_failures: u64,
    pub unknown_frames: u64,
    pub malformed_frames: u64,
}

impl std::fmt::Display for HealthSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Health: {} bytes, {} frames demuxed, {} dispatched, {} pictures, {} rejected packets, {} buffered packets, {} unknown frames, {} malformed frames",
            self.bytes_received,
            self.frames_demuxed,
            self.frames_dispatched,
            self.pictures_decoded,
            self.submit_failures,
            self.receive_failures,
            self.unknown_frames,
            self.malformed_frames
        )
    }
}

/// Health alert types
#[derive(Debug, Clone, PartialEq)]
pub enum HealthAlert {
    /// No picture decoded for threshold duration
    Stalled { duration: Duration },

    /// New packets rejected by the decoder since the last check
    DecodeFailures { count: u64 },

    /// New frames with an unknown type tag since the last check
    UnknownFrames { count: u64 },
}

impl std::fmt::Display for HealthAlert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthAlert::Stalled { duration } => {
                write!(f, "Decoding stalled for {:?}", duration)
            }
            HealthAlert::DecodeFailures { count } => {
                write!(f, "Rejected packets: {}", count)
            }
            HealthAlert::UnknownFrames { count } => {
                write!(f, "Unknown frames: {}", count)
            }
        }
    }
}

/// Health monitoring service
///
/// Periodically checks receiver health and sends alerts when issues are detected.
pub struct HealthMonitor {
    health: Arc<PipelineHealth>,
    alert_tx: mpsc::Sender<HealthAlert>,
    check_interval: Duration,
    stall_threshold: Duration,
    last_submit_failures: u64,
    last_unknown_frames: u64,
}

impl HealthMonitor {
    pub fn new(health: Arc<PipelineHealth>, alert_tx: mpsc::Sender<HealthAlert>) -> Self {
        Self {
            health,
            alert_tx,
            check_interval: Duration::from_secs(5),
            stall_threshold: Duration::from_secs(5),
            last_submit_failures: 0,
            last_unknown_frames: 0,
        }
    }

    /// Configure the check interval
    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    /// Configure the stall threshold
    pub fn with_stall_threshold(mut self, threshold: Duration) -> Self {
        self.stall_threshold = threshold;
        self
    }

    /// Compare the counters with the previous check.
    pub fn check(&mut self) -> Vec<HealthAlert> {
        let mut alerts = Vec::new();

        if self.health.is_stalled(self.stall_threshold) {
            alerts.push(HealthAlert::Stalled {
                duration: self.stall_threshold,
            });
        }

        // buffering (receive failures) is routine, only rejected packets are reported
        let submit_failures = self.health.submit_failures();
        if submit_failures > self.last_submit_failures {
            alerts.push(HealthAlert::DecodeFailures {
                count: submit_failures - self.last_submit_failures,
            });
            self.last_submit_failures = submit_failures;
        }

        let unknown_frames = self.health.unknown_frames();
        if unknown_frames > self.last_unknown_frames {
            alerts.push(HealthAlert::UnknownFrames {
                count: unknown_frames - self.last_unknown_frames,
            });
            self.last_unknown_frames = unknown_frames;
        }

        alerts
    }

    /// Run the health monitor until the alert receiver goes away
    pub async fn run(mut self) {
        let mut interval = tokio::time::interval(self.check_interval);

        loop {
            interval.tick().await;

            for alert in self.check() {
                if self.alert_tx.send(alert).await.is_err() {
                    return;
                }
            }
        }
    }
}
