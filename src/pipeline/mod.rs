//! Receiver instrumentation
//!
//! Counters shared by the demuxer, the dispatcher and the decoder, plus a monitor
//! that turns them into periodic alerts.

pub mod health;

pub use health::{HealthAlert, HealthMonitor, HealthSummary, PipelineHealth};
