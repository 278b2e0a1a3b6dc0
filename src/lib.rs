//! Receiver core for Castify streams
//!
//! Bytes from the caster go into a [`demux::FrameDemuxer`], which cuts them into typed
//! frames. A [`dispatch::FrameDispatcher`] drains those frames on every tick, keeps the
//! session state up to date, caches audio and feeds video through a
//! [`decoder::DecodePipeline`].

pub mod config;
pub mod decoder;
pub mod demux;
pub mod dispatch;
pub mod pipeline;
