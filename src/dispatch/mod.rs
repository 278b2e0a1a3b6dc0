//! Frame dispatch
//!
//! Each tick drains the demuxer queue and routes frames by type: control frames
//! update the session, video goes through the decoder, audio is cached.

mod dispatcher;
mod session;

pub use dispatcher::{FrameDispatcher, PictureSink, TickReport};
pub use session::{AudioCache, SessionState};
