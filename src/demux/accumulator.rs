use bytes::{Buf, BufMut, BytesMut};

use super::frame::{Frame, FrameHeader, HEADER_SIZE};

/// Growing buffer of not-yet-framed stream bytes.
///
/// Chunks may arrive split anywhere: in the middle of a header, in the middle of a
/// payload, or carrying several frames at once. Bytes are only consumed once a whole
/// frame is present, so extraction can resume from any split point.
pub struct ByteAccumulator {
    buffer: BytesMut,
}

impl Default for ByteAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl ByteAccumulator {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::new(),
        }
    }

    /// Appends a chunk to the tail of the buffer.
    pub fn append(&mut self, chunk: &[u8]) {
        self.buffer.put_slice(chunk);
    }

    /// Returns the header at the front of the buffer without consuming it.
    pub fn peek_header(&self) -> Option<FrameHeader> {
        FrameHeader::parse(&self.buffer)
    }

    /// Removes and returns the frame at the front of the buffer, if it is complete.
    ///
    /// Returns `None` when more bytes are needed; nothing is consumed in that case.
    pub fn try_extract_frame(&mut self) -> Option<Frame> {
        let header = self.peek_header()?;
        // a length that overflows usize can never be buffered completely
        let size = header.frame_size()?;
        if self.buffer.len() < size {
            return None;
        }

        self.buffer.advance(HEADER_SIZE);
        // split_to hands the payload out and drops the consumed prefix from the buffer
        let payload = self.buffer.split_to(header.length as usize).freeze();

        Some(Frame {
            kind: header.kind,
            payload,
        })
    }

    /// Bytes received but not yet part of an extracted frame.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}
