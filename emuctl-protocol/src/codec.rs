//! Buffering decoder for frame streams.

use crate::frame::{CommandFrame, FRAME_SIZE};
use bytes::BytesMut;

/// Accumulates stream bytes and yields complete frames.
///
/// Stream reads do not respect frame boundaries; bytes are buffered until a
/// whole frame is available.
pub struct FrameDecoder {
    buffer: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(FRAME_SIZE * 64),
        }
    }

    /// Appends data to the internal buffer.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Attempts to decode the next frame from the buffer.
    pub fn decode_frame(&mut self) -> Option<CommandFrame> {
        CommandFrame::decode(&mut self.buffer)
    }

    /// Drains every complete frame currently buffered.
    pub fn drain_frames(&mut self) -> Vec<CommandFrame> {
        let mut frames = Vec::with_capacity(self.buffer.len() / FRAME_SIZE);
        while let Some(frame) = self.decode_frame() {
            frames.push(frame);
        }
        frames
    }

    /// Returns the number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Clears the internal buffer, returning how many bytes were discarded.
    pub fn clear(&mut self) -> usize {
        let discarded = self.buffer.len();
        self.buffer.clear();
        discarded
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::Opcode;
    use proptest::prelude::*;

    #[test]
    fn test_decoder_byte_at_a_time() {
        let frame = CommandFrame::new(Opcode::RestorePointSave, 77);
        let bytes = frame.to_bytes();
        let mut decoder = FrameDecoder::new();

        for (i, b) in bytes.iter().enumerate() {
            decoder.extend(&[*b]);
            if i < FRAME_SIZE - 1 {
                assert!(decoder.decode_frame().is_none());
            }
        }

        assert_eq!(decoder.decode_frame(), Some(frame));
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_clear_discards_partial() {
        let mut decoder = FrameDecoder::new();
        decoder.extend(&[0x12, 0x02, 0x00]);
        assert_eq!(decoder.buffered(), 3);
        assert_eq!(decoder.clear(), 3);
        assert_eq!(decoder.buffered(), 0);
    }

    proptest! {
        #[test]
        fn prop_chunking_preserves_frames(
            frames in prop::collection::vec((any::<u16>(), any::<u64>()), 1..16),
            chunk in 1usize..32,
        ) {
            let frames: Vec<CommandFrame> = frames
                .into_iter()
                .map(|(op, arg)| CommandFrame::from_raw(op, arg))
                .collect();
            let wire: Vec<u8> = frames.iter().flat_map(|f| f.to_bytes()).collect();

            let mut decoder = FrameDecoder::new();
            let mut decoded = Vec::new();
            for piece in wire.chunks(chunk) {
                decoder.extend(piece);
                decoded.extend(decoder.drain_frames());
            }

            prop_assert_eq!(decoded, frames);
            prop_assert_eq!(decoder.buffered(), 0);
        }
    }
}
