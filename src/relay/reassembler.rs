//! Reassembly of inbound fragments into bounded logical messages.
//!
//! A message that grows past the limit fails on its own: the buffer is
//! reset and every remaining fragment of that message is skipped until its
//! final fragment. The connection is never affected.

use crate::relay::error::ReassemblyError;
use crate::relay::frame::{Fragment, FrameKind};

/// Default cap on a single received chunk.
pub const DEFAULT_FRAGMENT_BYTES: usize = 4 * 1024;

/// Default cap on a complete logical message.
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 32 * 1024;

/// Outcome of feeding one fragment.
#[derive(Debug, PartialEq, Eq)]
pub enum Accumulated {
    /// The final fragment arrived; holds the whole message.
    Complete(Vec<u8>),
    NeedMoreData,
    /// The fragment was ignored (non-text, empty, or tail of a dropped message).
    Skipped,
}

/// Accumulates text fragments into one message at a time.
#[derive(Debug)]
pub struct MessageReassembler {
    buffer: Vec<u8>,
    capacity: usize,
    discarding: bool,
}

impl MessageReassembler {
    pub fn new(max_message_bytes: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(max_message_bytes),
            capacity: max_message_bytes,
            discarding: false,
        }
    }

    /// Current write offset into the pending message.
    pub fn offset(&self) -> usize {
        self.buffer.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// True while the tail of an oversized message is being skipped.
    pub fn is_discarding(&self) -> bool {
        self.discarding
    }

    pub fn accumulate(&mut self, fragment: &Fragment) -> Result<Accumulated, ReassemblyError> {
        if fragment.kind != FrameKind::Text {
            tracing::warn!(
                kind = ?fragment.kind,
                size = fragment.len(),
                "Unexpected packet type received, ignoring"
            );
            return Ok(Accumulated::Skipped);
        }

        if self.discarding {
            if fragment.is_final {
                self.discarding = false;
            }
            return Ok(Accumulated::Skipped);
        }

        if fragment.is_empty() && self.buffer.is_empty() {
            if fragment.is_final {
                tracing::warn!("Empty message received, ignoring");
                return Ok(Accumulated::Skipped);
            }
            return Ok(Accumulated::NeedMoreData);
        }

        let size = self.buffer.len() + fragment.len();
        if size > self.capacity {
            self.buffer.clear();
            self.discarding = !fragment.is_final;
            return Err(ReassemblyError::MessageTooLarge {
                size,
                limit: self.capacity,
            });
        }

        self.buffer.extend_from_slice(&fragment.payload);

        if fragment.is_final {
            let message = self.buffer.clone();
            self.buffer.clear();
            Ok(Accumulated::Complete(message))
        } else {
            Ok(Accumulated::NeedMoreData)
        }
    }
}

impl Default for MessageReassembler {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MESSAGE_BYTES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concatenates_fragments() {
        let mut r = MessageReassembler::default();
        assert_eq!(
            r.accumulate(&Fragment::text("hello ", false)).unwrap(),
            Accumulated::NeedMoreData
        );
        assert_eq!(r.offset(), 6);
        assert_eq!(
            r.accumulate(&Fragment::text("wor", false)).unwrap(),
            Accumulated::NeedMoreData
        );
        assert_eq!(
            r.accumulate(&Fragment::text("ld", true)).unwrap(),
            Accumulated::Complete(b"hello world".to_vec())
        );
        assert_eq!(r.offset(), 0);
    }

    #[test]
    fn exactly_at_limit_is_accepted() {
        let mut r = MessageReassembler::new(8);
        r.accumulate(&Fragment::text("1234", false)).unwrap();
        assert_eq!(
            r.accumulate(&Fragment::text("5678", true)).unwrap(),
            Accumulated::Complete(b"12345678".to_vec())
        );
    }

    #[test]
    fn one_byte_over_limit_drops_message_only() {
        let mut r = MessageReassembler::default();
        let chunk = vec![b'a'; DEFAULT_FRAGMENT_BYTES];
        for _ in 0..8 {
            assert_eq!(
                r.accumulate(&Fragment::text(chunk.clone(), false)).unwrap(),
                Accumulated::NeedMoreData
            );
        }
        assert_eq!(r.offset(), DEFAULT_MAX_MESSAGE_BYTES);

        let err = r.accumulate(&Fragment::text("x", true)).unwrap_err();
        assert_eq!(
            err,
            ReassemblyError::MessageTooLarge {
                size: DEFAULT_MAX_MESSAGE_BYTES + 1,
                limit: DEFAULT_MAX_MESSAGE_BYTES
            }
        );
        assert_eq!(r.offset(), 0);
        assert!(!r.is_discarding());

        assert_eq!(
            r.accumulate(&Fragment::text("next", true)).unwrap(),
            Accumulated::Complete(b"next".to_vec())
        );
    }

    #[test]
    fn tail_of_oversized_message_is_skipped() {
        let mut r = MessageReassembler::new(10);
        r.accumulate(&Fragment::text("123456", false)).unwrap();
        assert!(r.accumulate(&Fragment::text("789012", false)).is_err());
        assert!(r.is_discarding());
        assert_eq!(
            r.accumulate(&Fragment::text("tail", false)).unwrap(),
            Accumulated::Skipped
        );
        assert_eq!(
            r.accumulate(&Fragment::text("end", true)).unwrap(),
            Accumulated::Skipped
        );
        assert!(!r.is_discarding());
        assert_eq!(
            r.accumulate(&Fragment::text("ok", true)).unwrap(),
            Accumulated::Complete(b"ok".to_vec())
        );
    }

    #[test]
    fn binary_fragments_do_not_touch_partial_message() {
        let mut r = MessageReassembler::default();
        r.accumulate(&Fragment::text("ab", false)).unwrap();
        assert_eq!(
            r.accumulate(&Fragment::binary(vec![0u8; 16], true)).unwrap(),
            Accumulated::Skipped
        );
        assert_eq!(r.offset(), 2);
        assert_eq!(
            r.accumulate(&Fragment::text("c", true)).unwrap(),
            Accumulated::Complete(b"abc".to_vec())
        );
    }

    #[test]
    fn empty_fragments() {
        let mut r = MessageReassembler::default();
        assert_eq!(r.accumulate(&Fragment::text("", true)).unwrap(), Accumulated::Skipped);
        r.accumulate(&Fragment::text("abc", false)).unwrap();
        assert_eq!(
            r.accumulate(&Fragment::text("", true)).unwrap(),
            Accumulated::Complete(b"abc".to_vec())
        );
    }
}
