//! # Dedup Gate
//!
//! Each channel remembers the last message it let through. A message textually
//! identical to that memory is a duplicate and is suppressed; anything else is
//! admitted and becomes the new memory.
//!
//! The radio slot is shared by the send and receive paths, so a command that
//! arrives from a peer is never echoed straight back to it.

use heapless::Vec;

use crate::MAX_MESSAGE_LEN;

/// Transport a message travels on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Channel {
    Radio,
    Companion,
}

/// Last-message memory of one channel
#[derive(Debug, Default)]
pub struct DedupSlot {
    last: Vec<u8, MAX_MESSAGE_LEN>,
}

impl DedupSlot {
    pub const fn new() -> Self {
        Self { last: Vec::new() }
    }

    /// Returns `true` if `msg` differs from the remembered message and records it
    ///
    /// Messages longer than the slot are always admitted and clear the memory.
    pub fn admit(&mut self, msg: &[u8]) -> bool {
        if self.last.as_slice() == msg {
            return false;
        }
        self.last.clear();
        // On overflow the slot stays empty
        let _ = self.last.extend_from_slice(msg);
        true
    }

    pub fn reset(&mut self) {
        self.last.clear();
    }

    pub fn last(&self) -> &[u8] {
        &self.last
    }
}

/// Dedup memory for both channels
#[derive(Debug, Default)]
pub struct DedupGate {
    radio: DedupSlot,
    companion: DedupSlot,
}

impl DedupGate {
    pub const fn new() -> Self {
        Self {
            radio: DedupSlot::new(),
            companion: DedupSlot::new(),
        }
    }

    pub fn admit(&mut self, channel: Channel, msg: &[u8]) -> bool {
        self.slot(channel).admit(msg)
    }

    pub fn reset(&mut self, channel: Channel) {
        self.slot(channel).reset();
    }

    pub fn reset_all(&mut self) {
        self.radio.reset();
        self.companion.reset();
    }

    fn slot(&mut self, channel: Channel) -> &mut DedupSlot {
        match channel {
            Channel::Radio => &mut self.radio,
            Channel::Companion => &mut self.companion,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_is_suppressed_once() {
        let mut gate = DedupGate::new();
        assert!(gate.admit(Channel::Radio, b"BRIGHT:10"));
        assert!(!gate.admit(Channel::Radio, b"BRIGHT:10"));
        assert!(gate.admit(Channel::Radio, b"BRIGHT:11"));
        assert!(gate.admit(Channel::Radio, b"BRIGHT:10"));
    }

    #[test]
    fn test_channels_are_independent() {
        let mut gate = DedupGate::new();
        assert!(gate.admit(Channel::Radio, b"Effect:Chase"));
        assert!(gate.admit(Channel::Companion, b"Effect:Chase"));
        assert!(!gate.admit(Channel::Companion, b"Effect:Chase"));
    }

    #[test]
    fn test_reset_forgets_last_message() {
        let mut gate = DedupGate::new();
        gate.admit(Channel::Companion, b"ColorIndex:2");
        gate.reset(Channel::Companion);
        assert!(gate.admit(Channel::Companion, b"ColorIndex:2"));
    }

    #[test]
    fn test_oversized_message_is_never_a_duplicate() {
        let mut slot = DedupSlot::new();
        let big = [b'x'; MAX_MESSAGE_LEN + 1];
        assert!(slot.admit(&big));
        assert!(slot.last().is_empty());
        assert!(slot.admit(&big));
    }
}
