//! # Peer Registry
//!
//! Bounded, insertion-ordered set of radio peers. Entries are created lazily the
//! first time a sender is seen and are never removed; once the registry is full,
//! new peers are silently ignored.

use core::fmt;

use heapless::Vec;
use serde::{Deserialize, Serialize};

/// 6-byte hardware address of a radio station
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PeerAddress(pub [u8; 6]);

impl PeerAddress {
    /// Destination reaching every station in range
    pub const BROADCAST: PeerAddress = PeerAddress([0xFF; 6]);

    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// Lower-case colon-hex form used in status lines (`aa:bb:cc:dd:ee:ff`)
    pub fn lower_hex(&self) -> LowerHex<'_> {
        LowerHex(self)
    }
}

/// Upper-case colon-hex, as printed in logs
impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

/// Display adapter returned by [`PeerAddress::lower_hex`]
pub struct LowerHex<'a>(&'a PeerAddress);

impl fmt::Display for LowerHex<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0 .0;
        write!(f, "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}")
    }
}

/// Known radio peers plus the "current peer" slot
///
/// The current peer always refers to the most recently seen non-broadcast sender,
/// whether or not it fit into the registry.
#[derive(Debug, Default)]
pub struct PeerRegistry<const N: usize> {
    peers: Vec<PeerAddress, N>,
    current: Option<PeerAddress>,
}

impl<const N: usize> PeerRegistry<N> {
    pub const fn new() -> Self {
        Self {
            peers: Vec::new(),
            current: None,
        }
    }

    pub fn has_peer(&self, addr: &PeerAddress) -> bool {
        self.peers.contains(addr)
    }

    /// Add `addr` if it is new and there is room
    ///
    /// Returns `true` only when the address was newly added.
    pub fn try_register(&mut self, addr: PeerAddress) -> bool {
        if addr.is_broadcast() || self.has_peer(&addr) {
            return false;
        }
        self.peers.push(addr).is_ok()
    }

    /// Registered peers in insertion order
    pub fn all(&self) -> &[PeerAddress] {
        &self.peers
    }

    pub fn current(&self) -> Option<PeerAddress> {
        self.current
    }

    /// Remember `addr` as the most recent sender
    pub fn set_current(&mut self, addr: PeerAddress) {
        if !addr.is_broadcast() {
            self.current = Some(addr);
        }
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.peers.is_full()
    }
}
