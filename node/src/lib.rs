//! # Cornhole Node Core
//!
//! This crate provides the coordination and messaging fabric shared by every
//! cornhole lighting board:
//!
//! - **Message Codec**: textual `KEY:payload` commands, role-protocol literals and
//!   the fixed-layout binary [`BoardStatus`] record
//! - **Dedup Gate**: per-channel memory of the last message, suppressing redundant
//!   retransmission and re-processing
//! - **Peer Registry**: bounded, insertion-ordered set of known radio peers
//! - **Role Election**: single-round broadcast protocol deciding PRIMARY vs SECONDARY
//! - **Chunked Transport**: MTU-sized fragmentation and `;`-terminated reassembly
//!   for the companion link
//! - **Command Dispatcher** and **Run Loop**: applying commands and fanning out state
//!
//! ## Architecture
//!
//! ```text
//!  radio callback ──► Inbox (spsc) ──┐                     ┌──► DedupGate ──► radio peers
//!                                    ├──► Node::poll ──► Dispatcher
//!  companion write ─► Inbox (spsc) ──┘        │            └──► DedupGate ──► ChunkedTransport ──► app
//!                                             ▼
//!                                   Renderer / PreferenceStore
//! ```
//!
//! ## Concurrency Model
//!
//! The run loop is single-threaded and cooperative. Transport callbacks only copy
//! bytes into a lock-free single-producer/single-consumer queue and return; all
//! protocol logic runs serially inside [`Node::poll`].

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(all(test, not(feature = "std")))]
extern crate std;

pub mod chunk;
pub mod dedup;
pub mod dispatcher;
pub mod election;
pub mod inbox;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod node;
pub mod peers;
pub mod protocol;
pub mod settings;
pub mod status;
pub mod traits;

// Re-export main types for convenience
pub use chunk::{chunks, Chunks, Reassembler};
pub use dedup::{Channel, DedupGate};
pub use dispatcher::{Action, BoardState, Dispatcher, Origin};
pub use election::{ArbiterStep, Election, ElectionOutcome, RoleArbiter};
pub use inbox::{CompanionEvent, Inboxes, QueueFull, RadioPacket, Receivers, Senders, SensorEvent};
pub use node::{Delivery, Node, Peripherals};
pub use peers::{PeerAddress, PeerRegistry};
pub use protocol::{Command, ParseError, Role, RoleMessage};
pub use settings::{Effect, Rgb, Settings, PALETTE};
pub use status::{BoardStatus, StatusError};
pub use traits::{CompanionLink, LinkError, Platform, PreferenceStore, RadioLink, Renderer, StoreError};

/// Library version reported in logs at boot
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maximum payload of one radio frame (ESP-NOW limit)
pub const MAX_RADIO_PAYLOAD: usize = 250;

/// Maximum length of one companion-link message (the settings snapshot is the longest)
pub const MAX_MESSAGE_LEN: usize = 512;

/// Bounded text used throughout the protocol
pub type Text<const N: usize> = heapless::String<N>;

/// A complete outbound message before framing
pub type Message = Text<MAX_MESSAGE_LEN>;

/// Copy `value` into a bounded string, truncating at a character boundary
pub fn bounded<const N: usize>(value: &str) -> Text<N> {
    let mut end = value.len().min(N);
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    let mut text = Text::new();
    // Cannot fail: `end <= N` and `end` is a char boundary
    let _ = text.push_str(&value[..end]);
    text
}

/// Timing and capacity constants of the node firmware
pub mod config {
    use core::ops::Range;

    /// Maximum number of radio peers remembered by the registry
    pub const MAX_PEERS: usize = 6;

    /// Companion-link notification payload limit
    pub const CHUNK_SIZE: usize = 20;

    /// Pause between two companion notifications, in milliseconds
    pub const CHUNK_PACING_MS: u32 = 20;

    /// Terminator separating commands written by the companion app
    pub const COMMAND_TERMINATOR: u8 = b';';

    /// Role election listen window, in milliseconds
    pub const ELECTION_WINDOW_MS: u32 = 2000;

    /// Polling step while waiting inside the election window
    pub const ELECTION_POLL_MS: u32 = 10;

    /// Idle time at the end of every run loop iteration
    pub const LOOP_IDLE_MS: u32 = 5;

    /// Random boot delay that staggers simultaneous power-on of both boards
    pub const BOOT_STAGGER_MS: Range<u32> = 300..2000;

    /// Random delay before a deliberate restart
    pub const RESTART_JITTER_MS: Range<u32> = 300..3000;

    /// PRIMARY re-advertises the companion service this often while disconnected
    pub const READVERTISE_INTERVAL_MS: u64 = 10_000;

    /// Delay between companion connection and the initial state greeting
    pub const GREETING_DELAY_MS: u64 = 1000;

    /// Capacity of the companion accumulation buffer
    pub const COMPANION_BUFFER_SIZE: usize = 512;

    /// Largest single write accepted from the companion transport
    pub const COMPANION_WRITE_MAX: usize = 64;
}
