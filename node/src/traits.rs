//! # Collaborator Traits
//!
//! Everything outside the coordination fabric is reached through a narrow trait:
//!
//! - [`RadioLink`]: broadcast/unicast radio with a per-peer table
//! - [`CompanionLink`]: MTU-limited notifications to the companion app
//! - [`PreferenceStore`]: persisted key/value configuration
//! - [`Renderer`]: the LED effect engine
//! - [`Platform`]: clock, randomness, restart, battery, network and updates
//!
//! Firmware implements these over the vendor SDK, the host crate over std, and
//! tests over the in-memory doubles in `mock`.
//!
//! ```text
//! ┌──────────────────────────── Node ─────────────────────────────┐
//! │  election · dedup · peers · dispatcher · reassembler          │
//! └──────┬──────────┬─────────────┬─────────────┬─────────────┬───┘
//!        ▼          ▼             ▼             ▼             ▼
//!   RadioLink  CompanionLink  PreferenceStore  Renderer    Platform
//! ```

use core::ops::Range;

use crate::peers::PeerAddress;
use crate::settings::{Effect, Rgb};
use crate::Text;

/// Errors surfaced by the radio and companion transports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkError {
    /// Destination is not in the transport's peer table
    NotRegistered,
    /// The hardware reported a failed transmission
    SendFailed,
    /// The transport is switched off
    Disabled,
    /// No companion is connected
    NotConnected,
    /// Payload exceeds the transport's frame size
    PayloadTooLarge,
}

/// Errors surfaced by the key/value store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StoreError {
    /// The store could not be opened
    Unavailable,
    /// The value could not be written
    WriteFailed,
}

/// Broadcast-capable radio link with addressed unicast to registered peers
pub trait RadioLink {
    /// Transmit one frame; `PeerAddress::BROADCAST` reaches every station
    fn send(&mut self, dest: PeerAddress, payload: &[u8]) -> Result<(), LinkError>;

    /// Add `peer` to the transport's unicast table
    fn add_peer(&mut self, peer: PeerAddress) -> Result<(), LinkError>;

    /// This station's own hardware address
    fn local_address(&self) -> PeerAddress;
}

/// Short-packet notification link to the companion app
pub trait CompanionLink {
    /// Send one notification of at most `CHUNK_SIZE` bytes
    fn notify(&mut self, chunk: &[u8]) -> Result<(), LinkError>;

    fn is_connected(&self) -> bool;

    /// (Re)start advertising the companion service
    fn start_advertising(&mut self);

    /// Stop advertising and drop any connected companion
    fn stop_advertising(&mut self);
}

/// Persisted key/value configuration
///
/// Getters return `None` for keys that were never written or were cleared.
pub trait PreferenceStore {
    fn get_str<const N: usize>(&self, key: &str) -> Option<Text<N>>;
    fn put_str(&mut self, key: &str, value: &str) -> Result<(), StoreError>;

    fn get_i32(&self, key: &str) -> Option<i32>;
    fn put_i32(&mut self, key: &str, value: i32) -> Result<(), StoreError>;

    fn get_u32(&self, key: &str) -> Option<u32>;
    fn put_u32(&mut self, key: &str, value: u32) -> Result<(), StoreError>;

    fn get_bool(&self, key: &str) -> Option<bool>;
    fn put_bool(&mut self, key: &str, value: bool) -> Result<(), StoreError>;

    /// Remove every key
    fn clear(&mut self) -> Result<(), StoreError>;
}

/// LED effect engine
pub trait Renderer {
    fn apply_effect(&mut self, effect: Effect);
    fn set_color(&mut self, color: Rgb);
    fn set_initial_color(&mut self, color: Rgb);
    fn set_sports_colors(&mut self, first: Rgb, second: Rgb);
    fn set_brightness(&mut self, brightness: u8);
    fn set_block_size(&mut self, size: u32);
    fn set_effect_speed(&mut self, speed: u32);

    /// Start the score celebration animation
    fn celebrate(&mut self);

    /// Switch the strips on or off
    fn power(&mut self, on: bool);

    /// Advance the current effect by one frame
    fn tick(&mut self);
}

/// Board services outside the fabric
pub trait Platform {
    /// Monotonic milliseconds since boot
    fn now_ms(&self) -> u64;

    fn delay_ms(&mut self, ms: u32);

    /// Uniform random value in `range`
    fn random_range(&mut self, range: Range<u32>) -> u32;

    /// Request a reboot; the run loop returns right after
    fn restart(&mut self);

    /// Start serving firmware updates
    fn begin_updates(&mut self);

    fn set_wifi(&mut self, enabled: bool);

    /// Current network address as text (`0.0.0.0` when offline)
    fn ip_address(&self) -> Text<16>;

    /// Raw 12-bit reading of the battery divider
    fn battery_raw(&mut self) -> u16;
}
