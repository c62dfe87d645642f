//! In-memory collaborators for tests
//!
//! Enabled for unit tests and through the `mock` feature for integration tests.

use core::ops::Range;
use std::collections::BTreeMap;
use std::string::{String, ToString};
use std::vec::Vec;

use crate::peers::PeerAddress;
use crate::settings::{Effect, Rgb};
use crate::traits::{CompanionLink, LinkError, Platform, PreferenceStore, RadioLink, Renderer, StoreError};
use crate::{bounded, Text};

/// Radio that records every transmission
#[derive(Debug)]
pub struct MockRadio {
    pub address: PeerAddress,
    pub sent: Vec<(PeerAddress, Vec<u8>)>,
    pub peers: Vec<PeerAddress>,
    pub add_peer_calls: Vec<PeerAddress>,
    /// Number of upcoming unicast sends that fail
    pub fail_sends: usize,
}

impl MockRadio {
    pub fn new(address: PeerAddress) -> Self {
        Self {
            address,
            sent: Vec::new(),
            peers: Vec::new(),
            add_peer_calls: Vec::new(),
            fail_sends: 0,
        }
    }

    /// Transmissions as lossy UTF-8 text
    pub fn sent_text(&self) -> Vec<(PeerAddress, String)> {
        self.sent
            .iter()
            .map(|(dest, bytes)| (*dest, String::from_utf8_lossy(bytes).into_owned()))
            .collect()
    }

    /// Texts sent to `dest`
    pub fn sent_to(&self, dest: PeerAddress) -> Vec<String> {
        self.sent_text()
            .into_iter()
            .filter(|(d, _)| *d == dest)
            .map(|(_, text)| text)
            .collect()
    }
}

impl RadioLink for MockRadio {
    fn send(&mut self, dest: PeerAddress, payload: &[u8]) -> Result<(), LinkError> {
        if !dest.is_broadcast() {
            if self.fail_sends > 0 {
                self.fail_sends -= 1;
                return Err(LinkError::SendFailed);
            }
            if !self.peers.contains(&dest) {
                return Err(LinkError::NotRegistered);
            }
        }
        self.sent.push((dest, payload.to_vec()));
        Ok(())
    }

    fn add_peer(&mut self, peer: PeerAddress) -> Result<(), LinkError> {
        self.add_peer_calls.push(peer);
        if !self.peers.contains(&peer) {
            self.peers.push(peer);
        }
        Ok(())
    }

    fn local_address(&self) -> PeerAddress {
        self.address
    }
}

/// Companion link that records notifications
#[derive(Debug, Default)]
pub struct MockCompanion {
    pub connected: bool,
    pub chunks: Vec<Vec<u8>>,
    pub advertised: usize,
    pub advertising: bool,
}

impl MockCompanion {
    /// Everything notified so far, reassembled
    pub fn received(&self) -> String {
        let bytes: Vec<u8> = self.chunks.concat();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl CompanionLink for MockCompanion {
    fn notify(&mut self, chunk: &[u8]) -> Result<(), LinkError> {
        if !self.connected {
            return Err(LinkError::NotConnected);
        }
        self.chunks.push(chunk.to_vec());
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn start_advertising(&mut self) {
        self.advertised += 1;
        self.advertising = true;
    }

    fn stop_advertising(&mut self) {
        self.advertising = false;
        self.connected = false;
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Stored {
    Str(String),
    I32(i32),
    U32(u32),
    Bool(bool),
}

/// Key/value store backed by a map
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    values: BTreeMap<String, Stored>,
    /// Reject every write
    pub read_only: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn put(&mut self, key: &str, value: Stored) -> Result<(), StoreError> {
        if self.read_only {
            return Err(StoreError::WriteFailed);
        }
        self.values.insert(key.to_string(), value);
        Ok(())
    }
}

impl PreferenceStore for MemoryStore {
    fn get_str<const N: usize>(&self, key: &str) -> Option<Text<N>> {
        match self.values.get(key) {
            Some(Stored::Str(s)) => Some(bounded(s)),
            _ => None,
        }
    }

    fn put_str(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        self.put(key, Stored::Str(value.to_string()))
    }

    fn get_i32(&self, key: &str) -> Option<i32> {
        match self.values.get(key) {
            Some(Stored::I32(v)) => Some(*v),
            _ => None,
        }
    }

    fn put_i32(&mut self, key: &str, value: i32) -> Result<(), StoreError> {
        self.put(key, Stored::I32(value))
    }

    fn get_u32(&self, key: &str) -> Option<u32> {
        match self.values.get(key) {
            Some(Stored::U32(v)) => Some(*v),
            _ => None,
        }
    }

    fn put_u32(&mut self, key: &str, value: u32) -> Result<(), StoreError> {
        self.put(key, Stored::U32(value))
    }

    fn get_bool(&self, key: &str) -> Option<bool> {
        match self.values.get(key) {
            Some(Stored::Bool(v)) => Some(*v),
            _ => None,
        }
    }

    fn put_bool(&mut self, key: &str, value: bool) -> Result<(), StoreError> {
        self.put(key, Stored::Bool(value))
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        if self.read_only {
            return Err(StoreError::WriteFailed);
        }
        self.values.clear();
        Ok(())
    }
}

/// One call made on a [`RecordingRenderer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderCall {
    Effect(Effect),
    Color(Rgb),
    InitialColor(Rgb),
    SportsColors(Rgb, Rgb),
    Brightness(u8),
    BlockSize(u32),
    EffectSpeed(u32),
    Celebrate,
    Power(bool),
}

/// Renderer that records configuration calls and counts frames
#[derive(Debug, Default)]
pub struct RecordingRenderer {
    pub calls: Vec<RenderCall>,
    pub ticks: usize,
}

impl Renderer for RecordingRenderer {
    fn apply_effect(&mut self, effect: Effect) {
        self.calls.push(RenderCall::Effect(effect));
    }

    fn set_color(&mut self, color: Rgb) {
        self.calls.push(RenderCall::Color(color));
    }

    fn set_initial_color(&mut self, color: Rgb) {
        self.calls.push(RenderCall::InitialColor(color));
    }

    fn set_sports_colors(&mut self, first: Rgb, second: Rgb) {
        self.calls.push(RenderCall::SportsColors(first, second));
    }

    fn set_brightness(&mut self, brightness: u8) {
        self.calls.push(RenderCall::Brightness(brightness));
    }

    fn set_block_size(&mut self, size: u32) {
        self.calls.push(RenderCall::BlockSize(size));
    }

    fn set_effect_speed(&mut self, speed: u32) {
        self.calls.push(RenderCall::EffectSpeed(speed));
    }

    fn celebrate(&mut self) {
        self.calls.push(RenderCall::Celebrate);
    }

    fn power(&mut self, on: bool) {
        self.calls.push(RenderCall::Power(on));
    }

    fn tick(&mut self) {
        self.ticks += 1;
    }
}

/// Platform whose clock only moves when the node sleeps
#[derive(Debug)]
pub struct ManualPlatform {
    pub now: u64,
    pub delays: Vec<u32>,
    pub restarts: usize,
    pub updates: usize,
    pub wifi: Option<bool>,
    pub ip: Text<16>,
    pub battery: u16,
}

impl Default for ManualPlatform {
    fn default() -> Self {
        Self {
            now: 0,
            delays: Vec::new(),
            restarts: 0,
            updates: 0,
            wifi: None,
            ip: bounded("192.168.4.1"),
            battery: 4095,
        }
    }
}

impl ManualPlatform {
    pub fn advance(&mut self, ms: u64) {
        self.now += ms;
    }
}

impl Platform for ManualPlatform {
    fn now_ms(&self) -> u64 {
        self.now
    }

    fn delay_ms(&mut self, ms: u32) {
        self.delays.push(ms);
        self.now += ms as u64;
    }

    /// Always the lower bound, so tests stay deterministic
    fn random_range(&mut self, range: Range<u32>) -> u32 {
        range.start
    }

    fn restart(&mut self) {
        self.restarts += 1;
    }

    fn begin_updates(&mut self) {
        self.updates += 1;
    }

    fn set_wifi(&mut self, enabled: bool) {
        self.wifi = Some(enabled);
    }

    fn ip_address(&self) -> Text<16> {
        self.ip.clone()
    }

    fn battery_raw(&mut self) -> u16 {
        self.battery
    }
}
