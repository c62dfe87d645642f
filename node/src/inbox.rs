//! # Inbound Hand-off Queues
//!
//! Transport callbacks run outside the run loop. They must not block and must
//! not touch protocol state, so each one only copies its bytes into a
//! lock-free single-producer/single-consumer queue and returns.
//!
//! ```text
//!  radio receive callback ──► Producer ─┐
//!  companion write callback ─► Producer ─┼──► spsc::Queue ──► Consumer ──► Node::poll
//!  sensor layer ─────────────► Producer ─┘
//! ```
//!
//! The queue storage lives in [`Inboxes`], which is split once at startup into
//! the producer halves ([`Senders`]) and the consumer halves ([`Receivers`]).
//! Every inbound path goes through the same hand-off, including the radio path.

use heapless::spsc::{Consumer, Producer, Queue};
use heapless::Vec;
use log::warn;

use crate::config::COMPANION_WRITE_MAX;
use crate::peers::PeerAddress;
use crate::MAX_RADIO_PAYLOAD;

/// Radio queue depth (holds one less than this)
pub const RADIO_INBOX: usize = 16;

/// Companion queue depth (holds one less than this)
pub const COMPANION_INBOX: usize = 16;

/// Sensor queue depth (holds one less than this)
pub const SENSOR_INBOX: usize = 8;

/// The queue was full; the item was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct QueueFull;

/// One frame received from the radio
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadioPacket {
    pub from: PeerAddress,
    pub payload: Vec<u8, MAX_RADIO_PAYLOAD>,
}

impl RadioPacket {
    /// Copy a received frame; frames over the radio limit are truncated
    pub fn new(from: PeerAddress, bytes: &[u8]) -> Self {
        let n = bytes.len().min(MAX_RADIO_PAYLOAD);
        let mut payload = Vec::new();
        let _ = payload.extend_from_slice(&bytes[..n]);
        Self { from, payload }
    }
}

/// Connection lifecycle and data events of the companion link
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompanionEvent {
    Connected,
    Disconnected,
    Data(Vec<u8, COMPANION_WRITE_MAX>),
}

/// Discrete events raised by the physical sensors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SensorEvent {
    SingleClick,
    DoubleClick,
    LongPress,
    /// The presence sensor saw a bag go through the hole
    Presence,
}

/// Producer half of one inbox
pub struct InboxSender<'q, T, const N: usize> {
    producer: Producer<'q, T, N>,
    name: &'static str,
}

impl<T, const N: usize> InboxSender<'_, T, N> {
    /// Enqueue without blocking
    pub fn post(&mut self, item: T) -> Result<(), QueueFull> {
        self.producer.enqueue(item).map_err(|_| {
            warn!("{} inbox full, event dropped", self.name);
            QueueFull
        })
    }
}

/// Consumer half of one inbox
pub struct InboxReceiver<'q, T, const N: usize> {
    consumer: Consumer<'q, T, N>,
}

impl<T, const N: usize> InboxReceiver<'_, T, N> {
    pub fn take(&mut self) -> Option<T> {
        self.consumer.dequeue()
    }

    pub fn is_empty(&self) -> bool {
        !self.consumer.ready()
    }

    /// Drop everything queued, returning how many items were dropped
    pub fn discard(&mut self) -> usize {
        let mut dropped = 0;
        while self.consumer.dequeue().is_some() {
            dropped += 1;
        }
        dropped
    }
}

/// Backing storage for every inbound queue of one node
pub struct Inboxes {
    radio: Queue<RadioPacket, RADIO_INBOX>,
    companion: Queue<CompanionEvent, COMPANION_INBOX>,
    sensor: Queue<SensorEvent, SENSOR_INBOX>,
}

impl Inboxes {
    pub const fn new() -> Self {
        Self {
            radio: Queue::new(),
            companion: Queue::new(),
            sensor: Queue::new(),
        }
    }

    /// Split into the callback-side and loop-side halves
    pub fn split(&mut self) -> (Senders<'_>, Receivers<'_>) {
        let (radio_tx, radio_rx) = self.radio.split();
        let (companion_tx, companion_rx) = self.companion.split();
        let (sensor_tx, sensor_rx) = self.sensor.split();
        (
            Senders {
                radio: InboxSender { producer: radio_tx, name: "Radio" },
                companion: InboxSender { producer: companion_tx, name: "Companion" },
                sensor: InboxSender { producer: sensor_tx, name: "Sensor" },
            },
            Receivers {
                radio: InboxReceiver { consumer: radio_rx },
                companion: InboxReceiver { consumer: companion_rx },
                sensor: InboxReceiver { consumer: sensor_rx },
            },
        )
    }
}

impl Default for Inboxes {
    fn default() -> Self {
        Self::new()
    }
}

/// Callback-side halves
pub struct Senders<'q> {
    pub radio: InboxSender<'q, RadioPacket, RADIO_INBOX>,
    pub companion: InboxSender<'q, CompanionEvent, COMPANION_INBOX>,
    pub sensor: InboxSender<'q, SensorEvent, SENSOR_INBOX>,
}

impl Senders<'_> {
    /// Radio receive callback body
    pub fn radio_received(&mut self, from: PeerAddress, bytes: &[u8]) -> Result<(), QueueFull> {
        self.radio.post(RadioPacket::new(from, bytes))
    }

    /// Companion write callback body
    ///
    /// Writes longer than one event are posted as consecutive pieces; nothing
    /// is posted past the first full queue.
    pub fn companion_written(&mut self, bytes: &[u8]) -> Result<(), QueueFull> {
        for piece in bytes.chunks(COMPANION_WRITE_MAX) {
            let mut data = Vec::new();
            let _ = data.extend_from_slice(piece);
            self.companion.post(CompanionEvent::Data(data))?;
        }
        Ok(())
    }
}

/// Loop-side halves
pub struct Receivers<'q> {
    pub radio: InboxReceiver<'q, RadioPacket, RADIO_INBOX>,
    pub companion: InboxReceiver<'q, CompanionEvent, COMPANION_INBOX>,
    pub sensor: InboxReceiver<'q, SensorEvent, SENSOR_INBOX>,
}

impl Receivers<'_> {
    /// Drop everything that arrived while the node was not polling
    pub fn discard_pending(&mut self) -> usize {
        self.radio.discard() + self.companion.discard() + self.sensor.discard()
    }
}
