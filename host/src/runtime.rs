//! # Board Runtime
//!
//! One OS thread per simulated board. The thread owns the node and all its
//! collaborators; other threads only reach it through the inbox producers in
//! [`SharedSenders`].
//!
//! ```text
//! Board::run
//!   loop:
//!     Node::new ─► boot ─► run ──(restart)──► into_parts
//!        ▲                                        │
//!        └──── discard inbox, clear radio peers ◄─┘
//! ```

use std::io;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use cornhole_node::{Inboxes, Node, PeerAddress, Peripherals, Receivers, Senders, SensorEvent};
use log::{debug, info};

use crate::companion::TcpCompanion;
use crate::config::NodeConfig;
use crate::platform::HostPlatform;
use crate::radio::{HubRadio, RadioHub};
use crate::renderer::LogRenderer;
use crate::store::JsonStore;

/// Producer halves of one node's inboxes, shared by every callback thread
pub type SharedSenders = Arc<Mutex<Senders<'static>>>;

pub type HostPeripherals = Peripherals<HubRadio, TcpCompanion, JsonStore, LogRenderer, HostPlatform>;

pub type HostNode = Node<'static, HubRadio, TcpCompanion, JsonStore, LogRenderer, HostPlatform>;

/// Allocate the inbox queues of one node for the life of the process
pub fn inboxes() -> (SharedSenders, Receivers<'static>) {
    let storage: &'static mut Inboxes = Box::leak(Box::new(Inboxes::new()));
    let (tx, rx) = storage.split();
    (Arc::new(Mutex::new(tx)), rx)
}

/// A simulated board: collaborators plus the loop-side inbox
pub struct Board {
    name: String,
    address: PeerAddress,
    hub: RadioHub,
    io: HostPeripherals,
    inbox: Receivers<'static>,
}

impl Board {
    pub fn new(
        config: &NodeConfig,
        hub: &RadioHub,
        senders: SharedSenders,
        inbox: Receivers<'static>,
        store: JsonStore,
        companion: TcpCompanion,
    ) -> Self {
        let io = Peripherals {
            radio: hub.attach(config.address, senders),
            companion,
            store,
            renderer: LogRenderer::new(&config.name),
            platform: HostPlatform::new(&config.name, config.battery_raw),
        };
        Self {
            name: config.name.clone(),
            address: config.address,
            hub: hub.clone(),
            io,
            inbox,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Boot a node on this board's collaborators
    pub fn start(self) -> (HostNode, RadioHub) {
        let mut node = Node::new(self.io, self.inbox);
        node.boot();
        (node, self.hub)
    }

    /// Boot, run, and reboot whenever the node asks for it
    pub fn run(self) {
        let Board {
            name,
            address,
            hub,
            mut io,
            mut inbox,
        } = self;
        loop {
            let mut node = Node::new(io, inbox);
            node.boot();
            node.run();
            (io, inbox) = node.into_parts();

            // A reboot loses everything in flight and the radio peer table
            let dropped = inbox.discard_pending();
            if dropped > 0 {
                debug!("{}: {} queued events lost in reboot", name, dropped);
            }
            hub.forget_peers(address);
            info!("{}: reboot #{}", name, io.platform.restarts());
        }
    }

    /// Run on a dedicated thread named after the board
    pub fn spawn(self) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || self.run())
    }
}

/// Parse one console line of the form `<board> <gesture>`
///
/// Gestures are `click`, `double`, `long` and `score`.
pub fn parse_sensor_line(line: &str) -> Option<(&str, SensorEvent)> {
    let mut words = line.split_whitespace();
    let board = words.next()?;
    let event = match words.next()? {
        "click" => SensorEvent::SingleClick,
        "double" => SensorEvent::DoubleClick,
        "long" => SensorEvent::LongPress,
        "score" => SensorEvent::Presence,
        _ => return None,
    };
    if words.next().is_some() {
        return None;
    }
    Some((board, event))
}
