//! # Run Loop
//!
//! [`Node`] is the explicit owned context of one board: role, peer registry,
//! dedup memory, configuration and companion reassembly all live here and are
//! only touched from the run loop.
//!
//! ## Lifecycle
//!
//! ```text
//! new ──► boot ──► run ─────────────────────────► (restart requested)
//!          │        │
//!          │        └─ poll: radio inbox ─► companion inbox ─► sensors ─► periodic
//!          │
//!          └─ stagger ─► elect (2 s window) ─► apply settings ─► advertise (PRIMARY)
//! ```
//!
//! After a restart request the caller takes the collaborators back with
//! [`Node::into_parts`] and builds a fresh node, which reloads the
//! configuration and the persisted role.

use core::fmt::Write;

use log::{debug, info, warn};

use crate::chunk::{chunks, Reassembler};
use crate::config::{
    BOOT_STAGGER_MS, CHUNK_PACING_MS, CHUNK_SIZE, COMPANION_BUFFER_SIZE, ELECTION_POLL_MS,
    ELECTION_WINDOW_MS, GREETING_DELAY_MS, LOOP_IDLE_MS, MAX_PEERS, READVERTISE_INTERVAL_MS,
    RESTART_JITTER_MS,
};
use crate::dedup::{Channel, DedupGate};
use crate::dispatcher::{Action, Dispatcher, Origin};
use crate::election::{Election, ElectionOutcome, RoleArbiter};
use crate::inbox::{CompanionEvent, RadioPacket, Receivers, SensorEvent};
use crate::peers::{PeerAddress, PeerRegistry};
use crate::protocol::{Command, Role, RoleMessage};
use crate::settings::{self, Settings};
use crate::status::BoardStatus;
use crate::traits::{CompanionLink, Platform, PreferenceStore, RadioLink, Renderer};
use crate::{Message, Text, MAX_RADIO_PAYLOAD, VERSION};

/// The collaborators a node drives
pub struct Peripherals<R, C, S, D, P> {
    pub radio: R,
    pub companion: C,
    pub store: S,
    pub renderer: D,
    pub platform: P,
}

/// Outcome of [`Node::send`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Handed to the transport
    Sent,
    /// Identical to the last message on the channel
    Suppressed,
    /// Radio sync is switched off
    Disabled,
    /// Only the PRIMARY talks to the companion
    NotPrimary,
    /// Message did not fit or the transport refused it
    Failed,
}

pub struct Node<'q, R, C, S, D, P> {
    io: Peripherals<R, C, S, D, P>,
    inbox: Receivers<'q>,
    address: PeerAddress,
    role: Role,
    peers: PeerRegistry<MAX_PEERS>,
    dedup: DedupGate,
    dispatcher: Dispatcher,
    reassembler: Reassembler<COMPANION_BUFFER_SIZE>,
    arbiter: RoleArbiter,
    companion_connected: bool,
    greet_at: Option<u64>,
    last_advertise: u64,
    celebration_until: Option<u64>,
    partner_status: Option<BoardStatus>,
    restart_requested: bool,
}

impl<'q, R, C, S, D, P> Node<'q, R, C, S, D, P>
where
    R: RadioLink,
    C: CompanionLink,
    S: PreferenceStore,
    D: Renderer,
    P: Platform,
{
    /// Load configuration and role, writing factory defaults on first boot
    pub fn new(mut io: Peripherals<R, C, S, D, P>, inbox: Receivers<'q>) -> Self {
        Settings::initialize_store(&mut io.store);
        let settings = Settings::load(&io.store);
        let role = settings::load_role(&io.store);
        let address = io.radio.local_address();

        Self {
            io,
            inbox,
            address,
            role,
            peers: PeerRegistry::new(),
            dedup: DedupGate::new(),
            dispatcher: Dispatcher::new(settings),
            reassembler: Reassembler::new(),
            arbiter: RoleArbiter::running(address, role),
            companion_connected: false,
            greet_at: None,
            last_advertise: 0,
            celebration_until: None,
            partner_status: None,
            restart_requested: false,
        }
    }

    /// Stagger, elect a role, then light the board
    pub fn boot(&mut self) -> ElectionOutcome {
        info!("Cornhole node v{} at {} starting as {}", VERSION, self.address, self.role);

        let stagger = self.io.platform.random_range(BOOT_STAGGER_MS);
        self.io.platform.delay_ms(stagger);

        let outcome = self.elect();

        self.dispatcher.apply_settings(&mut self.io.renderer);
        if self.role == Role::Primary {
            self.io.companion.start_advertising();
            self.last_advertise = self.io.platform.now_ms();
        } else {
            self.io.companion.stop_advertising();
        }
        outcome
    }

    /// Run one election round
    ///
    /// Every role change is persisted as soon as it happens. Non-role traffic
    /// received inside the window is dropped.
    pub fn elect(&mut self) -> ElectionOutcome {
        let mut election = Election::new(
            self.address,
            self.role,
            self.io.platform.now_ms(),
            ELECTION_WINDOW_MS,
        );
        self.broadcast_role(election.announcement());

        while !election.is_expired(self.io.platform.now_ms()) {
            while let Some(packet) = self.inbox.radio.take() {
                if packet.from == self.address {
                    continue;
                }
                self.note_sender(packet.from);

                let Some(msg) = as_text(&packet.payload).and_then(RoleMessage::parse) else {
                    debug!("Non-role message from {} dropped during election", packet.from);
                    continue;
                };
                let step = election.observe(packet.from, msg);
                if let Some(reply) = step.reply {
                    self.broadcast_role(reply);
                }
                if let Some(role) = step.changed {
                    self.set_role(role);
                }
            }
            self.io.platform.delay_ms(ELECTION_POLL_MS);
        }

        let outcome = election.finish();
        if outcome.role != self.role {
            self.set_role(outcome.role);
        }
        self.arbiter = RoleArbiter::running(self.address, self.role);
        info!("Election finished: {} (peer heard: {})", self.role, outcome.seen);
        outcome
    }

    /// Loop until a restart is requested
    pub fn run(&mut self) {
        while !self.restart_requested {
            self.poll();
            self.io.platform.delay_ms(LOOP_IDLE_MS);
        }
    }

    /// One run loop iteration
    pub fn poll(&mut self) {
        while !self.restart_requested {
            let Some(packet) = self.inbox.radio.take() else { break };
            self.handle_radio(packet);
        }
        while !self.restart_requested {
            let Some(event) = self.inbox.companion.take() else { break };
            self.handle_companion(event);
        }
        while !self.restart_requested {
            let Some(event) = self.inbox.sensor.take() else { break };
            self.handle_sensor(event);
        }
        if !self.restart_requested {
            self.periodic();
        }
    }

    /// Send on one channel through its dedup slot
    ///
    /// Radio messages are `key:payload` and go to every registered peer.
    /// Companion messages are `key` alone or `key:payload;`, PRIMARY only,
    /// chunked and paced.
    pub fn send(&mut self, channel: Channel, key: &str, payload: &str) -> Delivery {
        match channel {
            Channel::Radio => self.send_radio(key, payload),
            Channel::Companion => self.send_companion(key, payload),
        }
    }

    fn send_radio(&mut self, key: &str, payload: &str) -> Delivery {
        if !self.dispatcher.state().radio_enabled {
            debug!("Radio sync disabled, {} not sent", key);
            return Delivery::Disabled;
        }
        let mut msg: Text<MAX_RADIO_PAYLOAD> = Text::new();
        if write!(msg, "{}:{}", key, payload).is_err() {
            warn!("Radio message {} too long, dropped", key);
            return Delivery::Failed;
        }
        if !self.dedup.admit(Channel::Radio, msg.as_bytes()) {
            debug!("Duplicate radio message suppressed: {}", msg);
            return Delivery::Suppressed;
        }

        for peer in self.peers.all() {
            match self.io.radio.send(*peer, msg.as_bytes()) {
                Ok(()) => debug!("Sent to {}: {}", peer, msg),
                Err(e) => {
                    warn!("Send to {} failed ({:?}), re-adding peer", peer, e);
                    if let Err(e) = self.io.radio.add_peer(*peer) {
                        warn!("Re-adding {} failed: {:?}", peer, e);
                    }
                }
            }
        }
        Delivery::Sent
    }

    fn send_companion(&mut self, key: &str, payload: &str) -> Delivery {
        if self.role != Role::Primary {
            return Delivery::NotPrimary;
        }
        let mut msg = Message::new();
        let framed = if payload.is_empty() {
            msg.push_str(key).map_err(|_| core::fmt::Error)
        } else {
            write!(msg, "{}:{};", key, payload)
        };
        if framed.is_err() {
            warn!("Companion message {} too long, dropped", key);
            return Delivery::Failed;
        }
        if !self.dedup.admit(Channel::Companion, msg.as_bytes()) {
            debug!("Duplicate companion message suppressed: {}", msg);
            return Delivery::Suppressed;
        }

        debug!("Sending to companion: {}", msg);
        for (i, chunk) in chunks(msg.as_bytes(), CHUNK_SIZE).enumerate() {
            if i > 0 {
                self.io.platform.delay_ms(CHUNK_PACING_MS);
            }
            if let Err(e) = self.io.companion.notify(chunk) {
                warn!("Companion notify failed: {:?}", e);
                return Delivery::Failed;
            }
        }
        Delivery::Sent
    }

    fn handle_radio(&mut self, packet: RadioPacket) {
        if packet.from == self.address {
            return;
        }
        self.note_sender(packet.from);

        let payload = packet.payload.as_slice();
        if payload.len() == BoardStatus::SIZE {
            match BoardStatus::decode(payload) {
                Ok(status) => self.partner_reported(status),
                Err(e) => warn!("Bad status record from {}: {:?}", packet.from, e),
            }
            return;
        }

        let Some(text) = as_text(payload) else {
            warn!("Non-UTF-8 radio message from {} dropped", packet.from);
            return;
        };

        if let Some(msg) = RoleMessage::parse(text) {
            let step = self.arbiter.observe(packet.from, msg);
            if let Some(reply) = step.reply {
                self.broadcast_role(reply);
            }
            return;
        }

        match Command::parse(text) {
            Ok(cmd) => {
                if !cmd.is_request() && !self.dedup.admit(Channel::Radio, text.as_bytes()) {
                    debug!("Duplicate radio message dropped: {}", text);
                    return;
                }
                self.execute(cmd, Origin::Radio);
            }
            Err(e) => warn!("Unusable radio message {:?} ({:?})", text, e),
        }
    }

    fn handle_companion(&mut self, event: CompanionEvent) {
        if self.role != Role::Primary {
            match event {
                CompanionEvent::Connected => {
                    warn!("Companion connected to a SECONDARY, dropping it");
                    self.io.companion.stop_advertising();
                }
                CompanionEvent::Disconnected => self.companion_connected = false,
                CompanionEvent::Data(_) => debug!("Companion data ignored on SECONDARY"),
            }
            return;
        }
        match event {
            CompanionEvent::Connected => {
                info!("Companion connected");
                self.companion_connected = true;
                self.dedup.reset(Channel::Companion);
                self.greet_at = Some(self.io.platform.now_ms() + GREETING_DELAY_MS);
            }
            CompanionEvent::Disconnected => {
                info!("Companion disconnected");
                self.companion_connected = false;
                self.greet_at = None;
                self.reassembler.clear();
            }
            CompanionEvent::Data(bytes) => {
                if self.reassembler.push(&bytes).is_err() {
                    return;
                }
                while let Some(frame) = self.reassembler.next_frame() {
                    if self.restart_requested {
                        break;
                    }
                    let Some(line) = as_text(&frame) else {
                        warn!("Non-UTF-8 companion command dropped");
                        continue;
                    };
                    debug!("Companion command: {}", line);
                    match Command::parse(line) {
                        Ok(cmd) => self.execute(cmd, Origin::Companion),
                        Err(e) => warn!("Unusable companion command {:?} ({:?})", line, e),
                    }
                }
            }
        }
    }

    fn handle_sensor(&mut self, event: SensorEvent) {
        if event == SensorEvent::Presence {
            self.celebrate();
        } else if let Some(cmd) = self.dispatcher.gesture(event) {
            self.execute(cmd, Origin::Local);
        }
    }

    fn execute(&mut self, cmd: Command, origin: Origin) {
        let actions = self.dispatcher.dispatch(
            cmd,
            origin,
            self.role,
            &mut self.io.store,
            &mut self.io.renderer,
        );
        for action in actions {
            self.perform(action);
        }
    }

    fn perform(&mut self, action: Action) {
        match action {
            Action::Broadcast(cmd) => {
                self.send(Channel::Radio, cmd.key(), &cmd.payload());
            }
            Action::Notify(cmd) => {
                self.send(Channel::Companion, cmd.key(), &cmd.payload());
            }
            Action::NotifyText(text) => {
                self.send(Channel::Companion, &text, "");
            }
            Action::NotifyPeer(cmd) => match self.peers.current() {
                Some(peer) => self.send_direct(peer, encode_direct(&cmd).as_bytes()),
                None => warn!("No peer to send {} to", cmd.key()),
            },
            Action::Forward(cmd) => {
                let msg = encode_direct(&cmd);
                for i in 0..self.peers.len() {
                    let peer = self.peers.all()[i];
                    self.send_direct(peer, msg.as_bytes());
                }
            }
            Action::SendStatus => match self.peers.current() {
                Some(peer) => {
                    let record = self.own_status().encode();
                    self.send_direct(peer, &record);
                }
                None => warn!("No peer to report status to"),
            },
            Action::NotifyInfo => {
                let line = self.own_status().status_line(self.role);
                self.send(Channel::Companion, &line, "");
            }
            Action::ResetDedup => self.dedup.reset_all(),
            Action::Restart => self.restart(),
            Action::BeginUpdates => {
                info!("Starting update service");
                self.io.platform.begin_updates();
            }
            Action::SetWifi(on) => self.io.platform.set_wifi(on),
        }
    }

    /// Unicast outside the dedup gate
    fn send_direct(&mut self, peer: PeerAddress, bytes: &[u8]) {
        if let Err(e) = self.io.radio.send(peer, bytes) {
            warn!("Direct send to {} failed ({:?}), re-adding peer", peer, e);
            if let Err(e) = self.io.radio.add_peer(peer) {
                warn!("Re-adding {} failed: {:?}", peer, e);
            }
        }
    }

    fn broadcast_role(&mut self, msg: RoleMessage) {
        let text = msg.encode();
        info!("Broadcasting: {}", text);
        if let Err(e) = self.io.radio.send(PeerAddress::BROADCAST, text.as_bytes()) {
            warn!("Role broadcast failed: {:?}", e);
        }
    }

    fn note_sender(&mut self, from: PeerAddress) {
        if !self.peers.has_peer(&from) {
            if self.peers.try_register(from) {
                info!("New peer: {}", from);
                if let Err(e) = self.io.radio.add_peer(from) {
                    warn!("Adding peer {} failed: {:?}", from, e);
                }
            } else if self.peers.is_full() {
                warn!("Peer registry full, {} ignored", from);
            }
        }
        self.peers.set_current(from);
    }

    fn set_role(&mut self, role: Role) {
        self.role = role;
        if let Err(e) = settings::save_role(&mut self.io.store, role) {
            warn!("Failed to persist role: {:?}", e);
        }
    }

    fn partner_reported(&mut self, status: BoardStatus) {
        if self.role == Role::Primary {
            let line = status.status_line(Role::Secondary);
            info!("Partner status: {}", line);
            self.send(Channel::Companion, &line, "");
        } else {
            debug!("Status record ignored on SECONDARY");
        }
        self.partner_status = Some(status);
    }

    fn own_status(&mut self) -> BoardStatus {
        let settings = self.dispatcher.settings();
        let name = match self.role {
            Role::Primary => settings.board1_name.clone(),
            Role::Secondary => settings.board2_name.clone(),
        };
        let ip = self.io.platform.ip_address();
        let raw = self.io.platform.battery_raw();
        BoardStatus::new(&name, self.address, &ip, raw)
    }

    fn celebrate(&mut self) {
        if self.celebration_until.is_some() {
            return;
        }
        let duration = self.dispatcher.settings().celebration_ms as u64;
        info!("Score detected, celebrating for {} ms", duration);
        self.io.renderer.celebrate();
        self.celebration_until = Some(self.io.platform.now_ms() + duration);
    }

    fn periodic(&mut self) {
        let now = self.io.platform.now_ms();

        if self.role == Role::Primary
            && !self.companion_connected
            && now.saturating_sub(self.last_advertise) >= READVERTISE_INTERVAL_MS
        {
            debug!("Re-advertising companion service");
            self.io.companion.start_advertising();
            self.last_advertise = now;
        }

        if let Some(at) = self.greet_at {
            if now >= at {
                self.greet_at = None;
                let state = *self.dispatcher.state();
                let mut index: Text<4> = Text::new();
                let _ = write!(index, "{}", state.color_index);
                self.send(Channel::Companion, "ColorIndex", &index);
                self.send(Channel::Companion, "Effect", state.effect.name());
            }
        }

        if let Some(until) = self.celebration_until {
            if now >= until {
                self.celebration_until = None;
                info!("Celebration finished");
                self.io.renderer.set_color(self.dispatcher.state().color);
            }
        }

        if self.dispatcher.state().lights_on {
            self.io.renderer.tick();
        }
    }

    /// Wait a random jitter, then ask the platform to reboot
    pub fn restart(&mut self) {
        let jitter = self.io.platform.random_range(RESTART_JITTER_MS);
        info!("Restarting in {} ms", jitter);
        self.io.platform.delay_ms(jitter);
        self.io.platform.restart();
        self.restart_requested = true;
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn address(&self) -> PeerAddress {
        self.address
    }

    pub fn peers(&self) -> &PeerRegistry<MAX_PEERS> {
        &self.peers
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn partner_status(&self) -> Option<&BoardStatus> {
        self.partner_status.as_ref()
    }

    pub fn restart_requested(&self) -> bool {
        self.restart_requested
    }

    pub fn io(&self) -> &Peripherals<R, C, S, D, P> {
        &self.io
    }

    pub fn io_mut(&mut self) -> &mut Peripherals<R, C, S, D, P> {
        &mut self.io
    }

    /// Hand back the collaborators and the inbox for the next boot
    pub fn into_parts(self) -> (Peripherals<R, C, S, D, P>, Receivers<'q>) {
        (self.io, self.inbox)
    }
}

fn as_text(bytes: &[u8]) -> Option<&str> {
    core::str::from_utf8(bytes).ok()
}

/// `key` alone for bare commands, `key:payload` otherwise
fn encode_direct(cmd: &Command) -> Text<MAX_RADIO_PAYLOAD> {
    let payload = cmd.payload();
    let mut out = Text::new();
    let written = if payload.is_empty() {
        write!(out, "{}", cmd.key())
    } else {
        write!(out, "{}:{}", cmd.key(), payload)
    };
    debug_assert!(written.is_ok(), "{} truncated for the radio", cmd.key());
    out
}
