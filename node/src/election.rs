//! # Role Election
//!
//! Single-round, broadcast-only protocol that gives the two boards
//! complementary roles without a coordinator.
//!
//! ## Protocol
//!
//! ```text
//!   Node A                                   Node B
//!     │──── ROLE: SECONDARY ────────────────────►│
//!     │◄─────────────────── ROLE: SECONDARY ─────│
//!     │──── We are both: SECONDARY ─────────────►│   same role: conflict
//!     │◄──────────── We are both: SECONDARY ─────│
//!     │                                          │
//!   lower address keeps/takes PRIMARY      higher address SECONDARY
//! ```
//!
//! - An announcement naming our own role is a conflict; we answer
//!   `We are both: <role>` and keep our role. Otherwise we answer
//!   `We are different roles`. Only a received conflict changes a role.
//! - A conflict from a node whose announcement we also heard means both sides
//!   answered each other. It is settled by hardware address: the lower address
//!   ends PRIMARY, and both sides compute the same answer.
//! - A conflict from a node whose announcement we never heard (lost, sent before
//!   we listened, or a board already running) means only we will receive one.
//!   We take the complement of the reported role; the sender keeps its own.
//! - Our own broadcasts echoed back are ignored.
//! - When the window closes without any role message, a SECONDARY assumes it is
//!   alone and promotes itself to PRIMARY.

use heapless::Vec;
use log::{debug, info};

use crate::config::MAX_PEERS;
use crate::peers::PeerAddress;
use crate::protocol::{Role, RoleMessage};

/// Result of feeding one role message to a [`RoleArbiter`]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ArbiterStep {
    /// Message to broadcast in answer
    pub reply: Option<RoleMessage>,
    /// New role, if this message changed it
    pub changed: Option<Role>,
}

/// Applies the role protocol to incoming role messages
#[derive(Debug)]
pub struct RoleArbiter {
    own: PeerAddress,
    role: Role,
    electing: bool,
    seen: bool,
    announcers: Vec<PeerAddress, MAX_PEERS>,
}

impl RoleArbiter {
    /// Arbiter of a node inside its election window
    pub fn electing(own: PeerAddress, role: Role) -> Self {
        Self {
            own,
            role,
            electing: true,
            seen: false,
            announcers: Vec::new(),
        }
    }

    /// Arbiter of a node that finished its election; it answers but never changes
    pub fn running(own: PeerAddress, role: Role) -> Self {
        Self {
            electing: false,
            ..Self::electing(own, role)
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Whether any role message from another node was observed
    pub fn seen(&self) -> bool {
        self.seen
    }

    pub fn observe(&mut self, from: PeerAddress, msg: RoleMessage) -> ArbiterStep {
        let mut step = ArbiterStep::default();
        if from == self.own {
            return step;
        }
        self.seen = true;

        match msg {
            RoleMessage::Announce(theirs) => {
                if self.electing && !self.announcers.contains(&from) {
                    let _ = self.announcers.push(from);
                }
                if theirs == self.role {
                    info!("Role conflict with {}: both {}", from, theirs);
                    step.reply = Some(RoleMessage::Conflict(theirs));
                } else {
                    debug!("Peer {} holds {}", from, theirs);
                    step.reply = Some(RoleMessage::Resolved);
                }
            }
            RoleMessage::Conflict(shared) => {
                if !self.electing || shared != self.role {
                    return step;
                }
                step.changed = if self.announcers.contains(&from) {
                    self.settle_by_address(from)
                } else {
                    self.become_role(shared.complement())
                };
            }
            RoleMessage::Resolved => {
                debug!("Role resolution observed from {}", from);
            }
        }
        step
    }

    fn settle_by_address(&mut self, other: PeerAddress) -> Option<Role> {
        let wanted = if self.own < other {
            Role::Primary
        } else {
            Role::Secondary
        };
        self.become_role(wanted)
    }

    fn become_role(&mut self, role: Role) -> Option<Role> {
        if role == self.role {
            return None;
        }
        info!("Changed role to {}", role);
        self.role = role;
        Some(role)
    }
}

/// Final decision of one election round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElectionOutcome {
    pub role: Role,
    /// Role differs from the one persisted at boot
    pub changed: bool,
    /// At least one role message was observed
    pub seen: bool,
    /// Lone SECONDARY self-promoted
    pub promoted: bool,
}

/// Time-bounded election round
#[derive(Debug)]
pub struct Election {
    arbiter: RoleArbiter,
    initial: Role,
    started_at: u64,
    window_ms: u32,
}

impl Election {
    pub fn new(own: PeerAddress, role: Role, now_ms: u64, window_ms: u32) -> Self {
        Self {
            arbiter: RoleArbiter::electing(own, role),
            initial: role,
            started_at: now_ms,
            window_ms,
        }
    }

    /// The broadcast that opens the round
    pub fn announcement(&self) -> RoleMessage {
        RoleMessage::Announce(self.initial)
    }

    pub fn observe(&mut self, from: PeerAddress, msg: RoleMessage) -> ArbiterStep {
        self.arbiter.observe(from, msg)
    }

    pub fn role(&self) -> Role {
        self.arbiter.role()
    }

    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.started_at) >= self.window_ms as u64
    }

    /// Close the window and apply the lone-node fallback
    pub fn finish(self) -> ElectionOutcome {
        let seen = self.arbiter.seen();
        let mut role = self.arbiter.role();
        let promoted = !seen && role == Role::Secondary;
        if promoted {
            info!("No partner heard, promoting to PRIMARY");
            role = Role::Primary;
        }
        ElectionOutcome {
            role,
            changed: role != self.initial,
            seen,
            promoted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    const WINDOW: u32 = 2000;

    fn addr(last: u8) -> PeerAddress {
        PeerAddress::new([0x24, 0x6F, 0x28, 0x00, 0x00, last])
    }

    const ROLE_PAIRS: [(Role, Role); 4] = [
        (Role::Secondary, Role::Secondary),
        (Role::Primary, Role::Primary),
        (Role::Primary, Role::Secondary),
        (Role::Secondary, Role::Primary),
    ];

    /// How the channel between two electing nodes misbehaves
    #[derive(Default, Clone, Copy)]
    struct Link {
        /// Deliver B's traffic to A first
        b_first: bool,
        /// B opens its window this late; A's announcement goes unheard
        b_start: u64,
        lose_a_announcement: bool,
        lose_b_announcement: bool,
        /// Every message arrives twice
        duplicate: bool,
    }

    fn run_pair(a: (PeerAddress, Role), b: (PeerAddress, Role), b_first: bool) -> (Role, Role) {
        run_link(a, b, Link { b_first, ..Link::default() })
    }

    /// Two electing nodes exchanging messages until both queues drain
    fn run_link(a: (PeerAddress, Role), b: (PeerAddress, Role), link: Link) -> (Role, Role) {
        let mut ea = Election::new(a.0, a.1, 0, WINDOW);
        let mut eb = Election::new(b.0, b.1, link.b_start, WINDOW);
        let copies = if link.duplicate { 2 } else { 1 };

        let mut to_a = VecDeque::new();
        let mut to_b = VecDeque::new();
        if !link.lose_b_announcement {
            to_a.extend(core::iter::repeat(eb.announcement()).take(copies));
        }
        if !link.lose_a_announcement && link.b_start == 0 {
            to_b.extend(core::iter::repeat(ea.announcement()).take(copies));
        }

        let mut a_turn = link.b_first;
        while !to_a.is_empty() || !to_b.is_empty() {
            if a_turn {
                if let Some(msg) = to_a.pop_front() {
                    if let Some(reply) = ea.observe(b.0, msg).reply {
                        to_b.extend(core::iter::repeat(reply).take(copies));
                    }
                }
            } else if let Some(msg) = to_b.pop_front() {
                if let Some(reply) = eb.observe(a.0, msg).reply {
                    to_a.extend(core::iter::repeat(reply).take(copies));
                }
            }
            a_turn = !a_turn;
        }
        assert!(!ea.is_expired(link.b_start) && !eb.is_expired(link.b_start));
        assert!(ea.is_expired(2000) && eb.is_expired(link.b_start + 2000));
        (ea.finish().role, eb.finish().role)
    }

    /// Runs `link` over every role pairing and both address orders
    fn assert_complementary(link: Link) {
        for (ra, rb) in ROLE_PAIRS {
            for (a, b) in [(addr(1), addr(2)), (addr(9), addr(2))] {
                for b_first in [true, false] {
                    let link = Link { b_first, ..link };
                    let (fa, fb) = run_link((a, ra), (b, rb), link);
                    assert_ne!(fa, fb, "{:?}/{:?} a={} b={} b_first={}", ra, rb, a, b, b_first);
                }
            }
        }
    }

    #[test]
    fn test_two_secondaries_converge() {
        for b_first in [true, false] {
            let (a, b) = run_pair((addr(1), Role::Secondary), (addr(2), Role::Secondary), b_first);
            assert_eq!((a, b), (Role::Primary, Role::Secondary));
            let (a, b) = run_pair((addr(9), Role::Secondary), (addr(2), Role::Secondary), b_first);
            assert_eq!((a, b), (Role::Secondary, Role::Primary));
        }
    }

    #[test]
    fn test_two_primaries_converge() {
        for b_first in [true, false] {
            let (a, b) = run_pair((addr(1), Role::Primary), (addr(2), Role::Primary), b_first);
            assert_ne!(a, b);
        }
    }

    #[test]
    fn test_resolved_roles_are_stable() {
        for b_first in [true, false] {
            let (a, b) = run_pair((addr(7), Role::Primary), (addr(2), Role::Secondary), b_first);
            assert_eq!((a, b), (Role::Primary, Role::Secondary));
        }
    }

    #[test]
    fn test_lost_announcement_converges() {
        assert_complementary(Link { lose_a_announcement: true, ..Link::default() });
        assert_complementary(Link { lose_b_announcement: true, ..Link::default() });
    }

    #[test]
    fn test_late_joiner_converges() {
        assert_complementary(Link { b_start: 1000, ..Link::default() });

        // A heard B; B only hears A's conflict and concedes
        let late = Link { b_start: 1000, ..Link::default() };
        let roles = run_link((addr(1), Role::Secondary), (addr(2), Role::Secondary), late);
        assert_eq!(roles, (Role::Secondary, Role::Primary));
        let roles = run_link((addr(9), Role::Primary), (addr(2), Role::Primary), late);
        assert_eq!(roles, (Role::Primary, Role::Secondary));
    }

    #[test]
    fn test_duplicate_messages_converge() {
        assert_complementary(Link { duplicate: true, ..Link::default() });
        assert_complementary(Link { duplicate: true, b_start: 1000, ..Link::default() });

        let twice = Link { duplicate: true, ..Link::default() };
        let roles = run_link((addr(1), Role::Secondary), (addr(2), Role::Secondary), twice);
        assert_eq!(roles, (Role::Primary, Role::Secondary));
    }

    #[test]
    fn test_announcement_alone_never_changes_role() {
        let mut election = Election::new(addr(1), Role::Secondary, 0, WINDOW);
        let step = election.observe(addr(2), RoleMessage::Announce(Role::Secondary));
        assert_eq!(step.reply, Some(RoleMessage::Conflict(Role::Secondary)));
        assert_eq!(step.changed, None);
        let outcome = election.finish();
        assert_eq!(outcome.role, Role::Secondary);
        assert!(outcome.seen && !outcome.promoted);
    }

    #[test]
    fn test_lone_secondary_promotes() {
        let election = Election::new(addr(1), Role::Secondary, 0, WINDOW);
        assert!(!election.is_expired(1999));
        let outcome = election.finish();
        assert_eq!(outcome.role, Role::Primary);
        assert!(outcome.promoted && outcome.changed && !outcome.seen);
    }

    #[test]
    fn test_lone_primary_stays() {
        let outcome = Election::new(addr(1), Role::Primary, 0, WINDOW).finish();
        assert_eq!(outcome.role, Role::Primary);
        assert!(!outcome.changed && !outcome.promoted);
    }

    #[test]
    fn test_own_echo_is_ignored() {
        let mut election = Election::new(addr(1), Role::Secondary, 0, WINDOW);
        let step = election.observe(addr(1), RoleMessage::Conflict(Role::Secondary));
        assert_eq!(step, ArbiterStep::default());
        assert!(election.finish().promoted);
    }

    #[test]
    fn test_booting_node_concedes_to_running_node() {
        let mut running = RoleArbiter::running(addr(1), Role::Secondary);
        let mut booting = Election::new(addr(2), Role::Secondary, 0, WINDOW);

        let step = running.observe(addr(2), booting.announcement());
        assert_eq!(step.reply, Some(RoleMessage::Conflict(Role::Secondary)));
        assert_eq!(step.changed, None);

        let step = booting.observe(addr(1), RoleMessage::Conflict(Role::Secondary));
        assert_eq!(step.changed, Some(Role::Primary));
        assert_eq!(running.role(), Role::Secondary);
    }

    #[test]
    fn test_running_node_ignores_conflicts() {
        let mut running = RoleArbiter::running(addr(1), Role::Primary);
        let step = running.observe(addr(2), RoleMessage::Conflict(Role::Primary));
        assert_eq!(step, ArbiterStep::default());
        assert_eq!(running.role(), Role::Primary);
    }
}
