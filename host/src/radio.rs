//! # Simulated Radio Medium
//!
//! Every node attached to a [`RadioHub`] gets a [`HubRadio`]. Broadcasts reach
//! every other station; unicast needs the destination in the sender's peer
//! table first, like the real radio stack. Frames may be dropped at random and
//! the sender is never told.
//!
//! Delivery only copies the frame into the receiver's inbox queue, so a send
//! never blocks on the receiving node's run loop.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use cornhole_node::{LinkError, PeerAddress, RadioLink, MAX_RADIO_PAYLOAD};
use log::{debug, trace, warn};
use rand::Rng;

use crate::runtime::SharedSenders;

struct Station {
    inbox: SharedSenders,
    peers: BTreeSet<PeerAddress>,
}

struct HubState {
    stations: BTreeMap<PeerAddress, Station>,
    loss_percent: u8,
}

/// Shared broadcast medium
#[derive(Clone)]
pub struct RadioHub {
    inner: Arc<Mutex<HubState>>,
}

impl RadioHub {
    pub fn new(loss_percent: u8) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HubState {
                stations: BTreeMap::new(),
                loss_percent: loss_percent.min(100),
            })),
        }
    }

    /// Attach a station; frames for `address` are posted to `inbox`
    pub fn attach(&self, address: PeerAddress, inbox: SharedSenders) -> HubRadio {
        if let Ok(mut state) = self.inner.lock() {
            state.stations.insert(
                address,
                Station {
                    inbox,
                    peers: BTreeSet::new(),
                },
            );
        }
        HubRadio {
            address,
            hub: self.clone(),
        }
    }

    /// Empty the peer table of `address`, as a reboot of the radio stack does
    pub fn forget_peers(&self, address: PeerAddress) {
        if let Ok(mut state) = self.inner.lock() {
            if let Some(station) = state.stations.get_mut(&address) {
                station.peers.clear();
            }
        }
    }

    pub fn set_loss_percent(&self, percent: u8) {
        if let Ok(mut state) = self.inner.lock() {
            state.loss_percent = percent.min(100);
        }
    }
}

impl HubState {
    fn lost(&self) -> bool {
        self.loss_percent > 0 && rand::thread_rng().gen_range(0..100) < self.loss_percent
    }

    fn deliver(&self, from: PeerAddress, to: PeerAddress, payload: &[u8]) {
        if self.lost() {
            trace!("Frame {} -> {} lost", from, to);
            return;
        }
        let Some(station) = self.stations.get(&to) else {
            return;
        };
        match station.inbox.lock() {
            Ok(mut senders) => {
                // A full inbox drops the frame, as a busy receiver would
                let _ = senders.radio_received(from, payload);
            }
            Err(_) => warn!("Inbox of {} is poisoned", to),
        }
    }
}

/// One station's handle on the medium
#[derive(Clone)]
pub struct HubRadio {
    address: PeerAddress,
    hub: RadioHub,
}

impl RadioLink for HubRadio {
    fn send(&mut self, dest: PeerAddress, payload: &[u8]) -> Result<(), LinkError> {
        if payload.len() > MAX_RADIO_PAYLOAD {
            return Err(LinkError::PayloadTooLarge);
        }
        let state = self.hub.inner.lock().map_err(|_| LinkError::SendFailed)?;

        if dest.is_broadcast() {
            for &to in state.stations.keys().filter(|&&a| a != self.address) {
                state.deliver(self.address, to, payload);
            }
            return Ok(());
        }

        let known = state
            .stations
            .get(&self.address)
            .is_some_and(|s| s.peers.contains(&dest));
        if !known {
            return Err(LinkError::NotRegistered);
        }
        if !state.stations.contains_key(&dest) {
            debug!("No station at {}", dest);
            return Err(LinkError::SendFailed);
        }
        state.deliver(self.address, dest, payload);
        Ok(())
    }

    fn add_peer(&mut self, peer: PeerAddress) -> Result<(), LinkError> {
        let mut state = self.hub.inner.lock().map_err(|_| LinkError::SendFailed)?;
        let station = state
            .stations
            .get_mut(&self.address)
            .ok_or(LinkError::NotRegistered)?;
        station.peers.insert(peer);
        Ok(())
    }

    fn local_address(&self) -> PeerAddress {
        self.address
    }
}
