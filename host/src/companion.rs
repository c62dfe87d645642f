//! # TCP Companion Link
//!
//! Stands in for the short-packet wireless link to the companion app. A
//! companion connects over TCP and writes `;`-terminated commands; the node's
//! 20-byte notifications are written back as they are produced.
//!
//! ```text
//!  Node thread                         tokio task
//! ┌─────────────┐   mpsc (chunks)    ┌──────────────────┐    TCP    ┌───────────┐
//! │TcpCompanion │──────────────────► │ CompanionServer  │◄────────► │ companion │
//! └─────────────┘                    │                  │           └───────────┘
//!        ▲          Senders (spsc)   │ Connected / Data │
//!        └───────────────────────────│ / Disconnected   │
//!                                    └──────────────────┘
//! ```
//!
//! Only one companion is served at a time, and only while the node advertises
//! (the PRIMARY). Connections arriving while the node does not advertise are
//! closed right away, and stopping the advertisement ends the live session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use cornhole_node::config::COMPANION_WRITE_MAX;
use cornhole_node::{CompanionEvent, CompanionLink, LinkError};
use log::{debug, info, warn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Notify};

use crate::error::HostError;
use crate::runtime::SharedSenders;

#[derive(Default)]
struct LinkState {
    connected: AtomicBool,
    advertising: AtomicBool,
    hang_up: Notify,
}

/// Node-side half: implements [`CompanionLink`]
pub struct TcpCompanion {
    state: Arc<LinkState>,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
}

/// Network-side half: accepts companions and pumps bytes
pub struct CompanionServer {
    state: Arc<LinkState>,
    outbound: mpsc::UnboundedReceiver<Vec<u8>>,
    inbox: SharedSenders,
    name: String,
}

impl TcpCompanion {
    /// Create both halves of one node's companion link
    pub fn pair(name: &str, inbox: SharedSenders) -> (TcpCompanion, CompanionServer) {
        let state = Arc::new(LinkState::default());
        let (tx, rx) = mpsc::unbounded_channel();
        (
            TcpCompanion {
                state: state.clone(),
                outbound: tx,
            },
            CompanionServer {
                state,
                outbound: rx,
                inbox,
                name: name.to_string(),
            },
        )
    }

    pub fn is_advertising(&self) -> bool {
        self.state.advertising.load(Ordering::Acquire)
    }
}

impl CompanionLink for TcpCompanion {
    fn notify(&mut self, chunk: &[u8]) -> Result<(), LinkError> {
        if !self.state.connected.load(Ordering::Acquire) {
            return Err(LinkError::NotConnected);
        }
        self.outbound
            .send(chunk.to_vec())
            .map_err(|_| LinkError::SendFailed)
    }

    fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::Acquire)
    }

    fn start_advertising(&mut self) {
        if !self.state.advertising.swap(true, Ordering::AcqRel) {
            info!("Companion service advertised");
        }
    }

    fn stop_advertising(&mut self) {
        if self.state.advertising.swap(false, Ordering::AcqRel) {
            info!("Companion service withdrawn");
        }
        if self.state.connected.load(Ordering::Acquire) {
            self.state.hang_up.notify_one();
        }
    }
}

impl CompanionServer {
    /// Accept companions on `listener` until the task is dropped
    pub async fn serve(mut self, listener: TcpListener) -> Result<(), HostError> {
        info!("{}: companion link on {}", self.name, listener.local_addr()?);
        loop {
            let (mut stream, peer) = listener.accept().await?;
            if !self.state.advertising.load(Ordering::Acquire) {
                debug!("{}: refusing companion {} (not advertising)", self.name, peer);
                let _ = stream.shutdown().await;
                continue;
            }
            info!("{}: companion {} connected", self.name, peer);
            self.session(stream).await;
            info!("{}: companion {} disconnected", self.name, peer);
        }
    }

    async fn session(&mut self, mut stream: TcpStream) {
        // Chunks queued while nobody was connected are stale
        while self.outbound.try_recv().is_ok() {}
        let state = self.state.clone();

        self.state.connected.store(true, Ordering::Release);
        self.post(CompanionEvent::Connected);

        let mut buf = [0u8; COMPANION_WRITE_MAX];
        loop {
            tokio::select! {
                read = stream.read(&mut buf) => match read {
                    Ok(0) => break,
                    Ok(n) => self.post_data(&buf[..n]),
                    Err(e) => {
                        warn!("{}: companion read failed: {}", self.name, e);
                        break;
                    }
                },
                chunk = self.outbound.recv() => match chunk {
                    Some(chunk) => {
                        if let Err(e) = stream.write_all(&chunk).await {
                            warn!("{}: companion write failed: {}", self.name, e);
                            break;
                        }
                    }
                    None => break,
                },
                _ = state.hang_up.notified() => {
                    debug!("{}: companion dropped, service withdrawn", self.name);
                    break;
                }
            }
        }

        self.state.connected.store(false, Ordering::Release);
        self.post(CompanionEvent::Disconnected);
    }

    fn post(&self, event: CompanionEvent) {
        if let Ok(mut senders) = self.inbox.lock() {
            let _ = senders.companion.post(event);
        }
    }

    fn post_data(&self, bytes: &[u8]) {
        if let Ok(mut senders) = self.inbox.lock() {
            let _ = senders.companion_written(bytes);
        }
    }
}
