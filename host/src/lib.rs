//! # Cornhole Host Runtime
//!
//! Runs cornhole nodes on a desktop by providing std implementations of every
//! collaborator the node core needs:
//!
//! - **Radio**: an in-process broadcast medium with optional packet loss
//! - **Companion link**: a TCP socket per node, served with tokio
//! - **Preference store**: one JSON file per node
//! - **Platform**: wall clock, thread sleep, `rand` jitter
//! - **Renderer**: logs effect and color changes
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────── host process ────────────────────────────────┐
//! │                                                                              │
//! │   node thread "left"                           node thread "right"           │
//! │  ┌──────────────────┐                         ┌──────────────────┐           │
//! │  │ Node::run        │──HubRadio──┐   ┌──HubRadio──│ Node::run    │           │
//! │  └──────────────────┘            ▼   ▼         └──────────────────┘           │
//! │         ▲   │               ┌───────────┐              ▲                     │
//! │  Senders│   │notify         │ RadioHub  │──Senders─────┘                     │
//! │         │   ▼               └───────────┘                                    │
//! │  ┌──────────────────┐                                                        │
//! │  │ tokio TCP server │◄──── companion app (telnet, nc, ...)                   │
//! │  └──────────────────┘                                                        │
//! └──────────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Once;

pub mod companion;
pub mod config;
pub mod error;
pub mod platform;
pub mod radio;
pub mod renderer;
pub mod runtime;
pub mod store;

pub use companion::{CompanionServer, TcpCompanion};
pub use config::{HostConfig, NodeConfig};
pub use error::HostError;
pub use platform::HostPlatform;
pub use radio::{HubRadio, RadioHub};
pub use renderer::LogRenderer;
pub use runtime::{inboxes, Board, HostNode, HostPeripherals, SharedSenders};
pub use store::JsonStore;

// Initialize logging once
static INIT_LOGGER: Once = Once::new();

/// Install the `env_logger` backend
///
/// `default_level` applies when `RUST_LOG` is not set. Later calls are no-ops.
pub fn init_logging(default_level: &str) {
    INIT_LOGGER.call_once(|| {
        let env = env_logger::Env::default().default_filter_or(default_level);
        let _ = env_logger::Builder::from_env(env)
            .format_timestamp_millis()
            .try_init();
    });
}
