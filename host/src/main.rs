//! Run a pair of simulated cornhole boards
//!
//! ```text
//! cornhole-host [config.json]
//! ```
//!
//! Each board serves its companion link on TCP (`nc 127.0.0.1 7878`, then
//! type `BRIGHT:80;`). Sensor gestures are read from stdin as
//! `<board> click|double|long|score`.

use std::collections::HashMap;
use std::io::BufRead;
use std::path::PathBuf;

use cornhole_host::runtime::parse_sensor_line;
use cornhole_host::{
    inboxes, init_logging, Board, HostConfig, HostError, JsonStore, RadioHub, SharedSenders, TcpCompanion,
};
use log::{error, info, warn};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), HostError> {
    let path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = HostConfig::load(path.as_deref())?;
    init_logging(&config.log_level);
    info!("Cornhole host v{} with {} boards", cornhole_node::VERSION, config.nodes.len());

    let hub = RadioHub::new(config.radio_loss_percent);
    let mut sensors: HashMap<String, SharedSenders> = HashMap::new();

    for (i, node) in config.nodes.iter().enumerate() {
        let (senders, inbox) = inboxes();
        let (companion, server) = TcpCompanion::pair(&node.name, senders.clone());
        let store = JsonStore::open(config.store_path(node))?;

        let port = config.companion_port + i as u16;
        let listener = TcpListener::bind(("127.0.0.1", port)).await?;
        let name = node.name.clone();
        tokio::spawn(async move {
            if let Err(e) = server.serve(listener).await {
                error!("{}: companion link stopped: {}", name, e);
            }
        });

        sensors.insert(node.name.clone(), senders.clone());
        Board::new(node, &hub, senders, inbox, store, companion).spawn()?;
    }

    std::thread::Builder::new()
        .name("sensors".into())
        .spawn(move || read_sensors(sensors))?;

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    Ok(())
}

fn read_sensors(boards: HashMap<String, SharedSenders>) {
    for line in std::io::stdin().lock().lines() {
        let Ok(line) = line else { break };
        if line.trim().is_empty() {
            continue;
        }
        let Some((name, event)) = parse_sensor_line(&line) else {
            warn!("Expected `<board> click|double|long|score`, got {:?}", line);
            continue;
        };
        match boards.get(name).map(|senders| senders.lock()) {
            Some(Ok(mut senders)) => {
                let _ = senders.sensor.post(event);
            }
            Some(Err(_)) => warn!("{}: inbox poisoned", name),
            None => warn!("Unknown board {}", name),
        }
    }
}
