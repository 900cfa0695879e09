use std::collections::HashMap;

use packetforge::prelude::*;

/// Packets with this id are echoed back to their sender.
const ECHO_PACKET_ID: u16 = 1000;

// ---------------------------------------------------------------------------
// Logic
// ---------------------------------------------------------------------------

struct Echo {
    worker: usize,
    sender: PacketSender,
    /// Packets echoed per live connection.
    echoed: HashMap<ConnectionId, u64>,
}

impl LogicHandler for Echo {
    fn on_packet(&mut self, packet: &Packet) {
        match packet {
            Packet::Connect { owner } => {
                self.echoed.insert(*owner, 0);
                tracing::info!(%owner, "client connected");
            }
            Packet::Disconnect { owner } => {
                let echoed = self.echoed.remove(owner).unwrap_or(0);
                tracing::info!(%owner, echoed, "client disconnected");
            }
            Packet::Data { owner, payload } if payload.packet_id() == ECHO_PACKET_ID => {
                match self.sender.send(*owner, payload) {
                    Ok(_) => *self.echoed.entry(*owner).or_default() += 1,
                    Err(e) => tracing::debug!(%owner, error = %e, "echo failed"),
                }
            }
            Packet::Data { owner, payload } => {
                tracing::debug!(%owner, packet_id = payload.packet_id(), "ignoring packet");
            }
            Packet::Timer { .. } => {
                let total: u64 = self.echoed.values().sum();
                tracing::info!(
                    worker = self.worker,
                    clients = self.echoed.len(),
                    total,
                    "echo stats"
                );
            }
            _ => {}
        }
    }
}

fn load_config() -> Result<EngineConfig, Box<dyn std::error::Error>> {
    match std::env::args().nth(1) {
        Some(path) => Ok(EngineConfig::from_json_str(&std::fs::read_to_string(path)?)?),
        None => Ok(EngineConfig {
            bind_addr: "0.0.0.0:7000".to_string(),
            ..EngineConfig::default()
        }),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let config = load_config()?;
    tracing::info!(addr = %config.bind_addr, "starting echo server");

    let engine = Engine::builder()
        .config(config)
        .timer(TimerConfig::standard(TIMER_10_SEC))
        .build(|worker, sender| Echo {
            worker,
            sender,
            echoed: HashMap::new(),
        })
        .await?;

    let handle = engine.handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.stop();
        }
    });

    let reports = engine.run().await?;
    for report in reports {
        tracing::info!(
            worker = report.worker,
            processed = report.processed,
            data = report.count(Category::Data),
            "worker finished"
        );
    }
    Ok(())
}
