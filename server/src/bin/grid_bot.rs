use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use log::{info, warn};
use rand::seq::SliceRandom;
use shared::{ClientMessage, Direction, ServerMessage};
use std::time::Duration;
use tokio::time::sleep;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

/// Headless client that wanders the grid at random
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server WebSocket URL
    #[arg(short, long, default_value = "ws://127.0.0.1:8765")]
    server: String,

    /// Number of moves to send before disconnecting
    #[arg(short, long, default_value = "20")]
    moves: u32,

    /// Delay between moves in milliseconds
    #[arg(short, long, default_value = "250")]
    interval_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Connecting to {}", args.server);
    let (ws, _) = connect_async(args.server.as_str()).await?;
    let (mut sink, mut source) = ws.split();

    let reader = tokio::spawn(async move {
        while let Some(frame) = source.next().await {
            match frame {
                Ok(Message::Text(text)) => match ServerMessage::decode(&text) {
                    Ok(ServerMessage::Snapshot { position, others }) => {
                        info!("At {} with {} others", position, others.len());
                    }
                    Ok(ServerMessage::Error { error }) => {
                        warn!("Server error: {}", error);
                    }
                    Err(e) => warn!("Unreadable frame: {}", e),
                },
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    warn!("Connection error: {}", e);
                    break;
                }
            }
        }
        info!("Server closed the connection");
    });

    for _ in 0..args.moves {
        if reader.is_finished() {
            break;
        }

        let direction = *Direction::ALL
            .choose(&mut rand::thread_rng())
            .unwrap_or(&Direction::Right);
        let frame = ClientMessage::movement(direction).encode()?;
        info!("Moving {}", direction);
        sink.send(Message::Text(frame)).await?;

        sleep(Duration::from_millis(args.interval_ms)).await;
    }

    sink.close().await?;
    let _ = tokio::time::timeout(Duration::from_secs(1), reader).await;
    info!("Bot finished");

    Ok(())
}
