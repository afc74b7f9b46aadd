use clap::Parser;
use log::{error, info};
use server::config::{
    ServerConfig, DEFAULT_MAX_CLIENTS, DEFAULT_OUTBOX_CAPACITY, DEFAULT_PORT,
    DEFAULT_SEND_TIMEOUT,
};
use server::movement::EdgePolicy;
use server::network::Server;
use shared::{SpawnPolicy, DEFAULT_COLS, DEFAULT_ROWS};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Number of grid rows
    #[arg(long, default_value_t = DEFAULT_ROWS, allow_negative_numbers = true)]
    rows: i32,

    /// Number of grid columns
    #[arg(long, default_value_t = DEFAULT_COLS, allow_negative_numbers = true)]
    cols: i32,

    /// Spawn placement: sequential, origin or random
    #[arg(long, default_value = "sequential")]
    spawn: SpawnPolicy,

    /// Edge behaviour: reject or wrap
    #[arg(long, default_value = "reject")]
    edge: EdgePolicy,

    /// Maximum number of concurrent clients
    #[arg(short, long, default_value_t = DEFAULT_MAX_CLIENTS)]
    max_clients: usize,

    /// Snapshots buffered per client before it is dropped as too slow
    #[arg(long, default_value_t = DEFAULT_OUTBOX_CAPACITY)]
    outbox_capacity: usize,

    /// Timeout for writing one frame to a client, in milliseconds
    #[arg(long, default_value_t = DEFAULT_SEND_TIMEOUT.as_millis() as u64)]
    send_timeout_ms: u64,
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        ServerConfig {
            host: args.host,
            port: args.port,
            rows: args.rows,
            cols: args.cols,
            spawn_policy: args.spawn,
            edge_policy: args.edge,
            max_clients: args.max_clients,
            outbox_capacity: args.outbox_capacity,
            send_timeout: Duration::from_millis(args.send_timeout_ms),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let config = ServerConfig::from(Args::parse());
    let server = Server::bind(config).await?;

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Server stopped: {}", e);
                return Err(e.into());
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down gracefully...");
        }
    }

    Ok(())
}
