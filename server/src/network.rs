//! Server network layer: WebSocket listener and the core event loop

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::gateway::{self, ConnectionSettings, GatewayEvent};
use crate::world::World;
use log::{error, info};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Position server: accepts connections and owns the world state
pub struct Server {
    listener: TcpListener,
    config: ServerConfig,
}

impl Server {
    /// Validates the configuration and binds the listener.
    ///
    /// An invalid grid is reported here, before any client can connect.
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        config.grid()?;
        let listener = TcpListener::bind(config.bind_addr()).await?;
        info!("Server listening on {}", listener.local_addr()?);

        Ok(Server { listener, config })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Spawns task that accepts connections and starts a gateway for each
    fn spawn_acceptor(
        listener: TcpListener,
        events: mpsc::UnboundedSender<GatewayEvent>,
        settings: ConnectionSettings,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        let _ = stream.set_nodelay(true);
                        tokio::spawn(gateway::handle_connection(
                            stream,
                            addr,
                            events.clone(),
                            settings,
                        ));
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        })
    }

    /// Main server loop
    ///
    /// Connection tasks feed events into one channel; this loop applies them
    /// in arrival order, so registry mutations never interleave and each
    /// broadcast sees a consistent snapshot.
    pub async fn run(self) -> Result<(), ServerError> {
        let mut world = World::from_config(&self.config)?;
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let acceptor = Self::spawn_acceptor(
            self.listener,
            events_tx,
            ConnectionSettings::from(&self.config),
        );

        info!(
            "Server started successfully ({}x{} grid, spawn {}, edge {}, max {} clients)",
            self.config.rows,
            self.config.cols,
            self.config.spawn_policy,
            self.config.edge_policy,
            self.config.max_clients
        );

        while let Some(event) = events_rx.recv().await {
            if let Err(e) = world.handle_event(event) {
                error!("Fatal registry error: {}", e);
                acceptor.abort();
                return Err(e.into());
            }
        }

        info!("Server shutting down");
        Ok(())
    }
}
