//! Core state driven by the server's event loop.
//!
//! `World` owns the session registry and applies [`GatewayEvent`]s one at a
//! time. Every successful state change is followed by a broadcast, and
//! sessions whose connection can no longer take snapshots are removed before
//! the loop moves on to the next event.

use crate::broadcast::broadcast_all;
use crate::config::ServerConfig;
use crate::error::{ConnectionError, MoveError, RegistryError};
use crate::gateway::GatewayEvent;
use crate::movement::{EdgePolicy, MoveProcessor};
use crate::registry::{ConnectionHandle, SessionId, SessionRegistry};
use log::{debug, info, warn};
use shared::{Grid, GridError, Position, SpawnPolicy};

pub struct World {
    registry: SessionRegistry,
    processor: MoveProcessor,
    max_clients: usize,
}

impl World {
    pub fn new(
        grid: Grid,
        spawn_policy: SpawnPolicy,
        edge_policy: EdgePolicy,
        max_clients: usize,
    ) -> Self {
        Self {
            registry: SessionRegistry::new(grid, spawn_policy),
            processor: MoveProcessor::new(grid, edge_policy),
            max_clients,
        }
    }

    pub fn from_config(config: &ServerConfig) -> Result<Self, GridError> {
        Ok(Self::new(
            config.grid()?,
            config.spawn_policy,
            config.edge_policy,
            config.max_clients,
        ))
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Applies one gateway event. Only identifier exhaustion is an error.
    pub fn handle_event(&mut self, event: GatewayEvent) -> Result<(), RegistryError> {
        match event {
            GatewayEvent::Connected { connection, reply } => {
                let addr = connection.addr();
                let session_id = self.connect(connection)?;

                // The connection task stopped waiting; undo the registration.
                if reply.send(session_id).is_err() {
                    if let Some(session_id) = session_id {
                        debug!("Connection from {} left before registration completed", addr);
                        self.disconnect(session_id);
                    }
                }
            }
            GatewayEvent::Move {
                session_id,
                direction,
            } => match self.apply_move(session_id, &direction) {
                Ok(position) => debug!("Session {} moved {} to {}", session_id, direction, position),
                Err(MoveError::UnknownSession(_)) => {
                    debug!("Discarding move from departed session {}", session_id)
                }
                Err(e) => debug!("Rejected move from session {}: {}", session_id, e),
            },
            GatewayEvent::Disconnected { session_id } => {
                self.disconnect(session_id);
            }
        }
        Ok(())
    }

    /// Registers a connection and announces it.
    ///
    /// Returns `Ok(None)` when the server is at capacity; nothing is
    /// registered or broadcast in that case.
    pub fn connect(
        &mut self,
        connection: ConnectionHandle,
    ) -> Result<Option<SessionId>, RegistryError> {
        if self.registry.len() >= self.max_clients {
            info!(
                "Refusing connection from {}: server full ({} sessions)",
                connection.addr(),
                self.registry.len()
            );
            return Ok(None);
        }

        let session_id = self.registry.register(connection)?;
        self.broadcast();
        Ok(Some(session_id))
    }

    /// Applies a move and broadcasts the result. Failed moves change nothing
    /// and trigger no broadcast.
    pub fn apply_move(
        &mut self,
        session_id: SessionId,
        direction: &str,
    ) -> Result<Position, MoveError> {
        let position = self
            .processor
            .apply_move(&mut self.registry, session_id, direction)?;
        self.broadcast();
        Ok(position)
    }

    /// Removes a session and tells everyone else. Returns false if the
    /// session was already gone.
    pub fn disconnect(&mut self, session_id: SessionId) -> bool {
        match self.registry.unregister(session_id) {
            Ok(_) => {
                self.broadcast();
                true
            }
            Err(ConnectionError::AlreadyClosed(_)) => {
                debug!("Session {} already closed", session_id);
                false
            }
            Err(e) => {
                warn!("Unexpected error closing session {}: {}", session_id, e);
                false
            }
        }
    }

    /// Broadcasts until a pass completes without failures, dropping every
    /// session that could not be served. Each retry has at least one fewer
    /// session, so this terminates.
    fn broadcast(&mut self) {
        loop {
            let report = broadcast_all(&self.registry);
            if report.is_clean() {
                break;
            }

            for session_id in report.failed {
                if self.registry.unregister(session_id).is_ok() {
                    warn!("Dropped session {} after failed delivery", session_id);
                }
            }
        }
    }
}
