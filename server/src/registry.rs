//! Session registry: the single source of truth for who is connected and where
//!
//! This module tracks every live connection on the server side:
//! - Session lifecycle (register on connect, unregister on disconnect)
//! - The current grid position of each session
//! - The outbound connection handle used to target broadcasts
//!
//! The registry is owned by the core event loop, so every mutation happens
//! on one task and a broadcast always reads a consistent view.

use crate::error::{ConnectionError, RegistryError};
use log::info;
use shared::{Grid, Position, SpawnPolicy};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::net::SocketAddr;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Opaque, connection-scoped session identifier
///
/// Identifiers are never reused within a process, so a stale id held by a
/// closing connection can never address a newer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Sending half of a connection's outbound queue
///
/// The gateway owns the receiving half and writes whatever arrives to the
/// socket. The queue is bounded; the registry only ever uses `try_send`, so
/// a slow client cannot stall anyone else.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    addr: SocketAddr,
    outbox: mpsc::Sender<String>,
}

impl ConnectionHandle {
    pub fn new(addr: SocketAddr, outbox: mpsc::Sender<String>) -> Self {
        Self { addr, outbox }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Queues an encoded frame without waiting
    ///
    /// A full queue and a closed queue both count as a failed send. Either
    /// way the connection can no longer keep up and must be dropped.
    pub fn try_deliver(&self, session_id: SessionId, payload: String) -> Result<(), ConnectionError> {
        self.outbox.try_send(payload).map_err(|e| match e {
            TrySendError::Full(_) => ConnectionError::SendFailed {
                session_id,
                reason: "outbound queue full",
            },
            TrySendError::Closed(_) => ConnectionError::SendFailed {
                session_id,
                reason: "connection closed",
            },
        })
    }
}

/// One connected client
#[derive(Debug)]
pub struct Session {
    /// Identifier handed to the connection that owns this session
    pub id: SessionId,
    /// Current cell; only changed through [`SessionRegistry::set_position`]
    pub position: Position,
    /// Where broadcasts for this session are delivered
    pub connection: ConnectionHandle,
}

/// Maps live connections to sessions and positions
///
/// New sessions are placed with the configured [`SpawnPolicy`]. Sequential
/// placement takes the lowest free cell of the spawn band, so the first
/// client lands on the first spawn cell.
pub struct SessionRegistry {
    /// Live sessions indexed by their identifier
    sessions: HashMap<SessionId, Session>,
    /// Next identifier to hand out
    next_session_id: u64,
    grid: Grid,
    spawn_policy: SpawnPolicy,
}

impl SessionRegistry {
    /// Creates an empty registry for the given grid
    pub fn new(grid: Grid, spawn_policy: SpawnPolicy) -> Self {
        Self {
            sessions: HashMap::new(),
            next_session_id: 1,
            grid,
            spawn_policy,
        }
    }

    pub fn grid(&self) -> Grid {
        self.grid
    }

    /// Creates a session for a freshly accepted connection
    ///
    /// Fails only when the identifier space is exhausted, which the event
    /// loop treats as fatal.
    pub fn register(&mut self, connection: ConnectionHandle) -> Result<SessionId, RegistryError> {
        let id = SessionId(self.next_session_id);
        self.next_session_id = self
            .next_session_id
            .checked_add(1)
            .ok_or(RegistryError::IdSpaceExhausted)?;

        let position = self.spawn_position();
        info!(
            "Session {} registered from {} at {}",
            id,
            connection.addr(),
            position
        );

        self.sessions.insert(
            id,
            Session {
                id,
                position,
                connection,
            },
        );
        Ok(id)
    }

    /// Picks the starting cell for the next session
    ///
    /// Sequential spawning reuses band cells freed by departed sessions
    /// before extending the band.
    fn spawn_position(&self) -> Position {
        let count = self.sessions.len();
        if self.spawn_policy != SpawnPolicy::Sequential {
            return self.grid.spawn_position(self.spawn_policy, count);
        }

        let occupied: HashSet<Position> = self
            .sessions
            .values()
            .map(|session| session.position)
            .collect();
        (0..=count)
            .map(|index| self.grid.spawn_position(SpawnPolicy::Sequential, index))
            .find(|position| !occupied.contains(position))
            .unwrap_or_else(|| self.grid.spawn_position(SpawnPolicy::Sequential, count))
    }

    /// Removes a session and returns it
    ///
    /// Removing an unknown or already removed session yields
    /// [`ConnectionError::AlreadyClosed`]; callers treat that as a no-op.
    pub fn unregister(&mut self, id: SessionId) -> Result<Session, ConnectionError> {
        match self.sessions.remove(&id) {
            Some(session) => {
                info!("Session {} unregistered", id);
                Ok(session)
            }
            None => Err(ConnectionError::AlreadyClosed(id)),
        }
    }

    /// Current position of a session
    pub fn get(&self, id: SessionId) -> Result<Position, RegistryError> {
        self.sessions
            .get(&id)
            .map(|session| session.position)
            .ok_or(RegistryError::NotFound(id))
    }

    /// Overwrites a session's position without validating it
    pub fn set_position(&mut self, id: SessionId, position: Position) -> Result<(), RegistryError> {
        let session = self
            .sessions
            .get_mut(&id)
            .ok_or(RegistryError::NotFound(id))?;
        session.position = position;
        Ok(())
    }

    /// Every session and its position at the time of the call, ordered by id
    pub fn all_sessions(&self) -> Vec<(SessionId, Position)> {
        let mut all: Vec<(SessionId, Position)> = self
            .sessions
            .values()
            .map(|session| (session.id, session.position))
            .collect();
        all.sort_by_key(|(id, _)| *id);
        all
    }

    pub fn session(&self, id: SessionId) -> Option<&Session> {
        self.sessions.get(&id)
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    /// Returns the number of live sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns true if nobody is connected
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    pub(crate) fn test_handle(capacity: usize) -> (ConnectionHandle, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity);
        let addr: SocketAddr = "127.0.0.1:8080".parse().unwrap();
        (ConnectionHandle::new(addr, tx), rx)
    }

    pub(crate) fn first_session_id() -> SessionId {
        SessionId(1)
    }

    fn test_registry() -> SessionRegistry {
        SessionRegistry::new(Grid::default(), SpawnPolicy::Sequential)
    }

    #[test]
    fn test_registry_creation() {
        let registry = test_registry();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
        assert!(registry.all_sessions().is_empty());
    }

    #[test]
    fn test_register_assigns_spawn_positions() {
        let mut registry = test_registry();
        let (handle1, _rx1) = test_handle(4);
        let (handle2, _rx2) = test_handle(4);

        let id1 = registry.register(handle1).unwrap();
        let id2 = registry.register(handle2).unwrap();

        assert_ne!(id1, id2);
        assert_eq!(registry.get(id1), Ok(Position::new(0, 0)));
        assert_eq!(registry.get(id2), Ok(Position::new(0, 1)));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_all_sessions_lists_each_session_once() {
        let mut registry = test_registry();
        let mut receivers = Vec::new();
        let mut ids = Vec::new();

        for _ in 0..5 {
            let (handle, rx) = test_handle(4);
            receivers.push(rx);
            ids.push(registry.register(handle).unwrap());
        }

        let all = registry.all_sessions();
        assert_eq!(all.len(), 5);
        for id in &ids {
            assert_eq!(all.iter().filter(|(sid, _)| sid == id).count(), 1);
        }
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let mut registry = test_registry();
        let (handle, _rx) = test_handle(4);
        let id = registry.register(handle).unwrap();

        let removed = assert_ok!(registry.unregister(id));
        assert_eq!(removed.id, id);
        assert!(registry.all_sessions().iter().all(|(sid, _)| *sid != id));

        let second = assert_err!(registry.unregister(id));
        assert_eq!(second, ConnectionError::AlreadyClosed(id));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_ids_are_not_reused() {
        let mut registry = test_registry();
        let (handle1, _rx1) = test_handle(4);
        let (handle2, _rx2) = test_handle(4);

        let id1 = registry.register(handle1).unwrap();
        registry.unregister(id1).unwrap();
        let id2 = registry.register(handle2).unwrap();

        assert!(id2 > id1);
    }

    #[test]
    fn test_spawn_reuses_freed_band_cells() {
        let mut registry = test_registry();
        let (handle_a, _rx_a) = test_handle(4);
        let (handle_b, _rx_b) = test_handle(4);
        let (handle_c, _rx_c) = test_handle(4);
        let (handle_d, _rx_d) = test_handle(4);

        let a = registry.register(handle_a).unwrap();
        let b = registry.register(handle_b).unwrap();
        registry.unregister(a).unwrap();

        let c = registry.register(handle_c).unwrap();
        assert_eq!(registry.get(c), Ok(Position::new(0, 0)));
        assert_eq!(registry.get(b), Ok(Position::new(0, 1)));

        let d = registry.register(handle_d).unwrap();
        assert_eq!(registry.get(d), Ok(Position::new(0, 2)));
    }

    #[test]
    fn test_spawn_skips_cells_taken_by_movement() {
        let mut registry = test_registry();
        let (handle_a, _rx_a) = test_handle(4);
        let (handle_b, _rx_b) = test_handle(4);

        let a = registry.register(handle_a).unwrap();
        registry.set_position(a, Position::new(0, 1)).unwrap();

        let b = registry.register(handle_b).unwrap();
        assert_eq!(registry.get(b), Ok(Position::new(0, 0)));
    }

    #[test]
    fn test_get_unknown_session() {
        let registry = test_registry();
        let ghost = SessionId(42);
        assert_eq!(registry.get(ghost), Err(RegistryError::NotFound(ghost)));
    }

    #[test]
    fn test_set_position() {
        let mut registry = test_registry();
        let (handle, _rx) = test_handle(4);
        let id = registry.register(handle).unwrap();

        assert_ok!(registry.set_position(id, Position::new(7, 3)));
        assert_eq!(registry.get(id), Ok(Position::new(7, 3)));

        let ghost = SessionId(999);
        assert_eq!(
            registry.set_position(ghost, Position::new(1, 1)),
            Err(RegistryError::NotFound(ghost))
        );
    }

    #[test]
    fn test_id_exhaustion_is_reported() {
        let mut registry = test_registry();
        registry.next_session_id = u64::MAX;
        let (handle, _rx) = test_handle(4);

        assert_eq!(
            registry.register(handle),
            Err(RegistryError::IdSpaceExhausted)
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn test_try_deliver_reports_full_and_closed_queues() {
        let (handle, rx) = test_handle(1);
        let id = SessionId(1);

        assert_ok!(handle.try_deliver(id, "first".to_string()));
        assert_eq!(
            handle.try_deliver(id, "second".to_string()),
            Err(ConnectionError::SendFailed {
                session_id: id,
                reason: "outbound queue full",
            })
        );

        drop(rx);
        assert_eq!(
            handle.try_deliver(id, "third".to_string()),
            Err(ConnectionError::SendFailed {
                session_id: id,
                reason: "connection closed",
            })
        );
    }
}
