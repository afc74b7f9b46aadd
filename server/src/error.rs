//! Error types for the server core.
//!
//! Only [`ServerError`] ends the event loop. Move and connection errors are
//! handled where they occur: the offending request or session is dropped and
//! everyone else carries on.

use crate::registry::SessionId;
use shared::{Direction, GridError, Position};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MoveError {
    #[error("moving {direction} from {from} leaves the grid")]
    OutOfBounds { from: Position, direction: Direction },
    #[error("invalid direction {0:?}")]
    InvalidDirection(String),
    #[error("session {0} is not registered")]
    UnknownSession(SessionId),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    #[error("send to session {session_id} failed: {reason}")]
    SendFailed {
        session_id: SessionId,
        reason: &'static str,
    },
    #[error("session {0} is already closed")]
    AlreadyClosed(SessionId),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("session {0} not found")]
    NotFound(SessionId),
    #[error("session identifier space exhausted")]
    IdSpaceExhausted,
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Grid(#[from] GridError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}
