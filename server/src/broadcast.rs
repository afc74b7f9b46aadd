//! Snapshot fan-out.
//!
//! Every state change ends with [`broadcast_all`]: each live session gets its
//! own view of the world, `{position, others}`, computed from one registry
//! read. Delivery goes through each connection's bounded outbound queue, so a
//! single broadcast never waits on a socket.

use crate::registry::{SessionId, SessionRegistry};
use log::{debug, error, warn};
use shared::{Position, ServerMessage};

/// Outcome of one fan-out pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Sessions whose snapshot was queued.
    pub delivered: usize,
    /// Sessions that could not take the snapshot and must be unregistered.
    pub failed: Vec<SessionId>,
}

impl BroadcastReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// The snapshot one session should see, given every session's position.
pub fn snapshot_for(all: &[(SessionId, Position)], session_id: SessionId) -> Option<ServerMessage> {
    let position = all
        .iter()
        .find(|(id, _)| *id == session_id)
        .map(|(_, position)| *position)?;

    let others = all
        .iter()
        .filter(|(id, _)| *id != session_id)
        .map(|(_, position)| *position)
        .collect();

    Some(ServerMessage::Snapshot { position, others })
}

/// Queues a fresh snapshot for every registered session.
///
/// A failing connection is logged and reported back; it never stops the
/// remaining sessions from being served.
pub fn broadcast_all(registry: &SessionRegistry) -> BroadcastReport {
    let mut report = BroadcastReport::default();
    if registry.is_empty() {
        return report;
    }

    let all = registry.all_sessions();

    for (session_id, _) in &all {
        let Some(session) = registry.session(*session_id) else {
            continue;
        };
        let Some(snapshot) = snapshot_for(&all, *session_id) else {
            continue;
        };

        let payload = match snapshot.encode() {
            Ok(payload) => payload,
            Err(e) => {
                error!("Failed to encode snapshot for session {}: {}", session_id, e);
                continue;
            }
        };

        match session.connection.try_deliver(*session_id, payload) {
            Ok(()) => report.delivered += 1,
            Err(e) => {
                warn!("{}", e);
                report.failed.push(*session_id);
            }
        }
    }

    debug!(
        "Broadcast to {} sessions ({} failed)",
        report.delivered,
        report.failed.len()
    );
    report
}
