//! Move validation and application.

use crate::error::MoveError;
use crate::registry::{SessionId, SessionRegistry};
use shared::{Direction, Grid, Position, UnknownDirection};
use std::fmt;
use std::str::FromStr;

/// What happens when a move would step off the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EdgePolicy {
    /// The move fails with [`MoveError::OutOfBounds`].
    #[default]
    Reject,
    /// Opposite edges are joined; the session reappears on the far side.
    Wrap,
}

impl fmt::Display for EdgePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EdgePolicy::Reject => "reject",
            EdgePolicy::Wrap => "wrap",
        })
    }
}

impl FromStr for EdgePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "reject" => Ok(EdgePolicy::Reject),
            "wrap" => Ok(EdgePolicy::Wrap),
            other => Err(format!(
                "unknown edge policy '{other}' (expected reject or wrap)"
            )),
        }
    }
}

/// Turns directional intents into committed positions.
///
/// Several sessions may occupy the same cell; only the grid edge can
/// refuse a move.
#[derive(Debug, Clone, Copy)]
pub struct MoveProcessor {
    grid: Grid,
    edge_policy: EdgePolicy,
}

impl MoveProcessor {
    pub fn new(grid: Grid, edge_policy: EdgePolicy) -> Self {
        Self { grid, edge_policy }
    }

    pub fn edge_policy(&self) -> EdgePolicy {
        self.edge_policy
    }

    /// Applies a move given as it arrived on the wire.
    pub fn apply_move(
        &self,
        registry: &mut SessionRegistry,
        session_id: SessionId,
        direction: &str,
    ) -> Result<Position, MoveError> {
        let direction: Direction = direction
            .parse()
            .map_err(|UnknownDirection(raw)| MoveError::InvalidDirection(raw))?;
        self.apply_direction(registry, session_id, direction)
    }

    /// Moves a session one cell and returns where it ended up.
    ///
    /// Nothing is written unless the move succeeds.
    pub fn apply_direction(
        &self,
        registry: &mut SessionRegistry,
        session_id: SessionId,
        direction: Direction,
    ) -> Result<Position, MoveError> {
        let current = registry
            .get(session_id)
            .map_err(|_| MoveError::UnknownSession(session_id))?;
        let candidate = current.offset(direction);

        let target = if self.grid.is_in_bounds(candidate) {
            candidate
        } else {
            match self.edge_policy {
                EdgePolicy::Reject => {
                    return Err(MoveError::OutOfBounds {
                        from: current,
                        direction,
                    })
                }
                EdgePolicy::Wrap => self.grid.wrap(candidate),
            }
        };

        registry
            .set_position(session_id, target)
            .map_err(|_| MoveError::UnknownSession(session_id))?;
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::tests::test_handle;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use shared::SpawnPolicy;

    fn setup(edge_policy: EdgePolicy) -> (SessionRegistry, MoveProcessor) {
        let grid = Grid::default();
        (
            SessionRegistry::new(grid, SpawnPolicy::Sequential),
            MoveProcessor::new(grid, edge_policy),
        )
    }

    #[test]
    fn test_move_off_top_edge_is_rejected() {
        let (mut registry, processor) = setup(EdgePolicy::Reject);
        let (handle, _rx) = test_handle(4);
        let id = registry.register(handle).unwrap();
        assert_eq!(registry.get(id), Ok(Position::new(0, 0)));

        assert_eq!(
            processor.apply_move(&mut registry, id, "up"),
            Err(MoveError::OutOfBounds {
                from: Position::new(0, 0),
                direction: Direction::Up,
            })
        );
        assert_eq!(registry.get(id), Ok(Position::new(0, 0)));

        assert_eq!(
            processor.apply_move(&mut registry, id, "right"),
            Ok(Position::new(0, 1))
        );
        assert_eq!(registry.get(id), Ok(Position::new(0, 1)));
    }

    #[test]
    fn test_all_edges_reject() {
        let (mut registry, processor) = setup(EdgePolicy::Reject);
        let (handle, _rx) = test_handle(4);
        let id = registry.register(handle).unwrap();

        registry.set_position(id, Position::new(9, 9)).unwrap();
        assert!(processor.apply_move(&mut registry, id, "down").is_err());
        assert!(processor.apply_move(&mut registry, id, "right").is_err());

        registry.set_position(id, Position::new(0, 0)).unwrap();
        assert!(processor.apply_move(&mut registry, id, "left").is_err());
        assert_eq!(registry.get(id), Ok(Position::new(0, 0)));
    }

    #[test]
    fn test_wrap_policy_crosses_edges() {
        let (mut registry, processor) = setup(EdgePolicy::Wrap);
        let (handle, _rx) = test_handle(4);
        let id = registry.register(handle).unwrap();

        assert_eq!(
            processor.apply_move(&mut registry, id, "up"),
            Ok(Position::new(9, 0))
        );
        assert_eq!(
            processor.apply_move(&mut registry, id, "left"),
            Ok(Position::new(9, 9))
        );
        assert_eq!(
            processor.apply_move(&mut registry, id, "down"),
            Ok(Position::new(0, 9))
        );
    }

    #[test]
    fn test_invalid_direction_changes_nothing() {
        let (mut registry, processor) = setup(EdgePolicy::Reject);
        let (handle1, _rx1) = test_handle(4);
        let (handle2, _rx2) = test_handle(4);
        let id1 = registry.register(handle1).unwrap();
        let _id2 = registry.register(handle2).unwrap();
        let before = registry.all_sessions();

        for bogus in ["jump", "UP", "", "up ", "north"] {
            assert_eq!(
                processor.apply_move(&mut registry, id1, bogus),
                Err(MoveError::InvalidDirection(bogus.to_string()))
            );
        }

        assert_eq!(registry.all_sessions(), before);
    }

    #[test]
    fn test_moves_onto_occupied_cells_are_allowed() {
        let (mut registry, processor) = setup(EdgePolicy::Reject);
        let (handle1, _rx1) = test_handle(4);
        let (handle2, _rx2) = test_handle(4);
        let id1 = registry.register(handle1).unwrap();
        let id2 = registry.register(handle2).unwrap();

        assert_eq!(
            processor.apply_direction(&mut registry, id2, Direction::Left),
            Ok(Position::new(0, 0))
        );
        assert_eq!(registry.get(id1), registry.get(id2));
    }

    #[test]
    fn test_move_for_unknown_session_is_discarded() {
        let (mut registry, processor) = setup(EdgePolicy::Reject);
        let (handle, _rx) = test_handle(4);
        let id = registry.register(handle).unwrap();
        registry.unregister(id).unwrap();

        assert_eq!(
            processor.apply_move(&mut registry, id, "down"),
            Err(MoveError::UnknownSession(id))
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn test_random_walks_stay_in_bounds() {
        for edge_policy in [EdgePolicy::Reject, EdgePolicy::Wrap] {
            let (mut registry, processor) = setup(edge_policy);
            let mut receivers = Vec::new();
            let mut ids = Vec::new();
            for _ in 0..8 {
                let (handle, rx) = test_handle(4);
                receivers.push(rx);
                ids.push(registry.register(handle).unwrap());
            }

            let mut rng = StdRng::seed_from_u64(7);
            for _ in 0..5_000 {
                let id = ids[rng.gen_range(0..ids.len())];
                let direction = Direction::ALL[rng.gen_range(0..Direction::ALL.len())];
                let _ = processor.apply_direction(&mut registry, id, direction);
            }

            let grid = registry.grid();
            for (id, position) in registry.all_sessions() {
                assert!(
                    grid.is_in_bounds(position),
                    "session {id} escaped to {position} under {edge_policy}"
                );
            }
        }
    }

    #[test]
    fn test_edge_policy_parsing() {
        assert_eq!("wrap".parse::<EdgePolicy>(), Ok(EdgePolicy::Wrap));
        assert_eq!("reject".parse::<EdgePolicy>(), Ok(EdgePolicy::Reject));
        assert!("bounce".parse::<EdgePolicy>().is_err());
    }
}
