//! Startup configuration for the position server.

use crate::movement::EdgePolicy;
use shared::{Grid, GridError, SpawnPolicy, DEFAULT_COLS, DEFAULT_ROWS};
use std::time::Duration;

/// Port the browser grid client connects to out of the box.
pub const DEFAULT_PORT: u16 = 8765;
pub const DEFAULT_MAX_CLIENTS: usize = 64;
/// Snapshots queued per connection before it counts as too slow.
pub const DEFAULT_OUTBOX_CAPACITY: usize = 32;
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(2);

/// Server settings. Fixed for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Interface to bind to.
    pub host: String,
    /// Listen port. `0` picks a free port.
    pub port: u16,
    pub rows: i32,
    pub cols: i32,
    pub spawn_policy: SpawnPolicy,
    pub edge_policy: EdgePolicy,
    /// Connections beyond this count are refused.
    pub max_clients: usize,
    pub outbox_capacity: usize,
    /// Upper bound on writing one frame to a client socket.
    pub send_timeout: Duration,
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Validated grid for these dimensions.
    pub fn grid(&self) -> Result<Grid, GridError> {
        Grid::new(self.rows, self.cols)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            rows: DEFAULT_ROWS,
            cols: DEFAULT_COLS,
            spawn_policy: SpawnPolicy::default(),
            edge_policy: EdgePolicy::default(),
            max_clients: DEFAULT_MAX_CLIENTS,
            outbox_capacity: DEFAULT_OUTBOX_CAPACITY,
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr(), "127.0.0.1:8765");
        assert_eq!(config.spawn_policy, SpawnPolicy::Sequential);
        assert_eq!(config.edge_policy, EdgePolicy::Reject);

        let grid = config.grid().unwrap();
        assert_eq!(grid.rows(), 10);
        assert_eq!(grid.cols(), 10);
    }

    #[test]
    fn test_invalid_grid_is_reported() {
        let config = ServerConfig {
            rows: 0,
            ..ServerConfig::default()
        };
        assert_eq!(
            config.grid(),
            Err(GridError::InvalidDimensions { rows: 0, cols: 10 })
        );
    }
}
