//! # Grid Position Server Library
//!
//! This library provides the authoritative server for a shared grid world.
//! Clients connect over WebSocket, each gets a cell on the grid, and every
//! change to who is where is pushed to all connected clients as it happens.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative State
//! The server alone decides positions. Clients only send intents
//! (`{"move": "left"}`); the server validates them against the grid and
//! answers with snapshots (`{"position": {"i", "j"}, "others": [...]}`).
//!
//! ### Session Management
//! Handles the lifecycle of client connections:
//! - Registration and spawn placement on connect
//! - Capacity limits
//! - Cleanup on close, read error or failed delivery
//!
//! ### State Broadcasting
//! After every join, successful move and departure, each session receives
//! its own view of the world: its position plus everyone else's.
//!
//! ## Architecture Design
//!
//! ### Single Event Loop
//! One task owns the [`registry::SessionRegistry`]. Connection tasks never
//! touch it; they decode frames and send [`gateway::GatewayEvent`]s over a
//! channel. Events are applied strictly in arrival order, so mutations never
//! interleave and every broadcast reads a consistent snapshot.
//!
//! ### Bounded Delivery
//! Snapshots are queued per connection with `try_send` on a bounded channel
//! and written by a dedicated writer task with a send timeout. A client that
//! cannot keep up is dropped instead of stalling everyone else.
//!
//! ## Module Organization
//!
//! - `config`: startup settings and defaults
//! - `registry`: sessions, positions and connection handles
//! - `movement`: move validation and edge policies
//! - `broadcast`: per-session snapshots and fan-out
//! - `world`: the state owned by the event loop
//! - `gateway`: per-connection WebSocket handling
//! - `network`: listener and event loop
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig {
//!         port: 8765,
//!         rows: 10,
//!         cols: 10,
//!         ..ServerConfig::default()
//!     };
//!
//!     let server = Server::bind(config).await?;
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod broadcast;
pub mod config;
pub mod error;
pub mod gateway;
pub mod movement;
pub mod network;
pub mod registry;
pub mod world;
