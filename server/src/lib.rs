//! # Voxel World Server Library
//!
//! This library implements a multiplayer voxel-world server speaking the
//! classic fixed-layout binary protocol. It owns the authoritative world,
//! admits players through a handshake, and keeps every connected client's
//! view of blocks and players consistent.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative World
//! The server holds the only copy of the block grid. Clients request edits;
//! the server applies them and echoes the result to everyone, including the
//! client that asked.
//!
//! ### Session Management
//! Handles the complete lifecycle of a connection:
//! - Identification, extension negotiation and login verification
//! - Admission with a player id from the fixed pool of 126
//! - Level transfer as a gzip stream split into 1024-byte chunks
//! - Teardown with a despawn notice to everyone left
//!
//! ### Broadcasting
//! Every mutation is encoded once and queued to each recipient without
//! blocking. A client that cannot keep up is disconnected rather than
//! allowed to stall the others.
//!
//! ## Architecture Design
//!
//! ### Task Per Connection
//! Each connection runs as its own tokio task with a dedicated writer task.
//! The world and registry sit behind locks that are never held across I/O.
//!
//! ### Tick Scheduler
//! Periodic jobs such as the online-player announcement run on a single
//! 50ms scheduler loop.
//!
//! ## Module Organization
//!
//! - `broadcast`: per-session outbound queues and fan-out delivery
//! - `chat`: colour-code rewriting, truncation and line wrapping
//! - `config`: `server.json` loading and validation
//! - `error`: session failure taxonomy
//! - `heartbeat`: server directory listing
//! - `players`: player registry and id pool
//! - `scheduler`: fixed-tick periodic tasks
//! - `server`: the shared context and the accept loop
//! - `session`: handshake state machine and play loop
//! - `world`: block grid and level serialization
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::server::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let server = Server::new(ServerConfig::default())?;
//!     let listener = server.bind().await?;
//!
//!     server.spawn_scheduler();
//!     server.serve(listener).await;
//!     Ok(())
//! }
//! ```

pub mod broadcast;
pub mod chat;
pub mod config;
pub mod error;
pub mod heartbeat;
pub mod players;
pub mod scheduler;
pub mod server;
pub mod session;
pub mod world;
