//! # Headless Client Library
//!
//! A protocol-level client for the voxel world server. It performs the
//! handshake, downloads and reassembles the level, and sends and receives
//! play packets. There is no rendering; the crate exists to drive a server
//! from scripts, bots and tests.
//!
//! ## Module Organization
//!
//! ### Network Module (`network`)
//! Owns the TCP connection:
//! - Identification and extension negotiation
//! - Level download through [`level::LevelDownload`]
//! - Block edits, movement and chat
//!
//! ### Level Module (`level`)
//! Collects level chunks, decompresses the gzip stream and checks the
//! block-count header against the announced dimensions.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::Client;
//! use protocol::BlockMode;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = Client::connect("127.0.0.1:25565", "bot", "-").await?;
//!     let level = client.receive_level().await?;
//!     println!("level is {:?}", level.size);
//!
//!     client.set_block(1, 1, 1, BlockMode::Create, 4).await?;
//!     client.send_message("hello").await?;
//!     Ok(())
//! }
//! ```

pub mod level;
pub mod network;

pub use network::{Client, ClientError, ClientSender, ServerInfo};
