//! # Fitts' Law Experiment Server
//!
//! This library runs a reaction-time experiment in the style of Fitts' law.
//! A browser opens a WebSocket, reports its window size, and is then shown a
//! series of randomly placed and sized targets. For every target the browser
//! reports where it was clicked and how long that took; the server collects
//! these observations and writes them to a result file per subject and
//! condition.
//!
//! ## Protocol
//!
//! Every message is one JSON text frame.
//!
//! 1. client → server: viewport `{"width": 1280, "height": 720}`
//! 2. server → client: target `{"x": 410, "y": 233, "dimensions": {"width": 48, "height": 48}}`
//! 3. client → server: click report
//!    `{"circleX": 410, "circleY": 233, "clickX": 405, "clickY": 240,
//!      "dimensions": {...}, "timeTaken": 512.3}`
//! 4. steps 2 and 3 repeat until the trial limit is reached, then the
//!    server closes the connection.
//!
//! If anything goes wrong the server sends `{"error": "..."}` and closes the
//! connection. Only that session is affected.
//!
//! ## Module Organization
//!
//! ### Channel Module (`channel`)
//! The duplex message channel the session talks through, with a WebSocket
//! implementation and an in-memory pair for tests.
//!
//! ### Session Module (`session`)
//! The per-connection state machine: handshake, trial loop, completion.
//!
//! ### Sink Module (`sink`)
//! Subject/condition identity and result persistence.
//!
//! ### Network Module (`network`)
//! HTTP routes (`/`, `/ws`, `/play`) and the accept loop. Each connection is
//! served by its own task; sessions share no mutable state apart from the
//! seed generator used to derive their own random number generators.
//!
//! ### Config Module (`config`)
//! Command line parsing and validation.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let mut config = ServerConfig::new("127.0.0.1:8080");
//!     config.session.trial_limit = 10;
//!
//!     // Results land in ./results/{subject}-{condition}.json when the client
//!     // connects with /ws?subject=s01&condition=mouse
//!     let server = Server::bind(config).await?;
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod channel;
pub mod config;
pub mod error;
pub mod network;
pub mod session;
pub mod sink;
