//! Named local channel for cross-process service coordination
//!
//! A container runs one *agent* process and any number of *worker*
//! processes. The agent binds a [`MessengerServer`] on a well-known channel
//! and every worker talks to it through a [`MessengerClient`]. A channel is a
//! Unix domain socket carrying WebSocket frames, each holding one JSON
//! [`Envelope`].
//!
//! Two interaction styles are supported:
//!
//! - request/response: the client calls [`MessengerClient::request`], the
//!   server answers with the handler registered for that action
//! - publish/subscribe: the server [`broadcast`](MessengerServer::broadcast)s
//!   to every client, clients [`publish`](MessengerClient::publish) to the
//!   server
//!
//! # Architecture
//!
//! The crate stays runtime-agnostic at its edges (`async-net`,
//! `async-tungstenite`, `futures`), and runs its accept loop and connection
//! tasks on `smol`'s global executor so servers and clients keep working
//! whichever executor drives the caller.
//!
//! # Example
//!
//! ```no_run
//! use service_messenger::{MessengerClient, MessengerConfig, MessengerServer};
//! use serde_json::json;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = MessengerConfig::new("/tmp/my-app", "bus");
//!
//! let server = MessengerServer::bind(&config)?;
//! server.handle("echo", |data| async move { Ok(data) }).await;
//!
//! let client = MessengerClient::new(&config);
//! let reply = client.request("echo", json!({ "hello": "world" })).await?;
//! assert_eq!(reply["hello"], "world");
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod server;
mod subscription;

pub use client::MessengerClient;
pub use config::{DEFAULT_CHANNEL_NAME, MessengerConfig};
pub use error::{Error, Result};
pub use models::{Envelope, ErrorInfo};
pub use server::{Handler, MessengerServer};
