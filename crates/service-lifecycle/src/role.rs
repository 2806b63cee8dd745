//! Process roles and the messenger each role gets

use crate::{Error, Result, context::ProcessRepresentation};
use async_channel::Receiver;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use service_messenger::{MessengerClient, MessengerConfig, MessengerServer};
use std::fmt;
use std::path::Path;
use tracing::info;

/// Process name that marks the supervising process
pub const AGENT_PROCESS_NAME: &str = "agent";

/// Channel name prefix for standalone processes
pub const STANDALONE_CHANNEL_PREFIX: &str = "standalone";

/// Role of the hosting process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceWorkMode {
    /// Supervising process; owns the shared channel
    Agent,
    /// Worker process; talks to the agent over the shared channel
    Worker,
    /// Isolated process with a private channel nobody else knows about
    Standalone,
}

impl ServiceWorkMode {
    /// Derive the role of `process`, unless one is forced
    pub fn resolve(process: &ProcessRepresentation, forced: Option<ServiceWorkMode>) -> Self {
        match forced {
            Some(mode) => mode,
            None if process.process_name == AGENT_PROCESS_NAME => ServiceWorkMode::Agent,
            None => ServiceWorkMode::Worker,
        }
    }
}

impl fmt::Display for ServiceWorkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceWorkMode::Agent => f.write_str("agent"),
            ServiceWorkMode::Worker => f.write_str("worker"),
            ServiceWorkMode::Standalone => f.write_str("standalone"),
        }
    }
}

/// Messenger endpoint held by one process
#[derive(Clone)]
pub enum Messenger {
    /// Agent and standalone processes
    Server(MessengerServer),
    /// Worker processes
    Client(MessengerClient),
}

impl Messenger {
    /// Build the endpoint `mode` calls for
    ///
    /// Servers are bound immediately. A worker's client connects on first use.
    pub fn select(mode: ServiceWorkMode, config: &MessengerConfig) -> Result<Self> {
        let messenger = match mode {
            ServiceWorkMode::Agent => Messenger::Server(MessengerServer::bind(config)?),
            ServiceWorkMode::Worker => Messenger::Client(MessengerClient::new(config)),
            ServiceWorkMode::Standalone => {
                let private = config.unique(STANDALONE_CHANNEL_PREFIX);
                Messenger::Server(MessengerServer::bind(&private)?)
            }
        };

        info!("Selected {} messenger on {:?}", mode, messenger.path());
        Ok(messenger)
    }

    /// The server endpoint, if this process owns the channel
    pub fn server(&self) -> Option<&MessengerServer> {
        match self {
            Messenger::Server(server) => Some(server),
            Messenger::Client(_) => None,
        }
    }

    /// The client endpoint, if this process is a worker
    pub fn client(&self) -> Option<&MessengerClient> {
        match self {
            Messenger::Server(_) => None,
            Messenger::Client(client) => Some(client),
        }
    }

    /// Whether this process owns the channel
    pub fn is_server(&self) -> bool {
        matches!(self, Messenger::Server(_))
    }

    /// Socket file of the channel
    pub fn path(&self) -> &Path {
        match self {
            Messenger::Server(server) => server.path(),
            Messenger::Client(client) => client.path(),
        }
    }

    /// Run `action` wherever its handler lives
    pub async fn invoke(&self, action: &str, data: Value) -> Result<Value> {
        let result = match self {
            Messenger::Server(server) => server.dispatch(action, data).await,
            Messenger::Client(client) => client.request(action, data).await,
        };
        result.map_err(Error::from)
    }

    /// Publish `data` on `topic` to the other side of the channel
    pub async fn publish(&self, topic: &str, data: Value) -> Result<()> {
        match self {
            Messenger::Server(server) => {
                server.broadcast(topic, data).await;
                Ok(())
            }
            Messenger::Client(client) => Ok(client.publish(topic, data).await?),
        }
    }

    /// Receive what the other side publishes on `topic`
    pub async fn subscribe(&self, topic: &str) -> Result<Receiver<Value>> {
        match self {
            Messenger::Server(server) => Ok(server.subscribe(topic).await),
            Messenger::Client(client) => Ok(client.subscribe(topic).await?),
        }
    }

    /// Release the endpoint
    pub async fn close(&self) {
        match self {
            Messenger::Server(server) => server.close().await,
            Messenger::Client(client) => client.close().await,
        }
    }
}

impl fmt::Debug for Messenger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_server() { "Server" } else { "Client" };
        f.debug_struct("Messenger")
            .field("kind", &kind)
            .field("path", &self.path())
            .finish()
    }
}
