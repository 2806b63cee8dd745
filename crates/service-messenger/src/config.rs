//! Channel naming and socket placement

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Channel name shared by the agent and every worker of a container
pub const DEFAULT_CHANNEL_NAME: &str = "service-lifecycle-messenger";

/// Location of a named messenger channel
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessengerConfig {
    /// Directory holding the channel socket files
    #[serde(default = "default_socket_dir")]
    pub socket_dir: PathBuf,
    /// Channel name; the socket file is `<socket_dir>/<channel_name>.sock`
    #[serde(default = "default_channel_name")]
    pub channel_name: String,
}

fn default_socket_dir() -> PathBuf {
    dirs::runtime_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("service-lifecycle")
}

fn default_channel_name() -> String {
    DEFAULT_CHANNEL_NAME.to_string()
}

impl Default for MessengerConfig {
    fn default() -> Self {
        Self {
            socket_dir: default_socket_dir(),
            channel_name: default_channel_name(),
        }
    }
}

impl MessengerConfig {
    /// Create a configuration for a channel inside `socket_dir`
    pub fn new(socket_dir: impl Into<PathBuf>, channel_name: impl Into<String>) -> Self {
        Self {
            socket_dir: socket_dir.into(),
            channel_name: channel_name.into(),
        }
    }

    /// Same directory, different channel
    pub fn with_channel_name(&self, channel_name: impl Into<String>) -> Self {
        Self {
            socket_dir: self.socket_dir.clone(),
            channel_name: channel_name.into(),
        }
    }

    /// Same directory, a freshly generated channel name nobody else knows
    pub fn unique(&self, prefix: &str) -> Self {
        self.with_channel_name(format!("{}-{}", prefix, Uuid::new_v4()))
    }

    /// Path of the socket file backing this channel
    pub fn socket_path(&self) -> PathBuf {
        self.socket_dir.join(format!("{}.sock", self.channel_name))
    }
}
