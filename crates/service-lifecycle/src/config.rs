//! Configuration for the lifecycle orchestrator

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use service_messenger::MessengerConfig;
use std::path::{Path, PathBuf};

/// Environment variable overriding the socket directory
pub const SOCKET_DIR_ENV: &str = "SERVICE_LIFECYCLE_SOCKET_DIR";

/// Environment variable overriding the shared channel name
pub const CHANNEL_ENV: &str = "SERVICE_LIFECYCLE_CHANNEL";

/// Orchestrator configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LifecycleConfig {
    /// Channel shared by the agent and its workers
    #[serde(default)]
    pub messenger: MessengerConfig,
}

impl LifecycleConfig {
    /// Load configuration from a YAML (`.yaml`/`.yml`) or JSON file
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        use async_fs::File;
        use futures::io::AsyncReadExt;

        let path = path.as_ref();
        let mut file = File::open(path).await?;
        let mut contents = String::new();
        file.read_to_string(&mut contents).await?;

        match path.extension().and_then(|s| s.to_str()) {
            Some("yaml") | Some("yml") => Ok(serde_yaml::from_str(&contents)?),
            _ => Ok(serde_json::from_str(&contents)?),
        }
    }

    /// Apply overrides from the process environment
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`, keyed by the `SERVICE_LIFECYCLE_*` names
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(SOCKET_DIR_ENV) {
            if dir.is_empty() {
                return Err(Error::Config(format!("{} is set but empty", SOCKET_DIR_ENV)));
            }
            self.messenger.socket_dir = PathBuf::from(dir);
        }

        if let Some(channel) = lookup(CHANNEL_ENV) {
            if channel.is_empty() || channel.contains('/') {
                return Err(Error::Config(format!(
                    "{} must be a plain channel name, got {:?}",
                    CHANNEL_ENV, channel
                )));
            }
            self.messenger.channel_name = channel;
        }

        Ok(self)
    }
}
