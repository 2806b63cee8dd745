//! Lifecycle state tracking
//!
//! Per-service states, the orchestrator-level state and the serializable
//! snapshot used to inspect a running reconciler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// State of one registered service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    /// Registered, no core factory yet
    NoInstance,
    /// Core factory built, service not running
    Instanced,
    /// Start hook in progress
    Booting,
    /// Start hook completed
    Booted,
    /// Stop hook in progress
    Stopping,
}

impl ServiceState {
    /// Whether the state machine allows moving from `self` to `next`
    ///
    /// `noinstance → instanced → booting → booted → stopping → instanced`,
    /// cycling between `instanced` and `booted` for repeated start/stop.
    pub fn can_transition_to(self, next: ServiceState) -> bool {
        use ServiceState::*;
        matches!(
            (self, next),
            (NoInstance, Instanced)
                | (Instanced, Booting)
                | (Booting, Booted)
                | (Booted, Stopping)
                | (Stopping, Instanced)
        )
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServiceState::NoInstance => "noinstance",
            ServiceState::Instanced => "instanced",
            ServiceState::Booting => "booting",
            ServiceState::Booted => "booted",
            ServiceState::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

/// Orchestrator-level state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum ReconcilerState {
    /// Nothing started, or everything stopped
    #[default]
    NotBoot,
    /// `start()` in progress
    Booting,
    /// `start()` completed
    Booted,
    /// `stop()` in progress
    Stopping,
}

/// Lifecycle phase a service hook failed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    /// Building the concrete service object
    Instantiate,
    /// Running the start hook
    Start,
    /// Running the stop hook
    Stop,
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecyclePhase::Instantiate => f.write_str("instantiate"),
            LifecyclePhase::Start => f.write_str("start"),
            LifecyclePhase::Stop => f.write_str("stop"),
        }
    }
}

/// Point-in-time view of one service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceSnapshot {
    /// Service name
    pub name: String,
    /// Current state
    pub state: ServiceState,
    /// Dependency weight
    pub weight: u32,
    /// Declared dependencies
    pub dependencies: Vec<String>,
    /// When the state last changed
    pub last_state_change: DateTime<Utc>,
}
