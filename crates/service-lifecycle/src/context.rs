//! Process identity and the read-only application context handed to services

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Identity of the process hosting a reconciler
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProcessRepresentation {
    /// Process name; `"agent"` marks the supervising process
    pub process_name: String,
    /// Application name
    #[serde(default)]
    pub app_name: String,
    /// Application directory
    #[serde(default)]
    pub app_dir: PathBuf,
}

impl ProcessRepresentation {
    /// Create a representation with only a process name
    pub fn new(process_name: impl Into<String>) -> Self {
        Self {
            process_name: process_name.into(),
            app_name: String::new(),
            app_dir: PathBuf::new(),
        }
    }

    /// Set the application name and directory
    pub fn with_app(mut self, app_name: impl Into<String>, app_dir: impl Into<PathBuf>) -> Self {
        self.app_name = app_name.into();
        self.app_dir = app_dir.into();
        self
    }
}

/// Read path into the wider application context
///
/// Passed to config resolvers and to every service. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct ContextAccessor {
    process: Arc<ProcessRepresentation>,
    properties: Arc<HashMap<String, String>>,
}

impl ContextAccessor {
    /// Create an accessor for `process` with no properties
    pub fn new(process: ProcessRepresentation) -> Self {
        Self {
            process: Arc::new(process),
            properties: Arc::new(HashMap::new()),
        }
    }

    /// Add a property
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.properties).insert(key.into(), value.into());
        self
    }

    /// The hosting process
    pub fn process(&self) -> &ProcessRepresentation {
        &self.process
    }

    /// Application name
    pub fn app_name(&self) -> &str {
        &self.process.app_name
    }

    /// Look up a property
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }
}
