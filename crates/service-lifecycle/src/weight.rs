//! Dependency weights and the lifecycle order derived from them
//!
//! A service without dependencies weighs 1; any other service weighs one
//! more than its heaviest dependency. Sorting by weight therefore puts every
//! dependency before its dependents.

use crate::{Error, Result, registry::ServiceRegistry};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Direction of a lifecycle walk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Dependencies first (startup)
    Asc,
    /// Dependents first (shutdown)
    Desc,
}

/// A service id with its weight
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightedServiceId {
    /// Service name
    pub id: String,
    /// Dependency weight, at least 1
    pub weight: u32,
}

/// Computes weights over one registry, remembering every weight it has seen
///
/// Create one per ordering computation so the memo never outlives the
/// registry contents it was built from.
pub struct WeightResolver<'a> {
    registry: &'a ServiceRegistry,
    memo: HashMap<String, u32>,
}

impl<'a> WeightResolver<'a> {
    /// Create a resolver with an empty memo
    pub fn new(registry: &'a ServiceRegistry) -> Self {
        Self {
            registry,
            memo: HashMap::new(),
        }
    }

    /// Weight of `id`, reached through the dependency path `chain`
    pub fn weight(&mut self, id: &str, chain: &[String]) -> Result<u32> {
        // Path check comes before the memo so a cycle is never masked by a cached weight
        if chain.iter().any(|visited| visited == id) {
            return Err(Error::CyclicDependency {
                id: id.to_string(),
                chain: chain.to_vec(),
            });
        }

        if let Some(weight) = self.memo.get(id) {
            return Ok(*weight);
        }

        let registry = self.registry;
        let reference = registry.get(id)?;
        let dependencies = &reference.representation().dependencies;

        let weight = if dependencies.is_empty() {
            1
        } else {
            let mut path = chain.to_vec();
            path.push(id.to_string());

            let mut heaviest = 0;
            for dependency in dependencies {
                heaviest = heaviest.max(self.weight(dependency, &path)?);
            }
            heaviest + 1
        };

        self.memo.insert(id.to_string(), weight);
        Ok(weight)
    }

    /// Every registered service with its weight, sorted in `order`
    ///
    /// Ties keep registration order when ascending. Descending is exactly the
    /// ascending list reversed.
    pub fn ordered(&mut self, order: SortOrder) -> Result<Vec<WeightedServiceId>> {
        let registry = self.registry;
        let mut ids = Vec::with_capacity(registry.len());
        for id in registry.ids() {
            ids.push(WeightedServiceId {
                id: id.to_string(),
                weight: self.weight(id, &[])?,
            });
        }

        ids.sort_by_key(|entry| entry.weight);
        if order == SortOrder::Desc {
            ids.reverse();
        }
        Ok(ids)
    }
}
