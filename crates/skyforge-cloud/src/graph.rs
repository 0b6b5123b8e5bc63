//! Resource dependency graph
//!
//! Edges come from explicit `depends_on` entries and from every attribute
//! reference in a resource body. The graph is layered into *waves*: wave 0
//! has no dependencies, wave N depends only on earlier waves.

use crate::error::{CloudError, Result};
use crate::provider::ResourceSet;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// node -> nodes it depends on
    edges: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    /// Build the graph for a resource set
    ///
    /// Every dependency must itself be part of the set.
    pub fn from_resources(resources: &ResourceSet) -> Result<Self> {
        let mut edges = BTreeMap::new();
        for resource in resources.iter() {
            let key = resource.key();
            let mut deps = BTreeSet::new();
            for dep in resource.dependencies() {
                if resources.get_key(&dep).is_none() {
                    return Err(CloudError::InvalidConfig(format!(
                        "{} depends on unknown resource {}",
                        key, dep
                    )));
                }
                if dep == key {
                    return Err(CloudError::CircularDependency(key));
                }
                deps.insert(dep);
            }
            edges.insert(key, deps);
        }
        Ok(Self { edges })
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Direct dependencies of a node
    pub fn dependencies_of(&self, key: &str) -> Vec<&str> {
        self.edges
            .get(key)
            .map(|deps| deps.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    /// Nodes that directly depend on `key`
    pub fn dependents_of(&self, key: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|(_, deps)| deps.contains(key))
            .map(|(node, _)| node.as_str())
            .collect()
    }

    /// Layer the graph into waves (Kahn's algorithm, one level at a time)
    pub fn waves(&self) -> Result<Vec<Vec<String>>> {
        let mut remaining: BTreeMap<&str, BTreeSet<&str>> = self
            .edges
            .iter()
            .map(|(k, deps)| (k.as_str(), deps.iter().map(String::as_str).collect()))
            .collect();
        let mut waves = Vec::new();

        while !remaining.is_empty() {
            let ready: Vec<&str> = remaining
                .iter()
                .filter(|(_, deps)| deps.is_empty())
                .map(|(k, _)| *k)
                .collect();

            if ready.is_empty() {
                let stuck: Vec<&str> = remaining.keys().copied().collect();
                return Err(CloudError::CircularDependency(stuck.join(", ")));
            }

            for key in &ready {
                remaining.remove(key);
            }
            for deps in remaining.values_mut() {
                for key in &ready {
                    deps.remove(key);
                }
            }

            waves.push(ready.into_iter().map(String::from).collect());
        }

        tracing::debug!(nodes = self.len(), waves = waves.len(), "Resolved dependency waves");
        Ok(waves)
    }

    /// Wave index of every node
    pub fn wave_index(&self) -> Result<BTreeMap<String, usize>> {
        let mut index = BTreeMap::new();
        for (wave, keys) in self.waves()?.into_iter().enumerate() {
            for key in keys {
                index.insert(key, wave);
            }
        }
        Ok(index)
    }

    /// Topological order (dependencies first)
    pub fn order(&self) -> Result<Vec<String>> {
        Ok(self.waves()?.into_iter().flatten().collect())
    }

    /// Reverse waves (dependents first), used for teardown
    pub fn reverse_waves(&self) -> Result<Vec<Vec<String>>> {
        let mut waves = self.waves()?;
        waves.reverse();
        Ok(waves)
    }
}
