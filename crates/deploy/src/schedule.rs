//! Topological ordering of deployment units.

use std::collections::{BTreeSet, HashSet};

use crate::{error::ConfigurationError, graph::DeploymentGraph, unit::DeploymentUnit};

/// A deployment order in which every unit follows all of its dependencies.
#[derive(Debug, Clone)]
pub struct Schedule<'g> {
    units: Vec<&'g DeploymentUnit>,
}

impl<'g> Schedule<'g> {
    /// Order the units selected by `tags`, or every unit if `tags` is empty.
    ///
    /// A tag selects each unit whose name or tags match it, together with
    /// everything those units transitively depend on.
    pub fn plan(graph: &'g DeploymentGraph, tags: &[String]) -> Result<Self, ConfigurationError> {
        let selected: HashSet<usize> = if tags.is_empty() {
            (0..graph.units().len()).collect()
        } else {
            let mut roots = Vec::new();
            for tag in tags {
                let matching: Vec<&str> = graph
                    .units()
                    .iter()
                    .filter(|unit| unit.matches_tag(tag))
                    .map(|unit| unit.name.as_str())
                    .collect();
                if matching.is_empty() {
                    return Err(ConfigurationError::UnknownTag(tag.clone()));
                }
                roots.extend(matching);
            }
            graph.closure(roots)
        };

        Ok(Self {
            units: kahn_order(graph, &selected),
        })
    }

    pub fn units(&self) -> &[&'g DeploymentUnit] {
        &self.units
    }

    pub fn names(&self) -> Vec<&'g str> {
        self.units.iter().map(|unit| unit.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.units.iter().any(|unit| unit.name == name)
    }
}

/// Kahn's algorithm over the selected nodes. Ties go to the earliest-declared unit.
fn kahn_order<'g>(graph: &'g DeploymentGraph, selected: &HashSet<usize>) -> Vec<&'g DeploymentUnit> {
    let units = graph.units();

    // Selection is closed under dependencies, so every dependency is itself selected.
    let mut pending: Vec<usize> = vec![0; units.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); units.len()];
    for &node in selected {
        for dependency in &units[node].dependencies {
            if let Some(dep) = graph.position(dependency) {
                pending[node] += 1;
                dependents[dep].push(node);
            }
        }
    }

    let mut ready: BTreeSet<usize> = selected
        .iter()
        .copied()
        .filter(|&node| pending[node] == 0)
        .collect();

    let mut order = Vec::with_capacity(selected.len());
    while let Some(node) = ready.pop_first() {
        order.push(&units[node]);
        for &dependent in &dependents[node] {
            pending[dependent] -= 1;
            if pending[dependent] == 0 {
                ready.insert(dependent);
            }
        }
    }

    order
}
