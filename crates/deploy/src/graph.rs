//! Deployment graph validation.

use std::collections::{HashMap, HashSet};

use crate::{error::ConfigurationError, unit::DeploymentUnit};

/// Unit names key record files, so they must stay a single plain path component.
fn is_valid_name(name: &str) -> bool {
    !name.trim().is_empty()
        && !name.starts_with('.')
        && !name.contains("..")
        && !name.contains(['/', '\\'])
}

/// A validated, acyclic set of deployment units.
///
/// Construction checks that names are unique and usable as file names, that
/// every dependency and address reference points at a declared unit the
/// referencing unit depends on, and that the dependency relation has no cycle.
#[derive(Debug, Clone)]
pub struct DeploymentGraph {
    units: Vec<DeploymentUnit>,
    index: HashMap<String, usize>,
}

impl DeploymentGraph {
    pub fn build(units: Vec<DeploymentUnit>) -> Result<Self, ConfigurationError> {
        let mut index = HashMap::with_capacity(units.len());
        for (i, unit) in units.iter().enumerate() {
            if !is_valid_name(&unit.name) {
                return Err(ConfigurationError::InvalidUnitName(unit.name.clone()));
            }
            if index.insert(unit.name.clone(), i).is_some() {
                return Err(ConfigurationError::DuplicateUnit(unit.name.clone()));
            }
        }

        let graph = Self { units, index };
        for unit in &graph.units {
            graph.check_references(unit)?;
        }
        graph.check_acyclic()?;

        tracing::debug!(units = graph.units.len(), "Deployment graph validated");

        Ok(graph)
    }

    fn check_references(&self, unit: &DeploymentUnit) -> Result<(), ConfigurationError> {
        for dependency in &unit.dependencies {
            if !self.index.contains_key(dependency) {
                return Err(ConfigurationError::UndeclaredDependency {
                    unit: unit.name.clone(),
                    dependency: dependency.clone(),
                });
            }
        }

        let depends_on = |name: &str| unit.dependencies.iter().any(|d| d == name);

        for reference in unit.arg_references() {
            if !depends_on(reference) {
                return Err(ConfigurationError::UndeclaredReference {
                    unit: unit.name.clone(),
                    reference: reference.to_string(),
                });
            }
        }

        // Actions run after the owning unit exists, so they may also use its own address.
        for action in &unit.actions {
            let target = action.target_unit(&unit.name);
            let references = std::iter::once(target)
                .chain(action.all_args().filter_map(|arg| arg.reference()));
            for reference in references {
                if reference != unit.name && !depends_on(reference) {
                    return Err(ConfigurationError::UndeclaredReference {
                        unit: unit.name.clone(),
                        reference: reference.to_string(),
                    });
                }
            }
        }

        Ok(())
    }

    fn check_acyclic(&self) -> Result<(), ConfigurationError> {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Mark {
            Unvisited,
            InProgress,
            Done,
        }

        fn visit(
            graph: &DeploymentGraph,
            node: usize,
            marks: &mut [Mark],
            path: &mut Vec<usize>,
        ) -> Result<(), ConfigurationError> {
            match marks[node] {
                Mark::Done => return Ok(()),
                Mark::InProgress => {
                    let start = path.iter().position(|&n| n == node).unwrap_or(0);
                    let chain = path[start..]
                        .iter()
                        .chain(std::iter::once(&node))
                        .map(|&n| graph.units[n].name.clone())
                        .collect();
                    return Err(ConfigurationError::Cycle { chain });
                }
                Mark::Unvisited => {}
            }

            marks[node] = Mark::InProgress;
            path.push(node);
            for dependency in &graph.units[node].dependencies {
                visit(graph, graph.index[dependency], marks, path)?;
            }
            path.pop();
            marks[node] = Mark::Done;

            Ok(())
        }

        let mut marks = vec![Mark::Unvisited; self.units.len()];
        let mut path = Vec::new();
        for node in 0..self.units.len() {
            visit(self, node, &mut marks, &mut path)?;
        }

        Ok(())
    }

    /// Units in declaration order.
    pub fn units(&self) -> &[DeploymentUnit] {
        &self.units
    }

    pub fn get(&self, name: &str) -> Option<&DeploymentUnit> {
        self.index.get(name).map(|&i| &self.units[i])
    }

    pub(crate) fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// The named units and every unit they transitively depend on.
    pub(crate) fn closure<'a>(&self, roots: impl IntoIterator<Item = &'a str>) -> HashSet<usize> {
        let mut selected = HashSet::new();
        let mut stack: Vec<usize> = roots
            .into_iter()
            .filter_map(|name| self.position(name))
            .collect();

        while let Some(node) = stack.pop() {
            if selected.insert(node) {
                stack.extend(
                    self.units[node]
                        .dependencies
                        .iter()
                        .map(|dependency| self.index[dependency]),
                );
            }
        }

        selected
    }
}
