//! The deployment pipeline: graph, schedule, preflight, execution and actions.

use std::{collections::HashMap, time::Duration};

use serde::Serialize;

use crate::{
    abi,
    actions::{self, ActionOutcome},
    artifact::{Artifact, ArtifactStore},
    context::{Environment, NetworkContext},
    error::{ConfigurationError, PipelineError},
    executor::{Executor, Force, UnitOutcome, UnitStatus},
    graph::DeploymentGraph,
    resolver,
    rpc::ChainClient,
    schedule::Schedule,
    unit::{DEFAULT_ACCOUNT, DeploymentUnit},
};

/// Default time to wait for a transaction to be mined.
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(120);

/// Options of a single pipeline run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Restrict the run to units matching these tags (and their dependencies).
    pub tags: Vec<String>,
    pub force: Force,
    pub confirmation_timeout: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            tags: Vec::new(),
            force: Force::None,
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
        }
    }
}

/// What a run did, unit by unit, in schedule order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineReport {
    pub network: String,
    pub chain_id: u64,
    pub units: Vec<UnitOutcome>,
}

impl PipelineReport {
    /// Transactions submitted by the run, deployments and actions together.
    pub fn transactions_submitted(&self) -> usize {
        self.units
            .iter()
            .map(|unit| {
                usize::from(unit.status == UnitStatus::Deployed)
                    + unit.actions.iter().filter(|a| a.submitted()).count()
            })
            .sum()
    }

    pub fn deployed(&self) -> impl Iterator<Item = &UnitOutcome> {
        self.units
            .iter()
            .filter(|unit| unit.status == UnitStatus::Deployed)
    }

    pub fn stale(&self) -> impl Iterator<Item = &UnitOutcome> {
        self.units.iter().filter(|unit| unit.stale)
    }

    pub fn get(&self, name: &str) -> Option<&UnitOutcome> {
        self.units.iter().find(|unit| unit.name == name)
    }
}

/// A validated set of deployment units.
#[derive(Debug, Clone)]
pub struct Pipeline {
    graph: DeploymentGraph,
}

impl Pipeline {
    /// Build the dependency graph, rejecting duplicates, unknown references and cycles.
    pub fn new(units: Vec<DeploymentUnit>) -> Result<Self, ConfigurationError> {
        let graph = DeploymentGraph::build(units)?;
        tracing::debug!(units = graph.units().len(), "Deployment graph built");
        Ok(Self { graph })
    }

    pub fn graph(&self) -> &DeploymentGraph {
        &self.graph
    }

    /// The order in which a run with `tags` would execute units.
    pub fn plan(&self, tags: &[String]) -> Result<Schedule<'_>, ConfigurationError> {
        Schedule::plan(&self.graph, tags)
    }

    /// Deploy every scheduled unit that has no record (or is forced) and run
    /// post-deploy actions.
    ///
    /// Configuration problems are reported before the first transaction.
    /// Execution is strictly sequential and halts at the first failure.
    pub async fn run<C: ChainClient>(
        &self,
        ctx: &mut NetworkContext<C>,
        env: &Environment,
        artifacts: &ArtifactStore,
        options: &RunOptions,
    ) -> Result<PipelineReport, PipelineError> {
        let schedule = self.plan(&options.tags)?;

        tracing::info!(
            network = %ctx.network,
            units = schedule.len(),
            order = ?schedule.names(),
            "Starting deployment pipeline..."
        );

        let loaded = self.preflight(&schedule, ctx, env, artifacts, &options.force)?;

        let mut report = PipelineReport {
            network: ctx.network.clone(),
            chain_id: ctx.chain_id,
            units: Vec::with_capacity(schedule.len()),
        };

        for unit in schedule.units() {
            let force = options.force.applies_to(&unit.name);
            let mut outcome = Executor::new(ctx, env, options.confirmation_timeout)
                .execute(unit, loaded.get(unit.name.as_str()), force)
                .await?;

            if !unit.actions.is_empty() {
                let outcomes: Vec<ActionOutcome> =
                    actions::run_actions(ctx, env, unit, options.confirmation_timeout).await?;
                outcome.actions = outcomes;
            }

            report.units.push(outcome);
        }

        tracing::info!(
            network = %report.network,
            deployed = report.deployed().count(),
            reused = report.units.len() - report.deployed().count(),
            stale = report.stale().count(),
            transactions = report.transactions_submitted(),
            "✓ Deployment pipeline complete"
        );

        Ok(report)
    }

    /// Checks that need no transaction: forced names, environment values,
    /// accounts and senders, artifacts and constructor arity.
    ///
    /// Returns the artifacts of scheduled units, loaded once.
    fn preflight<'s, C: ChainClient>(
        &self,
        schedule: &Schedule<'s>,
        ctx: &NetworkContext<C>,
        env: &Environment,
        artifacts: &ArtifactStore,
        force: &Force,
    ) -> Result<HashMap<&'s str, Artifact>, ConfigurationError> {
        if let Force::Units(names) = force {
            for name in names {
                if !self.graph.contains(name) {
                    return Err(ConfigurationError::UnknownUnit(name.clone()));
                }
                if !schedule.contains(name) {
                    tracing::warn!(unit = %name, "Forced unit is not selected by the run's tags");
                }
            }
        }

        resolver::preflight(schedule.units().iter().copied(), env, &ctx.accounts)?;

        let mut loaded = HashMap::new();
        for unit in schedule.units() {
            let will_deploy = force.applies_to(&unit.name) || ctx.store.get(&unit.name).is_none();

            let senders = will_deploy
                .then_some(DEFAULT_ACCOUNT)
                .into_iter()
                .chain(unit.actions.iter().map(|action| action.sender()));
            for sender in senders {
                if !ctx.accounts.can_send(sender) {
                    return Err(ConfigurationError::UnsignableSender {
                        unit: unit.name.clone(),
                        account: sender.to_string(),
                    });
                }
            }
            let artifact = match artifacts.load(unit.contract_name()) {
                Ok(artifact) => artifact,
                Err(cause) if will_deploy => {
                    return Err(ConfigurationError::Artifact {
                        unit: unit.name.clone(),
                        contract: unit.contract_name().to_string(),
                        cause,
                    });
                }
                Err(e) => {
                    tracing::debug!(unit = %unit.name, error = %e, "Artifact unavailable for reused unit");
                    continue;
                }
            };

            let arity = abi::constructor_arity(&artifact.abi);
            if will_deploy && arity != unit.args.len() {
                return Err(ConfigurationError::InvalidArgument {
                    unit: unit.name.clone(),
                    cause: anyhow::anyhow!(
                        "constructor of {} takes {} argument(s), {} given",
                        artifact.contract_name,
                        arity,
                        unit.args.len()
                    ),
                });
            }

            loaded.insert(unit.name.as_str(), artifact);
        }

        tracing::debug!(artifacts = loaded.len(), "Preflight checks passed");
        Ok(loaded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        actions::ActionStatus,
        unit::ArgSpec,
    };
    use alloy_core::primitives::{Address, B256};

    fn outcome(name: &str, status: UnitStatus, actions: Vec<ActionOutcome>) -> UnitOutcome {
        UnitOutcome {
            name: name.into(),
            status,
            address: Address::ZERO,
            transaction_hash: B256::ZERO,
            args: vec![],
            stale: false,
            actions,
        }
    }

    #[test]
    fn test_transactions_submitted_counts_deployments_and_actions() {
        let report = PipelineReport {
            network: "localhost".into(),
            chain_id: 31337,
            units: vec![
                outcome("Token", UnitStatus::Reused, vec![]),
                outcome(
                    "Router",
                    UnitStatus::Deployed,
                    vec![
                        ActionOutcome {
                            name: "grant".into(),
                            target: Address::ZERO,
                            status: ActionStatus::Submitted {
                                transaction_hash: B256::ZERO,
                            },
                        },
                        ActionOutcome {
                            name: "grantAgain".into(),
                            target: Address::ZERO,
                            status: ActionStatus::Skipped,
                        },
                    ],
                ),
            ],
        };
        assert_eq!(report.transactions_submitted(), 2);
        assert_eq!(report.deployed().count(), 1);
        assert!(report.get("Token").is_some());
    }

    #[test]
    fn test_pipeline_rejects_cycles() {
        let err = Pipeline::new(vec![
            DeploymentUnit::new("A").depends_on("B"),
            DeploymentUnit::new("B").depends_on("A"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigurationError::Cycle { .. }));
    }

    #[test]
    fn test_plan_by_tag() {
        let pipeline = Pipeline::new(vec![
            DeploymentUnit::new("Token"),
            DeploymentUnit::new("Factory")
                .tag("factories")
                .depends_on("Token")
                .arg(ArgSpec::address("Token")),
            DeploymentUnit::new("Other"),
        ])
        .unwrap();
        let schedule = pipeline.plan(&["factories".to_string()]).unwrap();
        assert_eq!(schedule.names(), vec!["Token", "Factory"]);
    }
}
