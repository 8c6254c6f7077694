//! Idempotent deployment of a single unit.

use std::{collections::BTreeSet, time::Duration};

use alloy_core::primitives::{Address, B256};
use anyhow::Context;
use serde::Serialize;

use crate::{
    abi,
    artifact::Artifact,
    context::{Environment, NetworkContext},
    error::{ConfigurationError, PipelineError},
    record::DeploymentRecord,
    resolver::Resolver,
    rpc::{self, ChainClient, TransactionRequest},
    unit::DeploymentUnit,
};

/// Which units are redeployed even though they already have a record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Force {
    #[default]
    None,
    All,
    Units(BTreeSet<String>),
}

impl Force {
    pub fn units<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Force::Units(names.into_iter().map(Into::into).collect())
    }

    pub fn applies_to(&self, unit: &str) -> bool {
        match self {
            Force::None => false,
            Force::All => true,
            Force::Units(units) => units.contains(unit),
        }
    }
}

/// Whether a unit was deployed in this run or its record reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UnitStatus {
    Deployed,
    Reused,
}

/// The result of executing one unit.
#[derive(Debug, Clone, Serialize)]
pub struct UnitOutcome {
    pub name: String,
    pub status: UnitStatus,
    pub address: Address,
    pub transaction_hash: B256,
    /// Constructor arguments as resolved in this run.
    pub args: Vec<String>,
    /// The reused record no longer matches its dependencies or artifact.
    pub stale: bool,
    pub actions: Vec<crate::actions::ActionOutcome>,
}

/// Deploys units one at a time against a [`NetworkContext`].
pub struct Executor<'a, C> {
    pub ctx: &'a mut NetworkContext<C>,
    pub env: &'a Environment,
    pub confirmation_timeout: Duration,
}

impl<'a, C: ChainClient> Executor<'a, C> {
    pub fn new(
        ctx: &'a mut NetworkContext<C>,
        env: &'a Environment,
        confirmation_timeout: Duration,
    ) -> Self {
        Self {
            ctx,
            env,
            confirmation_timeout,
        }
    }

    /// Reuse the unit's record, or deploy it if there is none or `force` is set.
    ///
    /// `artifact` must be present whenever the unit will be deployed.
    pub async fn execute(
        &mut self,
        unit: &DeploymentUnit,
        artifact: Option<&Artifact>,
        force: bool,
    ) -> Result<UnitOutcome, PipelineError> {
        let args = Resolver::new(self.env, &self.ctx.accounts, &self.ctx.store)
            .resolve_all(&unit.name, &unit.args)?;

        if let Some(record) = self.ctx.store.get(&unit.name).filter(|_| !force) {
            let stale = is_stale(record, &args, artifact);
            if stale {
                tracing::warn!(
                    unit = %unit.name,
                    address = %record.address,
                    recorded_args = ?record.args,
                    resolved_args = ?args,
                    "Reusing a deployment whose dependencies or artifact changed, force a redeploy to refresh it"
                );
            } else {
                tracing::info!(unit = %unit.name, address = %record.address, "Already deployed, reusing record");
            }

            return Ok(UnitOutcome {
                name: unit.name.clone(),
                status: UnitStatus::Reused,
                address: record.address,
                transaction_hash: record.transaction_hash,
                args,
                stale,
                actions: Vec::new(),
            });
        }

        let artifact = artifact.ok_or_else(|| ConfigurationError::Artifact {
            unit: unit.name.clone(),
            contract: unit.contract_name().to_string(),
            cause: anyhow::anyhow!("artifact was not loaded"),
        })?;

        let record = self.deploy(unit, artifact, args.clone()).await?;
        let outcome = UnitOutcome {
            name: unit.name.clone(),
            status: UnitStatus::Deployed,
            address: record.address,
            transaction_hash: record.transaction_hash,
            args,
            stale: false,
            actions: Vec::new(),
        };

        self.ctx
            .store
            .insert(record)
            .map_err(PipelineError::Store)?;

        Ok(outcome)
    }

    async fn deploy(
        &self,
        unit: &DeploymentUnit,
        artifact: &Artifact,
        args: Vec<String>,
    ) -> Result<DeploymentRecord, PipelineError> {
        let data = abi::encode_deployment(&artifact.abi, &artifact.bytecode, &args).map_err(
            |cause| ConfigurationError::InvalidArgument {
                unit: unit.name.clone(),
                cause,
            },
        )?;

        let deployer = self.ctx.deployer();
        tracing::info!(
            unit = %unit.name,
            contract = %artifact.contract_name,
            %deployer,
            args = ?args,
            "Deploying contract..."
        );

        let failed = |cause: anyhow::Error| PipelineError::DeploymentFailed {
            unit: unit.name.clone(),
            cause,
        };

        let receipt = rpc::send_and_confirm(
            &self.ctx.client,
            TransactionRequest::create(deployer, data),
            self.confirmation_timeout,
        )
        .await
        .map_err(failed)?;

        let address = receipt
            .contract_address
            .context("Receipt of the creation transaction has no contract address")
            .map_err(failed)?;

        tracing::info!(
            unit = %unit.name,
            %address,
            tx_hash = %receipt.transaction_hash,
            block = receipt.block_number,
            "✓ Contract deployed"
        );

        Ok(DeploymentRecord {
            name: unit.name.clone(),
            contract_name: artifact.contract_name.clone(),
            network: self.ctx.network.clone(),
            address,
            abi: artifact.abi.clone(),
            transaction_hash: receipt.transaction_hash,
            block_number: receipt.block_number,
            args,
            bytecode_hash: artifact.bytecode_hash(),
            deployed_at: chrono::Utc::now().timestamp(),
        })
    }
}

fn is_stale(record: &DeploymentRecord, args: &[String], artifact: Option<&Artifact>) -> bool {
    let args_changed = record.args.as_slice() != args;
    let bytecode_changed = artifact.is_some_and(|artifact| {
        !record.bytecode_hash.is_empty() && record.bytecode_hash != artifact.bytecode_hash()
    });
    args_changed || bytecode_changed
}
