//! Post-deploy actions.
//!
//! Actions run after their unit has a record. An action with a `once` policy
//! first reads the target's state and skips its transaction when the state
//! check already holds, so re-running a pipeline does not repeat it.

use std::time::Duration;

use alloy_core::primitives::{Address, B256};
use anyhow::Context;
use serde::Serialize;

use crate::{
    abi::Method,
    context::{Environment, NetworkContext},
    error::{ConfigurationError, PipelineError},
    resolver::Resolver,
    rpc::{self, ChainClient, TransactionRequest},
    unit::{ActionPolicy, DeploymentUnit, PostDeployAction, StateCheck},
};

/// What happened to an action in this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum ActionStatus {
    Submitted { transaction_hash: B256 },
    /// The state check already held.
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActionOutcome {
    pub name: String,
    pub target: Address,
    #[serde(flatten)]
    pub status: ActionStatus,
}

impl ActionOutcome {
    pub fn submitted(&self) -> bool {
        matches!(self.status, ActionStatus::Submitted { .. })
    }
}

/// Run every action of `unit`, in declaration order.
///
/// Stops at the first failing action. Records written before the failure
/// stay valid.
pub async fn run_actions<C: ChainClient>(
    ctx: &NetworkContext<C>,
    env: &Environment,
    unit: &DeploymentUnit,
    confirmation_timeout: Duration,
) -> Result<Vec<ActionOutcome>, PipelineError> {
    let mut outcomes = Vec::with_capacity(unit.actions.len());
    for action in &unit.actions {
        outcomes.push(run_action(ctx, env, unit, action, confirmation_timeout).await?);
    }
    Ok(outcomes)
}

async fn run_action<C: ChainClient>(
    ctx: &NetworkContext<C>,
    env: &Environment,
    unit: &DeploymentUnit,
    action: &PostDeployAction,
    confirmation_timeout: Duration,
) -> Result<ActionOutcome, PipelineError> {
    let resolver = Resolver::new(env, &ctx.accounts, &ctx.store);

    let target_unit = action.target_unit(&unit.name);
    let target = ctx
        .store
        .address_of(target_unit)
        .ok_or_else(|| PipelineError::UnresolvedDependency {
            unit: unit.name.clone(),
            reference: target_unit.to_string(),
        })?;
    let sender = ctx
        .accounts
        .get(action.sender())
        .ok_or_else(|| ConfigurationError::UnknownAccount {
            unit: unit.name.clone(),
            account: action.sender().to_string(),
        })?;
    let args = resolver.resolve_all(&unit.name, &action.args)?;

    let failed = |cause: anyhow::Error| PipelineError::PostDeployActionFailed {
        unit: unit.name.clone(),
        action: action.name.clone(),
        cause,
    };

    if let ActionPolicy::Once { check } = &action.policy {
        let check_args = resolver.resolve_all(&unit.name, &check.args)?;
        let applied = state_check_holds(&ctx.client, target, check, &check_args)
            .await
            .map_err(failed)?;
        if applied {
            tracing::info!(
                unit = %unit.name,
                action = %action.name,
                %target,
                "State check holds, skipping action"
            );
            return Ok(ActionOutcome {
                name: action.name.clone(),
                target,
                status: ActionStatus::Skipped,
            });
        }
    }

    let data = Method::parse(&action.method)
        .and_then(|method| method.encode_call(&args))
        .map_err(failed)?;

    tracing::info!(
        unit = %unit.name,
        action = %action.name,
        method = %action.method,
        %target,
        from = %sender,
        "Running post-deploy action..."
    );

    let receipt = rpc::send_and_confirm(
        &ctx.client,
        TransactionRequest::call(sender, target, data),
        confirmation_timeout,
    )
    .await
    .map_err(failed)?;

    tracing::info!(
        unit = %unit.name,
        action = %action.name,
        tx_hash = %receipt.transaction_hash,
        "✓ Post-deploy action applied"
    );

    Ok(ActionOutcome {
        name: action.name.clone(),
        target,
        status: ActionStatus::Submitted {
            transaction_hash: receipt.transaction_hash,
        },
    })
}

async fn state_check_holds<C: ChainClient>(
    client: &C,
    target: Address,
    check: &StateCheck,
    args: &[String],
) -> anyhow::Result<bool> {
    let method = Method::parse(&check.method)?;
    let data = method.encode_call(args)?;
    let output = client
        .call(target, data)
        .await
        .with_context(|| format!("State check {} failed", method.signature()))?;
    method.first_output_equals(&output, &check.expect)
}
