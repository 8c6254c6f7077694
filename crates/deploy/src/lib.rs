//! vaultkit-deploy - Dependency-ordered smart contract deployment.
//!
//! This crate deploys a declared set of contracts in dependency order, wires
//! the addresses of earlier deployments into the constructor arguments of
//! later ones, records every deployment per network so re-runs are
//! idempotent, and applies post-deploy configuration calls.

pub mod abi;
pub mod actions;
pub mod artifact;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
mod fs;
pub mod graph;
pub mod record;
pub mod resolver;
pub mod rpc;
pub mod runner;
pub mod schedule;
pub mod unit;

pub use actions::{ActionOutcome, ActionStatus};
pub use artifact::{Artifact, ArtifactStore};
pub use config::{CONFIG_FILENAME, PipelineConfig};
pub use context::{AccountSpec, Environment, NamedAccounts, NetworkContext};
pub use error::{ConfigurationError, PipelineError};
pub use executor::{Force, UnitOutcome, UnitStatus};
pub use graph::DeploymentGraph;
pub use record::{DeploymentRecord, RecordStore};
pub use rpc::{ChainClient, RpcClient, TransactionReceipt, TransactionRequest};
pub use runner::{DEFAULT_CONFIRMATION_TIMEOUT, Pipeline, PipelineReport, RunOptions};
pub use schedule::Schedule;
pub use unit::{ActionPolicy, ArgSpec, DeploymentUnit, PostDeployAction, StateCheck};
