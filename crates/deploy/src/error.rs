//! Error taxonomy for the deployment pipeline.
//!
//! Configuration errors are raised before any transaction is submitted. The
//! remaining variants of [`PipelineError`] halt a run that is already
//! talking to the chain; every record persisted before the failure stays
//! valid, so re-running the pipeline resumes where it stopped.

/// A problem with the pipeline definition or its environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("unit name `{0}` is not usable as a record file name")]
    InvalidUnitName(String),

    #[error("unit `{0}` is declared more than once")]
    DuplicateUnit(String),

    #[error("unit `{unit}` depends on undeclared unit `{dependency}`")]
    UndeclaredDependency { unit: String, dependency: String },

    #[error(
        "unit `{unit}` references the address of `{reference}`, which is not one of its dependencies"
    )]
    UndeclaredReference { unit: String, reference: String },

    #[error("dependency cycle detected: {}", .chain.join(" -> "))]
    Cycle { chain: Vec<String> },

    #[error("unit `{unit}` requires configuration value `{key}`, which is not set")]
    MissingConfiguration { unit: String, key: String },

    #[error("unit `{unit}` uses unknown account `{account}`")]
    UnknownAccount { unit: String, account: String },

    #[error(
        "unit `{unit}` sends from account `{account}`, which the node does not manage and cannot sign for"
    )]
    UnsignableSender { unit: String, account: String },

    #[error("no unit is named or tagged `{0}`")]
    UnknownTag(String),

    #[error("cannot force unknown unit `{0}`")]
    UnknownUnit(String),

    #[error("unit `{unit}`: invalid argument: {cause:#}")]
    InvalidArgument { unit: String, cause: anyhow::Error },

    #[error("unit `{unit}`: failed to load artifact `{contract}`: {cause:#}")]
    Artifact {
        unit: String,
        contract: String,
        cause: anyhow::Error,
    },

    #[error("account `{account}` could not be resolved: {cause:#}")]
    Account { account: String, cause: anyhow::Error },

    #[error(
        "network `{network}` was previously deployed on chain {recorded}, but the endpoint reports chain {actual}"
    )]
    ChainMismatch {
        network: String,
        recorded: u64,
        actual: u64,
    },
}

/// An error that halts a pipeline run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("unit `{unit}` references `{reference}`, which has no deployment record yet")]
    UnresolvedDependency { unit: String, reference: String },

    #[error("deployment of `{unit}` failed: {cause:#}")]
    DeploymentFailed { unit: String, cause: anyhow::Error },

    #[error("post-deploy action `{action}` of `{unit}` failed: {cause:#}")]
    PostDeployActionFailed {
        unit: String,
        action: String,
        cause: anyhow::Error,
    },

    #[error("deployment record store failure: {0:#}")]
    Store(anyhow::Error),

    #[error("network setup failed: {0:#}")]
    Network(anyhow::Error),
}

impl PipelineError {
    /// Whether the error was raised before any transaction was submitted.
    pub fn is_configuration(&self) -> bool {
        matches!(self, PipelineError::Configuration(_))
    }

    /// Name of the unit the error is about, when there is one.
    pub fn unit(&self) -> Option<&str> {
        match self {
            PipelineError::UnresolvedDependency { unit, .. }
            | PipelineError::DeploymentFailed { unit, .. }
            | PipelineError::PostDeployActionFailed { unit, .. } => Some(unit),
            PipelineError::Configuration(
                ConfigurationError::UndeclaredDependency { unit, .. }
                | ConfigurationError::UndeclaredReference { unit, .. }
                | ConfigurationError::MissingConfiguration { unit, .. }
                | ConfigurationError::UnknownAccount { unit, .. }
                | ConfigurationError::UnsignableSender { unit, .. }
                | ConfigurationError::InvalidArgument { unit, .. }
                | ConfigurationError::Artifact { unit, .. },
            ) => Some(unit),
            PipelineError::Configuration(
                ConfigurationError::DuplicateUnit(unit) | ConfigurationError::InvalidUnitName(unit),
            ) => Some(unit),
            _ => None,
        }
    }
}
