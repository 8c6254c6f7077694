use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::{
    context::AccountSpec,
    runner::DEFAULT_CONFIRMATION_TIMEOUT,
    unit::DeploymentUnit,
};

/// The default name for the pipeline configuration file.
pub const CONFIG_FILENAME: &str = "Vaultkit.toml";

/// Everything a pipeline run reads from its configuration file.
///
/// Serialized to/from TOML. The RPC endpoint and accounts are configuration;
/// nothing about a network is built in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Name of the target network. Records are kept per network.
    pub network: String,
    /// JSON-RPC endpoint of the target network.
    pub rpc_url: String,
    /// Directory holding compiled contract artifacts.
    #[serde(default = "default_artifacts")]
    pub artifacts: PathBuf,
    /// Root directory of the per-network deployment records.
    #[serde(default = "default_deployments")]
    pub deployments: PathBuf,
    /// Seconds to wait for a transaction to be mined.
    #[serde(default = "default_confirmation_timeout_secs")]
    pub confirmation_timeout_secs: u64,
    /// Named accounts. `deployer` defaults to the node's first account.
    #[serde(default)]
    pub accounts: BTreeMap<String, AccountSpec>,
    #[serde(default)]
    pub units: Vec<DeploymentUnit>,
}

fn default_artifacts() -> PathBuf {
    PathBuf::from("artifacts")
}

fn default_deployments() -> PathBuf {
    PathBuf::from("deployments")
}

fn default_confirmation_timeout_secs() -> u64 {
    DEFAULT_CONFIRMATION_TIMEOUT.as_secs()
}

impl PipelineConfig {
    pub fn new(network: impl Into<String>, rpc_url: impl Into<String>) -> Self {
        Self {
            network: network.into(),
            rpc_url: rpc_url.into(),
            artifacts: default_artifacts(),
            deployments: default_deployments(),
            confirmation_timeout_secs: default_confirmation_timeout_secs(),
            accounts: BTreeMap::new(),
            units: Vec::new(),
        }
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }

    /// Check the parts of the configuration that do not need the unit graph.
    pub fn validate(&self) -> Result<()> {
        if self.network.trim().is_empty() {
            anyhow::bail!("Network name must not be empty");
        }
        url::Url::parse(&self.rpc_url)
            .with_context(|| format!("Invalid RPC URL: {}", self.rpc_url))?;
        if self.confirmation_timeout_secs == 0 {
            anyhow::bail!("Confirmation timeout must be at least one second");
        }
        Ok(())
    }

    /// The configuration file `path` designates.
    pub fn resolve_path(path: &Path) -> Result<PathBuf> {
        if !path.exists() {
            return Err(anyhow::anyhow!(
                "Configuration file or directory not found: {}",
                path.display()
            ));
        }

        Ok(if path.is_dir() {
            path.join(CONFIG_FILENAME)
        } else {
            path.to_path_buf()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::{ActionPolicy, ArgSpec};
    use tempdir::TempDir;

    const CONFIG: &str = r#"
network = "localhost"
rpc_url = "http://127.0.0.1:8545"

[accounts]
deployer = { index = 0 }

[[units]]
name = "ReceiptToken"

[[units]]
name = "ReceiptTokenFactory"
dependencies = ["ReceiptToken"]
args = [{ address = "ReceiptToken" }]

[[units.actions]]
name = "grantTokenCreator"
target = "ReceiptToken"
method = "grantTokenCreatorRole(address)"
args = [{ address = "ReceiptTokenFactory" }]
policy = { kind = "once", check = { method = "isTokenCreator(address) returns (bool)", args = [{ address = "ReceiptTokenFactory" }] } }
"#;

    #[test]
    fn test_parse_config() {
        let config: PipelineConfig = toml::from_str(CONFIG).unwrap();
        config.validate().unwrap();

        assert_eq!(config.network, "localhost");
        assert_eq!(config.artifacts, PathBuf::from("artifacts"));
        assert_eq!(config.confirmation_timeout(), DEFAULT_CONFIRMATION_TIMEOUT);
        assert_eq!(config.units.len(), 2);

        let factory = &config.units[1];
        assert_eq!(factory.args, vec![ArgSpec::address("ReceiptToken")]);
        assert!(matches!(
            factory.actions[0].policy,
            ActionPolicy::Once { ref check } if check.expect == "true"
        ));
    }

    #[test]
    fn test_resolve_path_falls_back_to_config_file_in_directory() {
        let dir = TempDir::new("config").unwrap();
        assert_eq!(
            PipelineConfig::resolve_path(dir.path()).unwrap(),
            dir.path().join(CONFIG_FILENAME)
        );

        let file = dir.path().join("fork.toml");
        std::fs::write(&file, CONFIG).unwrap();
        assert_eq!(PipelineConfig::resolve_path(&file).unwrap(), file);
    }

    #[test]
    fn test_missing_file() {
        let err = PipelineConfig::resolve_path(Path::new("/nonexistent/Vaultkit.toml"))
            .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_round_trips_through_toml() {
        let mut config = PipelineConfig::new("fork", "http://localhost:8545");
        config
            .accounts
            .insert("deployer".to_string(), AccountSpec::Index { index: 1 });
        let parsed: PipelineConfig = toml::from_str(&toml::to_string(&config).unwrap()).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        let config = PipelineConfig::new("localhost", "not a url");
        assert!(config.validate().is_err());
    }
}
