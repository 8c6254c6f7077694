//! Run-wide state: environment values, named accounts and the network context.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    path::Path,
    str::FromStr,
};

use alloy_core::primitives::Address;
use alloy_signer_local::PrivateKeySigner;
use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::{
    error::{ConfigurationError, PipelineError},
    record::RecordStore,
    rpc::ChainClient,
    unit::DEFAULT_ACCOUNT,
};

/// Configuration values sourced from the environment.
///
/// Built once at startup and passed by reference; nothing in the pipeline
/// reads the process environment directly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    values: HashMap<String, String>,
}

impl Environment {
    /// The process environment, layered over the entries of `env_file` if given.
    ///
    /// Variables already set in the process take precedence over the file.
    pub fn load(env_file: Option<&Path>) -> anyhow::Result<Self> {
        let mut values = HashMap::new();

        if let Some(path) = env_file {
            let entries = dotenvy::from_path_iter(path)
                .with_context(|| format!("Failed to open env file {}", path.display()))?;
            for entry in entries {
                let (key, value) = entry
                    .with_context(|| format!("Failed to parse env file {}", path.display()))?;
                values.insert(key, value);
            }
            tracing::debug!(path = %path.display(), "Env file loaded");
        }

        for (key, value) in std::env::vars_os() {
            let (Some(key_str), Some(value_str)) = (key.to_str(), value.to_str()) else {
                tracing::warn!(
                    variable = %key.to_string_lossy(),
                    "Skipping environment variable that is not valid UTF-8"
                );
                continue;
            };
            values.insert(key_str.to_string(), value_str.to_string());
        }

        Ok(Self { values })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Environment {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// How a named account is resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AccountSpec {
    /// Index into the accounts managed by the node.
    Index { index: usize },
    /// A fixed address.
    Address { address: Address },
    /// Derived from a private key held in an environment value.
    PrivateKeyEnv { private_key_env: String },
}

/// Named accounts resolved to addresses.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamedAccounts {
    accounts: BTreeMap<String, Address>,
    /// Accounts derived from a private key. Transactions go through
    /// `eth_sendTransaction`, so these can be referenced but never send.
    key_derived: BTreeSet<String>,
}

impl NamedAccounts {
    /// Resolve every spec. `deployer` falls back to the node's first account.
    pub async fn resolve<C: ChainClient>(
        client: &C,
        specs: &BTreeMap<String, AccountSpec>,
        env: &Environment,
    ) -> Result<Self, PipelineError> {
        let mut specs = specs.clone();
        specs
            .entry(DEFAULT_ACCOUNT.to_string())
            .or_insert(AccountSpec::Index { index: 0 });

        let node_accounts = if specs
            .values()
            .any(|spec| matches!(spec, AccountSpec::Index { .. }))
        {
            client
                .accounts()
                .await
                .context("Failed to list node accounts")
                .map_err(PipelineError::Network)?
        } else {
            Vec::new()
        };

        let mut accounts = BTreeMap::new();
        let mut key_derived = BTreeSet::new();
        for (name, spec) in &specs {
            let address = resolve_account(name, spec, &node_accounts, env)?;
            tracing::debug!(account = %name, %address, "Named account resolved");
            accounts.insert(name.clone(), address);
            if matches!(spec, AccountSpec::PrivateKeyEnv { .. }) {
                key_derived.insert(name.clone());
            }
        }

        Ok(Self {
            accounts,
            key_derived,
        })
    }

    pub fn get(&self, name: &str) -> Option<Address> {
        self.accounts.get(name).copied()
    }

    pub fn deployer(&self) -> Option<Address> {
        self.get(DEFAULT_ACCOUNT)
    }

    /// Whether `name` can be the sender of a transaction.
    pub fn can_send(&self, name: &str) -> bool {
        self.accounts.contains_key(name) && !self.key_derived.contains(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Address)> {
        self.accounts.iter().map(|(name, address)| (name.as_str(), *address))
    }
}

impl<K: Into<String>> FromIterator<(K, Address)> for NamedAccounts {
    fn from_iter<I: IntoIterator<Item = (K, Address)>>(iter: I) -> Self {
        Self {
            accounts: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
            key_derived: BTreeSet::new(),
        }
    }
}

fn resolve_account(
    name: &str,
    spec: &AccountSpec,
    node_accounts: &[Address],
    env: &Environment,
) -> Result<Address, ConfigurationError> {
    let account_error = |cause: anyhow::Error| ConfigurationError::Account {
        account: name.to_string(),
        cause,
    };

    match spec {
        AccountSpec::Index { index } => node_accounts.get(*index).copied().ok_or_else(|| {
            account_error(anyhow::anyhow!(
                "the node manages {} account(s), index {} is out of range",
                node_accounts.len(),
                index
            ))
        }),
        AccountSpec::Address { address } => Ok(*address),
        AccountSpec::PrivateKeyEnv { private_key_env } => {
            let key = env.get(private_key_env).ok_or_else(|| {
                account_error(anyhow::anyhow!(
                    "environment value `{private_key_env}` is not set"
                ))
            })?;
            let signer = PrivateKeySigner::from_str(key.trim())
                .map_err(|e| account_error(anyhow::anyhow!("invalid private key: {e}")))?;
            Ok(signer.address())
        }
    }
}

/// Everything a pipeline run needs to know about the network it targets.
///
/// Established once at the start of a run and finished at its end.
pub struct NetworkContext<C> {
    pub network: String,
    pub chain_id: u64,
    pub accounts: NamedAccounts,
    pub client: C,
    pub store: RecordStore,
}

impl<C: ChainClient> NetworkContext<C> {
    /// Connect to the network, resolve accounts and open its record store.
    ///
    /// Fails if the store was previously used with a different chain id.
    pub async fn establish(
        client: C,
        network: &str,
        deployments: &Path,
        accounts: &BTreeMap<String, AccountSpec>,
        env: &Environment,
    ) -> Result<Self, PipelineError> {
        let chain_id = client
            .chain_id()
            .await
            .context("Failed to query chain id")
            .map_err(PipelineError::Network)?;

        let store = RecordStore::open(deployments, network).map_err(PipelineError::Store)?;
        match store.recorded_chain_id().map_err(PipelineError::Store)? {
            Some(recorded) if recorded != chain_id => {
                return Err(ConfigurationError::ChainMismatch {
                    network: network.to_string(),
                    recorded,
                    actual: chain_id,
                }
                .into());
            }
            Some(_) => {}
            None => store.save_chain_id(chain_id).map_err(PipelineError::Store)?,
        }

        let accounts = NamedAccounts::resolve(&client, accounts, env).await?;

        tracing::info!(
            network,
            chain_id,
            deployer = ?accounts.deployer(),
            records = store.len(),
            "Network context established"
        );

        Ok(Self {
            network: network.to_string(),
            chain_id,
            accounts,
            client,
            store,
        })
    }

    /// The account deploying contracts.
    pub fn deployer(&self) -> Address {
        // `resolve` always inserts the deployer.
        self.accounts.deployer().unwrap_or_default()
    }

    /// Release the record store.
    pub fn finish(self) -> C {
        self.store.close();
        self.client
    }
}
