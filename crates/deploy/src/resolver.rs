//! Argument resolution.
//!
//! Turns [`ArgSpec`]s into the concrete strings handed to the ABI encoder.
//! Address references go through a checked lookup in the record store;
//! nothing assumes a unit has been deployed.

use alloy_core::primitives::keccak256;

use crate::{
    context::{Environment, NamedAccounts},
    error::{ConfigurationError, PipelineError},
    record::RecordStore,
    unit::{ArgSpec, DeploymentUnit},
};

/// Resolves argument specs against the environment, accounts and records of a run.
pub struct Resolver<'a> {
    pub env: &'a Environment,
    pub accounts: &'a NamedAccounts,
    pub store: &'a RecordStore,
}

impl<'a> Resolver<'a> {
    pub fn new(env: &'a Environment, accounts: &'a NamedAccounts, store: &'a RecordStore) -> Self {
        Self {
            env,
            accounts,
            store,
        }
    }

    /// Resolve a single argument on behalf of `unit`.
    pub fn resolve(&self, unit: &str, arg: &ArgSpec) -> Result<String, PipelineError> {
        match arg {
            ArgSpec::Value { value } => Ok(value.clone()),
            ArgSpec::Env { env, default } => resolve_env(self.env, unit, env, default.as_deref())
                .map_err(PipelineError::from),
            ArgSpec::Account { account } => self
                .accounts
                .get(account)
                .map(|address| address.to_string())
                .ok_or_else(|| {
                    ConfigurationError::UnknownAccount {
                        unit: unit.to_string(),
                        account: account.clone(),
                    }
                    .into()
                }),
            ArgSpec::Keccak { keccak } => Ok(keccak256(keccak.as_bytes()).to_string()),
            ArgSpec::Address { address } => self
                .store
                .address_of(address)
                .map(|resolved| resolved.to_string())
                .ok_or_else(|| PipelineError::UnresolvedDependency {
                    unit: unit.to_string(),
                    reference: address.clone(),
                }),
        }
    }

    /// Resolve a list of arguments in order.
    pub fn resolve_all(&self, unit: &str, args: &[ArgSpec]) -> Result<Vec<String>, PipelineError> {
        args.iter().map(|arg| self.resolve(unit, arg)).collect()
    }
}

fn resolve_env(
    env: &Environment,
    unit: &str,
    key: &str,
    default: Option<&str>,
) -> Result<String, ConfigurationError> {
    env.get(key)
        .or(default)
        .map(str::to_string)
        .ok_or_else(|| ConfigurationError::MissingConfiguration {
            unit: unit.to_string(),
            key: key.to_string(),
        })
}

/// Check, before anything is submitted, that every environment value and
/// named account used by `units` is available.
pub fn preflight<'u>(
    units: impl IntoIterator<Item = &'u DeploymentUnit>,
    env: &Environment,
    accounts: &NamedAccounts,
) -> Result<(), ConfigurationError> {
    for unit in units {
        let action_args = unit.actions.iter().flat_map(|action| action.all_args());
        for arg in unit.args.iter().chain(action_args) {
            match arg {
                ArgSpec::Env { env: key, default } => {
                    resolve_env(env, &unit.name, key, default.as_deref())?;
                }
                ArgSpec::Account { account } if accounts.get(account).is_none() => {
                    return Err(ConfigurationError::UnknownAccount {
                        unit: unit.name.clone(),
                        account: account.clone(),
                    });
                }
                _ => {}
            }
        }

        for action in &unit.actions {
            if accounts.get(action.sender()).is_none() {
                return Err(ConfigurationError::UnknownAccount {
                    unit: unit.name.clone(),
                    account: action.sender().to_string(),
                });
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{record::DeploymentRecord, unit::PostDeployAction};
    use alloy_core::{
        json_abi::JsonAbi,
        primitives::{Address, B256},
    };
    use tempdir::TempDir;

    fn store_with_token(dir: &TempDir) -> RecordStore {
        let mut store = RecordStore::open(dir.path(), "localhost").unwrap();
        store
            .insert(DeploymentRecord {
                name: "Token".into(),
                contract_name: "Token".into(),
                network: "localhost".into(),
                address: Address::repeat_byte(0xaa),
                abi: JsonAbi::default(),
                transaction_hash: B256::ZERO,
                block_number: 1,
                args: vec![],
                bytecode_hash: String::new(),
                deployed_at: 0,
            })
            .unwrap();
        store
    }

    #[test]
    fn test_resolves_every_kind() {
        let dir = TempDir::new("resolver").unwrap();
        let store = store_with_token(&dir);
        let env: Environment = [("WETH", "0x00000000000000000000000000000000000000ee")]
            .into_iter()
            .collect();
        let accounts: NamedAccounts = [("deployer", Address::repeat_byte(0x01))]
            .into_iter()
            .collect();
        let resolver = Resolver::new(&env, &accounts, &store);

        let args = resolver
            .resolve_all(
                "Factory",
                &[
                    ArgSpec::value("5"),
                    ArgSpec::env("WETH"),
                    ArgSpec::Env {
                        env: "FEE".into(),
                        default: Some("30".into()),
                    },
                    ArgSpec::account("deployer"),
                    ArgSpec::address("Token"),
                    ArgSpec::keccak("ROUTER_ROLE"),
                ],
            )
            .unwrap();

        assert_eq!(args[0], "5");
        assert_eq!(args[1], "0x00000000000000000000000000000000000000ee");
        assert_eq!(args[2], "30");
        assert_eq!(args[3], Address::repeat_byte(0x01).to_string());
        assert_eq!(args[4], Address::repeat_byte(0xaa).to_string());
        assert_eq!(args[5], keccak256("ROUTER_ROLE").to_string());
    }

    #[test]
    fn test_missing_env_is_configuration_error() {
        let dir = TempDir::new("resolver").unwrap();
        let store = store_with_token(&dir);
        let env = Environment::default();
        let accounts = NamedAccounts::default();
        let err = Resolver::new(&env, &accounts, &store)
            .resolve("Factory", &ArgSpec::env("MASTER_CHEF"))
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Configuration(ConfigurationError::MissingConfiguration { unit, key })
                if unit == "Factory" && key == "MASTER_CHEF"
        ));
    }

    #[test]
    fn test_unresolved_reference() {
        let dir = TempDir::new("resolver").unwrap();
        let store = store_with_token(&dir);
        let env = Environment::default();
        let accounts = NamedAccounts::default();
        let err = Resolver::new(&env, &accounts, &store)
            .resolve("Factory", &ArgSpec::address("Beacon"))
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::UnresolvedDependency { unit, reference }
                if unit == "Factory" && reference == "Beacon"
        ));
    }

    #[test]
    fn test_preflight_checks_actions() {
        let env = Environment::default();
        let accounts: NamedAccounts = [("deployer", Address::ZERO)].into_iter().collect();
        let unit = DeploymentUnit::new("Router")
            .action(PostDeployAction::new("grant", "grant(address)").sent_by("admin"));
        let err = preflight([&unit], &env, &accounts).unwrap_err();
        assert!(matches!(
            err,
            ConfigurationError::UnknownAccount { account, .. } if account == "admin"
        ));

        let unit = DeploymentUnit::new("Router").arg(ArgSpec::env("SUSHI"));
        assert!(matches!(
            preflight([&unit], &env, &accounts).unwrap_err(),
            ConfigurationError::MissingConfiguration { .. }
        ));
    }
}
