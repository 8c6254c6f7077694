//! Deployment unit declarations.
//!
//! Units are declared once in the pipeline configuration and never mutated
//! afterwards. A unit names the contract to deploy, where each constructor
//! argument comes from, the units it depends on, and the actions to run
//! once its contract exists.

use serde::{Deserialize, Deserializer, Serialize};

/// Name of the account used when nothing else is specified.
pub const DEFAULT_ACCOUNT: &str = "deployer";

/// A named contract deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeploymentUnit {
    /// Unique name of the unit. Also the key of its deployment record.
    pub name: String,
    /// Artifact to deploy. Defaults to the unit name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract: Option<String>,
    /// Tags used to select the unit from the command line.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Constructor arguments, in order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<ArgSpec>,
    /// Units that must be deployed first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
    /// Actions run after the unit's record exists.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<PostDeployAction>,
}

impl DeploymentUnit {
    /// Create a unit with no arguments, dependencies or actions.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            contract: None,
            tags: Vec::new(),
            args: Vec::new(),
            dependencies: Vec::new(),
            actions: Vec::new(),
        }
    }

    pub fn contract(mut self, contract: impl Into<String>) -> Self {
        self.contract = Some(contract.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn arg(mut self, arg: ArgSpec) -> Self {
        self.args.push(arg);
        self
    }

    pub fn depends_on(mut self, dependency: impl Into<String>) -> Self {
        self.dependencies.push(dependency.into());
        self
    }

    pub fn action(mut self, action: PostDeployAction) -> Self {
        self.actions.push(action);
        self
    }

    /// The artifact name of the contract deployed by this unit.
    pub fn contract_name(&self) -> &str {
        self.contract.as_deref().unwrap_or(&self.name)
    }

    /// Whether the unit is selected by `tag`, either by name or by one of its tags.
    pub fn matches_tag(&self, tag: &str) -> bool {
        self.name == tag || self.tags.iter().any(|t| t == tag)
    }

    /// Units whose address the constructor arguments reference.
    pub fn arg_references(&self) -> impl Iterator<Item = &str> {
        self.args.iter().filter_map(ArgSpec::reference)
    }
}

/// Where an argument value comes from.
///
/// Written as a table with exactly one source key, e.g. `{ env = "WETH" }`.
/// Unknown keys are rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ArgSpec {
    /// The deployed address of another unit.
    Address { address: String },
    /// A value read from the environment. Required unless `default` is set.
    Env {
        env: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        default: Option<String>,
    },
    /// The address of a named account.
    Account { account: String },
    /// The keccak-256 hash of a string, e.g. an access-control role id.
    Keccak { keccak: String },
    /// A literal, coerced to the ABI parameter type.
    Value { value: String },
}

impl ArgSpec {
    pub fn address(unit: impl Into<String>) -> Self {
        ArgSpec::Address {
            address: unit.into(),
        }
    }

    pub fn env(key: impl Into<String>) -> Self {
        ArgSpec::Env {
            env: key.into(),
            default: None,
        }
    }

    pub fn account(name: impl Into<String>) -> Self {
        ArgSpec::Account {
            account: name.into(),
        }
    }

    pub fn keccak(text: impl Into<String>) -> Self {
        ArgSpec::Keccak {
            keccak: text.into(),
        }
    }

    pub fn value(value: impl Into<String>) -> Self {
        ArgSpec::Value {
            value: value.into(),
        }
    }

    /// The unit referenced by this argument, if it is an address reference.
    pub fn reference(&self) -> Option<&str> {
        match self {
            ArgSpec::Address { address } => Some(address),
            _ => None,
        }
    }
}

/// Every key an argument table may carry.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawArgSpec {
    address: Option<String>,
    env: Option<String>,
    default: Option<String>,
    account: Option<String>,
    keccak: Option<String>,
    value: Option<String>,
}

impl TryFrom<RawArgSpec> for ArgSpec {
    type Error = String;

    fn try_from(raw: RawArgSpec) -> Result<Self, Self::Error> {
        if raw.default.is_some() && raw.env.is_none() {
            return Err("`default` only applies to `env` arguments".to_string());
        }

        let sources = [
            raw.address.map(|address| ArgSpec::Address { address }),
            raw.env.map(|env| ArgSpec::Env {
                env,
                default: raw.default,
            }),
            raw.account.map(|account| ArgSpec::Account { account }),
            raw.keccak.map(|keccak| ArgSpec::Keccak { keccak }),
            raw.value.map(|value| ArgSpec::Value { value }),
        ];
        let mut sources = sources.into_iter().flatten();
        match (sources.next(), sources.next()) {
            (Some(spec), None) => Ok(spec),
            _ => Err(
                "an argument takes exactly one of `address`, `env`, `account`, `keccak` or `value`"
                    .to_string(),
            ),
        }
    }
}

impl<'de> Deserialize<'de> for ArgSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        RawArgSpec::deserialize(deserializer)?
            .try_into()
            .map_err(serde::de::Error::custom)
    }
}

/// A call made against a deployed contract after its unit has a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PostDeployAction {
    /// Name used in logs and reports.
    pub name: String,
    /// Unit whose contract is called. Defaults to the owning unit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    /// Human-readable signature, e.g. `grantRouterRole(address)`.
    pub method: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<ArgSpec>,
    /// Account sending the transaction. Defaults to the deployer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default)]
    pub policy: ActionPolicy,
}

impl PostDeployAction {
    pub fn new(name: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: None,
            method: method.into(),
            args: Vec::new(),
            from: None,
            policy: ActionPolicy::Always,
        }
    }

    pub fn target(mut self, unit: impl Into<String>) -> Self {
        self.target = Some(unit.into());
        self
    }

    pub fn arg(mut self, arg: ArgSpec) -> Self {
        self.args.push(arg);
        self
    }

    pub fn sent_by(mut self, account: impl Into<String>) -> Self {
        self.from = Some(account.into());
        self
    }

    pub fn once(mut self, check: StateCheck) -> Self {
        self.policy = ActionPolicy::Once { check };
        self
    }

    /// The unit whose contract the action calls.
    pub fn target_unit<'a>(&'a self, owner: &'a str) -> &'a str {
        self.target.as_deref().unwrap_or(owner)
    }

    /// The account sending the action's transaction.
    pub fn sender(&self) -> &str {
        self.from.as_deref().unwrap_or(DEFAULT_ACCOUNT)
    }

    /// Every argument spec used by the action, including its state check.
    pub fn all_args(&self) -> impl Iterator<Item = &ArgSpec> {
        let check_args = match &self.policy {
            ActionPolicy::Once { check } => check.args.as_slice(),
            ActionPolicy::Always => &[][..],
        };
        self.args.iter().chain(check_args)
    }
}

/// When a post-deploy action submits its transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case", tag = "kind")]
#[strum(serialize_all = "snake_case")]
pub enum ActionPolicy {
    /// Submit on every run.
    #[default]
    Always,
    /// Submit only if the state check does not already hold.
    Once { check: StateCheck },
}

/// A read-only call whose first return value tells whether an action already took effect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StateCheck {
    /// Signature including its outputs, e.g. `hasRole(bytes32,address) returns (bool)`.
    pub method: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<ArgSpec>,
    /// Value the first output must equal for the action to be skipped.
    #[serde(default = "default_expect")]
    pub expect: String,
}

impl StateCheck {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            args: Vec::new(),
            expect: default_expect(),
        }
    }

    pub fn arg(mut self, arg: ArgSpec) -> Self {
        self.args.push(arg);
        self
    }

    pub fn expect(mut self, expect: impl Into<String>) -> Self {
        self.expect = expect.into();
        self
    }
}

fn default_expect() -> String {
    "true".to_string()
}
