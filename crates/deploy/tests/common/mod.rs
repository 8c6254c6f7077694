//! Shared test infrastructure: an in-memory chain and a scratch workspace.

#![allow(dead_code)]

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Duration,
};

use alloy_core::primitives::{Address, B256, Bytes, keccak256};
use tempdir::TempDir;
use vaultkit_deploy::{
    AccountSpec, ArtifactStore, ChainClient, DeploymentUnit, Environment, NetworkContext, Pipeline,
    PipelineError, PipelineReport, RunOptions, TransactionReceipt, TransactionRequest,
};

pub const CHAIN_ID: u64 = 31337;
pub const NETWORK: &str = "localhost";

fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// A chain that mines every transaction immediately.
///
/// Contracts are "deployed" by remembering their creation data. Access
/// control is modelled after OpenZeppelin: registered grant methods add a
/// role to the address passed as their only argument, and
/// `hasRole(bytes32,address)` reads it back.
#[derive(Clone)]
pub struct MockChain {
    state: Arc<Mutex<State>>,
}

struct State {
    chain_id: u64,
    accounts: Vec<Address>,
    nonces: HashMap<Address, u64>,
    contracts: HashMap<Address, Bytes>,
    receipts: HashMap<B256, TransactionReceipt>,
    submitted: Vec<TransactionRequest>,
    reverting_bytecode: Vec<Bytes>,
    reverting_selectors: HashSet<[u8; 4]>,
    role_grants: HashMap<[u8; 4], B256>,
    roles: HashSet<(Address, B256, Address)>,
}

impl Default for MockChain {
    fn default() -> Self {
        Self::new(CHAIN_ID)
    }
}

impl MockChain {
    pub fn new(chain_id: u64) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                chain_id,
                accounts: vec![Address::repeat_byte(0xd0), Address::repeat_byte(0xd1)],
                nonces: HashMap::new(),
                contracts: HashMap::new(),
                receipts: HashMap::new(),
                submitted: Vec::new(),
                reverting_bytecode: Vec::new(),
                reverting_selectors: HashSet::new(),
                role_grants: HashMap::new(),
                roles: HashSet::new(),
            })),
        }
    }

    /// Calls to `signature` grant `role` (hashed) to their address argument.
    pub fn grants_role(&self, signature: &str, role: &str) -> &Self {
        self.state
            .lock()
            .unwrap()
            .role_grants
            .insert(selector(signature), keccak256(role.as_bytes()));
        self
    }

    /// Creation transactions carrying `bytecode` revert.
    pub fn revert_deployments_of(&self, bytecode: Bytes) -> &Self {
        self.state.lock().unwrap().reverting_bytecode.push(bytecode);
        self
    }

    /// Calls to `signature` revert.
    pub fn revert_calls_to(&self, signature: &str) -> &Self {
        self.state
            .lock()
            .unwrap()
            .reverting_selectors
            .insert(selector(signature));
        self
    }

    pub fn clear_reverts(&self) {
        let mut state = self.state.lock().unwrap();
        state.reverting_bytecode.clear();
        state.reverting_selectors.clear();
    }

    pub fn deployer(&self) -> Address {
        self.state.lock().unwrap().accounts[0]
    }

    /// Every transaction submitted so far, reverted ones included.
    pub fn submissions(&self) -> Vec<TransactionRequest> {
        self.state.lock().unwrap().submitted.clone()
    }

    pub fn submission_count(&self) -> usize {
        self.state.lock().unwrap().submitted.len()
    }

    pub fn creation_count(&self) -> usize {
        self.submissions().iter().filter(|tx| tx.to.is_none()).count()
    }

    /// Creation data of the contract at `address`.
    pub fn creation_data(&self, address: Address) -> Option<Bytes> {
        self.state.lock().unwrap().contracts.get(&address).cloned()
    }

    pub fn has_role(&self, target: Address, role: &str, account: Address) -> bool {
        self.state
            .lock()
            .unwrap()
            .roles
            .contains(&(target, keccak256(role.as_bytes()), account))
    }
}

fn word_to_address(word: &[u8]) -> Address {
    Address::from_slice(&word[12..32])
}

impl ChainClient for MockChain {
    async fn chain_id(&self) -> anyhow::Result<u64> {
        Ok(self.state.lock().unwrap().chain_id)
    }

    async fn accounts(&self) -> anyhow::Result<Vec<Address>> {
        Ok(self.state.lock().unwrap().accounts.clone())
    }

    async fn send_transaction(&self, tx: TransactionRequest) -> anyhow::Result<B256> {
        let mut state = self.state.lock().unwrap();
        if !state.accounts.contains(&tx.from) {
            anyhow::bail!("unknown account {}", tx.from);
        }

        let nonce = *state.nonces.get(&tx.from).unwrap_or(&0);
        state.nonces.insert(tx.from, nonce + 1);
        state.submitted.push(tx.clone());
        let block_number = state.submitted.len() as u64;
        let hash = keccak256([tx.from.as_slice(), &nonce.to_be_bytes()].concat());

        let (success, contract_address) = match tx.to {
            None => {
                let reverts = state
                    .reverting_bytecode
                    .iter()
                    .any(|bytecode| tx.data.starts_with(bytecode));
                if reverts {
                    (false, None)
                } else {
                    let address = tx.from.create(nonce);
                    state.contracts.insert(address, tx.data.clone());
                    (true, Some(address))
                }
            }
            Some(to) => {
                let selector: [u8; 4] = tx.data.get(..4).and_then(|s| s.try_into().ok()).unwrap_or_default();
                let success = state.contracts.contains_key(&to)
                    && !state.reverting_selectors.contains(&selector);
                if success {
                    if let Some(role) = state.role_grants.get(&selector).copied() {
                        let account = word_to_address(&tx.data[4..36]);
                        state.roles.insert((to, role, account));
                    }
                }
                (success, None)
            }
        };

        state.receipts.insert(
            hash,
            TransactionReceipt {
                transaction_hash: hash,
                contract_address,
                block_number,
                status: success,
            },
        );
        Ok(hash)
    }

    async fn transaction_receipt(&self, hash: B256) -> anyhow::Result<Option<TransactionReceipt>> {
        Ok(self.state.lock().unwrap().receipts.get(&hash).cloned())
    }

    async fn call(&self, to: Address, data: Bytes) -> anyhow::Result<Bytes> {
        let state = self.state.lock().unwrap();
        if !state.contracts.contains_key(&to) {
            anyhow::bail!("call to {to}, which has no code");
        }
        if data.get(..4) != Some(&selector("hasRole(bytes32,address)")[..]) || data.len() != 68 {
            anyhow::bail!("execution reverted");
        }

        let role = B256::from_slice(&data[4..36]);
        let account = word_to_address(&data[36..68]);
        let mut word = [0u8; 32];
        word[31] = u8::from(state.roles.contains(&(to, role, account)));
        Ok(Bytes::from(word.to_vec()))
    }
}

/// Bytecode the scratch artifacts give `contract`.
pub fn bytecode_of(contract: &str) -> Bytes {
    let mut code = vec![0x60, 0x80];
    code.extend_from_slice(contract.as_bytes());
    Bytes::from(code)
}

/// A scratch project: artifacts, a deployments directory and a mock chain.
pub struct Workspace {
    pub dir: TempDir,
    pub chain: MockChain,
}

impl Workspace {
    pub fn new(prefix: &str) -> Self {
        init_tracing();
        Self {
            dir: TempDir::new(prefix).unwrap(),
            chain: MockChain::default(),
        }
    }

    pub fn artifacts_dir(&self) -> PathBuf {
        self.dir.path().join("artifacts")
    }

    pub fn deployments_dir(&self) -> PathBuf {
        self.dir.path().join("deployments")
    }

    pub fn artifacts(&self) -> ArtifactStore {
        ArtifactStore::new(self.artifacts_dir())
    }

    /// Write a Hardhat-style artifact whose constructor takes `inputs`.
    pub fn artifact(&self, contract: &str, inputs: &[&str]) {
        let constructor = if inputs.is_empty() {
            Vec::new()
        } else {
            let inputs: Vec<_> = inputs
                .iter()
                .enumerate()
                .map(|(i, ty)| serde_json::json!({ "name": format!("arg{i}"), "type": ty }))
                .collect();
            vec![serde_json::json!({
                "type": "constructor",
                "inputs": inputs,
                "stateMutability": "nonpayable"
            })]
        };
        let artifact = serde_json::json!({
            "contractName": contract,
            "abi": constructor,
            "bytecode": bytecode_of(contract),
        });

        std::fs::create_dir_all(self.artifacts_dir()).unwrap();
        std::fs::write(
            self.artifacts_dir().join(format!("{contract}.json")),
            serde_json::to_string_pretty(&artifact).unwrap(),
        )
        .unwrap();
    }

    /// An artifact for every unit, with one `address` parameter per constructor argument.
    pub fn artifacts_for(&self, units: &[DeploymentUnit]) {
        for unit in units {
            let inputs = vec!["address"; unit.args.len()];
            self.artifact(unit.contract_name(), &inputs);
        }
    }

    pub async fn context(&self) -> Result<NetworkContext<MockChain>, PipelineError> {
        self.context_with(&BTreeMap::new(), &Environment::default())
            .await
    }

    pub async fn context_with(
        &self,
        accounts: &BTreeMap<String, AccountSpec>,
        env: &Environment,
    ) -> Result<NetworkContext<MockChain>, PipelineError> {
        NetworkContext::establish(
            self.chain.clone(),
            NETWORK,
            &self.deployments_dir(),
            accounts,
            env,
        )
        .await
    }

    /// One complete run, establishing and finishing a fresh network context.
    pub async fn run(
        &self,
        pipeline: &Pipeline,
        env: &Environment,
        options: &RunOptions,
    ) -> Result<PipelineReport, PipelineError> {
        let mut ctx = self.context().await?;
        let result = pipeline.run(&mut ctx, env, &self.artifacts(), options).await;
        ctx.finish();
        result
    }
}

/// Log to the test harness so output shows up for failing tests only.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::level_filters::LevelFilter::DEBUG)
        .with_test_writer()
        .try_init();
}

pub fn options() -> RunOptions {
    RunOptions {
        confirmation_timeout: Duration::from_secs(5),
        ..RunOptions::default()
    }
}

/// The address argument as the resolver renders it.
pub fn rendered(address: Address) -> String {
    address.to_string()
}
