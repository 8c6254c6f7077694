//! Persisted deployment records.
//!
//! Records live at `<deployments>/<network>/<Unit>.json`, one file per unit,
//! next to a `.chainId` file naming the chain the network was deployed on.
//! Records are written whole and never edited in place; a forced redeploy
//! supersedes the previous file.

use std::{
    collections::BTreeMap,
    fs::File,
    path::{Path, PathBuf},
};

use alloy_core::{
    json_abi::JsonAbi,
    primitives::{Address, B256},
};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::fs::FsHandler;

const CHAIN_ID_FILENAME: &str = ".chainId";
const LOCK_FILENAME: &str = ".lock";

/// The result of a successful deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRecord {
    /// Unit name. Also the record's file name.
    pub name: String,
    /// Artifact the unit deployed.
    pub contract_name: String,
    pub network: String,
    pub address: Address,
    pub abi: JsonAbi,
    pub transaction_hash: B256,
    pub block_number: u64,
    /// Constructor arguments as resolved at deployment time.
    #[serde(default)]
    pub args: Vec<String>,
    /// SHA-256 of the creation bytecode.
    #[serde(default)]
    pub bytecode_hash: String,
    /// Unix timestamp of the deployment.
    #[serde(default)]
    pub deployed_at: i64,
}

/// Per-network store of deployment records.
///
/// A writable store holds an exclusive lock on its directory for as long as
/// it is open, so two runs cannot append to the same network concurrently.
/// Read-only stores take no lock.
#[derive(Debug)]
pub struct RecordStore {
    network: String,
    dir: PathBuf,
    records: BTreeMap<String, DeploymentRecord>,
    lock: Option<File>,
}

impl RecordStore {
    /// Open (creating if needed) the store for `network` under `root`.
    pub fn open(root: &Path, network: &str) -> Result<Self> {
        let dir = root.join(network);
        FsHandler::create_data_directory(&dir)?;
        let lock = FsHandler::lock_exclusive(&dir.join(LOCK_FILENAME))?;

        let records = load_records(&dir)?;
        tracing::debug!(
            network,
            path = %dir.display(),
            records = records.len(),
            "Deployment records loaded"
        );

        Ok(Self {
            network: network.to_string(),
            dir,
            records,
            lock: Some(lock),
        })
    }

    /// Open the store for reading only. Creates nothing and does not wait for
    /// a run holding the lock; a network never deployed to has no records.
    pub fn open_read_only(root: &Path, network: &str) -> Result<Self> {
        let dir = root.join(network);
        let records = if dir.is_dir() {
            load_records(&dir)?
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            network: network.to_string(),
            dir,
            records,
            lock: None,
        })
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.lock.is_none() {
            anyhow::bail!(
                "Deployment records of {} were opened read-only",
                self.network
            );
        }
        Ok(())
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The record for `name`, if the unit has been deployed on this network.
    pub fn get(&self, name: &str) -> Option<&DeploymentRecord> {
        self.records.get(name)
    }

    /// Deployed address of `name`, if any.
    pub fn address_of(&self, name: &str) -> Option<Address> {
        self.get(name).map(|record| record.address)
    }

    pub fn records(&self) -> impl Iterator<Item = &DeploymentRecord> {
        self.records.values()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Persist `record`, superseding any previous record of the same unit.
    pub fn insert(&mut self, record: DeploymentRecord) -> Result<()> {
        self.ensure_writable()?;
        let path = self.dir.join(format!("{}.json", record.name));
        let content = serde_json::to_string_pretty(&record)
            .context("Failed to serialize deployment record")?;
        FsHandler::write_atomic(&path, content.as_bytes())?;

        tracing::debug!(unit = %record.name, path = %path.display(), "Deployment record saved");

        self.records.insert(record.name.clone(), record);
        Ok(())
    }

    /// Chain id the network was first deployed on, if recorded.
    pub fn recorded_chain_id(&self) -> Result<Option<u64>> {
        let path = self.dir.join(CHAIN_ID_FILENAME);
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let chain_id = content
            .trim()
            .parse()
            .with_context(|| format!("Invalid chain id in {}", path.display()))?;
        Ok(Some(chain_id))
    }

    pub fn save_chain_id(&self, chain_id: u64) -> Result<()> {
        self.ensure_writable()?;
        FsHandler::write_atomic(
            &self.dir.join(CHAIN_ID_FILENAME),
            chain_id.to_string().as_bytes(),
        )
    }

    /// Release the store. Every record is already on disk.
    pub fn close(self) {
        tracing::debug!(network = %self.network, records = self.records.len(), "Deployment record store closed");
    }
}

fn load_records(dir: &Path) -> Result<BTreeMap<String, DeploymentRecord>> {
    let mut records = BTreeMap::new();
    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read deployments directory {}", dir.display()))?
    {
        let path = entry?.path();
        let is_record = path.extension().is_some_and(|ext| ext == "json")
            && !path
                .file_name()
                .is_some_and(|name| name.to_string_lossy().starts_with('.'));
        if !is_record {
            continue;
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read record {}", path.display()))?;
        let record: DeploymentRecord = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse record {}", path.display()))?;
        records.insert(record.name.clone(), record);
    }
    Ok(records)
}
