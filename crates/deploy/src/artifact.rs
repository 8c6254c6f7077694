//! Compiled contract artifacts.
//!
//! Both the Hardhat layout (`bytecode` is a hex string) and the Foundry
//! layout (`bytecode.object`) are understood. Artifacts are looked up as
//! `<dir>/<Contract>.json` first, then anywhere below `dir`.

use std::path::{Path, PathBuf};

use alloy_core::{json_abi::JsonAbi, primitives::Bytes};
use anyhow::{Context, Result};
use serde::Deserialize;
use sha2::{Digest, Sha256};

/// ABI and creation bytecode of a contract.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub contract_name: String,
    pub abi: JsonAbi,
    pub bytecode: Bytes,
}

impl Artifact {
    /// Hex-encoded SHA-256 of the creation bytecode.
    pub fn bytecode_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.bytecode);
        hex::encode(hasher.finalize())
    }
}

#[derive(Debug, Deserialize)]
struct ArtifactFile {
    abi: JsonAbi,
    bytecode: BytecodeField,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BytecodeField {
    Hex(Bytes),
    Object { object: Bytes },
}

impl BytecodeField {
    fn into_bytes(self) -> Bytes {
        match self {
            BytecodeField::Hex(bytes) | BytecodeField::Object { object: bytes } => bytes,
        }
    }
}

/// Loads artifacts from a build output directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn load(&self, contract: &str) -> Result<Artifact> {
        let path = self.find(contract)?;
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read artifact {}", path.display()))?;
        let file: ArtifactFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse artifact {}", path.display()))?;

        let bytecode = file.bytecode.into_bytes();
        if bytecode.is_empty() {
            anyhow::bail!(
                "Artifact {} has no creation bytecode (abstract contract or interface?)",
                path.display()
            );
        }

        tracing::trace!(contract, path = %path.display(), "Artifact loaded");

        Ok(Artifact {
            contract_name: contract.to_string(),
            abi: file.abi,
            bytecode,
        })
    }

    fn find(&self, contract: &str) -> Result<PathBuf> {
        let file_name = format!("{contract}.json");
        let direct = self.dir.join(&file_name);
        if direct.is_file() {
            return Ok(direct);
        }

        find_recursive(&self.dir, &file_name)?.with_context(|| {
            format!(
                "No artifact named {} under {}",
                file_name,
                self.dir.display()
            )
        })
    }
}

fn find_recursive(dir: &Path, file_name: &str) -> Result<Option<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read artifacts directory {}", dir.display()))?;

    let mut subdirs = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_dir() {
            subdirs.push(path);
        } else if path.file_name().is_some_and(|name| name == file_name) {
            return Ok(Some(path));
        }
    }

    subdirs.sort();
    for subdir in subdirs {
        if let Some(found) = find_recursive(&subdir, file_name)? {
            return Ok(Some(found));
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    const ABI: &str = r#"[{"type":"constructor","inputs":[{"name":"impl","type":"address"}],"stateMutability":"nonpayable"}]"#;

    #[test]
    fn test_load_hardhat_layout() {
        let dir = TempDir::new("artifacts").unwrap();
        let nested = dir.path().join("contracts/Beacon.sol");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(
            nested.join("Beacon.json"),
            format!(r#"{{"contractName":"Beacon","abi":{ABI},"bytecode":"0x6080"}}"#),
        )
        .unwrap();

        let artifact = ArtifactStore::new(dir.path()).load("Beacon").unwrap();
        assert_eq!(&artifact.bytecode[..], &[0x60, 0x80]);
        assert!(artifact.abi.constructor.is_some());
        assert_eq!(artifact.bytecode_hash().len(), 64);
    }

    #[test]
    fn test_load_foundry_layout() {
        let dir = TempDir::new("artifacts").unwrap();
        std::fs::write(
            dir.path().join("Token.json"),
            r#"{"abi":[],"bytecode":{"object":"0x600a","sourceMap":""}}"#,
        )
        .unwrap();

        let artifact = ArtifactStore::new(dir.path()).load("Token").unwrap();
        assert_eq!(&artifact.bytecode[..], &[0x60, 0x0a]);
        assert!(artifact.abi.constructor.is_none());
    }

    #[test]
    fn test_missing_artifact() {
        let dir = TempDir::new("artifacts").unwrap();
        let err = ArtifactStore::new(dir.path()).load("Nope").unwrap_err();
        assert!(err.to_string().contains("No artifact named Nope.json"));
    }

    #[test]
    fn test_empty_bytecode_is_rejected() {
        let dir = TempDir::new("artifacts").unwrap();
        std::fs::write(dir.path().join("IToken.json"), r#"{"abi":[],"bytecode":"0x"}"#).unwrap();
        assert!(ArtifactStore::new(dir.path()).load("IToken").is_err());
    }
}
