//! Ethereum JSON-RPC access.
//!
//! The pipeline talks to the chain through the [`ChainClient`] trait.
//! [`RpcClient`] implements it over HTTP JSON-RPC against a node that
//! manages the sending accounts (a Hardhat or Anvil fork).

use std::{future::Future, time::Duration};

use alloy_core::primitives::{Address, B256, Bytes};
use anyhow::Context;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

/// Default timeout for RPC requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default interval between receipt polls.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// A transaction to submit from a node-managed account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionRequest {
    pub from: Address,
    /// `None` creates a contract.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<Address>,
    pub data: Bytes,
}

impl TransactionRequest {
    pub fn create(from: Address, data: Bytes) -> Self {
        Self {
            from,
            to: None,
            data,
        }
    }

    pub fn call(from: Address, to: Address, data: Bytes) -> Self {
        Self {
            from,
            to: Some(to),
            data,
        }
    }
}

/// The parts of a mined transaction's receipt the pipeline uses.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: B256,
    #[serde(default)]
    pub contract_address: Option<Address>,
    #[serde(deserialize_with = "deserialize_u64_from_hex")]
    pub block_number: u64,
    #[serde(deserialize_with = "deserialize_status")]
    pub status: bool,
}

/// Deserialize a u64 from a hex string (with 0x prefix).
fn deserialize_u64_from_hex<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = Deserialize::deserialize(deserializer)?;
    u64::from_str_radix(s.trim_start_matches("0x"), 16).map_err(serde::de::Error::custom)
}

fn deserialize_status<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: serde::Deserializer<'de>,
{
    deserialize_u64_from_hex(deserializer).map(|status| status == 1)
}

/// The blockchain operations the pipeline depends on.
pub trait ChainClient: Send + Sync {
    /// Chain id reported by the endpoint.
    fn chain_id(&self) -> impl Future<Output = anyhow::Result<u64>> + Send;

    /// Accounts managed by the node, in signer index order.
    fn accounts(&self) -> impl Future<Output = anyhow::Result<Vec<Address>>> + Send;

    /// Submit a transaction, returning its hash.
    fn send_transaction(
        &self,
        tx: TransactionRequest,
    ) -> impl Future<Output = anyhow::Result<B256>> + Send;

    /// Receipt of a transaction, or `None` while it is pending.
    fn transaction_receipt(
        &self,
        hash: B256,
    ) -> impl Future<Output = anyhow::Result<Option<TransactionReceipt>>> + Send;

    /// Read-only call against the latest block.
    fn call(&self, to: Address, data: Bytes) -> impl Future<Output = anyhow::Result<Bytes>> + Send;
}

/// Wait until `hash` is mined and check that it did not revert.
pub async fn wait_for_receipt<C: ChainClient>(
    client: &C,
    hash: B256,
    timeout: Duration,
) -> anyhow::Result<TransactionReceipt> {
    let start = std::time::Instant::now();

    loop {
        if let Some(receipt) = client.transaction_receipt(hash).await? {
            if !receipt.status {
                anyhow::bail!(
                    "Transaction {} reverted in block {}",
                    hash,
                    receipt.block_number
                );
            }
            return Ok(receipt);
        }

        if start.elapsed() > timeout {
            anyhow::bail!(
                "Timeout waiting for transaction {} after {}s",
                hash,
                timeout.as_secs()
            );
        }

        tracing::trace!(tx_hash = %hash, "Transaction pending, polling again...");
        tokio::time::sleep(DEFAULT_POLL_INTERVAL).await;
    }
}

/// Submit `tx` and wait for it to be mined.
pub async fn send_and_confirm<C: ChainClient>(
    client: &C,
    tx: TransactionRequest,
    timeout: Duration,
) -> anyhow::Result<TransactionReceipt> {
    let hash = client
        .send_transaction(tx)
        .await
        .context("Failed to submit transaction")?;
    tracing::debug!(tx_hash = %hash, "Transaction submitted");
    wait_for_receipt(client, hash, timeout).await
}

/// Create an HTTP client configured for JSON-RPC requests.
pub fn create_client() -> Result<reqwest::Client, anyhow::Error> {
    reqwest::Client::builder()
        .timeout(DEFAULT_TIMEOUT)
        .build()
        .context("Failed to create HTTP client")
}

/// Make a JSON-RPC call and deserialize the result.
///
/// # Arguments
/// * `client` - The HTTP client to use
/// * `url` - The RPC endpoint URL
/// * `method` - The RPC method name
/// * `params` - The method parameters
///
/// # Returns
/// The deserialized result, or an error if the request failed or returned an error response.
pub async fn json_rpc_call<T: DeserializeOwned>(
    client: &reqwest::Client,
    url: &str,
    method: &str,
    params: Vec<Value>,
) -> Result<T, anyhow::Error> {
    let response = client
        .post(url)
        .json(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        }))
        .send()
        .await
        .with_context(|| format!("Failed to send {} request", method))?;

    let result: Value = response
        .json()
        .await
        .with_context(|| format!("Failed to parse {} response", method))?;

    if let Some(error) = result.get("error") {
        anyhow::bail!(
            "RPC error: {}",
            error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown")
        );
    }

    let result_value = result
        .get("result")
        .context("No result in response")?
        .clone();

    serde_json::from_value(result_value)
        .with_context(|| format!("Failed to deserialize {} result", method))
}

/// [`ChainClient`] over HTTP JSON-RPC.
#[derive(Debug, Clone)]
pub struct RpcClient {
    client: reqwest::Client,
    url: String,
}

impl RpcClient {
    pub fn new(url: impl Into<String>) -> anyhow::Result<Self> {
        let url = url.into();
        url::Url::parse(&url).with_context(|| format!("Invalid RPC URL: {url}"))?;
        Ok(Self {
            client: create_client()?,
            url,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl ChainClient for RpcClient {
    async fn chain_id(&self) -> anyhow::Result<u64> {
        let chain_id: String =
            json_rpc_call(&self.client, &self.url, "eth_chainId", vec![]).await?;
        u64::from_str_radix(chain_id.trim_start_matches("0x"), 16)
            .with_context(|| format!("Invalid chain id: {chain_id}"))
    }

    async fn accounts(&self) -> anyhow::Result<Vec<Address>> {
        json_rpc_call(&self.client, &self.url, "eth_accounts", vec![]).await
    }

    async fn send_transaction(&self, tx: TransactionRequest) -> anyhow::Result<B256> {
        json_rpc_call(
            &self.client,
            &self.url,
            "eth_sendTransaction",
            vec![serde_json::to_value(&tx).context("Failed to serialize transaction")?],
        )
        .await
    }

    async fn transaction_receipt(&self, hash: B256) -> anyhow::Result<Option<TransactionReceipt>> {
        json_rpc_call(
            &self.client,
            &self.url,
            "eth_getTransactionReceipt",
            vec![serde_json::json!(hash)],
        )
        .await
    }

    async fn call(&self, to: Address, data: Bytes) -> anyhow::Result<Bytes> {
        json_rpc_call(
            &self.client,
            &self.url,
            "eth_call",
            vec![
                serde_json::json!({ "to": to, "data": data }),
                serde_json::json!("latest"),
            ],
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receipt_from_rpc_json() {
        let receipt: TransactionReceipt = serde_json::from_value(serde_json::json!({
            "transactionHash": "0x1111111111111111111111111111111111111111111111111111111111111111",
            "contractAddress": "0x2222222222222222222222222222222222222222",
            "blockNumber": "0x1a",
            "status": "0x1",
            "gasUsed": "0x5208"
        }))
        .unwrap();

        assert_eq!(receipt.block_number, 26);
        assert!(receipt.status);
        assert_eq!(
            receipt.contract_address,
            Some(Address::repeat_byte(0x22))
        );
    }

    #[test]
    fn test_reverted_receipt() {
        let receipt: TransactionReceipt = serde_json::from_value(serde_json::json!({
            "transactionHash": "0x1111111111111111111111111111111111111111111111111111111111111111",
            "contractAddress": null,
            "blockNumber": "0x2",
            "status": "0x0"
        }))
        .unwrap();
        assert!(!receipt.status);
        assert!(receipt.contract_address.is_none());
    }

    #[test]
    fn test_create_request_omits_to() {
        let tx = TransactionRequest::create(Address::ZERO, Bytes::from(vec![0x60]));
        let json = serde_json::to_value(&tx).unwrap();
        assert!(json.get("to").is_none());
        assert_eq!(json["data"], "0x60");
    }

    #[test]
    fn test_rejects_invalid_url() {
        assert!(RpcClient::new("not a url").is_err());
    }
}
