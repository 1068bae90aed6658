//! Node client seam
//!
//! [`NodeClient`] is everything the engine needs from the chain: submit a
//! flip, request a deletion, look up a transaction. [`HttpNodeClient`] is the
//! JSON-RPC adapter shipped with the crate; tests swap in a programmable
//! mock.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::error::{FlipError, FlipResult};

/// Block hash the node reports while a transaction is still in the mempool.
/// Any other block hash means the transaction was mined.
pub const HASH_IN_MEMPOOL: &str =
    "0x0000000000000000000000000000000000000000000000000000000000000000";

/// Chain view of a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub hash: String,
    pub block_hash: String,
}

impl Transaction {
    /// True once the transaction left the mempool and landed in a real block.
    pub fn is_mined(&self) -> bool {
        self.block_hash != HASH_IN_MEMPOOL
    }
}

/// Submission request, one entry per encoded payload part.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitFlipRequest {
    pub hex: String,
    pub public_hex: String,
    pub private_hex: String,
    pub pair_id: i64,
}

/// Result of a successful submission.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlipSubmitResult {
    /// Transaction carrying the submission
    pub tx_hash: String,
    /// Canonical on-chain content hash of the flip
    pub hash: String,
}

/// Async client for the flip-related node API.
#[async_trait]
pub trait NodeClient: Send + Sync {
    /// Submit an encoded flip. Returns the pending transaction and the
    /// on-chain content hash.
    async fn submit_flip(&self, req: SubmitFlipRequest) -> FlipResult<FlipSubmitResult>;

    /// Request deletion of a published flip by its content hash. Returns the
    /// pending delete transaction hash.
    async fn delete_flip(&self, hash: &str) -> FlipResult<String>;

    /// Look up a transaction. `Ok(None)` means the node does not know it
    /// (dropped or never broadcast).
    async fn transaction(&self, tx_hash: &str) -> FlipResult<Option<Transaction>>;
}

// ============================================================================
// JSON-RPC adapter
// ============================================================================

#[derive(Serialize)]
struct RpcRequest<'a, P: Serialize> {
    method: &'a str,
    params: P,
    id: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    key: Option<&'a str>,
}

#[derive(Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    message: String,
}

/// JSON-RPC client for the node's flip API.
pub struct HttpNodeClient {
    client: Client,
    url: String,
    api_key: Option<String>,
}

impl HttpNodeClient {
    /// Create a client for the given node RPC endpoint.
    pub fn new(url: impl Into<String>, api_key: Option<String>) -> FlipResult<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| FlipError::Node(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            url: url.into(),
            api_key,
        })
    }

    async fn call<P: Serialize, T: DeserializeOwned>(
        &self,
        method: &str,
        params: P,
    ) -> FlipResult<RpcResponse<T>> {
        let request = RpcRequest {
            method,
            params,
            id: 1,
            key: self.api_key.as_deref(),
        };

        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| FlipError::Node(format!("Node request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(FlipError::Node(format!(
                "Node returned status {status}: {body}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| FlipError::Node(format!("Failed to parse node response: {e}")))
    }

    async fn call_result<P: Serialize, T: DeserializeOwned>(
        &self,
        method: &str,
        params: P,
    ) -> FlipResult<T> {
        let resp: RpcResponse<T> = self.call(method, params).await?;
        if let Some(err) = resp.error {
            return Err(FlipError::Node(err.message));
        }
        resp.result
            .ok_or_else(|| FlipError::Node(format!("{method}: empty result")))
    }
}

#[async_trait]
impl NodeClient for HttpNodeClient {
    async fn submit_flip(&self, req: SubmitFlipRequest) -> FlipResult<FlipSubmitResult> {
        self.call_result("flip_submit", [req]).await
    }

    async fn delete_flip(&self, hash: &str) -> FlipResult<String> {
        self.call_result("flip_delete", [hash]).await
    }

    async fn transaction(&self, tx_hash: &str) -> FlipResult<Option<Transaction>> {
        let resp: RpcResponse<Transaction> = self.call("bcn_transaction", [tx_hash]).await?;
        match resp.error {
            // The node answers lookups for unknown transactions with an
            // error; the engine treats that as "dropped", not a failure.
            Some(err) if err.message.to_lowercase().contains("not found") => Ok(None),
            Some(err) => Err(FlipError::Node(err.message)),
            None => Ok(resp.result),
        }
    }
}
