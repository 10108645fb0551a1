//! Client-side interface to the remote ledger, plus its JSON-RPC binding.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use alloy_core::primitives::Address;
use anyhow::{Context, Result};
use derive_more::{Deref, From};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Timeout for individual ledger requests. Distinct from confirmation
/// waiting, which is governed by [`crate::ConfirmPolicy`].
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Opaque identifier for a submitted operation that is not durable yet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Deref, From)]
pub struct PendingHandle(String);

impl From<&str> for PendingHandle {
    fn from(handle: &str) -> Self {
        Self(handle.to_string())
    }
}

impl fmt::Display for PendingHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of a creation submission: the address the artifact will live at
/// and the pending transaction to watch for durability.
#[derive(Debug, Clone)]
pub struct PendingCreate {
    pub address: Address,
    pub tx: PendingHandle,
}

/// Narrow interface to the remote ledger.
///
/// Signing capability and network selection are assumed to be bound to the
/// implementation already; callers only describe what to submit. All
/// submissions return before durability — use
/// [`crate::confirm::wait_for_depth`] to block until an operation is
/// buried deep enough.
pub trait LedgerClient: Send + Sync {
    /// Submit a creation transaction for `contract`.
    fn submit_create(
        &self,
        contract: &str,
        args: &[Value],
    ) -> impl Future<Output = Result<PendingCreate>> + Send;

    /// Submit a method call against an existing artifact.
    fn submit_call(
        &self,
        target: Address,
        method: &str,
        args: &[Value],
    ) -> impl Future<Output = Result<PendingHandle>> + Send;

    /// Current confirmation depth of a submitted operation.
    fn confirmation_depth(&self, tx: &PendingHandle) -> impl Future<Output = Result<u64>> + Send;
}

/// [`LedgerClient`] over a JSON-RPC endpoint.
pub struct HttpLedger {
    client: reqwest::Client,
    url: url::Url,
}

/// Response to a creation submission.
#[derive(Debug, Deserialize)]
struct CreateResponse {
    address: Address,
    tx: String,
}

impl HttpLedger {
    pub fn new(rpc_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;
        let url = url::Url::parse(rpc_url).context("Invalid ledger RPC URL")?;
        Ok(Self { client, url })
    }

    /// Make a JSON-RPC call and deserialize the result.
    async fn call<T: DeserializeOwned>(&self, method: &str, params: Vec<Value>) -> Result<T> {
        let response = self
            .client
            .post(self.url.clone())
            .json(&serde_json::json!({
                "jsonrpc": "2.0",
                "method": method,
                "params": params,
                "id": 1
            }))
            .send()
            .await
            .with_context(|| format!("Failed to send {} request", method))?;

        let body: Value = response
            .json()
            .await
            .with_context(|| format!("Failed to parse {} response", method))?;

        if let Some(error) = body.get("error") {
            anyhow::bail!(
                "RPC error from {}: {}",
                method,
                error
                    .get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or("unknown")
            );
        }

        let result = body
            .get("result")
            .with_context(|| format!("No result in {} response", method))?
            .clone();

        serde_json::from_value(result)
            .with_context(|| format!("Failed to deserialize {} result", method))
    }
}

impl LedgerClient for HttpLedger {
    async fn submit_create(&self, contract: &str, args: &[Value]) -> Result<PendingCreate> {
        let response: CreateResponse = self
            .call(
                "deployer_submitCreate",
                vec![Value::String(contract.to_string()), Value::Array(args.to_vec())],
            )
            .await?;

        Ok(PendingCreate {
            address: response.address,
            tx: response.tx.into(),
        })
    }

    async fn submit_call(&self, target: Address, method: &str, args: &[Value]) -> Result<PendingHandle> {
        let tx: String = self
            .call(
                "deployer_submitCall",
                vec![
                    Value::String(target.to_string()),
                    Value::String(method.to_string()),
                    Value::Array(args.to_vec()),
                ],
            )
            .await?;

        Ok(tx.into())
    }

    async fn confirmation_depth(&self, tx: &PendingHandle) -> Result<u64> {
        // Depth comes back as a hex quantity.
        let depth: String = self
            .call("deployer_confirmationDepth", vec![Value::String(tx.to_string())])
            .await?;

        u64::from_str_radix(depth.trim_start_matches("0x"), 16)
            .context("Failed to parse confirmation depth")
    }
}
