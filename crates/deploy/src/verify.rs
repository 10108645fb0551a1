//! Verification stage: submit confirmed artifacts to an external registry.
//!
//! Failures here are never fatal. The remote state is already final when
//! this stage runs, so problems are downgraded to warnings and reported
//! together at the end of the run.

use std::future::Future;

use alloy_core::primitives::Address;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::confirm::{self, ConfirmPolicy};
use crate::error::StageWarning;
use crate::ledger::LedgerClient;
use crate::pipeline::DeployedArtifact;

/// Registry-side outcome of a verification submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    /// Request accepted and queued by the registry.
    Accepted,
    /// The registry already knows this artifact. Treated as success.
    AlreadyVerified,
    /// Anything else the registry refused to take.
    Rejected(String),
}

/// Verification payload derived from a confirmed artifact.
#[derive(Debug, Clone, Serialize)]
pub struct VerificationRequest {
    pub artifact: String,
    pub address: Address,
    pub constructor_args: Vec<Value>,
}

impl VerificationRequest {
    pub fn for_artifact(artifact: &DeployedArtifact) -> Self {
        Self {
            artifact: artifact.name.clone(),
            address: artifact.address,
            constructor_args: artifact.constructor_args.clone(),
        }
    }
}

/// Narrow interface to the verification registry.
pub trait RegistryClient: Send + Sync {
    fn submit_verification(
        &self,
        request: &VerificationRequest,
    ) -> impl Future<Output = Result<VerificationOutcome>> + Send;
}

/// Drives verification for deployed artifacts.
pub struct Verifier<'a, C, R> {
    ledger: &'a C,
    registry: &'a R,
    policy: ConfirmPolicy,
}

impl<'a, C: LedgerClient, R: RegistryClient> Verifier<'a, C, R> {
    /// `policy` should usually require a deeper depth than the creation
    /// wait did; registries only index operations that are well buried.
    pub fn new(ledger: &'a C, registry: &'a R, policy: ConfirmPolicy) -> Self {
        Self {
            ledger,
            registry,
            policy,
        }
    }

    /// Verify one artifact. Every failure comes back as a warning.
    pub async fn verify(&self, artifact: &DeployedArtifact) -> Result<(), StageWarning> {
        let warn = |reason: String| StageWarning::VerificationFailed {
            artifact: artifact.name.clone(),
            reason,
        };

        // The registry requires the creation to be durable first.
        confirm::wait_for_depth(self.ledger, &artifact.creation_tx, &self.policy)
            .await
            .map_err(|e| warn(e.to_string()))?;

        let request = VerificationRequest::for_artifact(artifact);
        match self.registry.submit_verification(&request).await {
            Ok(VerificationOutcome::Accepted) => {
                tracing::info!(artifact = %artifact.name, "Verification accepted");
                Ok(())
            }
            Ok(VerificationOutcome::AlreadyVerified) => {
                tracing::info!(artifact = %artifact.name, "Already verified, nothing to do");
                Ok(())
            }
            Ok(VerificationOutcome::Rejected(reason)) => Err(warn(reason)),
            Err(e) => Err(warn(format!("{e:#}"))),
        }
    }

    /// Verify every artifact, collecting warnings instead of failing.
    pub async fn verify_all(&self, artifacts: &[DeployedArtifact]) -> Vec<StageWarning> {
        let mut warnings = Vec::new();

        for artifact in artifacts {
            if let Err(warning) = self.verify(artifact).await {
                tracing::warn!(%warning, "Verification failed (non-fatal)");
                warnings.push(warning);
            }
        }

        warnings
    }
}

/// [`RegistryClient`] over the registry's HTTP API.
pub struct HttpRegistry {
    client: reqwest::Client,
    url: url::Url,
    api_key: Option<String>,
}

/// Response envelope from the registry.
#[derive(Debug, Deserialize)]
struct RegistryResponse {
    status: String,
    #[serde(default)]
    reason: Option<String>,
}

impl HttpRegistry {
    pub fn new(url: &str, api_key: Option<String>) -> Result<Self> {
        let client = reqwest::Client::new();
        let url = url::Url::parse(url).context("Invalid registry URL")?;
        Ok(Self {
            client,
            url,
            api_key,
        })
    }
}

impl RegistryClient for HttpRegistry {
    async fn submit_verification(&self, request: &VerificationRequest) -> Result<VerificationOutcome> {
        let mut http = self.client.post(self.url.clone()).json(request);
        if let Some(key) = &self.api_key {
            http = http.query(&[("apikey", key.as_str())]);
        }

        let response = http
            .send()
            .await
            .context("Failed to send verification request")?;

        let body: RegistryResponse = response
            .json()
            .await
            .context("Failed to parse registry response")?;

        Ok(classify(&body.status, body.reason))
    }
}

/// Map a registry response onto an outcome.
///
/// Some registries report a re-verification through an "already verified"
/// error string rather than a dedicated status; both shapes count as
/// success.
fn classify(status: &str, reason: Option<String>) -> VerificationOutcome {
    match status {
        "accepted" | "ok" => VerificationOutcome::Accepted,
        "already_verified" => VerificationOutcome::AlreadyVerified,
        other => {
            let reason = reason.unwrap_or_else(|| other.to_string());
            if reason.to_lowercase().contains("already verified") {
                VerificationOutcome::AlreadyVerified
            } else {
                VerificationOutcome::Rejected(reason)
            }
        }
    }
}
