//! Deployment manifest: the static configuration a run is created from.
//!
//! The manifest describes the target network, the confirmation policy,
//! the verification and export settings, and the ordered list of steps.
//! Credentials never live here; they are bound to the ledger and registry
//! clients externally.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use url::Url;

use crate::confirm::{ConfirmPolicy, DEFAULT_MAX_WAIT, DEFAULT_POLL_INTERVAL, DEFAULT_REQUIRED_DEPTH};
use crate::pipeline::{self, DeploymentStep, PostDeployCall, StepArg};

/// The default name for the manifest file.
pub const MANIFEST_FILENAME: &str = "Stakeship.toml";

/// Depth registries expect before they will index a creation.
pub const DEFAULT_VERIFY_DEPTH: u64 = 6;

/// Root manifest structure, stored as TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub network: NetworkConfig,
    #[serde(default)]
    pub confirmations: ConfirmationsConfig,
    #[serde(default)]
    pub verification: VerificationConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(rename = "step")]
    pub steps: Vec<DeploymentStep>,
}

/// Target network description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub name: String,
    pub chain_id: u64,
    pub rpc_url: String,
}

/// Confirmation policy knobs, in whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfirmationsConfig {
    /// Depth before a creation or post-deploy call counts as durable.
    pub required_depth: u64,
    pub poll_interval_secs: u64,
    pub max_wait_secs: u64,
    /// Deeper depth required before verification submissions.
    pub verify_depth: u64,
}

impl Default for ConfirmationsConfig {
    fn default() -> Self {
        Self {
            required_depth: DEFAULT_REQUIRED_DEPTH,
            poll_interval_secs: DEFAULT_POLL_INTERVAL.as_secs(),
            max_wait_secs: DEFAULT_MAX_WAIT.as_secs(),
            verify_depth: DEFAULT_VERIFY_DEPTH,
        }
    }
}

impl ConfirmationsConfig {
    /// Policy for creation and post-deploy confirmation waits.
    pub fn creation_policy(&self) -> ConfirmPolicy {
        ConfirmPolicy {
            required_depth: self.required_depth,
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            max_wait: Duration::from_secs(self.max_wait_secs),
        }
    }

    /// Policy for the deeper wait before verification submissions.
    pub fn verification_policy(&self) -> ConfirmPolicy {
        self.creation_policy().with_depth(self.verify_depth)
    }
}

/// Verification stage settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationConfig {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry_url: Option<String>,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            registry_url: None,
        }
    }
}

/// Export stage settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub enabled: bool,
    /// Directory the record and interface copies are written to.
    pub dir: PathBuf,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: PathBuf::from("export"),
        }
    }
}

impl Manifest {
    /// Save the manifest to a TOML file.
    pub fn save_to_file(&self, path: &PathBuf) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize manifest to TOML")?;
        std::fs::write(path, content)
            .context(format!("Failed to write manifest to {}", path.display()))?;
        tracing::info!(path = %path.display(), "Manifest saved");
        Ok(())
    }

    /// Load a manifest from a TOML file (or a directory containing one).
    pub fn load_from_file(path: &PathBuf) -> Result<Self> {
        if !path.exists() {
            return Err(anyhow::anyhow!(
                "Manifest file or directory not found: {}",
                path.display()
            ));
        }

        let manifest_path = if path.is_dir() {
            path.join(MANIFEST_FILENAME)
        } else {
            path.to_path_buf()
        };

        let content = std::fs::read_to_string(&manifest_path)
            .context(format!("Failed to read manifest from {}", manifest_path.display()))?;
        let manifest: Self = toml::from_str(&content).context("Failed to parse manifest as TOML")?;
        manifest.validate()?;
        tracing::info!(path = %manifest_path.display(), steps = manifest.steps.len(), "Manifest loaded");
        Ok(manifest)
    }

    /// Reject manifests the pipeline would fail on before anything is
    /// submitted.
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.network.rpc_url).context("Invalid rpc_url in manifest")?;

        if self.steps.is_empty() {
            anyhow::bail!("Manifest defines no deployment steps");
        }

        let mut seen: BTreeSet<&str> = BTreeSet::new();
        for step in &self.steps {
            if !seen.insert(step.name.as_str()) {
                anyhow::bail!("Duplicate step name `{}` in manifest", step.name);
            }
        }

        pipeline::validate_references(&self.steps)
            .map_err(anyhow::Error::new)
            .context("Invalid artifact reference in manifest")?;

        Ok(())
    }

    /// Starter manifest for the reference staking stack: an NFT
    /// collection, its reward token, and the staking vault wired between
    /// them.
    pub fn starter(network: NetworkConfig) -> Self {
        let steps = vec![
            DeploymentStep {
                name: "nft-collection".to_string(),
                contract: "APE".to_string(),
                // max supply, mint cost in wei (0.01), max mint per call
                args: vec![
                    StepArg::Literal(json!(10_000)),
                    StepArg::Literal(json!("10000000000000000")),
                    StepArg::Literal(json!(5)),
                ],
                calls: vec![PostDeployCall {
                    method: "setBaseURI".to_string(),
                    target: None,
                    args: vec![StepArg::Literal(json!(
                        "ipfs://QmQp2wetEnju3zp6N93igCDjQUDLJJnhCLrXN78Z1opiCA"
                    ))],
                }],
                interface: Some(PathBuf::from("artifacts/APE.json")),
            },
            DeploymentStep {
                name: "reward-token".to_string(),
                contract: "SAPE".to_string(),
                args: Vec::new(),
                calls: Vec::new(),
                interface: Some(PathBuf::from("artifacts/SAPE.json")),
            },
            DeploymentStep {
                name: "staking-vault".to_string(),
                contract: "NFTStakingVault".to_string(),
                args: vec![
                    StepArg::Artifact {
                        artifact: "nft-collection".to_string(),
                    },
                    StepArg::Artifact {
                        artifact: "reward-token".to_string(),
                    },
                ],
                // The vault must be allowed to mint rewards.
                calls: vec![PostDeployCall {
                    method: "setController".to_string(),
                    target: Some("reward-token".to_string()),
                    args: vec![
                        StepArg::Artifact {
                            artifact: "staking-vault".to_string(),
                        },
                        StepArg::Literal(json!(true)),
                    ],
                }],
                interface: Some(PathBuf::from("artifacts/NFTStakingVault.json")),
            },
        ];

        Self {
            network,
            confirmations: ConfirmationsConfig::default(),
            verification: VerificationConfig::default(),
            export: ExportConfig::default(),
            steps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network() -> NetworkConfig {
        NetworkConfig {
            name: "bsc-testnet".to_string(),
            chain_id: 97,
            rpc_url: "https://data-seed-prebsc-1-s1.bnbchain.org:8545".to_string(),
        }
    }

    #[test]
    fn starter_manifest_is_valid_and_round_trips_through_toml() {
        let manifest = Manifest::starter(network());
        manifest.validate().unwrap();

        let rendered = toml::to_string_pretty(&manifest).unwrap();
        let parsed: Manifest = toml::from_str(&rendered).unwrap();

        assert_eq!(parsed, manifest);
    }

    #[test]
    fn manifest_parses_artifact_references_and_literals() {
        let manifest: Manifest = toml::from_str(
            r#"
            [network]
            name = "local"
            chain_id = 31337
            rpc_url = "http://127.0.0.1:8545"

            [[step]]
            name = "token"
            contract = "SAPE"

            [[step]]
            name = "vault"
            contract = "NFTStakingVault"
            args = [10000, { artifact = "token" }]
            "#,
        )
        .unwrap();

        manifest.validate().unwrap();
        assert_eq!(manifest.steps.len(), 2);
        assert_eq!(
            manifest.steps[1].args[1],
            StepArg::Artifact {
                artifact: "token".to_string()
            }
        );
        // Unset sections fall back to defaults.
        assert_eq!(manifest.confirmations.verify_depth, DEFAULT_VERIFY_DEPTH);
        assert!(manifest.verification.enabled);
    }

    #[test]
    fn duplicate_step_names_are_rejected() {
        let mut manifest = Manifest::starter(network());
        let duplicate = manifest.steps[0].clone();
        manifest.steps.push(duplicate);

        assert!(manifest.validate().is_err());
    }

    #[test]
    fn forward_references_are_rejected() {
        let mut manifest = Manifest::starter(network());
        manifest.steps[0].args.push(StepArg::Artifact {
            artifact: "staking-vault".to_string(),
        });

        assert!(manifest.validate().is_err());
    }

    #[test]
    fn empty_step_list_is_rejected() {
        let mut manifest = Manifest::starter(network());
        manifest.steps.clear();

        assert!(manifest.validate().is_err());
    }

    #[test]
    fn verification_policy_reuses_timing_with_deeper_depth() {
        let confirmations = ConfirmationsConfig::default();

        let creation = confirmations.creation_policy();
        let verification = confirmations.verification_policy();

        assert_eq!(creation.required_depth, DEFAULT_REQUIRED_DEPTH);
        assert_eq!(verification.required_depth, DEFAULT_VERIFY_DEPTH);
        assert_eq!(verification.poll_interval, creation.poll_interval);
        assert_eq!(verification.max_wait, creation.max_wait);
    }
}
