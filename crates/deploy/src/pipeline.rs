//! Dependency-ordered execution of deployment steps.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use alloy_core::primitives::Address;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::confirm::{self, ConfirmPolicy, ConfirmedReceipt};
use crate::error::{DeployError, PipelineFailure};
use crate::ledger::{LedgerClient, PendingHandle};

/// A value passed to a creation or post-deploy call.
///
/// `Artifact` references resolve to the handle of a previously confirmed
/// step at execution time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StepArg {
    /// Reference to an earlier step's artifact, by step name.
    Artifact { artifact: String },
    /// Plain value forwarded as-is.
    Literal(Value),
}

/// A wiring call made once the step's own artifact is confirmed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostDeployCall {
    pub method: String,
    /// Artifact the call is made against. Defaults to the step's own
    /// artifact; may name any earlier step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<StepArg>,
}

/// One artifact-creation step. Immutable once defined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentStep {
    /// Name other steps use to reference this artifact.
    pub name: String,
    /// Contract identifier understood by the ledger client.
    pub contract: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<StepArg>,
    /// Wiring calls run after the artifact is confirmed.
    #[serde(default, rename = "call", skip_serializing_if = "Vec::is_empty")]
    pub calls: Vec<PostDeployCall>,
    /// Path to the artifact's binary-interface descriptor, copied on
    /// export.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<PathBuf>,
}

/// A created artifact.
///
/// The receipt is attached exactly once, when the creation is confirmed;
/// nothing is mutated after that.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeployedArtifact {
    pub name: String,
    /// Remote address of the artifact.
    pub address: Address,
    /// Creation transaction, kept around for deeper confirmation waits.
    pub creation_tx: PendingHandle,
    pub receipt: Option<ConfirmedReceipt>,
    /// Constructor arguments as actually submitted, references resolved.
    pub constructor_args: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interface: Option<PathBuf>,
}

impl DeployedArtifact {
    pub fn is_confirmed(&self) -> bool {
        self.receipt.is_some()
    }
}

/// Executes deployment steps strictly in the given order.
///
/// The input order is the dependency resolution: a step may only reference
/// artifacts of steps before it. The pipeline is fail-stop; the first
/// fatal error aborts the remaining steps and is surfaced together with
/// the artifacts confirmed so far.
pub struct Pipeline<'a, C> {
    ledger: &'a C,
    policy: ConfirmPolicy,
}

impl<'a, C: LedgerClient> Pipeline<'a, C> {
    pub fn new(ledger: &'a C, policy: ConfirmPolicy) -> Self {
        Self { ledger, policy }
    }

    /// Run every step, producing one confirmed artifact per step in input
    /// order.
    pub async fn run(&self, steps: &[DeploymentStep]) -> Result<Vec<DeployedArtifact>, PipelineFailure> {
        // Malformed configuration must never reach the ledger.
        if let Err(error) = validate_references(steps) {
            return Err(PipelineFailure {
                error,
                completed: Vec::new(),
            });
        }

        let mut deployed: Vec<DeployedArtifact> = Vec::with_capacity(steps.len());
        let mut handles: BTreeMap<String, Address> = BTreeMap::new();

        for step in steps {
            match self.run_step(step, &handles).await {
                Ok(artifact) => {
                    handles.insert(artifact.name.clone(), artifact.address);
                    deployed.push(artifact);
                }
                Err((error, confirmed)) => {
                    // The failing step's own artifact is reported only if
                    // its creation was already confirmed.
                    if let Some(artifact) = confirmed {
                        deployed.push(artifact);
                    }
                    tracing::error!(step = %step.name, %error, "Deployment aborted");
                    return Err(PipelineFailure {
                        error,
                        completed: deployed,
                    });
                }
            }
        }

        Ok(deployed)
    }

    async fn run_step(
        &self,
        step: &DeploymentStep,
        handles: &BTreeMap<String, Address>,
    ) -> Result<DeployedArtifact, (DeployError, Option<DeployedArtifact>)> {
        tracing::info!(step = %step.name, contract = %step.contract, "Creating artifact...");

        let args = resolve_args(&step.name, &step.args, handles).map_err(|e| (e, None))?;

        let pending = self
            .ledger
            .submit_create(&step.contract, &args)
            .await
            .map_err(|e| {
                (
                    DeployError::CreationFailed {
                        step: step.name.clone(),
                        cause: e,
                    },
                    None,
                )
            })?;

        tracing::debug!(
            step = %step.name,
            address = %pending.address,
            tx = %pending.tx,
            "Creation submitted, waiting for confirmation..."
        );

        let receipt = confirm::wait_for_depth(self.ledger, &pending.tx, &self.policy)
            .await
            .map_err(|e| {
                (
                    DeployError::ConfirmationTimeout {
                        step: step.name.clone(),
                        source: e,
                    },
                    None,
                )
            })?;

        let artifact = DeployedArtifact {
            name: step.name.clone(),
            address: pending.address,
            creation_tx: pending.tx,
            receipt: Some(receipt),
            constructor_args: args,
            interface: step.interface.clone(),
        };

        tracing::info!(
            step = %step.name,
            address = %artifact.address,
            depth = receipt.depth,
            "Artifact confirmed"
        );

        // Post-deploy wiring. The step's own handle is visible here.
        let mut scope = handles.clone();
        scope.insert(step.name.clone(), artifact.address);

        for call in &step.calls {
            if let Err(error) = self.run_call(step, call, &scope).await {
                return Err((error, Some(artifact)));
            }
        }

        Ok(artifact)
    }

    async fn run_call(
        &self,
        step: &DeploymentStep,
        call: &PostDeployCall,
        scope: &BTreeMap<String, Address>,
    ) -> Result<(), DeployError> {
        let target_name = call.target.as_deref().unwrap_or(&step.name);
        let Some(target) = scope.get(target_name).copied() else {
            return Err(DeployError::UnresolvedDependency {
                step: step.name.clone(),
                reference: target_name.to_string(),
            });
        };

        let args = resolve_args(&step.name, &call.args, scope)?;

        tracing::info!(step = %step.name, method = %call.method, target = %target, "Post-deploy call...");

        let tx = self
            .ledger
            .submit_call(target, &call.method, &args)
            .await
            .map_err(|e| DeployError::PostDeployActionFailed {
                step: step.name.clone(),
                method: call.method.clone(),
                cause: e,
            })?;

        confirm::wait_for_depth(self.ledger, &tx, &self.policy)
            .await
            .map_err(|e| DeployError::PostDeployActionFailed {
                step: step.name.clone(),
                method: call.method.clone(),
                cause: e.into(),
            })?;

        Ok(())
    }
}

/// Resolve step arguments against the handles of confirmed artifacts.
fn resolve_args(
    step: &str,
    args: &[StepArg],
    handles: &BTreeMap<String, Address>,
) -> Result<Vec<Value>, DeployError> {
    args.iter()
        .map(|arg| match arg {
            StepArg::Literal(value) => Ok(value.clone()),
            StepArg::Artifact { artifact } => handles
                .get(artifact)
                .map(|address| Value::String(address.to_string()))
                .ok_or_else(|| DeployError::UnresolvedDependency {
                    step: step.to_string(),
                    reference: artifact.clone(),
                }),
        })
        .collect()
}

/// Check that every artifact reference points at an earlier step.
///
/// The step order is the dependency order, so this also rules out cycles.
/// A post-deploy call may additionally reference the step's own artifact.
pub(crate) fn validate_references(steps: &[DeploymentStep]) -> Result<(), DeployError> {
    let mut seen: BTreeSet<&str> = BTreeSet::new();

    for step in steps {
        for arg in &step.args {
            if let StepArg::Artifact { artifact } = arg {
                if !seen.contains(artifact.as_str()) {
                    return Err(DeployError::UnresolvedDependency {
                        step: step.name.clone(),
                        reference: artifact.clone(),
                    });
                }
            }
        }

        let mut call_scope = seen.clone();
        call_scope.insert(&step.name);

        for call in &step.calls {
            if let Some(target) = &call.target {
                if !call_scope.contains(target.as_str()) {
                    return Err(DeployError::UnresolvedDependency {
                        step: step.name.clone(),
                        reference: target.clone(),
                    });
                }
            }
            for arg in &call.args {
                if let StepArg::Artifact { artifact } = arg {
                    if !call_scope.contains(artifact.as_str()) {
                        return Err(DeployError::UnresolvedDependency {
                            step: step.name.clone(),
                            reference: artifact.clone(),
                        });
                    }
                }
            }
        }

        seen.insert(&step.name);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn step(name: &str, args: Vec<StepArg>) -> DeploymentStep {
        DeploymentStep {
            name: name.to_string(),
            contract: name.to_uppercase(),
            args,
            calls: Vec::new(),
            interface: None,
        }
    }

    fn artifact_ref(name: &str) -> StepArg {
        StepArg::Artifact {
            artifact: name.to_string(),
        }
    }

    #[test]
    fn backward_references_are_valid() {
        let steps = vec![
            step("a", vec![]),
            step("b", vec![artifact_ref("a")]),
            step("c", vec![artifact_ref("a"), artifact_ref("b")]),
        ];

        assert!(validate_references(&steps).is_ok());
    }

    #[test]
    fn forward_reference_is_rejected() {
        let steps = vec![step("a", vec![artifact_ref("b")]), step("b", vec![])];

        let err = validate_references(&steps).unwrap_err();
        assert!(matches!(
            err,
            DeployError::UnresolvedDependency { ref step, ref reference } if step == "a" && reference == "b"
        ));
    }

    #[test]
    fn self_reference_in_constructor_args_is_rejected() {
        let steps = vec![step("a", vec![artifact_ref("a")])];

        assert!(validate_references(&steps).is_err());
    }

    #[test]
    fn post_deploy_call_may_reference_own_and_earlier_artifacts() {
        let mut vault = step("vault", vec![artifact_ref("token")]);
        vault.calls.push(PostDeployCall {
            method: "setController".to_string(),
            target: Some("token".to_string()),
            args: vec![artifact_ref("vault"), StepArg::Literal(json!(true))],
        });
        let steps = vec![step("token", vec![]), vault];

        assert!(validate_references(&steps).is_ok());
    }

    #[test]
    fn post_deploy_call_may_not_reference_later_artifacts() {
        let mut token = step("token", vec![]);
        token.calls.push(PostDeployCall {
            method: "setController".to_string(),
            target: Some("vault".to_string()),
            args: Vec::new(),
        });
        let steps = vec![token, step("vault", vec![])];

        assert!(validate_references(&steps).is_err());
    }

    #[test]
    fn literals_pass_through_and_references_resolve_to_handles() {
        let mut handles = BTreeMap::new();
        handles.insert("token".to_string(), Address::repeat_byte(0x42));

        let resolved = resolve_args(
            "vault",
            &[StepArg::Literal(json!(10_000)), artifact_ref("token")],
            &handles,
        )
        .unwrap();

        assert_eq!(resolved[0], json!(10_000));
        assert_eq!(resolved[1], json!(Address::repeat_byte(0x42).to_string()));
    }

    #[test]
    fn unknown_reference_fails_resolution() {
        let err = resolve_args("vault", &[artifact_ref("token")], &BTreeMap::new()).unwrap_err();

        assert!(matches!(err, DeployError::UnresolvedDependency { .. }));
    }
}
