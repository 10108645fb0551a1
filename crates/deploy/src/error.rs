//! Error taxonomy for the deployment pipeline.
//!
//! Pipeline-stage failures abort the run. Verification and export problems
//! are downgraded to warnings, collected, and reported at the end.

use std::time::Duration;

use crate::ledger::PendingHandle;
use crate::pipeline::DeployedArtifact;

/// Fatal errors raised while executing deployment steps.
///
/// Any of these aborts the remaining steps. The operator is expected to
/// diagnose and re-run the whole pipeline; no retries happen here because
/// creation calls are not idempotent.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// A step argument names an artifact that is not deployed before it.
    ///
    /// Only reachable through malformed configuration: references are
    /// validated before anything is submitted, so a failed dependency
    /// aborts the run before its dependents execute.
    #[error("step `{step}` references artifact `{reference}` which is not deployed before it")]
    UnresolvedDependency { step: String, reference: String },

    /// The creation submission itself was rejected by the ledger.
    #[error("creation call for step `{step}` failed: {cause:#}")]
    CreationFailed { step: String, cause: anyhow::Error },

    /// The creation transaction did not reach the required depth in time.
    #[error("step `{step}` was not confirmed in time")]
    ConfirmationTimeout {
        step: String,
        #[source]
        source: WaitTimeout,
    },

    /// A post-deploy call failed, either at submission or while waiting
    /// for its own confirmation.
    #[error("post-deploy call `{method}` for step `{step}` failed: {cause:#}")]
    PostDeployActionFailed {
        step: String,
        method: String,
        cause: anyhow::Error,
    },
}

impl DeployError {
    /// Name of the step the pipeline failed on.
    pub fn step(&self) -> &str {
        match self {
            Self::UnresolvedDependency { step, .. }
            | Self::CreationFailed { step, .. }
            | Self::ConfirmationTimeout { step, .. }
            | Self::PostDeployActionFailed { step, .. } => step,
        }
    }
}

/// Raised by the confirmation waiter when `max_wait` elapses before the
/// operation reaches the required depth.
#[derive(Debug, thiserror::Error)]
#[error("`{handle}` still below confirmation depth {required} after {waited:?}")]
pub struct WaitTimeout {
    pub handle: PendingHandle,
    pub required: u64,
    pub waited: Duration,
}

/// A fatal error together with the artifacts confirmed before it.
///
/// The partial list lets an operator see what already exists remotely
/// before re-running the pipeline.
#[derive(Debug, thiserror::Error)]
#[error("deployment aborted at step `{}`; {} artifact(s) confirmed before the failure", .error.step(), .completed.len())]
pub struct PipelineFailure {
    #[source]
    pub error: DeployError,
    pub completed: Vec<DeployedArtifact>,
}

/// Non-fatal problems from the verification and export stages.
///
/// The remote state is already final when these stages run, so their
/// failures never roll anything back or change the exit status.
#[derive(Debug, thiserror::Error)]
pub enum StageWarning {
    #[error("verification of `{artifact}` failed: {reason}")]
    VerificationFailed { artifact: String, reason: String },

    #[error("export target unavailable: {reason}")]
    ExportTargetUnavailable { reason: String },
}
