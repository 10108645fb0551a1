//! stakeship-deploy - Deployment library for dependency-ordered contract stacks.
//!
//! This crate provides the orchestration for rolling out a set of contracts
//! whose constructor arguments depend on earlier contracts' addresses:
//! strict in-order creation, post-deploy wiring calls, confirmation
//! waiting, registry verification and a machine-readable export for a
//! downstream consumer.

mod pipeline;
pub use pipeline::{DeployedArtifact, DeploymentStep, Pipeline, PostDeployCall, StepArg};

mod confirm;
pub use confirm::{
    ConfirmPolicy, ConfirmedReceipt, DEFAULT_MAX_WAIT, DEFAULT_POLL_INTERVAL,
    DEFAULT_REQUIRED_DEPTH, wait_for_depth,
};

mod error;
pub use error::{DeployError, PipelineFailure, StageWarning, WaitTimeout};

mod ledger;
pub use ledger::{HttpLedger, LedgerClient, PendingCreate, PendingHandle};

mod verify;
pub use verify::{HttpRegistry, RegistryClient, VerificationOutcome, VerificationRequest, Verifier};

mod export;
pub use export::{
    DirTarget, ExportFile, ExportRecord, ExportTarget, INTERFACES_DIR, MemoryTarget,
    RECORD_FILENAME, export,
};

mod manifest;
pub use manifest::{
    ConfirmationsConfig, DEFAULT_VERIFY_DEPTH, ExportConfig, MANIFEST_FILENAME, Manifest,
    NetworkConfig, VerificationConfig,
};

mod report;
pub use report::DeploymentReport;
