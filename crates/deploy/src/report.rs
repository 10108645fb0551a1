//! Human-readable summary of a deployment run.

use std::fmt;

use crate::error::StageWarning;
use crate::export::ExportRecord;
use crate::pipeline::DeployedArtifact;

/// Outcome summary printed at the end of a run.
///
/// Warnings listed here are non-fatal by definition; a run with warnings
/// still exits successfully.
pub struct DeploymentReport {
    pub network: String,
    pub network_id: u64,
    pub artifacts: Vec<DeployedArtifact>,
    pub warnings: Vec<StageWarning>,
    pub export: Option<ExportRecord>,
}

impl DeploymentReport {
    /// True when every stage finished without a warning.
    pub fn clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

impl fmt::Display for DeploymentReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Deployment to {} (chain id {})", self.network, self.network_id)?;
        writeln!(f)?;

        writeln!(f, "=== Artifacts ===")?;
        for artifact in &self.artifacts {
            write!(f, "  {}  {}", artifact.name, artifact.address)?;
            if let Some(receipt) = artifact.receipt {
                write!(f, "  depth={}", receipt.depth)?;
            }
            writeln!(f)?;
        }

        if let Some(record) = &self.export {
            writeln!(f)?;
            writeln!(f, "=== Export ===")?;
            writeln!(f, "  record generated at {}", record.generated_at.to_rfc3339())?;
        }

        if !self.warnings.is_empty() {
            writeln!(f)?;
            writeln!(f, "=== Warnings (non-fatal) ===")?;
            for warning in &self.warnings {
                writeln!(f, "  {}", warning)?;
            }
        }

        Ok(())
    }
}
