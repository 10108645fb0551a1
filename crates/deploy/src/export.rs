//! Artifact exporter: writes the deployment record and interface
//! descriptors to a location a downstream consumer can import directly.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use alloy_core::primitives::Address;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::StageWarning;
use crate::pipeline::DeployedArtifact;

/// File name of the machine-readable deployment record.
pub const RECORD_FILENAME: &str = "deployment.json";
/// Directory inside the target holding interface descriptor copies.
pub const INTERFACES_DIR: &str = "interfaces";

/// Write-once record of a completed deployment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportRecord {
    /// Artifact name to remote handle.
    pub contracts: BTreeMap<String, Address>,
    pub network_id: u64,
    /// ISO-8601 creation time of this record.
    pub generated_at: DateTime<Utc>,
}

/// One file produced by the exporter, relative to the target root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportFile {
    pub path: PathBuf,
    pub contents: Vec<u8>,
}

/// Destination for exported files.
///
/// `replace` swaps the previous export for the given set in full. Partial
/// merges are not allowed, so re-running an export never leaves stale
/// entries behind.
pub trait ExportTarget {
    fn replace(&mut self, files: Vec<ExportFile>) -> Result<()>;
}

/// [`ExportTarget`] writing below a directory root.
pub struct DirTarget {
    root: PathBuf,
}

impl DirTarget {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ExportTarget for DirTarget {
    fn replace(&mut self, files: Vec<ExportFile>) -> Result<()> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("Failed to create export directory {}", self.root.display()))?;

        // Drop the previous export entirely before writing the new one.
        let record = self.root.join(RECORD_FILENAME);
        if record.exists() {
            fs::remove_file(&record).context("Failed to remove previous deployment record")?;
        }
        let interfaces = self.root.join(INTERFACES_DIR);
        if interfaces.exists() {
            fs::remove_dir_all(&interfaces).context("Failed to remove previous interface copies")?;
        }

        for file in files {
            let path = self.root.join(&file.path);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            fs::write(&path, &file.contents)
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }

        Ok(())
    }
}

/// In-memory target, for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryTarget {
    pub files: BTreeMap<PathBuf, Vec<u8>>,
}

impl ExportTarget for MemoryTarget {
    fn replace(&mut self, files: Vec<ExportFile>) -> Result<()> {
        self.files.clear();
        for file in files {
            self.files.insert(file.path, file.contents);
        }
        Ok(())
    }
}

/// Build the export record and write it, together with each artifact's
/// interface descriptor, to `target`.
///
/// Never fatal to the deployment: the authoritative state already lives
/// remotely, so any failure comes back as a [`StageWarning`].
pub fn export(
    artifacts: &[DeployedArtifact],
    network_id: u64,
    target: &mut dyn ExportTarget,
) -> Result<ExportRecord, StageWarning> {
    let record = ExportRecord {
        contracts: artifacts
            .iter()
            .map(|artifact| (artifact.name.clone(), artifact.address))
            .collect(),
        network_id,
        generated_at: Utc::now(),
    };

    let outcome = collect_files(&record, artifacts).and_then(|files| target.replace(files));
    match outcome {
        Ok(()) => {
            tracing::info!(
                contracts = record.contracts.len(),
                network_id,
                "Export record written"
            );
            Ok(record)
        }
        Err(e) => Err(StageWarning::ExportTargetUnavailable {
            reason: format!("{e:#}"),
        }),
    }
}

fn collect_files(record: &ExportRecord, artifacts: &[DeployedArtifact]) -> Result<Vec<ExportFile>> {
    let mut files = Vec::with_capacity(artifacts.len() + 1);

    let rendered = serde_json::to_vec_pretty(record).context("Failed to serialize deployment record")?;
    files.push(ExportFile {
        path: PathBuf::from(RECORD_FILENAME),
        contents: rendered,
    });

    for artifact in artifacts {
        let Some(source) = &artifact.interface else {
            continue;
        };
        let contents = fs::read(source)
            .with_context(|| format!("Failed to read interface descriptor {}", source.display()))?;
        files.push(ExportFile {
            path: Path::new(INTERFACES_DIR).join(format!("{}.json", artifact.name)),
            contents,
        });
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use serde_json::Value;
    use tempdir::TempDir;

    use super::*;
    use crate::ledger::PendingHandle;

    fn artifact(name: &str, byte: u8, interface: Option<PathBuf>) -> DeployedArtifact {
        DeployedArtifact {
            name: name.to_string(),
            address: Address::repeat_byte(byte),
            creation_tx: PendingHandle::from(format!("0x{byte:02x}")),
            receipt: None,
            constructor_args: Vec::new(),
            interface,
        }
    }

    fn record_names(target: &MemoryTarget) -> Vec<String> {
        let record: Value =
            serde_json::from_slice(target.files.get(Path::new(RECORD_FILENAME)).unwrap()).unwrap();
        record["contracts"]
            .as_object()
            .unwrap()
            .keys()
            .cloned()
            .collect()
    }

    #[test]
    fn record_carries_every_handle_and_an_iso_timestamp() {
        let mut target = MemoryTarget::default();

        let record = export(&[artifact("nft", 0x11, None), artifact("vault", 0x22, None)], 97, &mut target)
            .unwrap();

        assert_eq!(record.network_id, 97);
        assert_eq!(record.contracts.len(), 2);

        let rendered: Value =
            serde_json::from_slice(target.files.get(Path::new(RECORD_FILENAME)).unwrap()).unwrap();
        assert_eq!(rendered["network_id"], 97);
        // chrono renders DateTime<Utc> as an ISO-8601 string.
        assert!(rendered["generated_at"].as_str().unwrap().contains('T'));
    }

    #[test]
    fn rerunning_export_fully_replaces_the_record() {
        let mut target = MemoryTarget::default();

        export(&[artifact("nft", 0x11, None), artifact("vault", 0x22, None)], 97, &mut target).unwrap();
        export(&[artifact("token", 0x33, None)], 97, &mut target).unwrap();

        assert_eq!(record_names(&target), vec!["token".to_string()]);
        assert_eq!(target.files.len(), 1);
    }

    #[test]
    fn interface_descriptors_are_copied_and_stale_copies_removed() {
        let workdir = TempDir::new("stakeship-export").unwrap();
        let descriptor = workdir.path().join("NFT.json");
        fs::write(&descriptor, br#"{"abi": []}"#).unwrap();

        let out = workdir.path().join("out");
        let mut target = DirTarget::new(&out);

        export(&[artifact("nft", 0x11, Some(descriptor.clone()))], 97, &mut target).unwrap();
        assert!(out.join(INTERFACES_DIR).join("nft.json").exists());

        // A second run without the nft artifact must not leave its copy
        // behind.
        export(&[artifact("token", 0x22, None)], 97, &mut target).unwrap();
        assert!(!out.join(INTERFACES_DIR).join("nft.json").exists());
        assert!(out.join(RECORD_FILENAME).exists());
    }

    #[test]
    fn unwritable_destination_is_a_warning_not_a_panic() {
        let workdir = TempDir::new("stakeship-export").unwrap();
        let blocker = workdir.path().join("blocker");
        fs::write(&blocker, b"not a directory").unwrap();

        // The export root sits below a regular file, so it cannot be
        // created.
        let mut target = DirTarget::new(blocker.join("out"));

        let warning = export(&[artifact("nft", 0x11, None)], 97, &mut target).unwrap_err();
        assert!(matches!(warning, StageWarning::ExportTargetUnavailable { .. }));
    }

    #[test]
    fn missing_interface_descriptor_is_a_warning() {
        let mut target = MemoryTarget::default();

        let warning = export(
            &[artifact("nft", 0x11, Some(PathBuf::from("/nonexistent/NFT.json")))],
            97,
            &mut target,
        )
        .unwrap_err();

        assert!(matches!(warning, StageWarning::ExportTargetUnavailable { .. }));
    }
}
