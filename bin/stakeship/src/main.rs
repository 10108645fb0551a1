//! stakeship deploys a dependency-ordered contract stack in one run:
//! create, wire, wait for durability, verify, export.

mod cli;

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use cli::Cli;
use stakeship_deploy::{
    DeploymentReport, DirTarget, HttpLedger, HttpRegistry, MANIFEST_FILENAME, Manifest, Pipeline,
    Verifier, export,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    let mut manifest = match &cli.manifest {
        Some(path) => Manifest::load_from_file(&PathBuf::from(path))?,
        None => {
            let mut manifest = Manifest::starter(cli.network_config()?);
            manifest.verification.registry_url = cli.network.registry_url().map(String::from);
            // Save the generated manifest so the operator can tune it and
            // re-run.
            manifest.save_to_file(&PathBuf::from(MANIFEST_FILENAME))?;
            manifest
        }
    };

    // CLI overrides win over whatever the manifest says.
    if let Some(rpc_url) = &cli.rpc_url {
        manifest.network.rpc_url = rpc_url.clone();
    }
    if let Some(registry_url) = &cli.registry_url {
        manifest.verification.registry_url = Some(registry_url.clone());
    }
    if let Some(dir) = &cli.export_dir {
        manifest.export.dir = PathBuf::from(dir);
    }
    if cli.skip_verify {
        manifest.verification.enabled = false;
    }
    if cli.skip_export {
        manifest.export.enabled = false;
    }
    manifest.validate()?;

    tracing::info!(
        network = %manifest.network.name,
        chain_id = manifest.network.chain_id,
        steps = manifest.steps.len(),
        "Starting deployment..."
    );

    let ledger = HttpLedger::new(&manifest.network.rpc_url)?;
    let pipeline = Pipeline::new(&ledger, manifest.confirmations.creation_policy());

    let artifacts = match pipeline.run(&manifest.steps).await {
        Ok(artifacts) => artifacts,
        Err(failure) => {
            // Show what already exists remotely so the operator can
            // diagnose and resume by hand.
            for artifact in &failure.completed {
                tracing::warn!(
                    step = %artifact.name,
                    address = %artifact.address,
                    "Confirmed before the failure"
                );
            }
            return Err(failure.into());
        }
    };

    let mut warnings = Vec::new();

    if manifest.verification.enabled {
        match &manifest.verification.registry_url {
            Some(url) => {
                let registry = HttpRegistry::new(url, cli.registry_api_key.clone())?;
                let verifier = Verifier::new(
                    &ledger,
                    &registry,
                    manifest.confirmations.verification_policy(),
                );
                warnings.extend(verifier.verify_all(&artifacts).await);
            }
            None => {
                tracing::warn!("Verification is enabled but no registry URL is configured, skipping");
            }
        }
    }

    let mut record = None;
    if manifest.export.enabled {
        let mut target = DirTarget::new(&manifest.export.dir);
        match export(&artifacts, manifest.network.chain_id, &mut target) {
            Ok(written) => record = Some(written),
            Err(warning) => {
                tracing::warn!(%warning, "Export failed (non-fatal)");
                warnings.push(warning);
            }
        }
    }

    let report = DeploymentReport {
        network: manifest.network.name.clone(),
        network_id: manifest.network.chain_id,
        artifacts,
        warnings,
        export: record,
    };
    println!("{report}");

    Ok(())
}
