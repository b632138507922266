//! Local build command.

use anyhow::{Context, Result};
use binsmith_config::MAX_BUILD_TIMEOUT;
use binsmith_core::{BuildRequest, ExecutionBudget};
use binsmith_executor::{
    BuildEvent, BuildPipeline, LocalSourceFetcher, ProcessRunner, builder_for,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use super::{load_config, parse_type};

/// Build a pipeline from a local source directory and stage its artifact.
pub async fn run(
    config_path: Option<&Path>,
    name: &str,
    pipeline_type: &str,
    source: &Path,
    timeout_secs: Option<u64>,
) -> Result<()> {
    let config = load_config(config_path)?;
    let pipeline_type = parse_type(pipeline_type)?;
    let request = BuildRequest::new(name, pipeline_type)?;

    let source = source
        .canonicalize()
        .with_context(|| format!("Failed to resolve source directory: {}", source.display()))?;

    let artifact_dir = config.artifact_dir();
    std::fs::create_dir_all(&artifact_dir).with_context(|| {
        format!(
            "Failed to create artifact directory: {}",
            artifact_dir.display()
        )
    })?;

    let timeout = timeout_secs
        .map(Duration::from_secs)
        .unwrap_or(config.build_timeout);
    if timeout.is_zero() || timeout > MAX_BUILD_TIMEOUT {
        anyhow::bail!(
            "Timeout must be between 1 and {} seconds",
            MAX_BUILD_TIMEOUT.as_secs()
        );
    }
    let budget = ExecutionBudget::with_timeout(timeout);

    let builder = builder_for(pipeline_type, config, Arc::new(ProcessRunner::new()));
    let pipeline = BuildPipeline::new(builder, Arc::new(LocalSourceFetcher::new(&source)));

    println!("Building pipeline: {} ({})", request.pipeline_name, pipeline_type);
    println!("Source: {}", source.display());
    println!("Timeout: {}s\n", timeout.as_secs());

    let canceller = budget.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling build");
            canceller.cancel();
        }
    });

    let (mut rx, handle) = pipeline.execute(request, budget);

    while let Some(event) = rx.recv().await {
        match event {
            BuildEvent::StageStarted { stage } => {
                println!("▶ Stage '{}' started", stage);
            }
            BuildEvent::StageCompleted { stage, success } => {
                if success {
                    println!("✓ Stage '{}' completed", stage);
                } else {
                    println!("✗ Stage '{}' failed", stage);
                }
            }
            BuildEvent::BuildCompleted { success } => {
                if success {
                    println!("\n--- Build completed successfully ---");
                } else {
                    println!("\n--- Build failed ---");
                }
            }
        }
    }

    let report = handle.await.context("Build task failed")?;

    if let Some(work_dir) = &report.request.work_dir {
        println!("Workspace: {}", work_dir.display());
    }

    match (report.artifact, report.failure) {
        (Some(artifact), None) => {
            println!("Artifact: {}", artifact.display());
            Ok(())
        }
        (_, Some((stage, err))) => {
            let kind = if err.is_timeout() { "timed out" } else { "failed" };
            Err(anyhow::Error::new(err).context(format!("Stage '{}' {}", stage, kind)))
        }
        (None, None) => anyhow::bail!("Build finished without an artifact"),
    }
}
