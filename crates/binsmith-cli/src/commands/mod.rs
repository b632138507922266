//! CLI command implementations.

pub mod build;

use anyhow::{Context, Result};
use binsmith_config::BuildConfig;
use binsmith_core::{BuildRequest, PipelineType};
use binsmith_executor::{ProcessRunner, builder_for};
use std::path::Path;
use std::sync::Arc;

/// Load and validate configuration from an optional file plus the environment.
pub fn load_config(path: Option<&Path>) -> Result<Arc<BuildConfig>> {
    let config = BuildConfig::load(path).with_context(|| match path {
        Some(p) => format!("Failed to load configuration from {}", p.display()),
        None => "Failed to load configuration from environment".to_string(),
    })?;
    Ok(Arc::new(config))
}

pub fn parse_type(pipeline_type: &str) -> Result<PipelineType> {
    pipeline_type
        .parse()
        .with_context(|| format!("Invalid pipeline type: {}", pipeline_type))
}

pub async fn prepare(config_path: Option<&Path>, pipeline_type: &str) -> Result<()> {
    let config = load_config(config_path)?;
    let pipeline_type = parse_type(pipeline_type)?;
    let builder = builder_for(pipeline_type, config, Arc::new(ProcessRunner::new()));

    // The name only matters for artifact naming, which prepare never touches.
    let mut request = BuildRequest::new("workspace", pipeline_type)?;
    builder
        .prepare_environment(&mut request)
        .await
        .context("Failed to prepare workspace")?;

    println!("{}", request.work_dir()?.display());
    Ok(())
}

pub fn paths(config_path: Option<&Path>, name: &str, pipeline_type: &str) -> Result<()> {
    let config = load_config(config_path)?;
    let pipeline_type = parse_type(pipeline_type)?;
    let request = BuildRequest::new(name, pipeline_type)?;

    let paths = serde_json::json!({
        "workspace_root": config.workspace_root(pipeline_type),
        "toolchain_root": config.toolchain_root(pipeline_type),
        "artifact": config.artifact_path(&request.artifact_name()),
    });
    println!("{}", serde_json::to_string_pretty(&paths)?);
    Ok(())
}

pub fn validate(path: &Path) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    match binsmith_config::system::parse_system_config(&content)
        .and_then(|config| config.validate().map(|_| config))
    {
        Ok(config) => {
            println!("Configuration is valid");
            println!("  home:      {}", config.home_path.display());
            println!("  artifacts: {}", config.artifact_dir().display());
            println!("  timeout:   {}s", config.build_timeout.as_secs());
            Ok(())
        }
        Err(e) => {
            println!("Configuration error: {}", e);
            std::process::exit(1);
        }
    }
}
