//! binsmith CLI tool.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "binsmith")]
#[command(about = "Toolchain build executor for pipeline binaries", long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, short, env = "BINSMITH_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a pipeline from a local source directory and stage its artifact
    Build {
        /// Pipeline name
        #[arg(long)]
        name: String,
        /// Pipeline type
        #[arg(long = "type", default_value = "golang")]
        pipeline_type: String,
        /// Directory holding the pipeline source
        #[arg(long)]
        source: PathBuf,
        /// Override the configured build timeout
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    /// Allocate a fresh workspace and print its path
    Prepare {
        /// Pipeline type
        #[arg(long = "type", default_value = "golang")]
        pipeline_type: String,
    },
    /// Print the workspace root and artifact path for a pipeline
    Paths {
        /// Pipeline name
        #[arg(long)]
        name: String,
        /// Pipeline type
        #[arg(long = "type", default_value = "golang")]
        pipeline_type: String,
    },
    /// Validate a configuration file
    Validate {
        /// Path to the configuration file
        #[arg(default_value = "binsmith.kdl")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if cli.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    match cli.command {
        Commands::Build {
            name,
            pipeline_type,
            source,
            timeout_secs,
        } => {
            commands::build::run(
                cli.config.as_deref(),
                &name,
                &pipeline_type,
                &source,
                timeout_secs,
            )
            .await?;
        }
        Commands::Prepare { pipeline_type } => {
            commands::prepare(cli.config.as_deref(), &pipeline_type).await?;
        }
        Commands::Paths {
            name,
            pipeline_type,
        } => {
            commands::paths(cli.config.as_deref(), &name, &pipeline_type)?;
        }
        Commands::Validate { path } => {
            commands::validate(&path)?;
        }
    }

    Ok(())
}
