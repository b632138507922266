//! Toolchain build execution for the binsmith build executor.
//!
//! Provides the pieces that turn a fetched working copy into a staged artifact:
//! - Workspace allocation under the home path
//! - Subprocess execution bounded by an execution budget
//! - Artifact staging into the artifact directory
//! - Per-toolchain builders and the end-to-end build pipeline

pub mod fetch;
pub mod golang;
pub mod invoker;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod pipeline;
pub mod process;
pub mod stager;
pub mod workspace;

use binsmith_config::BuildConfig;
use binsmith_core::{CommandRunner, PipelineBuilder, PipelineType};
use std::sync::Arc;

pub use binsmith_core::{
    BuildError, BuildRequest, CommandOutput, CommandSpec, ExecutionBudget, Interruption, RunError,
};
pub use fetch::{LocalSourceFetcher, SourceFetcher};
pub use golang::GolangBuilder;
pub use pipeline::{BuildEvent, BuildPipeline, BuildReport, BuildStage};
pub use process::ProcessRunner;

/// Builder for a pipeline type, spawning toolchain commands through `runner`.
pub fn builder_for(
    pipeline_type: PipelineType,
    config: Arc<BuildConfig>,
    runner: Arc<dyn CommandRunner>,
) -> Arc<dyn PipelineBuilder> {
    match pipeline_type {
        PipelineType::Golang => Arc::new(GolangBuilder::with_runner(config, runner)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::RecordingRunner;

    #[test]
    fn test_builder_for_every_pipeline_type() {
        let config = Arc::new(BuildConfig::new("/srv/binsmith"));
        for &pipeline_type in PipelineType::ALL {
            let builder = builder_for(
                pipeline_type,
                config.clone(),
                Arc::new(RecordingRunner::new()),
            );
            assert_eq!(builder.pipeline_type(), pipeline_type);
        }
    }
}
