//! Go toolchain builder.

use async_trait::async_trait;
use binsmith_config::BuildConfig;
use binsmith_core::{
    BuildRequest, CommandRunner, CommandSpec, ExecutionBudget, PipelineBuilder, PipelineType,
    Result,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::invoker::run_steps;
use crate::process::ProcessRunner;
use crate::stager::stage_artifact;
use crate::workspace::Workspace;

/// Builds Go modules: `go get -d ./...`, then `go build -o <name>_golang`.
///
/// Every command runs inside the request's workspace with `GOPATH` set to
/// `<home>/tmp/golang`.
pub struct GolangBuilder {
    config: Arc<BuildConfig>,
    runner: Arc<dyn CommandRunner>,
}

impl GolangBuilder {
    /// Builder spawning real `go` processes.
    pub fn new(config: Arc<BuildConfig>) -> Self {
        Self::with_runner(config, Arc::new(ProcessRunner::new()))
    }

    pub fn with_runner(config: Arc<BuildConfig>, runner: Arc<dyn CommandRunner>) -> Self {
        Self { config, runner }
    }

    /// The ordered toolchain commands for a request.
    pub fn build_steps(&self, request: &BuildRequest) -> Result<Vec<CommandSpec>> {
        let work_dir = request.work_dir()?;
        let toolchain = self.config.toolchain(PipelineType::Golang);
        let gopath = self.config.toolchain_root(PipelineType::Golang);

        let base = |args: &[&str]| {
            let mut spec = CommandSpec::new(toolchain.binary.clone())
                .args(args.iter().copied())
                .current_dir(work_dir)
                .env("GOPATH", gopath.to_string_lossy());
            spec.env
                .extend(toolchain.env.iter().map(|(k, v)| (k.clone(), v.clone())));
            spec
        };

        Ok(vec![
            base(&["get", "-d", "./..."]),
            base(&["build", "-o", &request.artifact_name()]),
        ])
    }
}

#[async_trait]
impl PipelineBuilder for GolangBuilder {
    fn pipeline_type(&self) -> PipelineType {
        PipelineType::Golang
    }

    async fn prepare_environment(&self, request: &mut BuildRequest) -> Result<()> {
        let root = self.config.workspace_root(PipelineType::Golang);
        let workspace = Workspace::allocate(&root).await?;
        info!(
            pipeline = %request.pipeline_name,
            workspace_id = %workspace.id,
            "Prepared build environment"
        );
        request.work_dir = Some(workspace.path);
        Ok(())
    }

    async fn execute_build_with_budget(
        &self,
        request: &BuildRequest,
        budget: &ExecutionBudget,
    ) -> Result<()> {
        let steps = self.build_steps(request)?;
        info!(pipeline = %request.pipeline_name, steps = steps.len(), "Executing build");
        run_steps(self.runner.as_ref(), &steps, budget).await?;
        info!(pipeline = %request.pipeline_name, "Build finished");
        Ok(())
    }

    async fn copy_binary(&self, request: &BuildRequest) -> Result<()> {
        let source = request.build_output()?;
        let destination = self.artifact_path(request);
        stage_artifact(&source, &destination).await?;
        Ok(())
    }

    fn artifact_path(&self, request: &BuildRequest) -> PathBuf {
        self.config.artifact_path(&request.artifact_name())
    }

    fn default_budget(&self) -> ExecutionBudget {
        ExecutionBudget::with_timeout(self.config.build_timeout)
    }
}
