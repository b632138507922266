//! Pipeline builder trait.
//!
//! One implementation per toolchain. A build attempt calls the three stages
//! strictly in order on the same request; each stage fails fast and never
//! retries.

use async_trait::async_trait;
use std::path::PathBuf;

use crate::{BuildRequest, ExecutionBudget, PipelineType, Result};

#[async_trait]
pub trait PipelineBuilder: Send + Sync {
    /// Pipeline type this builder handles.
    fn pipeline_type(&self) -> PipelineType;

    /// Allocate a fresh workspace and record it as the request's working copy.
    ///
    /// On success `request.work_dir` is an existing, empty directory nobody
    /// else uses. On failure the request is left unchanged.
    async fn prepare_environment(&self, request: &mut BuildRequest) -> Result<()>;

    /// Run the toolchain inside the workspace under the default build timeout.
    async fn execute_build(&self, request: &BuildRequest) -> Result<()> {
        let budget = self.default_budget();
        self.execute_build_with_budget(request, &budget).await
    }

    /// Run the toolchain inside the workspace under a caller-supplied budget.
    ///
    /// On success the workspace holds the artifact under its canonical name.
    async fn execute_build_with_budget(
        &self,
        request: &BuildRequest,
        budget: &ExecutionBudget,
    ) -> Result<()>;

    /// Publish the built artifact to the artifact directory.
    async fn copy_binary(&self, request: &BuildRequest) -> Result<()>;

    /// Where [`PipelineBuilder::copy_binary`] publishes the request's artifact.
    fn artifact_path(&self, request: &BuildRequest) -> PathBuf;

    /// Budget used by [`PipelineBuilder::execute_build`].
    fn default_budget(&self) -> ExecutionBudget {
        ExecutionBudget::unbounded()
    }
}
