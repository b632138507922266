//! Build pipeline - runs the stages of one build attempt in order.

use binsmith_core::{BuildError, BuildRequest, ExecutionBudget, PipelineBuilder};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::fetch::SourceFetcher;

/// Stages of a build attempt, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStage {
    Prepare,
    Fetch,
    Build,
    Stage,
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BuildStage::Prepare => "prepare",
            BuildStage::Fetch => "fetch",
            BuildStage::Build => "build",
            BuildStage::Stage => "stage",
        };
        f.write_str(name)
    }
}

/// Event emitted during a build.
#[derive(Debug, Clone)]
pub enum BuildEvent {
    StageStarted { stage: BuildStage },
    StageCompleted { stage: BuildStage, success: bool },
    BuildCompleted { success: bool },
}

/// Outcome of a build attempt.
#[derive(Debug)]
pub struct BuildReport {
    /// The request as the stages left it (with its workspace, if one was prepared).
    pub request: BuildRequest,
    /// Staged artifact, set only when every stage succeeded.
    pub artifact: Option<PathBuf>,
    /// Stage that failed and why.
    pub failure: Option<(BuildStage, BuildError)>,
}

impl BuildReport {
    pub fn success(&self) -> bool {
        self.failure.is_none()
    }
}

/// Runs prepare, fetch, build and stage for one request.
///
/// Stops at the first failing stage, so a failed build never publishes or
/// replaces an artifact. Concurrent builds of the same pipeline must be
/// serialized by the caller.
#[derive(Clone)]
pub struct BuildPipeline {
    builder: Arc<dyn PipelineBuilder>,
    fetcher: Arc<dyn SourceFetcher>,
}

impl BuildPipeline {
    pub fn new(builder: Arc<dyn PipelineBuilder>, fetcher: Arc<dyn SourceFetcher>) -> Self {
        Self { builder, fetcher }
    }

    /// Run the build on a new task, returning a channel of events and a handle to the report.
    pub fn execute(
        &self,
        request: BuildRequest,
        budget: ExecutionBudget,
    ) -> (mpsc::Receiver<BuildEvent>, tokio::task::JoinHandle<BuildReport>) {
        let (tx, rx) = mpsc::channel(16);
        let pipeline = self.clone();

        let handle =
            tokio::spawn(async move { pipeline.run(request, &budget, Some(tx)).await });

        (rx, handle)
    }

    /// Run the build on the current task.
    pub async fn run(
        &self,
        mut request: BuildRequest,
        budget: &ExecutionBudget,
        events: Option<mpsc::Sender<BuildEvent>>,
    ) -> BuildReport {
        let emit = |event: BuildEvent| {
            let events = events.clone();
            async move {
                if let Some(tx) = events {
                    let _ = tx.send(event).await;
                }
            }
        };

        let mut failure = None;
        for stage in [
            BuildStage::Prepare,
            BuildStage::Fetch,
            BuildStage::Build,
            BuildStage::Stage,
        ] {
            emit(BuildEvent::StageStarted { stage }).await;
            info!(pipeline = %request.pipeline_name, %stage, "Stage started");

            let result = match stage {
                BuildStage::Prepare => self.builder.prepare_environment(&mut request).await,
                BuildStage::Fetch => self.fetcher.fetch(&request, budget).await,
                BuildStage::Build => {
                    self.builder
                        .execute_build_with_budget(&request, budget)
                        .await
                }
                BuildStage::Stage => self.builder.copy_binary(&request).await,
            };

            let success = result.is_ok();
            emit(BuildEvent::StageCompleted { stage, success }).await;

            if let Err(e) = result {
                error!(pipeline = %request.pipeline_name, %stage, error = %e, "Stage failed");
                failure = Some((stage, e));
                break;
            }
        }

        let success = failure.is_none();
        emit(BuildEvent::BuildCompleted { success }).await;

        let artifact = success.then(|| self.builder.artifact_path(&request));
        if let Some(path) = &artifact {
            info!(pipeline = %request.pipeline_name, artifact = %path.display(), "Build succeeded");
        }

        BuildReport {
            request,
            artifact,
            failure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::LocalSourceFetcher;
    use crate::golang::GolangBuilder;
    use crate::mock::RecordingRunner;
    use binsmith_config::BuildConfig;
    use binsmith_core::{Interruption, PipelineType};
    use tempfile::TempDir;

    fn setup(runner: RecordingRunner) -> (TempDir, TempDir, BuildPipeline, Arc<RecordingRunner>) {
        let home = TempDir::new().unwrap();
        std::fs::create_dir(home.path().join("pipelines")).unwrap();
        let src = TempDir::new().unwrap();
        std::fs::write(src.path().join("main.go"), "package main\n").unwrap();

        let runner = Arc::new(runner);
        let config = Arc::new(BuildConfig::new(home.path()));
        let builder = Arc::new(GolangBuilder::with_runner(config, runner.clone()));
        let fetcher = Arc::new(LocalSourceFetcher::new(src.path()));
        (home, src, BuildPipeline::new(builder, fetcher), runner)
    }

    #[tokio::test]
    async fn test_successful_build_stages_artifact() {
        let (home, _src, pipeline, runner) = setup(RecordingRunner::new().writing_outputs("ELF"));
        let request = BuildRequest::new("main", PipelineType::Golang).unwrap();

        let report = pipeline.run(request, &ExecutionBudget::unbounded(), None).await;

        assert!(report.success(), "{:?}", report.failure);
        let artifact = report.artifact.unwrap();
        assert_eq!(artifact, home.path().join("pipelines").join("main_golang"));
        assert_eq!(std::fs::read(&artifact).unwrap(), b"ELF");
        assert_eq!(runner.calls().len(), 2);

        let work_dir = report.request.work_dir().unwrap();
        assert!(work_dir.join("main.go").is_file());
        assert!(work_dir.join("main_golang").is_file());
    }

    #[tokio::test]
    async fn test_failed_build_publishes_nothing() {
        let (home, _src, pipeline, _runner) = setup(
            RecordingRunner::new()
                .writing_outputs("ELF")
                .fail_at(1, 2, "undefined: foo"),
        );
        let staged = home.path().join("pipelines").join("main_golang");
        std::fs::write(&staged, b"previous").unwrap();
        let request = BuildRequest::new("main", PipelineType::Golang).unwrap();

        let report = pipeline.run(request, &ExecutionBudget::unbounded(), None).await;

        assert!(!report.success());
        assert!(report.artifact.is_none());
        let (stage, err) = report.failure.unwrap();
        assert_eq!(stage, BuildStage::Build);
        assert!(matches!(err, BuildError::Toolchain { .. }));
        assert_eq!(std::fs::read(&staged).unwrap(), b"previous");
    }

    #[tokio::test]
    async fn test_events_follow_stage_order() {
        let (_home, _src, pipeline, _runner) = setup(
            RecordingRunner::new().interrupt_at(0, Interruption::Cancelled),
        );
        let request = BuildRequest::new("main", PipelineType::Golang).unwrap();

        let (mut rx, handle) = pipeline.execute(request, ExecutionBudget::unbounded());
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        let report = handle.await.unwrap();

        let started: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                BuildEvent::StageStarted { stage } => Some(*stage),
                _ => None,
            })
            .collect();
        assert_eq!(
            started,
            vec![BuildStage::Prepare, BuildStage::Fetch, BuildStage::Build]
        );
        assert!(matches!(
            events.last(),
            Some(BuildEvent::BuildCompleted { success: false })
        ));
        let (stage, err) = report.failure.unwrap();
        assert_eq!(stage, BuildStage::Build);
        assert!(err.is_timeout());
    }
}
