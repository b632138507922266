//! Source fetching into a prepared workspace.

use async_trait::async_trait;
use binsmith_core::{BuildError, BuildRequest, ExecutionBudget, Interruption, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Populates a prepared workspace with pipeline source.
///
/// Source control lives outside this crate; implementations adapt it.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, request: &BuildRequest, budget: &ExecutionBudget) -> Result<()>;
}

/// Copies a local directory tree into the workspace.
#[derive(Debug, Clone)]
pub struct LocalSourceFetcher {
    source: PathBuf,
}

/// Directories never copied into a workspace.
const SKIPPED_DIRS: &[&str] = &[".git"];

#[derive(Debug)]
enum CopyError {
    Io(std::io::Error),
    Interrupted(Interruption),
}

impl From<std::io::Error> for CopyError {
    fn from(e: std::io::Error) -> Self {
        CopyError::Io(e)
    }
}

impl LocalSourceFetcher {
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
        }
    }

    #[async_recursion::async_recursion]
    async fn copy_tree(
        from: &Path,
        to: &Path,
        budget: &ExecutionBudget,
    ) -> std::result::Result<u64, CopyError> {
        let mut copied = 0;
        let mut entries = tokio::fs::read_dir(from).await?;

        while let Some(entry) = entries.next_entry().await? {
            if let Some(reason) = budget.interruption() {
                return Err(CopyError::Interrupted(reason));
            }

            let file_type = entry.file_type().await?;
            let name = entry.file_name();
            let target = to.join(&name);

            if file_type.is_dir() {
                if name.to_str().is_some_and(|n| SKIPPED_DIRS.contains(&n)) {
                    debug!(path = %entry.path().display(), "Skipping directory");
                    continue;
                }
                tokio::fs::create_dir_all(&target).await?;
                copied += Self::copy_tree(&entry.path(), &target, budget).await?;
            } else if file_type.is_file() {
                tokio::fs::copy(entry.path(), &target).await?;
                copied += 1;
            }
        }

        Ok(copied)
    }
}

#[async_trait]
impl SourceFetcher for LocalSourceFetcher {
    async fn fetch(&self, request: &BuildRequest, budget: &ExecutionBudget) -> Result<()> {
        let work_dir = request.work_dir()?;
        info!(
            source = %self.source.display(),
            workspace = %work_dir.display(),
            "Copying local source"
        );

        let copied = Self::copy_tree(&self.source, work_dir, budget)
            .await
            .map_err(|e| match e {
                CopyError::Interrupted(reason) => BuildError::BuildTimeout {
                    command: format!("copy {}", self.source.display()),
                    reason,
                },
                CopyError::Io(e) => BuildError::Fetch {
                    path: work_dir.to_path_buf(),
                    message: format!("copy from {}: {}", self.source.display(), e),
                },
            })?;

        debug!(files = copied, "Source copied");
        Ok(())
    }
}
