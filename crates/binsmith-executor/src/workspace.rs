//! Build workspace allocation.

use binsmith_core::{BuildError, Result, WorkspaceId};
use std::path::{Path, PathBuf};
use tokio::fs::DirBuilder;
use tracing::{debug, info};

/// A freshly created, empty build directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    pub id: WorkspaceId,
    pub path: PathBuf,
}

impl Workspace {
    /// Create `<root>/<uuid>`, creating `root` and its parents as needed.
    ///
    /// The leaf directory is created exclusively: if it already exists the
    /// call fails instead of handing out a shared workspace.
    pub async fn allocate(root: &Path) -> Result<Self> {
        let id = WorkspaceId::new();
        let path = root.join(id.to_string());

        debug!(root = %root.display(), "Creating workspace root");
        owner_only_dir_builder(true)
            .create(root)
            .await
            .map_err(|source| BuildError::Workspace {
                path: path.clone(),
                source,
            })?;

        owner_only_dir_builder(false)
            .create(&path)
            .await
            .map_err(|source| BuildError::Workspace {
                path: path.clone(),
                source,
            })?;

        info!(workspace = %path.display(), "Workspace created");
        Ok(Self { id, path })
    }
}

fn owner_only_dir_builder(recursive: bool) -> DirBuilder {
    let mut builder = DirBuilder::new();
    builder.recursive(recursive);
    #[cfg(unix)]
    builder.mode(0o700);
    builder
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_allocate_creates_empty_dir() {
        let home = TempDir::new().unwrap();
        let root = home.path().join("tmp").join("golang").join("src");

        let workspace = Workspace::allocate(&root).await.unwrap();

        assert_eq!(workspace.path, root.join(workspace.id.to_string()));
        assert!(workspace.path.is_dir());
        assert_eq!(std::fs::read_dir(&workspace.path).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_allocate_twice_gives_distinct_dirs() {
        let home = TempDir::new().unwrap();
        let a = Workspace::allocate(home.path()).await.unwrap();
        let b = Workspace::allocate(home.path()).await.unwrap();
        assert_ne!(a.path, b.path);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_workspace_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let home = TempDir::new().unwrap();
        let workspace = Workspace::allocate(home.path()).await.unwrap();
        let mode = std::fs::metadata(&workspace.path).unwrap().permissions().mode();
        assert_eq!(mode & 0o077, 0);
    }

    #[tokio::test]
    async fn test_root_under_a_file_fails() {
        let home = TempDir::new().unwrap();
        let file = home.path().join("not-a-dir");
        std::fs::write(&file, b"").unwrap();

        let err = Workspace::allocate(&file.join("src")).await.unwrap_err();
        assert!(matches!(err, BuildError::Workspace { .. }));
    }
}
