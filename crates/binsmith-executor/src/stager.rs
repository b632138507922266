//! Artifact staging.
//!
//! The artifact is streamed into a temporary file next to the destination
//! and renamed over it, so a concurrent reader sees either the previous
//! artifact or the complete new one, never a truncated file.

use binsmith_core::{BuildError, Result, StageAction};
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Copy `source` to `destination`, replacing any existing file.
///
/// `source` is left untouched. The destination directory must exist.
/// Returns the number of bytes staged.
pub async fn stage_artifact(source: &Path, destination: &Path) -> Result<u64> {
    let mut src = File::open(source)
        .await
        .map_err(|e| stage_error(StageAction::OpenSource, source, e))?;
    let permissions = src
        .metadata()
        .await
        .map_err(|e| stage_error(StageAction::OpenSource, source, e))?
        .permissions();

    let temp = temp_path(destination);
    debug!(source = %source.display(), temp = %temp.display(), "Staging artifact");

    let written = async {
        let mut dst = File::create(&temp).await?;
        let written = tokio::io::copy(&mut src, &mut dst).await?;
        dst.flush().await?;
        dst.sync_all().await?;
        fs::set_permissions(&temp, permissions).await?;
        Ok::<_, std::io::Error>(written)
    }
    .await;

    let written = match written {
        Ok(written) => written,
        Err(e) => {
            remove_temp(&temp).await;
            return Err(stage_error(StageAction::WriteDestination, destination, e));
        }
    };

    if let Err(e) = fs::rename(&temp, destination).await {
        remove_temp(&temp).await;
        return Err(stage_error(StageAction::Replace, destination, e));
    }

    info!(
        source = %source.display(),
        destination = %destination.display(),
        bytes = written,
        "Artifact staged"
    );
    Ok(written)
}

fn stage_error(action: StageAction, path: &Path, source: std::io::Error) -> BuildError {
    BuildError::Stage {
        action,
        path: path.to_path_buf(),
        source,
    }
}

/// Hidden sibling of `destination`, unique per call.
fn temp_path(destination: &Path) -> PathBuf {
    let name = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    destination.with_file_name(format!(".{}.{}.tmp", name, Uuid::new_v4().simple()))
}

async fn remove_temp(temp: &Path) {
    if let Err(e) = fs::remove_file(temp).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(temp = %temp.display(), error = %e, "Failed to remove temporary artifact");
        }
    }
}
