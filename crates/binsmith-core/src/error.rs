//! Error types for binsmith.

use std::path::PathBuf;

use thiserror::Error;

use crate::budget::Interruption;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("invalid build request: {0}")]
    InvalidRequest(String),

    #[error("failed to prepare workspace {}: {source}", .path.display())]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{reason} while running `{command}`")]
    BuildTimeout {
        command: String,
        reason: Interruption,
    },

    #[error("`{command}` failed ({}): {output}", exit_status(.code))]
    Toolchain {
        command: String,
        code: Option<i32>,
        output: String,
    },

    #[error("failed to {action} {}: {source}", .path.display())]
    Stage {
        action: StageAction,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to fetch source into {}: {message}", .path.display())]
    Fetch { path: PathBuf, message: String },

    #[error("unsupported pipeline type: {0}")]
    Unsupported(String),
}

/// Which part of staging failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum StageAction {
    #[display("open build output")]
    OpenSource,
    #[display("write artifact")]
    WriteDestination,
    #[display("replace artifact")]
    Replace,
}

/// Coarse classification of a [`BuildError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildErrorKind {
    Request,
    Workspace,
    Timeout,
    Toolchain,
    Stage,
    Fetch,
    Unsupported,
}

impl BuildError {
    pub fn kind(&self) -> BuildErrorKind {
        match self {
            BuildError::InvalidRequest(_) => BuildErrorKind::Request,
            BuildError::Workspace { .. } => BuildErrorKind::Workspace,
            BuildError::BuildTimeout { .. } => BuildErrorKind::Timeout,
            BuildError::Toolchain { .. } => BuildErrorKind::Toolchain,
            BuildError::Stage { .. } => BuildErrorKind::Stage,
            BuildError::Fetch { .. } => BuildErrorKind::Fetch,
            BuildError::Unsupported(_) => BuildErrorKind::Unsupported,
        }
    }

    /// True when the build was aborted by its budget rather than failing on its own.
    pub fn is_timeout(&self) -> bool {
        self.kind() == BuildErrorKind::Timeout
    }
}

fn exit_status(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => "terminated by signal".to_string(),
    }
}

pub type Result<T> = std::result::Result<T, BuildError>;
