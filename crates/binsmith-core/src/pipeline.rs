//! Pipeline types and build requests.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::{BuildError, Result};

/// Toolchain a pipeline is built with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineType {
    Golang,
}

impl PipelineType {
    pub const ALL: &'static [PipelineType] = &[PipelineType::Golang];

    /// Tag used in artifact names and workspace paths.
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineType::Golang => "golang",
        }
    }
}

impl fmt::Display for PipelineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PipelineType {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "golang" | "go" => Ok(PipelineType::Golang),
            other => Err(BuildError::Unsupported(other.to_string())),
        }
    }
}

/// Canonical artifact filename: `<name>_<type>`.
///
/// The toolchain names its output with this and the stager copies the same
/// name, so both sides must go through this function.
pub fn artifact_name(pipeline_name: &str, pipeline_type: &str) -> String {
    format!("{}_{}", pipeline_name, pipeline_type)
}

/// One build attempt, passed by `&mut` through every stage.
///
/// After `prepare_environment`, `work_dir` points at an empty, exclusively
/// owned workspace. The fetch stage fills it with source, `execute_build`
/// leaves the artifact in it, and `copy_binary` reads it from there.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildRequest {
    /// Pipeline name (non-empty, a single path component).
    pub pipeline_name: String,
    pub pipeline_type: PipelineType,
    /// Working copy; `None` until a workspace has been prepared.
    pub work_dir: Option<PathBuf>,
}

impl BuildRequest {
    pub fn new(pipeline_name: impl Into<String>, pipeline_type: PipelineType) -> Result<Self> {
        let pipeline_name = pipeline_name.into();
        validate_name(&pipeline_name)?;
        Ok(Self {
            pipeline_name,
            pipeline_type,
            work_dir: None,
        })
    }

    /// Request whose working copy already exists, e.g. a workspace handed over by a caller.
    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(work_dir.into());
        self
    }

    pub fn artifact_name(&self) -> String {
        artifact_name(&self.pipeline_name, self.pipeline_type.as_str())
    }

    /// The working copy, or an error if no workspace was prepared.
    pub fn work_dir(&self) -> Result<&Path> {
        self.work_dir.as_deref().ok_or_else(|| {
            BuildError::InvalidRequest(format!(
                "pipeline '{}' has no working directory; prepare the environment first",
                self.pipeline_name
            ))
        })
    }

    /// Path the toolchain writes the artifact to inside the workspace.
    pub fn build_output(&self) -> Result<PathBuf> {
        Ok(self.work_dir()?.join(self.artifact_name()))
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(BuildError::InvalidRequest(
            "pipeline name must not be empty".to_string(),
        ));
    }
    if name == "." || name == ".." || name.contains(['/', '\\', '\0']) {
        return Err(BuildError::InvalidRequest(format!(
            "pipeline name '{}' must be a single path component",
            name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_name_joins_with_underscore() {
        assert_eq!(artifact_name("main", "go"), "main_go");
        assert_eq!(artifact_name("my-service", "golang"), "my-service_golang");
        assert_eq!(artifact_name("main", "go"), artifact_name("main", "go"));
    }

    #[test]
    fn test_request_artifact_name_uses_type_tag() {
        let request = BuildRequest::new("main", PipelineType::Golang).unwrap();
        assert_eq!(request.artifact_name(), "main_golang");
    }

    #[test]
    fn test_pipeline_type_parse() {
        assert_eq!("golang".parse::<PipelineType>().unwrap(), PipelineType::Golang);
        assert_eq!("Go".parse::<PipelineType>().unwrap(), PipelineType::Golang);
        assert!(matches!(
            "cobol".parse::<PipelineType>(),
            Err(BuildError::Unsupported(t)) if t == "cobol"
        ));
    }

    #[test]
    fn test_pipeline_type_serde_lowercase() {
        let json = serde_json::to_string(&PipelineType::Golang).unwrap();
        assert_eq!(json, "\"golang\"");
    }

    #[test]
    fn test_rejects_empty_name() {
        let err = BuildRequest::new("", PipelineType::Golang).unwrap_err();
        assert!(matches!(err, BuildError::InvalidRequest(_)));
    }

    #[test]
    fn test_rejects_path_like_names() {
        for name in ["../escape", "a/b", ".."] {
            assert!(BuildRequest::new(name, PipelineType::Golang).is_err(), "{name}");
        }
    }

    #[test]
    fn test_work_dir_required_before_build_output() {
        let request = BuildRequest::new("main", PipelineType::Golang).unwrap();
        assert!(request.work_dir().is_err());

        let request = request.with_work_dir("/tmp/ws");
        assert_eq!(
            request.build_output().unwrap(),
            PathBuf::from("/tmp/ws/main_golang")
        );
    }
}
