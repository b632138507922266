//! System configuration parsing.
//!
//! The configuration is built once at startup and shared by reference with
//! every builder; nothing here is global or mutable after construction.

use binsmith_core::PipelineType;
use kdl::{KdlDocument, KdlNode};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::{ConfigError, ConfigResult};

/// Artifact directory name under the home path when none is configured.
pub const DEFAULT_ARTIFACT_SUBDIR: &str = "pipelines";

/// Upper bound on the wall-clock time of one build.
pub const DEFAULT_BUILD_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Largest accepted build timeout.
pub const MAX_BUILD_TIMEOUT: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Process-wide settings for the build executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Root of all workspaces and, by default, the artifact directory.
    pub home_path: PathBuf,
    /// Where staged artifacts live. Relative paths are resolved against `home_path`.
    pub artifact_dir: PathBuf,
    /// Shared budget for all toolchain commands of one build.
    pub build_timeout: Duration,
    /// Per-toolchain overrides.
    pub toolchains: HashMap<PipelineType, ToolchainConfig>,
}

/// How to invoke one toolchain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolchainConfig {
    /// Toolchain binary, resolved through `PATH` unless it contains a separator.
    pub binary: String,
    /// Extra environment for every command of this toolchain.
    pub env: BTreeMap<String, String>,
}

impl ToolchainConfig {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            env: BTreeMap::new(),
        }
    }

    /// Defaults for a pipeline type.
    pub fn default_for(pipeline_type: PipelineType) -> Self {
        match pipeline_type {
            PipelineType::Golang => Self::new("go"),
        }
    }
}

impl BuildConfig {
    /// Configuration with defaults for everything but the home path.
    pub fn new(home_path: impl Into<PathBuf>) -> Self {
        Self {
            home_path: home_path.into(),
            artifact_dir: PathBuf::from(DEFAULT_ARTIFACT_SUBDIR),
            build_timeout: DEFAULT_BUILD_TIMEOUT,
            toolchains: HashMap::new(),
        }
    }

    pub fn with_artifact_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifact_dir = dir.into();
        self
    }

    pub fn with_build_timeout(mut self, timeout: Duration) -> Self {
        self.build_timeout = timeout;
        self
    }

    pub fn with_toolchain(mut self, pipeline_type: PipelineType, toolchain: ToolchainConfig) -> Self {
        self.toolchains.insert(pipeline_type, toolchain);
        self
    }

    /// Load from an optional KDL file, then apply `BINSMITH_*` environment overrides.
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let mut config = match path {
            Some(path) => {
                debug!(path = %path.display(), "Loading configuration file");
                let content = std::fs::read_to_string(path)?;
                parse_system_config(&content)?
            }
            None => Self::new(PathBuf::new()),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides read through `lookup`.
    ///
    /// Recognized keys: `BINSMITH_HOME`, `BINSMITH_ARTIFACT_DIR`,
    /// `BINSMITH_BUILD_TIMEOUT_SECS`, `BINSMITH_GO_BIN`.
    pub fn apply_env<F>(&mut self, lookup: F) -> ConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(home) = lookup("BINSMITH_HOME") {
            self.home_path = PathBuf::from(home);
        }
        if let Some(dir) = lookup("BINSMITH_ARTIFACT_DIR") {
            self.artifact_dir = PathBuf::from(dir);
        }
        if let Some(secs) = lookup("BINSMITH_BUILD_TIMEOUT_SECS") {
            let secs: i128 = secs.trim().parse().map_err(|_| ConfigError::InvalidValue {
                field: "BINSMITH_BUILD_TIMEOUT_SECS".to_string(),
                message: format!("expected a whole number of seconds, got '{}'", secs),
            })?;
            self.build_timeout = timeout_from_secs("BINSMITH_BUILD_TIMEOUT_SECS", secs)?;
        }
        if let Some(bin) = lookup("BINSMITH_GO_BIN") {
            self.toolchains
                .entry(PipelineType::Golang)
                .or_insert_with(|| ToolchainConfig::default_for(PipelineType::Golang))
                .binary = bin;
        }
        Ok(())
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.home_path.as_os_str().is_empty() {
            return Err(ConfigError::MissingField("home".to_string()));
        }
        if self.build_timeout.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "build-timeout-secs".to_string(),
                message: "must be positive".to_string(),
            });
        }
        if self.build_timeout > MAX_BUILD_TIMEOUT {
            return Err(ConfigError::InvalidValue {
                field: "build-timeout-secs".to_string(),
                message: format!("must be at most {}", MAX_BUILD_TIMEOUT.as_secs()),
            });
        }
        for (pipeline_type, toolchain) in &self.toolchains {
            if toolchain.binary.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: format!("toolchain {} bin", pipeline_type),
                    message: "must not be empty".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Toolchain settings, falling back to the defaults for the type.
    pub fn toolchain(&self, pipeline_type: PipelineType) -> ToolchainConfig {
        self.toolchains
            .get(&pipeline_type)
            .cloned()
            .unwrap_or_else(|| ToolchainConfig::default_for(pipeline_type))
    }

    /// `<home>/tmp/<toolchain>`
    pub fn toolchain_root(&self, pipeline_type: PipelineType) -> PathBuf {
        self.home_path.join("tmp").join(pipeline_type.as_str())
    }

    /// `<home>/tmp/<toolchain>/src`, parent of every workspace.
    pub fn workspace_root(&self, pipeline_type: PipelineType) -> PathBuf {
        self.toolchain_root(pipeline_type).join("src")
    }

    /// Artifact directory with relative paths resolved against the home path.
    pub fn artifact_dir(&self) -> PathBuf {
        if self.artifact_dir.is_absolute() {
            self.artifact_dir.clone()
        } else {
            self.home_path.join(&self.artifact_dir)
        }
    }

    /// Staged location of an artifact.
    pub fn artifact_path(&self, artifact_name: &str) -> PathBuf {
        self.artifact_dir().join(artifact_name)
    }
}

/// Parse system configuration from KDL text.
pub fn parse_system_config(kdl: &str) -> ConfigResult<BuildConfig> {
    let doc: KdlDocument = kdl.parse()?;

    let mut config = BuildConfig::new(PathBuf::new());

    for node in doc.nodes() {
        match node.name().value() {
            "home" => {
                let home = get_first_string_arg(node)
                    .ok_or_else(|| ConfigError::MissingField("home".to_string()))?;
                config.home_path = PathBuf::from(home);
            }
            "artifacts" => {
                let dir = get_first_string_arg(node)
                    .ok_or_else(|| ConfigError::MissingField("artifacts".to_string()))?;
                config.artifact_dir = PathBuf::from(dir);
            }
            "build-timeout-secs" => {
                let secs = get_first_integer_arg(node).ok_or_else(|| ConfigError::InvalidValue {
                    field: "build-timeout-secs".to_string(),
                    message: "expected an integer".to_string(),
                })?;
                config.build_timeout = timeout_from_secs("build-timeout-secs", secs)?;
            }
            "toolchain" => {
                let (pipeline_type, toolchain) = parse_toolchain(node)?;
                config.toolchains.insert(pipeline_type, toolchain);
            }
            _ => {} // Ignore unknown nodes
        }
    }

    Ok(config)
}

fn parse_toolchain(node: &KdlNode) -> ConfigResult<(PipelineType, ToolchainConfig)> {
    let name = get_first_string_arg(node)
        .ok_or_else(|| ConfigError::MissingField("toolchain name".to_string()))?;
    let pipeline_type: PipelineType = name.parse().map_err(|_| ConfigError::InvalidValue {
        field: "toolchain".to_string(),
        message: format!("unknown toolchain: {}", name),
    })?;

    let mut toolchain = ToolchainConfig::default_for(pipeline_type);
    if let Some(bin) = get_string_prop(node, "bin") {
        toolchain.binary = bin;
    }

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "bin" => {
                    if let Some(bin) = get_first_string_arg(child) {
                        toolchain.binary = bin;
                    }
                }
                "env" => {
                    if let Some(grandchildren) = child.children() {
                        for gc in grandchildren.nodes() {
                            let key = gc.name().value().to_string();
                            if let Some(val) = get_first_string_arg(gc) {
                                toolchain.env.insert(key, val);
                            }
                        }
                    }
                }
                _ => {}
            }
        }
    }

    Ok((pipeline_type, toolchain))
}

fn timeout_from_secs(field: &str, secs: i128) -> ConfigResult<Duration> {
    if secs <= 0 {
        return Err(ConfigError::InvalidValue {
            field: field.to_string(),
            message: format!("must be positive, got {}", secs),
        });
    }
    match u64::try_from(secs) {
        Ok(secs) if secs <= MAX_BUILD_TIMEOUT.as_secs() => Ok(Duration::from_secs(secs)),
        _ => Err(ConfigError::InvalidValue {
            field: field.to_string(),
            message: format!(
                "out of range: {} (at most {})",
                secs,
                MAX_BUILD_TIMEOUT.as_secs()
            ),
        }),
    }
}

// Helper functions for extracting values from KDL nodes

fn get_first_string_arg(node: &KdlNode) -> Option<String> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

fn get_first_integer_arg(node: &KdlNode) -> Option<i128> {
    node.entries()
        .iter()
        .find(|e| e.name().is_none())
        .and_then(|e| e.value().as_integer())
}

fn get_string_prop(node: &KdlNode, name: &str) -> Option<String> {
    node.get(name)
        .and_then(|v| v.as_string())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let kdl = r#"
            home "/var/lib/binsmith"
            artifacts "/srv/artifacts"
            build-timeout-secs 120

            toolchain "golang" bin="/usr/local/go/bin/go" {
                env {
                    GOFLAGS "-mod=mod"
                }
            }
        "#;

        let config = parse_system_config(kdl).unwrap();
        assert_eq!(config.home_path, PathBuf::from("/var/lib/binsmith"));
        assert_eq!(config.artifact_dir(), PathBuf::from("/srv/artifacts"));
        assert_eq!(config.build_timeout, Duration::from_secs(120));

        let go = config.toolchain(PipelineType::Golang);
        assert_eq!(go.binary, "/usr/local/go/bin/go");
        assert_eq!(go.env.get("GOFLAGS").map(String::as_str), Some("-mod=mod"));
        config.validate().unwrap();
    }

    #[test]
    fn test_defaults() {
        let config = parse_system_config(r#"home "/home/ci""#).unwrap();
        assert_eq!(config.build_timeout, DEFAULT_BUILD_TIMEOUT);
        assert_eq!(config.artifact_dir(), PathBuf::from("/home/ci/pipelines"));
        assert_eq!(config.toolchain(PipelineType::Golang).binary, "go");
    }

    #[test]
    fn test_layout_paths() {
        let config = BuildConfig::new("/home/ci");
        assert_eq!(
            config.toolchain_root(PipelineType::Golang),
            PathBuf::from("/home/ci/tmp/golang")
        );
        assert_eq!(
            config.workspace_root(PipelineType::Golang),
            PathBuf::from("/home/ci/tmp/golang/src")
        );
        assert_eq!(
            config.artifact_path("main_golang"),
            PathBuf::from("/home/ci/pipelines/main_golang")
        );
    }

    #[test]
    fn test_missing_home_is_rejected() {
        let config = parse_system_config("build-timeout-secs 10").unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingField(field)) if field == "home"
        ));
    }

    #[test]
    fn test_unknown_toolchain() {
        let result = parse_system_config(r#"toolchain "cobol" bin="cobc""#);
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_non_positive_timeout() {
        let result = parse_system_config("build-timeout-secs 0");
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));

        let result = parse_system_config(r#"build-timeout-secs "soon""#);
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_oversized_timeout_is_rejected() {
        let result = parse_system_config("home \"/h\"\nbuild-timeout-secs 18446744073709551615");
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));

        let max = MAX_BUILD_TIMEOUT.as_secs();
        let config =
            parse_system_config(&format!("home \"/h\"\nbuild-timeout-secs {}", max)).unwrap();
        assert_eq!(config.build_timeout, MAX_BUILD_TIMEOUT);

        let mut config = BuildConfig::new("/h");
        let err = config
            .apply_env(|key| {
                (key == "BINSMITH_BUILD_TIMEOUT_SECS").then(|| "18446744073709551615".to_string())
            })
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));

        let config = BuildConfig::new("/h").with_build_timeout(Duration::from_secs(u64::MAX));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_kdl() {
        let result = parse_system_config("home {");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = parse_system_config(r#"home "/from/file""#).unwrap();
        let env: HashMap<&str, &str> = [
            ("BINSMITH_HOME", "/from/env"),
            ("BINSMITH_ARTIFACT_DIR", "bins"),
            ("BINSMITH_BUILD_TIMEOUT_SECS", "5"),
            ("BINSMITH_GO_BIN", "/opt/go/bin/go"),
        ]
        .into_iter()
        .collect();

        config
            .apply_env(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.home_path, PathBuf::from("/from/env"));
        assert_eq!(config.artifact_dir(), PathBuf::from("/from/env/bins"));
        assert_eq!(config.build_timeout, Duration::from_secs(5));
        assert_eq!(config.toolchain(PipelineType::Golang).binary, "/opt/go/bin/go");
    }

    #[test]
    fn test_env_timeout_must_be_numeric() {
        let mut config = BuildConfig::new("/home/ci");
        let result = config.apply_env(|key| {
            (key == "BINSMITH_BUILD_TIMEOUT_SECS").then(|| "ten".to_string())
        });
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("binsmith.kdl");
        std::fs::write(&path, "home \"/srv/ci\"\nbuild-timeout-secs 30\n").unwrap();

        let config = BuildConfig::load(Some(&path)).unwrap();
        assert_eq!(config.build_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_load_missing_file() {
        let result = BuildConfig::load(Some(Path::new("/nonexistent/binsmith.kdl")));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
