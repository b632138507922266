//! KDL configuration for the binsmith build executor.
//!
//! This crate handles:
//! - Parsing the system configuration (binsmith.kdl)
//! - Environment variable overrides
//! - Deriving the fixed filesystem layout under the home path

pub mod error;
pub mod system;

pub use error::{ConfigError, ConfigResult};
pub use system::{
    BuildConfig, DEFAULT_ARTIFACT_SUBDIR, DEFAULT_BUILD_TIMEOUT, MAX_BUILD_TIMEOUT, ToolchainConfig,
};
