//! Core domain types and traits for the binsmith build executor.
//!
//! This crate contains:
//! - Pipeline types, build requests and the artifact naming convention
//! - Workspace identifiers
//! - The execution budget shared by all toolchain commands of one build
//! - The command runner seam used to spawn toolchain processes
//! - The `PipelineBuilder` trait implemented per toolchain
//! - The build error taxonomy

pub mod budget;
pub mod builder;
pub mod error;
pub mod id;
pub mod pipeline;
pub mod runner;

pub use budget::{ExecutionBudget, Interruption};
pub use builder::PipelineBuilder;
pub use error::{BuildError, BuildErrorKind, Result, StageAction};
pub use id::WorkspaceId;
pub use pipeline::{BuildRequest, PipelineType, artifact_name};
pub use runner::{CommandOutput, CommandRunner, CommandSpec, RunError};
