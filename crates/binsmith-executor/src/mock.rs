//! Scripted command runner for exercising builds without a real toolchain.

use async_trait::async_trait;
use binsmith_core::{
    CommandOutput, CommandRunner, CommandSpec, ExecutionBudget, Interruption, RunError,
};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone)]
enum Scripted {
    Exit { code: i32, stderr: String },
    Interrupt(Interruption),
    SpawnError,
}

/// Records every command it is asked to run and answers from a script.
///
/// Unscripted calls succeed with empty output, unless the budget is already
/// exhausted, in which case they are interrupted like a real process would be.
#[derive(Debug, Default)]
pub struct RecordingRunner {
    calls: Mutex<Vec<CommandSpec>>,
    script: HashMap<usize, Scripted>,
    cancels: HashMap<usize, ExecutionBudget>,
    output_content: Option<Vec<u8>>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the `index`th call exit with `code` and `stderr`.
    pub fn fail_at(mut self, index: usize, code: i32, stderr: impl Into<String>) -> Self {
        self.script.insert(
            index,
            Scripted::Exit {
                code,
                stderr: stderr.into(),
            },
        );
        self
    }

    /// Make the `index`th call report that its budget ran out.
    pub fn interrupt_at(mut self, index: usize, reason: Interruption) -> Self {
        self.script.insert(index, Scripted::Interrupt(reason));
        self
    }

    /// Make the `index`th call fail to spawn.
    pub fn spawn_error_at(mut self, index: usize) -> Self {
        self.script.insert(index, Scripted::SpawnError);
        self
    }

    /// Cancel `budget` while the `index`th call is running.
    pub fn cancel_during(mut self, index: usize, budget: ExecutionBudget) -> Self {
        self.cancels.insert(index, budget);
        self
    }

    /// On success, write `content` to the file named after a `-o` argument,
    /// relative to the command's directory.
    pub fn writing_outputs(mut self, content: impl Into<Vec<u8>>) -> Self {
        self.output_content = Some(content.into());
        self
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn argv_calls(&self) -> Vec<Vec<String>> {
        self.calls().iter().map(CommandSpec::argv).collect()
    }

    async fn write_output(&self, spec: &CommandSpec) -> Result<(), RunError> {
        let Some(content) = &self.output_content else {
            return Ok(());
        };
        let Some(pos) = spec.args.iter().position(|a| a == "-o") else {
            return Ok(());
        };
        if let Some(name) = spec.args.get(pos + 1) {
            let path = match &spec.current_dir {
                Some(dir) => dir.join(name),
                None => name.into(),
            };
            tokio::fs::write(path, content).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(
        &self,
        spec: &CommandSpec,
        budget: &ExecutionBudget,
    ) -> Result<CommandOutput, RunError> {
        let index = {
            let mut calls = self
                .calls
                .lock()
                .map_err(|_| RunError::Io(std::io::Error::other("call log poisoned")))?;
            calls.push(spec.clone());
            calls.len() - 1
        };

        if let Some(budget) = self.cancels.get(&index) {
            budget.cancel();
        }

        match self.script.get(&index) {
            Some(Scripted::Exit { code, stderr }) => Ok(CommandOutput {
                status: Some(*code),
                stdout: String::new(),
                stderr: stderr.clone(),
            }),
            Some(Scripted::Interrupt(reason)) => Err(RunError::Interrupted(*reason)),
            Some(Scripted::SpawnError) => Err(RunError::Spawn {
                program: spec.program.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "not found"),
            }),
            None => {
                if let Some(reason) = budget.interruption() {
                    return Err(RunError::Interrupted(reason));
                }
                self.write_output(spec).await?;
                Ok(CommandOutput {
                    status: Some(0),
                    ..Default::default()
                })
            }
        }
    }
}
