//! Sequential toolchain invocation under one execution budget.

use binsmith_core::{
    BuildError, CommandOutput, CommandRunner, CommandSpec, ExecutionBudget, Result, RunError,
};
use tracing::{error, info, warn};

/// Run `steps` in order, stopping at the first failure.
///
/// All steps share `budget`. A step never starts once the budget is
/// exhausted, and a step that fails while the budget is exhausted is
/// reported as a timeout rather than a toolchain failure.
pub async fn run_steps(
    runner: &dyn CommandRunner,
    steps: &[CommandSpec],
    budget: &ExecutionBudget,
) -> Result<Vec<CommandOutput>> {
    let mut outputs = Vec::with_capacity(steps.len());

    for step in steps {
        let command = step.command_line();

        if let Some(reason) = budget.interruption() {
            warn!(command = %command, %reason, "Budget exhausted before step");
            return Err(BuildError::BuildTimeout { command, reason });
        }

        info!(command = %command, "Running toolchain step");

        let output = match runner.run(step, budget).await {
            Ok(output) => output,
            Err(RunError::Interrupted(reason)) => {
                warn!(command = %command, %reason, "Toolchain step interrupted");
                return Err(BuildError::BuildTimeout { command, reason });
            }
            Err(e) => {
                error!(command = %command, error = %e, "Toolchain step could not run");
                return Err(BuildError::Toolchain {
                    command,
                    code: None,
                    output: e.to_string(),
                });
            }
        };

        if !output.success() {
            if let Some(reason) = budget.interruption() {
                warn!(command = %command, %reason, "Toolchain step failed after budget ran out");
                return Err(BuildError::BuildTimeout { command, reason });
            }
            let combined = output.combined();
            error!(command = %command, code = ?output.status, output = %combined, "Toolchain step failed");
            return Err(BuildError::Toolchain {
                command,
                code: output.status,
                output: combined,
            });
        }

        outputs.push(output);
    }

    Ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::RecordingRunner;
    use binsmith_core::Interruption;
    use std::time::Duration;

    fn steps() -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("tool").arg("fetch"),
            CommandSpec::new("tool").arg("compile"),
        ]
    }

    #[tokio::test]
    async fn test_runs_all_steps_in_order() {
        let runner = RecordingRunner::new();
        let outputs = run_steps(&runner, &steps(), &ExecutionBudget::unbounded())
            .await
            .unwrap();

        assert_eq!(outputs.len(), 2);
        assert_eq!(
            runner.argv_calls(),
            vec![vec!["tool", "fetch"], vec!["tool", "compile"]]
        );
    }

    #[tokio::test]
    async fn test_expired_budget_runs_nothing() {
        let runner = RecordingRunner::new();
        let err = run_steps(&runner, &steps(), &ExecutionBudget::with_timeout(Duration::ZERO))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            BuildError::BuildTimeout {
                reason: Interruption::DeadlineExceeded,
                ..
            }
        ));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_interrupted_step_stops_sequence() {
        let runner = RecordingRunner::new().interrupt_at(0, Interruption::DeadlineExceeded);
        let err = run_steps(&runner, &steps(), &ExecutionBudget::unbounded())
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert!(err.to_string().contains("deadline exceeded"));
        assert_eq!(runner.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_step_stops_sequence() {
        let runner = RecordingRunner::new().fail_at(0, 1, "cannot find module");
        let err = run_steps(&runner, &steps(), &ExecutionBudget::unbounded())
            .await
            .unwrap_err();

        match err {
            BuildError::Toolchain {
                command,
                code,
                output,
            } => {
                assert_eq!(command, "tool fetch");
                assert_eq!(code, Some(1));
                assert_eq!(output, "cannot find module");
            }
            other => panic!("expected toolchain error, got {:?}", other),
        }
        assert_eq!(runner.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_failure_after_cancel_is_timeout() {
        let budget = ExecutionBudget::unbounded();
        let runner = RecordingRunner::new()
            .fail_at(0, -1, "signal: killed")
            .cancel_during(0, budget.clone());

        let err = run_steps(&runner, &steps(), &budget).await.unwrap_err();
        assert!(matches!(
            err,
            BuildError::BuildTimeout {
                reason: Interruption::Cancelled,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_spawn_error_is_toolchain_error() {
        let runner = RecordingRunner::new().spawn_error_at(1);
        let err = run_steps(&runner, &steps(), &ExecutionBudget::unbounded())
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::Toolchain { code: None, .. }));
        assert_eq!(runner.calls().len(), 2);
    }
}
