use crate::input::Input;
use std::io::Write;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tracing::{error, warn};

/// How often a running target is polled for exit.
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionStatus {
    Ok,
    Timeout,
    Crash(String),
    Other(String),
}

pub trait Executor<I: Input> {
    fn execute_sync(&mut self, input: &I) -> ExecutionStatus;
}

pub struct InProcessExecutor<F>
where
    F: Fn(&[u8]),
{
    harness_fn: F,
}

impl<F> InProcessExecutor<F>
where
    F: Fn(&[u8]),
{
    pub fn new(harness_fn: F) -> Self {
        Self { harness_fn }
    }
}

impl<I: Input, F> Executor<I> for InProcessExecutor<F>
where
    F: Fn(&[u8]) + Send + Sync,
{
    fn execute_sync(&mut self, input: &I) -> ExecutionStatus {
        let result = catch_unwind(AssertUnwindSafe(|| {
            (self.harness_fn)(input.as_bytes());
        }));

        match result {
            Ok(_) => ExecutionStatus::Ok,
            Err(panic_payload) => {
                let msg = if let Some(s) = panic_payload.downcast_ref::<&str>() {
                    s.to_string()
                } else if let Some(s) = panic_payload.downcast_ref::<String>() {
                    s.clone()
                } else {
                    "Unknown panic type".to_string()
                };
                ExecutionStatus::Crash(msg)
            }
        }
    }
}

/// Settings for running an external target binary that reads its input on stdin.
#[derive(Debug, Clone)]
pub struct CommandExecutorConfig {
    pub command: Vec<String>,
    pub timeout: Duration,
    pub working_dir: Option<PathBuf>,
}

pub struct CommandExecutor {
    config: CommandExecutorConfig,
}

impl CommandExecutor {
    pub fn new(config: CommandExecutorConfig) -> Self {
        Self { config }
    }

    fn wait_with_timeout(&self, child: &mut Child) -> Result<ExitStatus, ExecutionStatus> {
        let start_time = Instant::now();

        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) => {
                    if start_time.elapsed() > self.config.timeout {
                        warn!(timeout = ?self.config.timeout, "target timed out, killing");
                        if let Err(e) = child.kill() {
                            return Err(ExecutionStatus::Other(format!(
                                "Failed to kill timed-out process: {e}",
                            )));
                        }
                        let _ = child.wait();
                        return Err(ExecutionStatus::Timeout);
                    }
                    std::thread::sleep(WAIT_POLL_INTERVAL);
                }
                Err(e) => {
                    return Err(ExecutionStatus::Other(format!(
                        "Error waiting for child: {e}",
                    )));
                }
            }
        }
    }
}

fn describe_failure(status: &ExitStatus) -> String {
    if let Some(code) = status.code() {
        return format!("Exited with code {code}");
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return format!("Terminated by signal {signal}");
        }
    }
    "Exited abnormally".to_string()
}

impl<I: Input> Executor<I> for CommandExecutor {
    fn execute_sync(&mut self, input: &I) -> ExecutionStatus {
        let Some((program, args)) = self.config.command.split_first() else {
            return ExecutionStatus::Other("No target command configured".to_string());
        };

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        if let Some(cwd) = &self.config.working_dir {
            cmd.current_dir(cwd);
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                let error_msg = format!("Failed to spawn command '{:?}': {e}", self.config.command);
                error!("{error_msg}");
                return ExecutionStatus::Other(error_msg);
            }
        };

        if let Some(mut child_stdin) = child.stdin.take() {
            // A target that exits before reading everything closes the pipe;
            // its exit status still decides the outcome.
            if let Err(e) = child_stdin.write_all(input.as_bytes()) {
                if e.kind() != std::io::ErrorKind::BrokenPipe {
                    let _ = child.kill();
                    let _ = child.wait();
                    return ExecutionStatus::Other(format!("Failed to write to stdin: {e}"));
                }
            }
        } else {
            let _ = child.kill();
            let _ = child.wait();
            return ExecutionStatus::Other("Child stdin was not available after piping.".to_string());
        }

        match self.wait_with_timeout(&mut child) {
            Ok(status) if status.success() => ExecutionStatus::Ok,
            Ok(status) => ExecutionStatus::Crash(describe_failure(&status)),
            Err(status) => status,
        }
    }
}

#[cfg(test)]
mod in_process_executor_tests {
    use super::*;
    use crate::checksum::encode;
    use crate::target::{USE_AFTER_FREE_MESSAGE, harness};

    fn simple_harness(data: &[u8]) {
        let _ = data;
    }

    fn panicking_harness(data: &[u8]) {
        if data.first() == Some(&0xFF) {
            panic!("Boom!");
        }
    }

    #[test]
    fn in_process_executor_runs_harness() {
        let mut executor = InProcessExecutor::new(simple_harness);
        let input: Vec<u8> = vec![1, 2, 3];
        assert_eq!(executor.execute_sync(&input), ExecutionStatus::Ok);
    }

    #[test]
    fn in_process_executor_catches_panic() {
        let mut executor = InProcessExecutor::new(panicking_harness);
        let input: Vec<u8> = vec![0xFF];
        assert_eq!(
            executor.execute_sync(&input),
            ExecutionStatus::Crash("Boom!".to_string())
        );
    }

    #[test]
    fn in_process_executor_reports_target_trigger() {
        let mut executor = InProcessExecutor::new(harness);
        assert_eq!(executor.execute_sync(&encode(b"UAG")), ExecutionStatus::Ok);
        assert_eq!(
            executor.execute_sync(&encode(b"UAF")),
            ExecutionStatus::Crash(USE_AFTER_FREE_MESSAGE.to_string())
        );
    }
}
