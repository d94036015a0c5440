use crate::executor::ExecutionStatus;
use crate::input::Input;

/// Default severity level for crashes detected by `CrashOracle`.
const DEFAULT_CRASH_SEVERITY: u8 = 10;
/// Severity for crashes whose input also carries a consistent checksum, i.e.
/// the crash happened past the target's integrity gate.
const GATED_CRASH_SEVERITY: u8 = 20;

/// A bug found while running an input.
#[derive(Debug, Clone)]
pub struct BugReport<I: Input> {
    /// The specific input that triggered this bug report.
    pub input: I,
    /// A human-readable description of the bug.
    pub description: String,
    /// MD5 of the input as lowercase hex, used for deduplication and file names.
    pub input_hash: String,
    pub severity: u8,
}

/// An `Oracle` examines the outcome of a target's execution to determine if a bug has occurred.
pub trait Oracle<I: Input>: Send + Sync {
    /// Returns `Some(BugReport)` if `status` for `input` counts as a bug.
    fn examine(&self, input: &I, status: &ExecutionStatus) -> Option<BugReport<I>>;
}

/// Reports a bug whenever the `ExecutionStatus` is `Crash`.
#[derive(Debug, Default)]
pub struct CrashOracle;

impl CrashOracle {
    pub fn new() -> Self {
        CrashOracle
    }
}

impl<I> Oracle<I> for CrashOracle
where
    I: Input + Clone,
{
    fn examine(&self, input: &I, status: &ExecutionStatus) -> Option<BugReport<I>> {
        match status {
            ExecutionStatus::Crash(description) => {
                let input_digest = md5::compute(input.as_bytes());
                let severity = if input.encoded().is_consistent() {
                    GATED_CRASH_SEVERITY
                } else {
                    DEFAULT_CRASH_SEVERITY
                };
                Some(BugReport {
                    input: input.clone(),
                    description: description.clone(),
                    input_hash: format!("{input_digest:x}"),
                    severity,
                })
            }
            _ => None,
        }
    }
}
