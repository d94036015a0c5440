pub mod campaign;
pub mod checksum;
pub mod config;
pub mod executor;
pub mod input;
pub mod mutator;
pub mod oracle;
pub mod plugin;
pub mod target;

pub use campaign::{Campaign, CampaignError, CampaignStats};
pub use config::CrcFuzzConfig;
pub use executor::{CommandExecutor, ExecutionStatus, Executor, InProcessExecutor};
pub use input::{EncodedInput, Input};
pub use mutator::{ChecksumMutator, MutationError, Mutator};
pub use oracle::{BugReport, CrashOracle, Oracle};
pub use plugin::CustomMutator;
pub use target::{ChecksumTarget, TargetConfig, TargetVerdict};
