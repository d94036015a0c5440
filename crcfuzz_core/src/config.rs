use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file at {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse TOML from config file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct MutatorSettings {
    #[serde(default)]
    pub seed: u32,
    #[serde(default = "default_max_size")]
    pub max_size: usize,
}

pub fn default_max_size() -> usize {
    1024
}

impl Default for MutatorSettings {
    fn default() -> Self {
        Self {
            seed: 0,
            max_size: default_max_size(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutorType {
    #[default]
    InProcess,
    Command,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct CommandExecutorSettings {
    pub command: Vec<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    pub working_dir: Option<PathBuf>,
}

pub fn default_timeout_ms() -> u64 {
    2000
}

impl CommandExecutorSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct ExecutorConfig {
    #[serde(default)]
    pub executor_type: ExecutorType,
    #[serde(default = "default_verify_checksum")]
    pub verify_checksum: bool,
    #[serde(default)]
    pub command_settings: Option<CommandExecutorSettings>,
}

fn default_verify_checksum() -> bool {
    true
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            executor_type: ExecutorType::InProcess,
            verify_checksum: default_verify_checksum(),
            command_settings: None,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct CampaignSettings {
    #[serde(default = "default_iterations")]
    pub max_iterations: u64,
    #[serde(default)]
    pub seed_paths: Vec<PathBuf>,
    #[serde(default = "default_reencode_seeds")]
    pub reencode_seeds: bool,
    #[serde(default)]
    pub stop_on_crash: bool,
    #[serde(default = "default_crash_dir")]
    pub crash_dir: PathBuf,
}

pub fn default_iterations() -> u64 {
    100_000
}

fn default_reencode_seeds() -> bool {
    true
}

pub fn default_crash_dir() -> PathBuf {
    PathBuf::from("./crashes")
}

impl Default for CampaignSettings {
    fn default() -> Self {
        Self {
            max_iterations: default_iterations(),
            seed_paths: Vec::new(),
            reencode_seeds: default_reencode_seeds(),
            stop_on_crash: false,
            crash_dir: default_crash_dir(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct CrcFuzzConfig {
    #[serde(default)]
    pub mutator: MutatorSettings,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub campaign: CampaignSettings,
}

impl CrcFuzzConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: CrcFuzzConfig =
            toml::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings that can never lead to a successful run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.executor.executor_type == ExecutorType::Command {
            let has_command = self
                .executor
                .command_settings
                .as_ref()
                .is_some_and(|settings| !settings.command.is_empty());
            if !has_command {
                return Err(ConfigError::Invalid(
                    "executor-type \"command\" needs [executor.command-settings] with a non-empty command"
                        .to_string(),
                ));
            }
        }
        Ok(())
    }
}
