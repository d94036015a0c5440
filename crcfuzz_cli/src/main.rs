use crcfuzz_core::campaign::Campaign;
use crcfuzz_core::config::{
    CommandExecutorSettings, CrcFuzzConfig, ExecutorType, default_timeout_ms,
};

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_FILE: &str = "crcfuzz.toml";

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    #[clap(short, long, value_parser)]
    config_file: Option<PathBuf>,
    /// Program to run for the command executor; switches the executor type to "command".
    #[clap(long)]
    target_command: Option<String>,
    #[clap(short, long)]
    iterations: Option<u64>,
    /// Seed for the mutator's random stream.
    #[clap(short, long)]
    seed: Option<u32>,
    #[clap(short, long)]
    max_size: Option<usize>,
    #[clap(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .init();
}

fn load_config(cli: &Cli) -> anyhow::Result<CrcFuzzConfig> {
    let config = match &cli.config_file {
        Some(config_path) => {
            info!("Loading configuration from {config_path:?}");
            CrcFuzzConfig::load_from_file(config_path)?
        }
        None => {
            let default_config_path = PathBuf::from(DEFAULT_CONFIG_FILE);
            if default_config_path.exists() {
                info!("No config file specified, loading default: {default_config_path:?}");
                CrcFuzzConfig::load_from_file(&default_config_path)?
            } else {
                info!("No config file found, using built-in defaults");
                CrcFuzzConfig::default()
            }
        }
    };
    Ok(config)
}

fn apply_overrides(config: &mut CrcFuzzConfig, cli: &Cli) {
    if let Some(iterations) = cli.iterations {
        config.campaign.max_iterations = iterations;
    }
    if let Some(seed) = cli.seed {
        config.mutator.seed = seed;
    }
    if let Some(max_size) = cli.max_size {
        config.mutator.max_size = max_size;
    }
    if let Some(target_cmd) = &cli.target_command {
        if config.executor.executor_type != ExecutorType::Command {
            warn!("--target-command given, switching executor type to 'command'");
            config.executor.executor_type = ExecutorType::Command;
        }
        let settings = config
            .executor
            .command_settings
            .get_or_insert_with(|| CommandExecutorSettings {
                command: Vec::new(),
                timeout_ms: default_timeout_ms(),
                working_dir: None,
            });
        match settings.command.first_mut() {
            Some(program) => *program = target_cmd.clone(),
            None => settings.command.push(target_cmd.clone()),
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = load_config(&cli)?;
    apply_overrides(&mut config, &cli);
    tracing::debug!("Effective configuration: {config:#?}");

    let mut campaign =
        Campaign::from_config(&config).context("failed to set up the fuzzing campaign")?;

    let max_iterations = config.campaign.max_iterations;
    info!("Starting campaign for {max_iterations} iterations");
    let stats = campaign.run(max_iterations, config.campaign.stop_on_crash);

    if let (Some(execution), Some(after)) = (stats.first_crash_execution, stats.time_to_first_crash)
    {
        info!("First crash after {after:.2?} at execution {execution}");
    }
    info!(
        iterations = stats.iterations,
        executions = stats.executions,
        refused = stats.refused,
        allocation_failures = stats.allocation_failures,
        timeouts = stats.timeouts,
        crashes = stats.crashes,
        unique_crashes = stats.unique_crashes,
        "Campaign finished in {:.2?} ({:.2} execs/sec)",
        stats.elapsed,
        stats.execs_per_sec()
    );

    let written = campaign
        .save_crashes(&config.campaign.crash_dir)
        .context("failed to save crashing inputs")?;
    for path in &written {
        info!("Saved crash to {path:?}");
    }

    Ok(())
}
