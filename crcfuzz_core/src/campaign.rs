//! A small mutate, execute, examine loop around [`ChecksumMutator`].
//!
//! This is a demonstration host rather than a fuzzer: it keeps no corpus and
//! no coverage feedback, only the seeds it was given and the chain of
//! mutations grown from the current seed.

use crate::checksum::encode;
use crate::config::{CrcFuzzConfig, ExecutorType};
use crate::executor::{
    CommandExecutor, CommandExecutorConfig, ExecutionStatus, Executor, InProcessExecutor,
};
use crate::input::Input;
use crate::mutator::{ChecksumMutator, MutationError, Mutator};
use crate::oracle::{BugReport, CrashOracle, Oracle};
use crate::target::{TargetConfig, checked_harness};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Number of progress lines logged over a full run.
const PROGRESS_STEPS: u64 = 10;

#[derive(Error, Debug)]
pub enum CampaignError {
    #[error("failed to read seed {path:?}: {source}")]
    SeedIo {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write crash to {path:?}: {source}")]
    CrashIo {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CampaignStats {
    pub iterations: u64,
    pub executions: u64,
    /// Mutations refused for any reason, allocation failures included.
    pub refused: u64,
    pub allocation_failures: u64,
    pub timeouts: u64,
    pub crashes: u64,
    pub unique_crashes: u64,
    /// Wall-clock time spent inside [`Campaign::run`], summed over calls.
    pub elapsed: Duration,
    /// Execution count at which the first unique crash was seen.
    pub first_crash_execution: Option<u64>,
    /// Time from the start of the first run to the first unique crash.
    pub time_to_first_crash: Option<Duration>,
}

impl CampaignStats {
    /// Mean throughput over [`CampaignStats::elapsed`]; zero before anything ran.
    pub fn execs_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.executions as f64 / secs
        } else {
            0.0
        }
    }
}

/// Reads seed inputs from files and (non-recursively) from directories.
///
/// With `reencode` set, a seed whose checksum does not match its payload is
/// treated as a raw payload and wrapped in a fresh, consistent checksum.
pub fn load_seeds(paths: &[PathBuf], reencode: bool) -> Result<Vec<Vec<u8>>, CampaignError> {
    let read = |path: &Path| {
        std::fs::read(path).map_err(|source| CampaignError::SeedIo {
            path: path.to_path_buf(),
            source,
        })
    };

    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let entries = std::fs::read_dir(path).map_err(|source| CampaignError::SeedIo {
                path: path.clone(),
                source,
            })?;
            let mut dir_files = Vec::new();
            for entry in entries {
                let entry = entry.map_err(|source| CampaignError::SeedIo {
                    path: path.clone(),
                    source,
                })?;
                if entry.path().is_file() {
                    dir_files.push(entry.path());
                }
            }
            dir_files.sort();
            files.extend(dir_files);
        } else {
            files.push(path.clone());
        }
    }

    let mut seeds = Vec::with_capacity(files.len());
    for file in files {
        let data = read(&file)?;
        if reencode && !data.encoded().is_consistent() {
            debug!(path = ?file, "re-encoding seed with a fresh checksum");
            seeds.push(encode(&data));
        } else {
            seeds.push(data);
        }
    }
    Ok(seeds)
}

pub struct Campaign {
    mutator: ChecksumMutator,
    executor: Box<dyn Executor<Vec<u8>>>,
    oracle: Box<dyn Oracle<Vec<u8>>>,
    seeds: Vec<Vec<u8>>,
    next_seed: usize,
    max_size: usize,
    stats: CampaignStats,
    known_crashes: HashSet<String>,
    crashes: Vec<BugReport<Vec<u8>>>,
}

impl Campaign {
    /// An empty seed list starts every chain from the empty input, which the
    /// mutator treats as a zero-length payload.
    pub fn new(
        mutator: ChecksumMutator,
        executor: Box<dyn Executor<Vec<u8>>>,
        oracle: Box<dyn Oracle<Vec<u8>>>,
        mut seeds: Vec<Vec<u8>>,
        max_size: usize,
    ) -> Self {
        if seeds.is_empty() {
            seeds.push(Vec::new());
        }
        Self {
            mutator,
            executor,
            oracle,
            seeds,
            next_seed: 0,
            max_size,
            stats: CampaignStats::default(),
            known_crashes: HashSet::new(),
            crashes: Vec::new(),
        }
    }

    pub fn from_config(config: &CrcFuzzConfig) -> Result<Self, CampaignError> {
        config.validate()?;

        let executor: Box<dyn Executor<Vec<u8>>> = match config.executor.executor_type {
            ExecutorType::InProcess => Box::new(InProcessExecutor::new(checked_harness(
                TargetConfig {
                    verify_checksum: config.executor.verify_checksum,
                },
            ))),
            ExecutorType::Command => {
                let settings = config.executor.command_settings.clone().unwrap_or_default();
                Box::new(CommandExecutor::new(CommandExecutorConfig {
                    timeout: settings.timeout(),
                    command: settings.command,
                    working_dir: settings.working_dir,
                }))
            }
        };

        let seeds = load_seeds(
            &config.campaign.seed_paths,
            config.campaign.reencode_seeds,
        )?;
        info!(
            seeds = seeds.len(),
            executor = ?config.executor.executor_type,
            max_size = config.mutator.max_size,
            "campaign configured"
        );

        Ok(Self::new(
            ChecksumMutator::from_seed(u64::from(config.mutator.seed)),
            executor,
            Box::new(CrashOracle::new()),
            seeds,
            config.mutator.max_size,
        ))
    }

    fn record_refusal(&mut self, err: &MutationError, input_len: usize) {
        self.stats.refused += 1;
        match err {
            MutationError::SizeExceeded { .. } => {
                debug!(input_len, "restarting chain: {err}");
            }
            MutationError::AllocationFailure { .. } => {
                self.stats.allocation_failures += 1;
                error!(input_len, "restarting chain: {err}");
            }
        }
    }

    fn take_seed(&mut self) -> Vec<u8> {
        let seed = self.seeds[self.next_seed % self.seeds.len()].clone();
        self.next_seed = self.next_seed.wrapping_add(1);
        seed
    }

    /// Runs up to `max_iterations` mutation attempts.
    ///
    /// A refused mutation restarts the chain from the next seed; otherwise
    /// the mutated input becomes the base for the following iteration.
    pub fn run(&mut self, max_iterations: u64, stop_on_crash: bool) -> CampaignStats {
        let progress_every = (max_iterations / PROGRESS_STEPS).max(1);
        let start_time = Instant::now();
        let elapsed_before = self.stats.elapsed;
        let mut current = self.take_seed();

        for i in 0..max_iterations {
            self.stats.iterations += 1;
            if i > 0 && i % progress_every == 0 {
                info!(
                    iteration = i,
                    executions = self.stats.executions,
                    unique_crashes = self.stats.unique_crashes,
                    "progress"
                );
            }

            let mutated = match self.mutator.mutate(&current, None, self.max_size) {
                Ok(mutated) => mutated,
                Err(err) => {
                    self.record_refusal(&err, current.len());
                    current = self.take_seed();
                    continue;
                }
            };

            self.stats.executions += 1;
            let status = self.executor.execute_sync(&mutated);
            match &status {
                ExecutionStatus::Timeout => self.stats.timeouts += 1,
                ExecutionStatus::Other(msg) => warn!("execution problem: {msg}"),
                _ => {}
            }

            if let Some(report) = self.oracle.examine(&mutated, &status) {
                self.stats.crashes += 1;
                if self.known_crashes.insert(report.input_hash.clone()) {
                    self.stats.unique_crashes += 1;
                    if self.stats.first_crash_execution.is_none() {
                        self.stats.first_crash_execution = Some(self.stats.executions);
                        self.stats.time_to_first_crash =
                            Some(elapsed_before + start_time.elapsed());
                    }
                    info!(
                        hash = %report.input_hash,
                        severity = report.severity,
                        execution = self.stats.executions,
                        "new crash: {}",
                        report.description
                    );
                    self.crashes.push(report);
                }
                if stop_on_crash {
                    break;
                }
            }
            current = mutated;
        }

        self.stats.elapsed = elapsed_before + start_time.elapsed();
        self.stats
    }

    pub fn stats(&self) -> CampaignStats {
        self.stats
    }

    pub fn crashes(&self) -> &[BugReport<Vec<u8>>] {
        &self.crashes
    }

    /// Writes each unique crashing input to `dir/<md5>.crash`, creating `dir` if needed.
    pub fn save_crashes(&self, dir: &Path) -> Result<Vec<PathBuf>, CampaignError> {
        if self.crashes.is_empty() {
            return Ok(Vec::new());
        }
        std::fs::create_dir_all(dir).map_err(|source| CampaignError::CrashIo {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut written = Vec::with_capacity(self.crashes.len());
        for report in &self.crashes {
            let path = dir.join(format!("{}.crash", report.input_hash));
            std::fs::write(&path, report.input.as_bytes()).map_err(|source| {
                CampaignError::CrashIo {
                    path: path.clone(),
                    source,
                }
            })?;
            written.push(path);
        }
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::{TRIGGER_PREFIX, harness};

    fn in_process_campaign(seeds: Vec<Vec<u8>>, max_size: usize, rng_seed: u64) -> Campaign {
        Campaign::new(
            ChecksumMutator::from_seed(rng_seed),
            Box::new(InProcessExecutor::new(harness)),
            Box::new(CrashOracle::new()),
            seeds,
            max_size,
        )
    }

    #[test]
    fn uaf_seed_reaches_the_trigger() {
        let mut campaign = in_process_campaign(vec![encode(b"UAF")], 12, 0);
        let stats = campaign.run(200, false);

        assert_eq!(stats.iterations, 200);
        assert_eq!(stats.executions + stats.refused, 200);
        assert!(stats.unique_crashes > 0, "mutations keeping the prefix crash");
        for report in campaign.crashes() {
            assert!(report.input.encoded().is_consistent());
            assert!(report.input[4..].starts_with(TRIGGER_PREFIX));
            assert!(report.input.len() <= 12);
        }
    }

    #[test]
    fn stop_on_crash_ends_the_run_early() {
        let mut campaign = in_process_campaign(vec![encode(b"UAF")], 64, 1);
        let stats = campaign.run(10_000, true);
        assert_eq!(stats.crashes, 1);
        assert!(stats.iterations < 10_000);
        assert_eq!(
            stats.first_crash_execution,
            Some(stats.executions),
            "the run stops on the execution that crashed first"
        );
        let time_to_first_crash = stats.time_to_first_crash.expect("crash time recorded");
        assert!(time_to_first_crash <= stats.elapsed);
    }

    #[test]
    fn first_crash_is_recorded_once() {
        let mut campaign = in_process_campaign(vec![encode(b"UAF")], 12, 0);
        let first = campaign.run(200, false);
        assert!(first.unique_crashes > 1, "several distinct crashing inputs expected");
        let index = first.first_crash_execution.expect("a crash was found");
        assert!((1..=first.executions).contains(&index));

        let second = campaign.run(200, false);
        assert_eq!(second.first_crash_execution, Some(index));
        assert_eq!(second.time_to_first_crash, first.time_to_first_crash);
        assert!(second.elapsed >= first.elapsed, "elapsed accumulates across runs");
    }

    #[test]
    fn no_crash_leaves_first_crash_unset() {
        let mut campaign = in_process_campaign(vec![encode(b"abc")], 5, 5);
        let stats = campaign.run(20, false);
        assert_eq!(stats.unique_crashes, 0);
        assert_eq!(stats.first_crash_execution, None);
        assert_eq!(stats.time_to_first_crash, None);
    }

    #[test]
    fn execs_per_sec_divides_executions_by_elapsed() {
        let stats = CampaignStats {
            executions: 500,
            elapsed: Duration::from_millis(250),
            ..CampaignStats::default()
        };
        assert!((stats.execs_per_sec() - 2000.0).abs() < 1e-9);
        assert_eq!(CampaignStats::default().execs_per_sec(), 0.0);
    }

    #[test]
    fn tight_ceiling_refuses_every_mutation() {
        let mut campaign = in_process_campaign(vec![encode(b"UAF")], 4, 2);
        let stats = campaign.run(50, false);
        assert_eq!(stats.refused, 50);
        assert_eq!(stats.allocation_failures, 0);
        assert_eq!(stats.executions, 0);
    }

    #[test]
    fn refusals_are_split_by_cause() {
        let mut campaign = in_process_campaign(vec![encode(b"UAF")], 4, 6);
        campaign.record_refusal(
            &MutationError::AllocationFailure { requested: 1 << 20 },
            (1 << 20) - 4,
        );
        campaign.run(3, false);

        let stats = campaign.stats();
        assert_eq!(stats.refused, 4);
        assert_eq!(stats.allocation_failures, 1);
    }

    #[test]
    fn empty_seed_list_starts_from_empty_input() {
        let mut campaign = in_process_campaign(Vec::new(), 16, 3);
        let stats = campaign.run(100, false);
        assert!(stats.executions > 0);
        assert!(stats.refused > 0, "chains grow until the ceiling refuses them");
    }

    #[test]
    fn identical_campaigns_agree() {
        let mut a = in_process_campaign(vec![encode(b"UAF"), encode(b"UA")], 24, 9);
        let mut b = in_process_campaign(vec![encode(b"UAF"), encode(b"UA")], 24, 9);
        let (sa, sb) = (a.run(300, false), b.run(300, false));
        assert_eq!(
            (sa.iterations, sa.executions, sa.refused, sa.unique_crashes),
            (sb.iterations, sb.executions, sb.refused, sb.unique_crashes)
        );
        assert_eq!(sa.first_crash_execution, sb.first_crash_execution);
        let hashes = |c: &Campaign| {
            c.crashes()
                .iter()
                .map(|r| r.input_hash.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(hashes(&a), hashes(&b));
    }

    #[test]
    fn load_seeds_reencodes_raw_payloads() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a_raw"), b"UA").unwrap();
        std::fs::write(dir.path().join("b_valid"), encode(b"xyz")).unwrap();

        let seeds = load_seeds(&[dir.path().to_path_buf()], true).unwrap();
        assert_eq!(seeds, vec![encode(b"UA"), encode(b"xyz")]);

        let raw = load_seeds(&[dir.path().join("a_raw")], false).unwrap();
        assert_eq!(raw, vec![b"UA".to_vec()]);
    }

    #[test]
    fn load_seeds_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            load_seeds(&[missing], true),
            Err(CampaignError::SeedIo { .. })
        ));
    }

    #[test]
    fn save_crashes_writes_one_file_per_unique_crash() {
        let mut campaign = in_process_campaign(vec![encode(b"UAF")], 12, 4);
        campaign.run(100, false);
        let dir = tempfile::tempdir().unwrap();
        let out_dir = dir.path().join("crashes");

        let written = campaign.save_crashes(&out_dir).unwrap();
        assert_eq!(written.len(), campaign.crashes().len());
        for (path, report) in written.iter().zip(campaign.crashes()) {
            assert_eq!(std::fs::read(path).unwrap(), report.input);
        }
    }

    #[test]
    fn from_config_builds_in_process_campaign() {
        let mut config = CrcFuzzConfig::default();
        config.mutator.max_size = 4;
        let mut campaign = Campaign::from_config(&config).unwrap();
        let stats = campaign.run(5, false);
        assert_eq!(stats.refused, 5, "a 4-byte ceiling leaves no room to grow");
    }
}
