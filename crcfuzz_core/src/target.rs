//! In-process model of the program under test.
//!
//! The real target reads a little-endian CRC-32 followed by at most eight
//! payload bytes from stdin, discards anything that fails the integrity check,
//! and walks a `U`, `A`, `F` prefix into an allocate, free, read-after-free
//! sequence. This model reproduces those decisions without the memory error so
//! campaigns can run against it with the in-process executor.

use crate::checksum::{CHECKSUM_LEN, payload_checksum, stored_checksum};

/// Most payload bytes the target reads in one go.
pub const TARGET_READ_LEN: usize = 8;
/// Fewest payload bytes the target needs before looking at them.
pub const TARGET_MIN_PAYLOAD: usize = 3;
/// Payload prefix that reaches the use-after-free.
pub const TRIGGER_PREFIX: &[u8; 3] = b"UAF";

/// Panic message raised by [`harness`] when the trigger is reached.
pub const USE_AFTER_FREE_MESSAGE: &str = "use-after-free: read through freed allocation";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetConfig {
    /// Mirrors building the target with checksum validation compiled in.
    pub verify_checksum: bool,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            verify_checksum: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetVerdict {
    /// Not enough bytes for the checksum field or the minimum payload.
    TooShort,
    /// The stored checksum does not cover the payload bytes that were read.
    ChecksumMismatch { expected: u32, actual: u32 },
    /// Accepted, matching the first `prefix_depth` bytes of the trigger.
    Accepted { prefix_depth: usize },
    /// The full trigger prefix was seen and the freed pointer was read.
    UseAfterFree,
}

impl TargetVerdict {
    pub fn is_rejected(&self) -> bool {
        matches!(
            self,
            TargetVerdict::TooShort | TargetVerdict::ChecksumMismatch { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ChecksumTarget {
    config: TargetConfig,
}

impl ChecksumTarget {
    pub fn new(config: TargetConfig) -> Self {
        Self { config }
    }

    pub fn run(&self, data: &[u8]) -> TargetVerdict {
        let (stored, rest) = if self.config.verify_checksum {
            match stored_checksum(data) {
                Some(stored) => (Some(stored), &data[CHECKSUM_LEN..]),
                None => return TargetVerdict::TooShort,
            }
        } else {
            (None, data)
        };

        let payload = &rest[..rest.len().min(TARGET_READ_LEN)];
        if payload.len() < TARGET_MIN_PAYLOAD {
            return TargetVerdict::TooShort;
        }

        if let Some(expected) = stored {
            let actual = payload_checksum(payload);
            if actual != expected {
                return TargetVerdict::ChecksumMismatch { expected, actual };
            }
        }

        let prefix_depth = payload
            .iter()
            .zip(TRIGGER_PREFIX)
            .take_while(|(got, want)| got == want)
            .count();
        if prefix_depth == TRIGGER_PREFIX.len() {
            TargetVerdict::UseAfterFree
        } else {
            TargetVerdict::Accepted { prefix_depth }
        }
    }
}

/// Harness for [`crate::executor::InProcessExecutor`]: runs the checksum-verifying
/// target and panics when the use-after-free is reached.
pub fn harness(data: &[u8]) {
    checked_harness(TargetConfig::default())(data)
}

/// Builds a harness closure for an arbitrary target configuration.
pub fn checked_harness(config: TargetConfig) -> impl Fn(&[u8]) + Send + Sync + Copy {
    let target = ChecksumTarget::new(config);
    move |data: &[u8]| {
        if target.run(data) == TargetVerdict::UseAfterFree {
            panic!("{USE_AFTER_FREE_MESSAGE}");
        }
    }
}
