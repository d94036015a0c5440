//! Host-facing init / fuzz / deinit surface, shaped after the custom-mutator
//! hooks fuzzing engines call into.

use crate::mutator::{ChecksumMutator, MutationError};
use tracing::{debug, error};

/// Counters kept for diagnostics across the lifetime of a [`CustomMutator`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PluginStats {
    pub produced: u64,
    pub size_refusals: u64,
    pub allocation_failures: u64,
}

/// Handle returned by [`CustomMutator::init`]. Each worker owns its own.
#[derive(Debug, Clone)]
pub struct CustomMutator {
    mutator: ChecksumMutator,
    stats: PluginStats,
}

impl CustomMutator {
    /// Seeds the random stream from the host-supplied seed.
    pub fn init(seed: u32) -> Self {
        debug!(seed, "initialising checksum mutator");
        Self {
            mutator: ChecksumMutator::from_seed(u64::from(seed)),
            stats: PluginStats::default(),
        }
    }

    /// Produces a mutated copy of `buf` no longer than `max_size`.
    ///
    /// `_add_buf` is accepted for compatibility with hosts that offer a splice
    /// candidate; the growth strategy does not read it. `None` means no
    /// mutation was produced this time and the host should simply move on.
    pub fn fuzz(
        &mut self,
        buf: &[u8],
        _add_buf: Option<&[u8]>,
        max_size: usize,
    ) -> Option<Vec<u8>> {
        match self.mutator.try_mutate(buf, max_size) {
            Ok(out) => {
                self.stats.produced += 1;
                Some(out)
            }
            Err(err @ MutationError::SizeExceeded { .. }) => {
                self.stats.size_refusals += 1;
                debug!(input_len = buf.len(), max_size, "no mutation: {err}");
                None
            }
            Err(err @ MutationError::AllocationFailure { .. }) => {
                self.stats.allocation_failures += 1;
                error!(input_len = buf.len(), "no mutation: {err}");
                None
            }
        }
    }

    pub fn stats(&self) -> PluginStats {
        self.stats
    }

    /// Releases the handle. The mutator holds no resources beyond itself.
    pub fn deinit(self) {
        debug!(stats = ?self.stats, "checksum mutator torn down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::encode;
    use crate::input::EncodedInput;

    #[test]
    fn fuzz_returns_consistent_buffers() {
        let mut plugin = CustomMutator::init(42);
        let seed = encode(b"UA");
        let mut current = seed.clone();

        for _ in 0..100 {
            current = plugin.fuzz(&current, None, 32).unwrap_or_else(|| seed.clone());
            assert!(EncodedInput::parse(&current).is_consistent());
            assert!(current.len() <= 32);
        }
        let stats = plugin.stats();
        assert_eq!(stats.produced + stats.size_refusals, 100);
        assert_eq!(stats.allocation_failures, 0);
        plugin.deinit();
    }

    #[test]
    fn fuzz_reports_no_mutation_when_ceiling_is_tight() {
        let mut plugin = CustomMutator::init(1);
        let valid_uaf = encode(b"UAF");
        for _ in 0..20 {
            assert!(plugin.fuzz(&valid_uaf, Some(b"splice".as_slice()), 4).is_none());
        }
        assert_eq!(plugin.stats().size_refusals, 20);
        assert_eq!(plugin.stats().produced, 0);
    }

    #[test]
    fn handles_with_equal_seeds_agree() {
        let mut a = CustomMutator::init(77);
        let mut b = CustomMutator::init(77);
        let input = encode(b"abc");
        for _ in 0..30 {
            assert_eq!(a.fuzz(&input, None, 64), b.fuzz(&input, Some(input.as_slice()), 64));
        }
    }
}
