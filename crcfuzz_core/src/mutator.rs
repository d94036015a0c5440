use crate::checksum::{CHECKSUM_LEN, payload_checksum, write_checksum};
use crate::input::Input;
use rand::Rng;
use rand_chacha::ChaCha8Rng;
use rand_core::SeedableRng;
use thiserror::Error;

/// Smallest number of bytes a single mutation adds to the payload.
pub const MIN_GROWTH: usize = 1;
/// Largest number of bytes a single mutation adds to the payload.
pub const MAX_GROWTH: usize = 3;

/// Reasons a mutation request produces no output.
///
/// Neither is fatal to a campaign: the host is expected to try again on its
/// next call, where the random choices will differ.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MutationError {
    /// The grown input would not fit under the caller's size ceiling.
    #[error("mutated input needs {required} bytes but the ceiling is {max_size}")]
    SizeExceeded { required: usize, max_size: usize },

    /// The output buffer could not be allocated.
    #[error("failed to allocate {requested} bytes for the mutated input")]
    AllocationFailure { requested: usize },
}

/// A `Mutator` is responsible for transforming an `Input` into a new, potentially modified `Input`.
///
/// Mutators own whatever randomness they need, so two instances built from the
/// same seed and fed the same calls produce the same outputs.
///
/// # Type Parameters
/// * `I`: The type of `Input` this mutator operates on.
pub trait Mutator<I: Input> {
    /// Produces a new input derived from `input`.
    ///
    /// # Arguments
    /// * `input`: The current candidate. It does not need to be well-formed.
    /// * `splice`: An optional second input some strategies draw bytes from.
    /// * `max_size`: Hard ceiling on the length of the returned input.
    ///
    /// # Returns
    /// The new input, or the [`MutationError`] explaining why none was produced.
    fn mutate(
        &mut self,
        input: &I,
        splice: Option<&I>,
        max_size: usize,
    ) -> Result<I, MutationError>;
}

/// Grows the payload of a `checksum ‖ payload` input by one to three bytes,
/// overwrites a short run of payload bytes, and recomputes the checksum so
/// the result passes the target's integrity check.
///
/// Inputs shorter than the checksum field are treated as having an empty
/// payload, and their bytes are never read.
#[derive(Debug, Clone)]
pub struct ChecksumMutator<R = ChaCha8Rng> {
    rng: R,
}

impl ChecksumMutator<ChaCha8Rng> {
    /// Creates a mutator whose random stream is fully determined by `seed`.
    pub fn from_seed(seed: u64) -> Self {
        Self::new(ChaCha8Rng::seed_from_u64(seed))
    }
}

impl<R: Rng> ChecksumMutator<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }

    /// Mutates raw bytes. The splice input is not used by this strategy.
    pub fn try_mutate(&mut self, buf: &[u8], max_size: usize) -> Result<Vec<u8>, MutationError> {
        let original_payload = buf.get(CHECKSUM_LEN..);
        let current_payload_len = original_payload.map_or(0, <[u8]>::len);

        let growth = self.rng.random_range(MIN_GROWTH..=MAX_GROWTH);
        let new_payload_len = current_payload_len + growth;
        let new_size = new_payload_len + CHECKSUM_LEN;

        if new_size > max_size {
            return Err(MutationError::SizeExceeded {
                required: new_size,
                max_size,
            });
        }

        let mut out = Vec::new();
        out.try_reserve_exact(new_size)
            .map_err(|_| MutationError::AllocationFailure {
                requested: new_size,
            })?;
        out.resize(new_size, 0);

        let (field, payload) = out.split_at_mut(CHECKSUM_LEN);

        if let Some(original) = original_payload {
            let kept = original.len().min(payload.len());
            payload[..kept].copy_from_slice(&original[..kept]);
            self.randomize(&mut payload[kept..]);
        }

        let offset = if payload.is_empty() {
            0
        } else {
            self.rng.random_range(0..payload.len())
        };
        for byte in payload.iter_mut().skip(offset).take(growth) {
            *byte = self.rng.random();
        }

        write_checksum(field, payload_checksum(payload));
        Ok(out)
    }

    fn randomize(&mut self, bytes: &mut [u8]) {
        for byte in bytes {
            *byte = self.rng.random();
        }
    }
}

impl<I, R> Mutator<I> for ChecksumMutator<R>
where
    I: Input + From<Vec<u8>>,
    R: Rng,
{
    fn mutate(
        &mut self,
        input: &I,
        _splice: Option<&I>,
        max_size: usize,
    ) -> Result<I, MutationError> {
        self.try_mutate(input.as_bytes(), max_size).map(I::from)
    }
}
