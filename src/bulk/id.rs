//! Correlation id generation.
//!
//! Ids are random strings over `[A-Za-z0-9]`. The default length of 8 gives
//! 62^8 (about 2.2e14) possible ids, so collisions within a batch of tens of
//! thousands of calls are rare and are resolved by redrawing.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use rand::{rng, Rng};

use crate::error::BulkError;
use crate::rpc::ApiRequest;

/// Characters an id is drawn from.
pub const ID_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Default id length.
pub const DEFAULT_ID_LENGTH: usize = 8;

/// Shortest accepted id length.
pub const MIN_ID_LENGTH: usize = 1;

/// Longest accepted id length.
pub const MAX_ID_LENGTH: usize = 64;

/// Random correlation id generator with a fixed id length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdGenerator {
    length: usize,
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self {
            length: DEFAULT_ID_LENGTH,
        }
    }
}

impl IdGenerator {
    /// Create a generator producing ids of `length` characters.
    ///
    /// # Errors
    ///
    /// Returns `BulkError::InvalidIdLength` when `length` is outside
    /// `MIN_ID_LENGTH..=MAX_ID_LENGTH`.
    pub fn new(length: usize) -> Result<Self, BulkError> {
        if !(MIN_ID_LENGTH..=MAX_ID_LENGTH).contains(&length) {
            return Err(BulkError::InvalidIdLength {
                length,
                min: MIN_ID_LENGTH,
                max: MAX_ID_LENGTH,
            });
        }
        Ok(Self { length })
    }

    pub fn length(&self) -> usize {
        self.length
    }

    /// Number of distinct ids this generator can produce, saturating at
    /// `u128::MAX`.
    pub fn capacity(&self) -> u128 {
        (ID_CHARSET.len() as u128)
            .checked_pow(self.length as u32)
            .unwrap_or(u128::MAX)
    }

    /// Whether `id` lies in the space this generator draws from.
    pub fn could_generate(&self, id: &str) -> bool {
        id.len() == self.length && id.bytes().all(|b| ID_CHARSET.contains(&b))
    }

    /// Draw one random id.
    pub fn generate(&self) -> String {
        let mut rng = rng();
        (0..self.length)
            .map(|_| ID_CHARSET[rng.random_range(0..ID_CHARSET.len())] as char)
            .collect()
    }

    /// Give every call without an id a fresh id that is unique in the batch.
    ///
    /// Calls that already carry an id keep it; those ids must already be
    /// distinct. Either every call comes back with a unique id or the whole
    /// batch fails: a short list is never returned.
    ///
    /// # Errors
    ///
    /// - `BulkError::DuplicateId` if two caller-supplied ids are equal
    /// - `BulkError::IdSpaceExhausted` if the batch needs more ids than the
    ///   configured length can represent
    /// - `BulkError::IdTimeout` if assignment is still incomplete when
    ///   `timeout` elapses
    pub fn assign_unique_ids(
        &self,
        calls: Vec<ApiRequest>,
        timeout: Duration,
    ) -> Result<Vec<ApiRequest>, BulkError> {
        let started = Instant::now();

        let mut taken = caller_ids(&calls)?;

        let pending = calls.iter().filter(|c| !c.has_id()).count();
        if pending == 0 {
            return Ok(calls);
        }

        // Only caller ids that a draw could produce compete for the space.
        let competing = taken.iter().filter(|id| self.could_generate(id)).count();
        let requested = competing + pending;
        let capacity = self.capacity();
        if requested as u128 > capacity {
            return Err(BulkError::IdSpaceExhausted {
                requested,
                capacity,
                length: self.length,
            });
        }

        let mut assigned = 0usize;
        let mut out = Vec::with_capacity(calls.len());
        for call in calls {
            if call.has_id() {
                out.push(call);
                continue;
            }
            let id = loop {
                if started.elapsed() >= timeout {
                    return Err(BulkError::IdTimeout {
                        assigned,
                        pending,
                        elapsed_ms: started.elapsed().as_millis(),
                    });
                }
                let candidate = self.generate();
                if taken.insert(candidate.clone()) {
                    break candidate;
                }
            };
            assigned += 1;
            out.push(call.with_id(id));
        }

        tracing::debug!(
            assigned,
            elapsed_us = started.elapsed().as_micros() as u64,
            "assigned correlation ids"
        );
        Ok(out)
    }
}

/// Check that every call carries a correlation id and that no two calls
/// share one.
///
/// # Errors
///
/// Returns `BulkError::MissingId` for the first call without an id and
/// `BulkError::DuplicateId` for the first repeated id.
pub fn validate_ids(calls: &[ApiRequest]) -> Result<(), BulkError> {
    if let Some(index) = calls.iter().position(|c| !c.has_id()) {
        return Err(BulkError::MissingId {
            index,
            method: calls[index].method().to_string(),
        });
    }
    caller_ids(calls).map(|_| ())
}

/// Ids already present on `calls`, failing on the first duplicate.
fn caller_ids(calls: &[ApiRequest]) -> Result<HashSet<String>, BulkError> {
    let mut taken = HashSet::with_capacity(calls.len());
    for call in calls.iter().filter(|c| c.has_id()) {
        if !taken.insert(call.id().to_string()) {
            return Err(BulkError::DuplicateId(call.id().to_string()));
        }
    }
    Ok(taken)
}
