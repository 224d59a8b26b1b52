//! Result aggregation.
//!
//! The device may answer the calls of one chunk in any order, so outcomes
//! are matched to submitted calls by correlation id, never by position.

use std::collections::HashMap;

use serde_json::Value;

use super::dispatch::ChunkReply;
use crate::rpc::{ApiError, ApiResponse};

/// Per-call result of a bulk operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The call succeeded. `result` is left undecoded for the caller.
    Success { id: Option<String>, result: Value },
    /// The device reported an error for this call.
    Fault { id: Option<String>, error: ApiError },
}

impl Outcome {
    pub fn id(&self) -> Option<&str> {
        match self {
            Outcome::Success { id, .. } | Outcome::Fault { id, .. } => id.as_deref(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }

    pub fn result(&self) -> Option<&Value> {
        match self {
            Outcome::Success { result, .. } => Some(result),
            Outcome::Fault { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&ApiError> {
        match self {
            Outcome::Fault { error, .. } => Some(error),
            Outcome::Success { .. } => None,
        }
    }
}

impl From<ApiResponse> for Outcome {
    fn from(response: ApiResponse) -> Self {
        match response.error {
            Some(error) => Outcome::Fault {
                id: response.id,
                error,
            },
            None => Outcome::Success {
                id: response.id,
                result: response.result.unwrap_or(Value::Null),
            },
        }
    }
}

/// All outcomes of one bulk operation, in submission order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchResult {
    outcomes: Vec<Outcome>,
    index: HashMap<String, usize>,
    missing: Vec<String>,
}

impl BatchResult {
    fn new(outcomes: Vec<Outcome>, missing: Vec<String>) -> Self {
        let mut index = HashMap::with_capacity(outcomes.len());
        for (position, outcome) in outcomes.iter().enumerate() {
            if let Some(id) = outcome.id() {
                index.entry(id.to_string()).or_insert(position);
            }
        }
        Self {
            outcomes,
            index,
            missing,
        }
    }

    /// Every outcome, in submission order. Replies the device could not
    /// attribute to a submitted call follow the outcomes of their chunk.
    pub fn outcomes(&self) -> &[Outcome] {
        &self.outcomes
    }

    pub fn successes(&self) -> impl Iterator<Item = &Outcome> {
        self.outcomes.iter().filter(|o| o.is_success())
    }

    pub fn faults(&self) -> impl Iterator<Item = &Outcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    pub fn success_count(&self) -> usize {
        self.successes().count()
    }

    pub fn fault_count(&self) -> usize {
        self.faults().count()
    }

    /// Outcome for the call with correlation id `id`.
    pub fn get(&self, id: &str) -> Option<&Outcome> {
        self.index.get(id).map(|&i| &self.outcomes[i])
    }

    /// Ids of submitted calls the device did not answer.
    pub fn missing(&self) -> &[String] {
        &self.missing
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    pub fn into_outcomes(self) -> Vec<Outcome> {
        self.outcomes
    }
}

/// Merge chunk replies, taken in dispatch order, into one result.
pub fn merge(replies: Vec<ChunkReply>) -> BatchResult {
    let mut outcomes = Vec::with_capacity(replies.iter().map(|r| r.ids().len()).sum());
    let mut missing = Vec::new();

    for reply in replies {
        let (chunk, ids, responses) = reply.into_parts();
        let positions: HashMap<&str, usize> = ids
            .iter()
            .enumerate()
            .map(|(position, id)| (id.as_str(), position))
            .collect();

        let mut slots: Vec<Option<Outcome>> = vec![None; ids.len()];
        let mut strays = Vec::new();
        for response in responses {
            let outcome = Outcome::from(response);
            match outcome.id().and_then(|id| positions.get(id)) {
                Some(&position) if slots[position].is_none() => slots[position] = Some(outcome),
                _ => {
                    tracing::warn!(chunk, id = ?outcome.id(), "reply does not match a pending call");
                    strays.push(outcome);
                }
            }
        }

        for (id, slot) in ids.iter().zip(slots) {
            match slot {
                Some(outcome) => outcomes.push(outcome),
                None => missing.push(id.clone()),
            }
        }
        outcomes.extend(strays);
    }

    if !missing.is_empty() {
        tracing::warn!(count = missing.len(), "device did not answer every call");
    }
    BatchResult::new(outcomes, missing)
}
