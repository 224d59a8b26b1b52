//! Chunk planner.
//!
//! Splits an ordered list of calls into contiguous request bodies that each
//! fit the device's maximum request size. One left-to-right pass, each call
//! is encoded exactly once and its bytes are appended to the open chunk, so
//! planning stays linear in the number of calls.
//!
//! Calls are never reordered: callers may rely on submission order for
//! side-effecting calls such as `PlcProgram.Write`.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use super::size::{serialize_one, BodyBuilder, ByteCount, CharCount, SizeMeasure};
use super::size::{ARRAY_OVERHEAD, SEPARATOR_LEN};
use crate::error::BulkError;
use crate::rpc::ApiRequest;

/// Which measure the planner uses against the byte budget.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitStrategy {
    /// Character count. Matches `Exact` for ASCII-only input and is not safe
    /// for anything else. Costs slightly more than `Exact`, see [`CharCount`].
    Approximate,
    /// Encoded byte length.
    #[default]
    Exact,
}

impl std::str::FromStr for SplitStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "approximate" | "approx" | "chars" => Ok(SplitStrategy::Approximate),
            "exact" | "bytes" => Ok(SplitStrategy::Exact),
            other => Err(format!("unknown split strategy: {other}")),
        }
    }
}

/// A contiguous group of calls serialized as one request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    index: usize,
    range: Range<usize>,
    ids: Vec<String>,
    body: Vec<u8>,
}

impl Chunk {
    /// Position of this chunk in the plan.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Indices of this chunk's calls in the submitted list.
    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    /// Correlation ids of the calls, in submission order.
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// The request body.
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Number of calls in the chunk.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub(crate) fn into_parts(self) -> (usize, Vec<String>, Vec<u8>) {
        (self.index, self.ids, self.body)
    }
}

/// Split `calls` into chunks of at most `max_bytes` using `strategy`.
///
/// # Errors
///
/// Returns `BulkError::CallTooLarge` for the first call that cannot fit a
/// chunk on its own. No chunks are returned in that case.
pub fn plan(
    calls: &[ApiRequest],
    max_bytes: usize,
    strategy: SplitStrategy,
) -> Result<Vec<Chunk>, BulkError> {
    match strategy {
        SplitStrategy::Approximate => plan_with(calls, max_bytes, &CharCount),
        SplitStrategy::Exact => plan_with(calls, max_bytes, &ByteCount),
    }
}

/// Split `calls` using an explicit measure.
pub fn plan_with<M: SizeMeasure>(
    calls: &[ApiRequest],
    max_bytes: usize,
    measure: &M,
) -> Result<Vec<Chunk>, BulkError> {
    let mut chunks = Vec::new();
    let mut open = OpenChunk::new(0);

    for (position, call) in calls.iter().enumerate() {
        let encoded = serialize_one(call)?;
        let len = measure.measure(&encoded);

        if len + ARRAY_OVERHEAD > max_bytes {
            return Err(BulkError::CallTooLarge {
                id: call.id().to_string(),
                size: len + ARRAY_OVERHEAD,
                max: max_bytes,
            });
        }

        if !open.is_empty() && open.size + SEPARATOR_LEN + len > max_bytes {
            let index = chunks.len();
            let full = std::mem::replace(&mut open, OpenChunk::new(position));
            chunks.push(full.close(index));
        }
        open.push(call.id(), &encoded, len);
    }

    if !open.is_empty() {
        chunks.push(open.close(chunks.len()));
    }

    tracing::debug!(
        calls = calls.len(),
        chunks = chunks.len(),
        max_bytes,
        "planned bulk request"
    );
    Ok(chunks)
}

/// Chunk under construction. `size` is the measured size of the body if it
/// were closed now.
struct OpenChunk {
    start: usize,
    size: usize,
    ids: Vec<String>,
    body: BodyBuilder,
}

impl OpenChunk {
    fn new(start: usize) -> Self {
        Self {
            start,
            size: ARRAY_OVERHEAD,
            ids: Vec::new(),
            body: BodyBuilder::new(),
        }
    }

    fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    fn push(&mut self, id: &str, encoded: &[u8], measured: usize) {
        if !self.body.is_empty() {
            self.size += SEPARATOR_LEN;
        }
        self.size += measured;
        self.body.push(encoded);
        self.ids.push(id.to_string());
    }

    fn close(self, index: usize) -> Chunk {
        let end = self.start + self.ids.len();
        Chunk {
            index,
            range: self.start..end,
            ids: self.ids,
            body: self.body.finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bulk::test_support::{call_of_size, mixed_calls};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn sizes(chunks: &[Chunk]) -> Vec<usize> {
        chunks.iter().map(Chunk::len).collect()
    }

    #[test]
    fn test_five_hundred_byte_calls_split_three_two() {
        let calls: Vec<_> = (0..5).map(|i| call_of_size(&format!("c{i}"), 100)).collect();
        let chunks = plan(&calls, 350, SplitStrategy::Exact).unwrap();

        assert_eq!(sizes(&chunks), vec![3, 2]);
        assert_eq!(chunks[0].body().len(), 2 + 3 * 100 + 2);
        assert_eq!(chunks[1].body().len(), 2 + 2 * 100 + 1);
        assert_eq!(chunks[0].range(), 0..3);
        assert_eq!(chunks[1].range(), 3..5);
        assert_eq!(chunks[1].ids(), &["c3".to_string(), "c4".to_string()]);
    }

    #[test]
    fn test_single_oversized_call_fails() {
        let calls = vec![call_of_size("big", 100)];
        let err = plan(&calls, 5, SplitStrategy::Exact).unwrap_err();
        match err {
            BulkError::CallTooLarge { id, size, max } => {
                assert_eq!(id, "big");
                assert_eq!(size, 102);
                assert_eq!(max, 5);
            }
            other => panic!("Expected CallTooLarge, got {other:?}"),
        }
    }

    #[test]
    fn test_oversized_second_call_fails_without_chunking_first() {
        let small = ApiRequest::new("A", None).with_id("s");
        let small_len = serialize_one(&small).unwrap().len();
        let calls = vec![small, call_of_size("large", 100)];

        let err = plan(&calls, small_len + ARRAY_OVERHEAD + 1, SplitStrategy::Exact).unwrap_err();
        assert!(matches!(err, BulkError::CallTooLarge { ref id, .. } if id == "large"));
    }

    #[test]
    fn test_oversized_call_detected_at_any_position() {
        for position in [0, 7, 19] {
            let mut calls: Vec<_> = (0..20).map(|i| call_of_size(&format!("c{i}"), 80)).collect();
            calls[position] = call_of_size("huge", 500);
            let err = plan(&calls, 300, SplitStrategy::Exact).unwrap_err();
            assert!(matches!(err, BulkError::CallTooLarge { ref id, .. } if id == "huge"));
        }
    }

    #[test]
    fn test_body_exactly_at_budget_is_accepted() {
        let calls: Vec<_> = (0..3).map(|i| call_of_size(&format!("c{i}"), 100)).collect();
        let chunks = plan(&calls, 2 + 300 + 2, SplitStrategy::Exact).unwrap();
        assert_eq!(sizes(&chunks), vec![3]);

        let chunks = plan(&calls, 2 + 300 + 1, SplitStrategy::Exact).unwrap();
        assert_eq!(sizes(&chunks), vec![2, 1]);
    }

    #[test]
    fn test_empty_input_yields_no_chunks() {
        assert!(plan(&[], 100, SplitStrategy::Exact).unwrap().is_empty());
    }

    #[test]
    fn test_budget_order_and_minimality() {
        let calls = mixed_calls(2_000, 42);
        for max in [256, 1_000, 4_096, 64 * 1024] {
            let chunks = plan(&calls, max, SplitStrategy::Exact).unwrap();

            // Every body fits.
            assert!(chunks.iter().all(|c| c.body().len() <= max));

            // Concatenated chunks reproduce submission order.
            let ids: Vec<&str> = chunks.iter().flat_map(|c| c.ids()).map(String::as_str).collect();
            let expected: Vec<&str> = calls.iter().map(ApiRequest::id).collect();
            assert_eq!(ids, expected);

            // No chunk could have taken the next chunk's first call.
            for pair in chunks.windows(2) {
                let next_first = &calls[pair[1].range().start];
                let next_len = serialize_one(next_first).unwrap().len();
                assert!(pair[0].body().len() + SEPARATOR_LEN + next_len > max);
            }

            // Bodies are the exact wire form of their calls.
            for chunk in &chunks {
                let expected = crate::bulk::serialize_many(&calls[chunk.range()]).unwrap();
                assert_eq!(chunk.body(), expected.as_slice());
            }
        }
    }

    #[test]
    fn test_strategies_agree_on_ascii_batches() {
        for n in [1, 10, 20, 50, 1_000] {
            let calls = mixed_calls(n, n as u64);
            for max in [512, 8_192] {
                let approximate = plan(&calls, max, SplitStrategy::Approximate).unwrap();
                let exact = plan(&calls, max, SplitStrategy::Exact).unwrap();
                assert_eq!(approximate, exact, "n={n} max={max}");
            }
        }
    }

    #[test]
    fn test_exact_strategy_holds_budget_for_non_ascii() {
        let calls: Vec<_> = (0..40)
            .map(|i| {
                ApiRequest::with_params(
                    "PlcProgram.Write",
                    json!({"var": format!("\"Förderband\".Temperatur_{i:02}"), "value": "温度温度温度温度温度温度温度温度温度温度"}),
                )
                .with_id(format!("n{i:03}"))
            })
            .collect();
        let encoded = serialize_one(&calls[0]).unwrap();
        let chars = CharCount.measure(&encoded);
        assert!(encoded.len() > chars);

        // Room for three calls by character count, only two by bytes.
        let max = ARRAY_OVERHEAD + 3 * chars + 2 * SEPARATOR_LEN;

        let exact = plan(&calls, max, SplitStrategy::Exact).unwrap();
        assert!(exact.iter().all(|c| c.body().len() <= max));
        assert!(exact.iter().all(|c| c.len() <= 2));

        let approximate = plan(&calls, max, SplitStrategy::Approximate).unwrap();
        assert!(approximate.len() < exact.len());
        assert!(approximate.iter().any(|c| c.body().len() > max));
    }

    #[test]
    fn test_split_strategy_from_str() {
        assert_eq!("exact".parse::<SplitStrategy>(), Ok(SplitStrategy::Exact));
        assert_eq!("Approx".parse::<SplitStrategy>(), Ok(SplitStrategy::Approximate));
        assert!("fast".parse::<SplitStrategy>().is_err());
    }
}
