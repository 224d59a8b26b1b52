//! Bulk request engine.
//!
//! Sends large numbers of independent calls to a device that limits both the
//! request body size and the number of parallel requests.
//!
//! # Pipeline
//!
//! ```text
//! calls ──► IdGenerator ──► planner ──► Dispatcher ──► merge ──► BatchResult
//!          (unique ids)   (≤ max bytes   (one POST per    (ordered,
//!                          per chunk)     chunk, in order)  by id)
//! ```
//!
//! Everything up to the dispatcher is pure and fails before any network
//! I/O. Chunks are sent strictly one after another; a rejected chunk or a
//! transport failure aborts the whole operation, while a failed call inside
//! an accepted chunk is returned as a [`Outcome::Fault`].

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::DEFAULT_ID_TIMEOUT_MS;
use crate::error::BulkError;
use crate::rpc::ApiRequest;
use crate::transport::Transport;

mod dispatch;
mod id;
mod planner;
mod result;
mod size;

pub use dispatch::{ChunkReply, Dispatcher};
pub use id::{validate_ids, IdGenerator, DEFAULT_ID_LENGTH, ID_CHARSET, MAX_ID_LENGTH, MIN_ID_LENGTH};
pub use planner::{plan, plan_with, Chunk, SplitStrategy};
pub use result::{merge, BatchResult, Outcome};
pub use size::{
    body_len, serialize_many, serialize_one, ByteCount, CharCount, SizeMeasure, ARRAY_OVERHEAD,
    SEPARATOR_LEN,
};

/// Run `calls` as one bulk operation against `transport`, keeping every
/// request body within `max_bytes`.
///
/// Calls without an id get one from a default [`IdGenerator`]. Bodies are
/// measured with [`SplitStrategy::Exact`].
pub async fn run_bulk<T: Transport>(
    transport: &T,
    calls: Vec<ApiRequest>,
    max_bytes: usize,
) -> Result<BatchResult, BulkError> {
    let calls = IdGenerator::default()
        .assign_unique_ids(calls, Duration::from_millis(DEFAULT_ID_TIMEOUT_MS))?;
    execute(
        transport,
        &calls,
        max_bytes,
        SplitStrategy::Exact,
        &CancellationToken::new(),
    )
    .await
}

/// Plan, dispatch and merge calls that already carry unique ids.
///
/// # Errors
///
/// Fails with `BulkError::MissingId` or `BulkError::DuplicateId` before
/// anything is sent when the ids cannot correlate the replies.
pub async fn execute<T: Transport>(
    transport: &T,
    calls: &[ApiRequest],
    max_bytes: usize,
    strategy: SplitStrategy,
    cancel: &CancellationToken,
) -> Result<BatchResult, BulkError> {
    validate_ids(calls)?;
    if calls.is_empty() {
        return Ok(BatchResult::default());
    }

    let chunks = plan(calls, max_bytes, strategy)?;
    let requests = chunks.len();
    let replies = Dispatcher::new(transport).send_bulk(chunks, cancel).await?;
    let result = merge(replies);

    tracing::info!(
        calls = calls.len(),
        requests,
        succeeded = result.success_count(),
        failed = result.fault_count(),
        "bulk operation finished"
    );
    Ok(result)
}
