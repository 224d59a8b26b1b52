//! Error types for the bulk engine, its transport, and the client above it.
//!
//! Pre-flight failures (ids, oversized calls) are raised before any network
//! I/O. Chunk-level failures abort the whole bulk operation. Per-call device
//! faults are never errors here; they are returned as data in
//! [`crate::bulk::BatchResult`].

use thiserror::Error;

use crate::rpc::{ApiError, ApiErrorKind};

/// Failures of one bulk operation.
#[derive(Debug, Error)]
pub enum BulkError {
    /// The configured id length cannot be used.
    #[error("Invalid id length {length}: must be between {min} and {max}")]
    InvalidIdLength { length: usize, min: usize, max: usize },

    /// A call reached the engine without a correlation id.
    #[error("Request {index} ({method}) has no correlation id")]
    MissingId { index: usize, method: String },

    /// Two caller-supplied calls share a correlation id.
    #[error("Duplicate correlation id in batch: {0}")]
    DuplicateId(String),

    /// More distinct ids are needed than the id space can hold.
    #[error("Id space exhausted: {requested} distinct ids needed, {capacity} possible at length {length}")]
    IdSpaceExhausted {
        requested: usize,
        capacity: u128,
        length: usize,
    },

    /// Unique id assignment did not finish in time. No call is sent.
    #[error("Id assignment timed out after {elapsed_ms}ms ({assigned} of {pending} ids assigned)")]
    IdTimeout {
        assigned: usize,
        pending: usize,
        elapsed_ms: u128,
    },

    /// One call alone is larger than the byte budget.
    #[error("Request {id} is {size} bytes, which exceeds the maximum message size of {max} bytes")]
    CallTooLarge { id: String, size: usize, max: usize },

    /// A call could not be encoded.
    #[error("Failed to serialize request {id}: {source}")]
    Serialize {
        id: String,
        #[source]
        source: serde_json::Error,
    },

    /// The device refused a whole chunk.
    #[error("Device rejected chunk {chunk} ({calls} calls): {message}")]
    ChunkRejected {
        chunk: usize,
        calls: usize,
        status: u16,
        code: Option<i64>,
        message: String,
    },

    /// The reply body of a chunk is not a JSON-RPC reply.
    #[error("Malformed reply for chunk {chunk}: {source}")]
    MalformedReply {
        chunk: usize,
        #[source]
        source: serde_json::Error,
    },

    /// Network failure while exchanging a chunk.
    #[error("Transport failure on chunk {chunk}: {source}")]
    Transport {
        chunk: usize,
        #[source]
        source: TransportError,
    },

    /// The operation was cancelled by the caller.
    #[error("Bulk operation cancelled after {completed} of {total} chunks")]
    Cancelled { completed: usize, total: usize },
}

impl BulkError {
    /// Whether the error was raised before any request left the client.
    pub fn is_preflight(&self) -> bool {
        matches!(
            self,
            BulkError::InvalidIdLength { .. }
                | BulkError::MissingId { .. }
                | BulkError::DuplicateId(_)
                | BulkError::IdSpaceExhausted { .. }
                | BulkError::IdTimeout { .. }
                | BulkError::CallTooLarge { .. }
                | BulkError::Serialize { .. }
        )
    }
}

/// Network-level failures of the transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The configured endpoint is not a usable URL.
    #[error("Invalid device URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The exchange did not complete in time.
    #[error("Request timed out after {0}s")]
    Timeout(u64),

    /// The device could not be reached.
    #[error("Connection failed: {0}")]
    Connect(#[source] reqwest::Error),

    /// Any other HTTP client failure.
    #[error("HTTP error: {0}")]
    Http(#[source] reqwest::Error),
}

/// Errors surfaced by [`crate::client::WebApiClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Bulk(#[from] BulkError),

    /// The transport could not be set up.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The device answered the call with an error.
    #[error("Device error {code} ({}): {message}", .kind.as_str())]
    Api {
        kind: ApiErrorKind,
        code: i64,
        message: String,
    },

    /// The reply carried neither a result nor an error for the call.
    #[error("No result for request {0}")]
    MissingResult(String),

    /// The result could not be decoded into the expected type.
    #[error("Failed to decode result: {0}")]
    Decode(#[from] serde_json::Error),
}

impl From<ApiError> for ClientError {
    fn from(err: ApiError) -> Self {
        ClientError::Api {
            kind: err.kind(),
            code: err.code,
            message: err.message,
        }
    }
}
