//! Chunk dispatch.
//!
//! Chunks are exchanged strictly in order, one request in flight per bulk
//! operation, so a single operation never uses more than one of the device's
//! parallel request slots.

use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use super::planner::Chunk;
use crate::error::BulkError;
use crate::rpc::ApiResponse;
use crate::transport::{DeviceReply, Transport};

/// Decoded answer of the device to one accepted chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkReply {
    chunk: usize,
    ids: Vec<String>,
    responses: Vec<ApiResponse>,
}

impl ChunkReply {
    /// Pair the per-call replies of chunk `chunk` with the ids submitted in it.
    pub fn new(chunk: usize, ids: Vec<String>, responses: Vec<ApiResponse>) -> Self {
        Self {
            chunk,
            ids,
            responses,
        }
    }

    pub fn chunk(&self) -> usize {
        self.chunk
    }

    /// Ids submitted in the chunk, in submission order.
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// Reply entries, in the order the device returned them.
    pub fn responses(&self) -> &[ApiResponse] {
        &self.responses
    }

    pub(crate) fn into_parts(self) -> (usize, Vec<String>, Vec<ApiResponse>) {
        (self.chunk, self.ids, self.responses)
    }
}

/// A reply body is either the per-call array or one error object for the
/// whole request.
#[derive(Deserialize)]
#[serde(untagged)]
enum ReplyBody {
    Calls(Vec<ApiResponse>),
    Rejected(ApiResponse),
}

/// Sends planned chunks over a [`Transport`].
#[derive(Debug)]
pub struct Dispatcher<'a, T> {
    transport: &'a T,
}

impl<'a, T: Transport> Dispatcher<'a, T> {
    pub fn new(transport: &'a T) -> Self {
        Self { transport }
    }

    /// Exchange one chunk.
    ///
    /// # Errors
    ///
    /// - `BulkError::Transport` if the exchange fails at the network level
    /// - `BulkError::ChunkRejected` if the device refused the whole chunk
    /// - `BulkError::MalformedReply` if the body is not a JSON-RPC reply
    pub async fn send_chunk(&self, chunk: Chunk) -> Result<ChunkReply, BulkError> {
        let (index, ids, body) = chunk.into_parts();
        tracing::debug!(
            chunk = index,
            calls = ids.len(),
            bytes = body.len(),
            "sending chunk"
        );

        let reply = self
            .transport
            .post(body)
            .await
            .map_err(|source| BulkError::Transport {
                chunk: index,
                source,
            })?;

        decode_reply(index, ids, reply)
    }

    /// Exchange all chunks in order.
    ///
    /// The first failing chunk aborts the operation; later chunks are not
    /// sent. Cancellation is honoured before each chunk and while waiting for
    /// a reply.
    pub async fn send_bulk(
        &self,
        chunks: Vec<Chunk>,
        cancel: &CancellationToken,
    ) -> Result<Vec<ChunkReply>, BulkError> {
        let total = chunks.len();
        let mut replies = Vec::with_capacity(total);

        for chunk in chunks {
            if cancel.is_cancelled() {
                return Err(BulkError::Cancelled {
                    completed: replies.len(),
                    total,
                });
            }

            let reply = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::warn!(chunk = replies.len(), "bulk operation cancelled in flight");
                    return Err(BulkError::Cancelled {
                        completed: replies.len(),
                        total,
                    });
                }
                reply = self.send_chunk(chunk) => reply?,
            };
            replies.push(reply);
        }

        Ok(replies)
    }
}

fn decode_reply(chunk: usize, ids: Vec<String>, reply: DeviceReply) -> Result<ChunkReply, BulkError> {
    if !reply.is_success() {
        let error = serde_json::from_slice::<ApiResponse>(&reply.body)
            .ok()
            .and_then(|r| r.error);
        tracing::warn!(chunk, status = reply.status, "device rejected chunk");
        return Err(BulkError::ChunkRejected {
            chunk,
            calls: ids.len(),
            status: reply.status,
            code: error.as_ref().map(|e| e.code),
            message: error
                .map(|e| e.message)
                .unwrap_or_else(|| format!("HTTP status {}", reply.status)),
        });
    }

    let body: ReplyBody = serde_json::from_slice(&reply.body)
        .map_err(|source| BulkError::MalformedReply { chunk, source })?;

    match body {
        ReplyBody::Calls(responses) => {
            if responses.len() != ids.len() {
                tracing::warn!(
                    chunk,
                    sent = ids.len(),
                    received = responses.len(),
                    "reply count differs from call count"
                );
            }
            Ok(ChunkReply::new(chunk, ids, responses))
        }
        ReplyBody::Rejected(ApiResponse {
            error: Some(error), ..
        }) => {
            tracing::warn!(chunk, code = error.code, "device rejected chunk: {}", error.message);
            Err(BulkError::ChunkRejected {
                chunk,
                calls: ids.len(),
                status: reply.status,
                code: Some(error.code),
                message: error.message,
            })
        }
        ReplyBody::Rejected(_) => Err(BulkError::MalformedReply {
            chunk,
            source: serde::de::Error::custom("expected an array of call replies"),
        }),
    }
}
