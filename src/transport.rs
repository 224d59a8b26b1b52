//! Transport seam between the bulk engine and the network.
//!
//! The engine only needs one operation: POST a request body and get the
//! status and raw body back. Anything that can do that (the HTTPS client
//! [`HttpTransport`], or an in-memory device in tests) can drive a bulk operation.

mod http;

use std::future::Future;
use std::sync::Arc;

use crate::error::TransportError;

pub use http::{HttpTransport, API_PATH, AUTH_TOKEN_HEADER};

/// Raw answer of the device to one request body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceReply {
    /// HTTP status code.
    pub status: u16,
    /// Undecoded response body.
    pub body: Vec<u8>,
}

impl DeviceReply {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends one request body to the device.
///
/// Implementations must not retry or split the body: one call of `post` is
/// one request seen by the device.
pub trait Transport: Send + Sync {
    fn post(&self, body: Vec<u8>) -> impl Future<Output = Result<DeviceReply, TransportError>> + Send;
}

impl<T: Transport> Transport for Arc<T> {
    fn post(&self, body: Vec<u8>) -> impl Future<Output = Result<DeviceReply, TransportError>> + Send {
        (**self).post(body)
    }
}
