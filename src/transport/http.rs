//! HTTPS transport to the PLC web server.
//!
//! Request bodies are POSTed to `<base>/api/jsonrpc`. After a successful
//! `Api.Login` the session token is attached to every request as
//! `X-Auth-Token`.

use std::sync::RwLock;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use url::Url;

use super::{DeviceReply, Transport};
use crate::config::ClientConfig;
use crate::error::TransportError;

/// Path of the JSON-RPC endpoint below the device base URL.
pub const API_PATH: &str = "api/jsonrpc";

/// Header carrying the session token.
pub const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";

/// HTTP(S) transport backed by a pooled `reqwest` client.
///
/// The per-request timeout is enforced by the HTTP client; it covers the
/// whole exchange of one chunk.
#[derive(Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: Url,
    timeout: Duration,
    token: RwLock<Option<String>>,
}

impl HttpTransport {
    /// Create a transport for the device at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::InvalidUrl` if `base_url` does not parse and
    /// `TransportError::Http` if the HTTP client cannot be built.
    pub fn new(
        base_url: &str,
        timeout: Duration,
        accept_invalid_certs: bool,
    ) -> Result<Self, TransportError> {
        let endpoint = endpoint_url(base_url)?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(accept_invalid_certs)
            .build()
            .map_err(TransportError::Http)?;

        tracing::debug!("Device endpoint: {}", endpoint);
        Ok(Self {
            client,
            endpoint,
            timeout,
            token: RwLock::new(None),
        })
    }

    /// Create a transport from client configuration.
    pub fn from_config(config: &ClientConfig) -> Result<Self, TransportError> {
        Self::new(
            &config.base_url,
            config.request_timeout(),
            config.accept_invalid_certs,
        )
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Set or clear the session token sent with every request.
    pub fn set_auth_token(&self, token: Option<String>) {
        let mut guard = self.token.write().unwrap_or_else(|e| e.into_inner());
        *guard = token;
    }

    pub fn auth_token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn classify(&self, err: reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout(self.timeout.as_secs())
        } else if err.is_connect() {
            TransportError::Connect(err)
        } else {
            TransportError::Http(err)
        }
    }
}

impl Transport for HttpTransport {
    async fn post(&self, body: Vec<u8>) -> Result<DeviceReply, TransportError> {
        let mut request = self
            .client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(body);
        if let Some(token) = self.auth_token() {
            request = request.header(AUTH_TOKEN_HEADER, token);
        }

        let response = request.send().await.map_err(|e| self.classify(e))?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(|e| self.classify(e))?;

        Ok(DeviceReply {
            status,
            body: body.to_vec(),
        })
    }
}

/// Resolve the JSON-RPC endpoint below `base_url`, treating the base as a
/// directory even without a trailing slash.
fn endpoint_url(base_url: &str) -> Result<Url, TransportError> {
    let mut base = Url::parse(base_url)?;
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    Ok(base.join(API_PATH)?)
}
