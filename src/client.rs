//! Web API client.
//!
//! [`WebApiClient`] owns a [`Transport`] and the engine settings, and runs
//! every call, single or bulk, through the same pipeline:
//!
//! ```text
//! assign ids ──► plan chunks ──► dispatch in order ──► merge by id
//! ```
//!
//! # Example
//!
//! ```ignore
//! use plcweb_bulk::{ApiRequest, ClientConfig, WebApiClient};
//! use serde_json::json;
//!
//! let client = WebApiClient::from_config(ClientConfig::from_env()?)?;
//! client.login("admin", "secret").await?;
//!
//! let calls = (0..500)
//!     .map(|i| ApiRequest::with_params("PlcProgram.Read", json!({"var": format!("\"DB1\".x[{i}]")})))
//!     .collect();
//! let result = client.run_bulk(calls).await?;
//! println!("{} ok, {} failed", result.success_count(), result.fault_count());
//! ```

use serde::Deserialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::bulk::{execute, BatchResult, IdGenerator, Outcome};
use crate::config::ClientConfig;
use crate::error::{BulkError, ClientError};
use crate::rpc::ApiRequest;
use crate::transport::{HttpTransport, Transport};

/// Client for the JSON-RPC Web API of a PLC.
#[derive(Debug)]
pub struct WebApiClient<T> {
    transport: T,
    config: ClientConfig,
    ids: IdGenerator,
}

impl<T: Transport> WebApiClient<T> {
    /// Create a client over `transport`.
    ///
    /// # Errors
    ///
    /// Returns `BulkError::InvalidIdLength` if `config.id_length` is out of
    /// range.
    pub fn new(transport: T, config: ClientConfig) -> Result<Self, BulkError> {
        let ids = IdGenerator::new(config.id_length)?;
        Ok(Self {
            transport,
            config,
            ids,
        })
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Execute `calls` as one bulk operation.
    ///
    /// Calls without an id receive a generated one. The calls are split
    /// into as few requests as the configured size limit allows and sent
    /// one after another. Per-call device errors are part of the returned
    /// [`BatchResult`]; only failures of the operation itself are errors.
    ///
    /// # Errors
    ///
    /// - Pre-flight (nothing sent): `InvalidIdLength`, `DuplicateId`,
    ///   `IdSpaceExhausted`, `IdTimeout`, `CallTooLarge`, `Serialize`
    /// - During dispatch: `ChunkRejected`, `MalformedReply`, `Transport`
    pub async fn run_bulk(&self, calls: Vec<ApiRequest>) -> Result<BatchResult, BulkError> {
        self.run_bulk_with_cancel(calls, &CancellationToken::new())
            .await
    }

    /// Like [`WebApiClient::run_bulk`], aborting with `BulkError::Cancelled`
    /// once `cancel` fires.
    pub async fn run_bulk_with_cancel(
        &self,
        calls: Vec<ApiRequest>,
        cancel: &CancellationToken,
    ) -> Result<BatchResult, BulkError> {
        let calls = self.ids.assign_unique_ids(calls, self.config.id_timeout())?;
        execute(
            &self.transport,
            &calls,
            self.config.max_request_size,
            self.config.split_strategy,
            cancel,
        )
        .await
    }

    /// Execute a single call and return its result.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Api` if the device answered with an error,
    /// `ClientError::MissingResult` if it did not answer the call at all,
    /// and `ClientError::Bulk` for transport and pre-flight failures.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, ClientError> {
        let result = self
            .run_bulk(vec![ApiRequest::with_params(method, params)])
            .await?;

        match result.into_outcomes().into_iter().next() {
            Some(Outcome::Success { result, .. }) => Ok(result),
            Some(Outcome::Fault { error, .. }) => Err(error.into()),
            None => Err(ClientError::MissingResult(method.to_string())),
        }
    }

    /// `Api.Ping`. Returns the device's runtime id, which changes on restart.
    pub async fn ping(&self) -> Result<String, ClientError> {
        let result = self.call("Api.Ping", Value::Null).await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Read tag values, one `PlcProgram.Read` per name.
    ///
    /// Outcomes follow the order of `names`.
    pub async fn read_variables(&self, names: &[&str]) -> Result<BatchResult, BulkError> {
        let calls = names
            .iter()
            .map(|name| {
                ApiRequest::with_params("PlcProgram.Read", json!({"var": name, "mode": "simple"}))
            })
            .collect();
        self.run_bulk(calls).await
    }

    /// Write tag values, one `PlcProgram.Write` per pair.
    ///
    /// Writes are sent in the order given.
    pub async fn write_variables(&self, values: &[(&str, Value)]) -> Result<BatchResult, BulkError> {
        let calls = values
            .iter()
            .map(|(name, value)| {
                ApiRequest::with_params(
                    "PlcProgram.Write",
                    json!({"var": name, "value": value, "mode": "simple"}),
                )
            })
            .collect();
        self.run_bulk(calls).await
    }
}

#[derive(Deserialize)]
struct LoginResult {
    token: String,
}

impl WebApiClient<HttpTransport> {
    /// Build an HTTPS client from configuration.
    pub fn from_config(config: ClientConfig) -> Result<Self, ClientError> {
        let transport = HttpTransport::from_config(&config)?;
        Ok(Self::new(transport, config)?)
    }

    /// `Api.Login`. The session token is sent with every later request.
    pub async fn login(&self, user: &str, password: &str) -> Result<(), ClientError> {
        let result = self
            .call("Api.Login", json!({"user": user, "password": password}))
            .await?;
        let login: LoginResult = serde_json::from_value(result)?;
        self.transport.set_auth_token(Some(login.token));
        tracing::info!("Logged in as {}", user);
        Ok(())
    }

    /// `Api.Logout`. Clears the session token.
    pub async fn logout(&self) -> Result<(), ClientError> {
        self.call("Api.Logout", Value::Null).await?;
        self.transport.set_auth_token(None);
        Ok(())
    }
}
