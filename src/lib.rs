//! PLC Web API bulk client
//!
//! This library sends large numbers of JSON-RPC calls to a PLC web server
//! that limits both the size of one request body and the number of
//! requests it handles in parallel:
//!
//! - `rpc` - JSON-RPC 2.0 wire types and the device error table
//! - `bulk` - the bulk request engine (ids, size estimation, chunk planning,
//!   dispatch, result aggregation)
//! - `transport` - the transport seam and its HTTPS implementation
//! - `client` - `WebApiClient`, the entry point most callers want
//! - `config` - layered client configuration
//!
//! # Example
//!
//! ```ignore
//! use plcweb_bulk::{ClientConfig, WebApiClient};
//!
//! let client = WebApiClient::from_config(ClientConfig::from_env()?)?;
//! let result = client.read_variables(&["\"DB1\".speed", "\"DB1\".temp"]).await?;
//! for outcome in result.outcomes() {
//!     println!("{:?}", outcome);
//! }
//! ```

pub mod bulk;
pub mod client;
pub mod config;
pub mod error;
pub mod rpc;
pub mod transport;

pub use bulk::{BatchResult, Outcome, SplitStrategy};
pub use client::WebApiClient;
pub use config::{ClientConfig, ConfigArgs};
pub use error::{BulkError, ClientError, TransportError};
pub use rpc::{ApiError, ApiErrorKind, ApiRequest, ApiResponse};
pub use transport::{DeviceReply, HttpTransport, Transport};
