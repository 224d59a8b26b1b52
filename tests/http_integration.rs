//! Integration tests for the HTTP transport and the bulk engine.
//!
//! A loopback device stub speaks just enough HTTP/1.1 to accept POSTed
//! JSON-RPC arrays: it reads the request head up to the blank line, takes
//! the body length from `Content-Length`, and answers with a framed body.
//!
//! # Running
//!
//! ```bash
//! cargo test --test http_integration -- --nocapture
//! ```

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};

use plcweb_bulk::{
    ApiRequest, BulkError, ClientConfig, ClientError, TransportError, WebApiClient,
};

/// One request as seen by the stub.
#[derive(Debug, Clone)]
struct Recorded {
    path: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Recorded {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    fn calls(&self) -> Vec<Value> {
        serde_json::from_slice(&self.body).unwrap()
    }
}

type Handler = Arc<dyn Fn(&[u8]) -> (u16, Vec<u8>) + Send + Sync>;

/// Loopback device that records every request.
struct DeviceStub {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl DeviceStub {
    async fn start(handler: Handler) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));

        let recorded = requests.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let recorded = recorded.clone();
                let handler = handler.clone();
                tokio::spawn(async move {
                    let _ = serve(stream, recorded, handler).await;
                });
            }
        });

        Self { addr, requests }
    }

    fn config(&self, max_request_size: usize) -> ClientConfig {
        ClientConfig {
            base_url: format!("http://{}", self.addr),
            max_request_size,
            request_timeout_secs: 5,
            ..ClientConfig::default()
        }
    }

    fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }
}

/// Serve keep-alive requests on one connection until the client hangs up.
async fn serve(
    stream: TcpStream,
    recorded: Arc<Mutex<Vec<Recorded>>>,
    handler: Handler,
) -> std::io::Result<()> {
    let mut reader = BufReader::new(stream);

    loop {
        let mut request_line = String::new();
        if reader.read_line(&mut request_line).await? == 0 {
            return Ok(());
        }
        let path = request_line
            .split_whitespace()
            .nth(1)
            .unwrap_or_default()
            .to_string();

        // Headers until blank line
        let mut headers = Vec::new();
        let mut content_length = 0usize;
        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).await? == 0 {
                return Ok(());
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                break;
            }
            if let Some(colon_pos) = trimmed.find(':') {
                let key = trimmed[..colon_pos].trim().to_string();
                let value = trimmed[colon_pos + 1..].trim().to_string();
                if key.eq_ignore_ascii_case("Content-Length") {
                    content_length = value.parse().unwrap_or(0);
                }
                headers.push((key, value));
            }
        }

        let mut body = vec![0u8; content_length];
        reader.read_exact(&mut body).await?;

        let (status, reply) = handler(&body);
        recorded.lock().unwrap().push(Recorded {
            path,
            headers,
            body,
        });

        let head = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n",
            status,
            if status == 200 { "OK" } else { "Error" },
            reply.len()
        );
        let stream = reader.get_mut();
        stream.write_all(head.as_bytes()).await?;
        stream.write_all(&reply).await?;
        stream.flush().await?;
    }
}

/// Answers every call of an array body, like a healthy device.
fn device_handler() -> Handler {
    Arc::new(|body: &[u8]| {
        let calls: Vec<Value> = serde_json::from_slice(body).unwrap();
        let replies: Vec<Value> = calls
            .iter()
            .map(|call| {
                let id = call["id"].clone();
                match call["method"].as_str().unwrap_or_default() {
                    "Api.Login" => json!({"jsonrpc": "2.0", "id": id, "result": {"token": "tok-xyz"}}),
                    "Api.Ping" => json!({"jsonrpc": "2.0", "id": id, "result": "runtime-7"}),
                    "PlcProgram.Read" => json!({"jsonrpc": "2.0", "id": id, "result": 1}),
                    _ => json!({"jsonrpc": "2.0", "id": id, "result": true}),
                }
            })
            .collect();
        (200, serde_json::to_vec(&replies).unwrap())
    })
}

fn read_calls(n: usize) -> Vec<ApiRequest> {
    (0..n)
        .map(|i| {
            ApiRequest::with_params(
                "PlcProgram.Read",
                json!({"var": format!("\"Conveyor\".Station[{i}].Speed"), "mode": "simple"}),
            )
        })
        .collect()
}

/// Test: a large batch is split into bodies within the limit and every
/// call comes back, in submission order.
#[tokio::test]
async fn test_bulk_read_over_http_respects_size_limit() {
    let device = DeviceStub::start(device_handler()).await;
    let client = WebApiClient::from_config(device.config(4096)).unwrap();

    let calls = read_calls(500);
    let result = client.run_bulk(calls).await.unwrap();

    assert_eq!(result.len(), 500);
    assert_eq!(result.success_count(), 500);
    assert!(result.missing().is_empty());

    let requests = device.requests();
    assert!(requests.len() > 1, "Expected several requests, got {}", requests.len());

    let mut sent_ids = Vec::new();
    for request in &requests {
        assert_eq!(request.path, "/api/jsonrpc");
        assert_eq!(request.header("content-type"), Some("application/json"));
        assert!(request.header("x-auth-token").is_none());
        assert!(request.body.len() <= 4096, "Body of {} bytes", request.body.len());
        sent_ids.extend(request.calls().iter().map(|c| c["id"].as_str().unwrap().to_string()));
    }

    let result_ids: Vec<String> = result
        .outcomes()
        .iter()
        .map(|o| o.id().unwrap().to_string())
        .collect();
    assert_eq!(result_ids, sent_ids);
}

/// Test: one oversized call fails the batch before anything is sent.
#[tokio::test]
async fn test_oversized_call_sends_no_request() {
    let device = DeviceStub::start(device_handler()).await;
    let client = WebApiClient::from_config(device.config(1024)).unwrap();

    let mut calls = read_calls(20);
    calls.push(ApiRequest::with_params(
        "PlcProgram.Write",
        json!({"var": "\"Recipe\".Text", "value": "x".repeat(2000)}),
    ));

    let err = client.run_bulk(calls).await.unwrap_err();
    assert!(matches!(err, BulkError::CallTooLarge { max: 1024, .. }));
    assert!(device.requests().is_empty());
}

/// Test: after login the token header rides on every request.
#[tokio::test]
async fn test_login_sets_auth_token_header() {
    let device = DeviceStub::start(device_handler()).await;
    let client = WebApiClient::from_config(device.config(64 * 1024)).unwrap();

    client.login("admin", "secret").await.unwrap();
    assert_eq!(client.transport().auth_token().as_deref(), Some("tok-xyz"));
    assert_eq!(client.ping().await.unwrap(), "runtime-7");

    client.logout().await.unwrap();
    assert!(client.transport().auth_token().is_none());

    let requests = device.requests();
    assert_eq!(requests.len(), 3);
    assert!(requests[0].header("x-auth-token").is_none());
    assert_eq!(requests[0].calls()[0]["params"], json!({"user": "admin", "password": "secret"}));
    assert_eq!(requests[1].header("x-auth-token"), Some("tok-xyz"));
    assert_eq!(requests[2].header("x-auth-token"), Some("tok-xyz"));
    assert_eq!(requests[2].calls()[0]["method"], "Api.Logout");
}

/// Test: an HTTP error status aborts the batch after the first chunk.
#[tokio::test]
async fn test_http_error_status_aborts_bulk() {
    let device = DeviceStub::start(Arc::new(|_: &[u8]| {
        (
            503,
            br#"{"jsonrpc":"2.0","id":null,"error":{"code":3,"message":"System is busy"}}"#.to_vec(),
        )
    }))
    .await;
    let client = WebApiClient::from_config(device.config(1024)).unwrap();

    let err = client.run_bulk(read_calls(100)).await.unwrap_err();
    match err {
        BulkError::ChunkRejected {
            chunk,
            status,
            code,
            message,
            ..
        } => {
            assert_eq!(chunk, 0);
            assert_eq!(status, 503);
            assert_eq!(code, Some(3));
            assert_eq!(message, "System is busy");
        }
        other => panic!("Expected ChunkRejected, got {other:?}"),
    }
    assert_eq!(device.requests().len(), 1);
}

/// Test: a device that is not listening surfaces a connect failure.
#[tokio::test]
async fn test_unreachable_device() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = ClientConfig {
        base_url: format!("http://{}", addr),
        request_timeout_secs: 2,
        ..ClientConfig::default()
    };
    let client = WebApiClient::from_config(config).unwrap();

    let err = client
        .call("Api.Ping", Value::Null)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ClientError::Bulk(BulkError::Transport {
            chunk: 0,
            source: TransportError::Connect(_) | TransportError::Timeout(_),
        })
    ));
}
