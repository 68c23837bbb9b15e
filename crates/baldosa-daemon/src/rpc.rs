//! Newline-delimited JSON-RPC 2.0 over a Unix socket.
//!
//! Each line a client writes is one call; each call gets exactly one
//! response line back, in order. Connections are served concurrently.

use std::path::PathBuf;
use std::sync::Arc;

use baldosa_map::MapError;
use baldosa_types::Coords;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, error, info, warn};

use crate::commands;
use crate::state::DaemonState;

const JSONRPC: &str = "2.0";

/// One call read off the socket.
#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    pub jsonrpc: String,
    /// Echoed back verbatim.
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

/// Exactly one of `result` and `error` is set.
#[derive(Debug, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

/// Error object. `code` is stable; `message` is a short machine name and
/// `data` carries details such as the offending cell.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcResponse {
    fn reply(id: Value, outcome: Result<Value, RpcError>) -> Self {
        let (result, error) = match outcome {
            Ok(value) => (Some(value), None),
            Err(err) => (None, Some(err)),
        };
        Self {
            jsonrpc: JSONRPC,
            id,
            result,
            error,
        }
    }
}

/// Error codes. -32700..-32600 are JSON-RPC's own; the rest are ours.
pub mod codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
    pub const NOT_FOUND: i32 = -32020;
    pub const LEDGER_UNAVAILABLE: i32 = -32030;
    pub const INSUFFICIENT_BALANCE: i32 = -32040;
    pub const ALREADY_OWNED: i32 = -32050;
    pub const ALREADY_EXISTS: i32 = -32051;
    pub const UNAUTHORIZED: i32 = -32060;
}

impl RpcError {
    fn new(code: i32, message: &str, data: Option<Value>) -> Self {
        Self {
            code,
            message: message.to_string(),
            data,
        }
    }

    fn detailed(code: i32, message: &str, detail: &str) -> Self {
        Self::new(code, message, Some(serde_json::json!({ "detail": detail })))
    }

    pub fn parse_error() -> Self {
        Self::new(codes::PARSE_ERROR, "PARSE_ERROR", None)
    }

    pub fn invalid_request() -> Self {
        Self::new(codes::INVALID_REQUEST, "INVALID_REQUEST", None)
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            codes::METHOD_NOT_FOUND,
            "METHOD_NOT_FOUND",
            Some(serde_json::json!({ "method": method })),
        )
    }

    pub fn invalid_params(detail: &str) -> Self {
        Self::detailed(codes::INVALID_PARAMS, "INVALID_PARAMS", detail)
    }

    pub fn internal_error(detail: &str) -> Self {
        Self::detailed(codes::INTERNAL_ERROR, "INTERNAL_ERROR", detail)
    }

    pub fn not_found(detail: &str) -> Self {
        Self::detailed(codes::NOT_FOUND, "NOT_FOUND", detail)
    }

    /// Marked retryable in `data`; nothing was written.
    pub fn ledger_unavailable(detail: &str) -> Self {
        Self::new(
            codes::LEDGER_UNAVAILABLE,
            "LEDGER_UNAVAILABLE",
            Some(serde_json::json!({ "detail": detail, "retryable": true })),
        )
    }

    pub fn insufficient_balance(required: u64, available: u64) -> Self {
        Self::new(
            codes::INSUFFICIENT_BALANCE,
            "INSUFFICIENT_BALANCE",
            Some(serde_json::json!({ "required": required, "available": available })),
        )
    }

    pub fn already_owned(coords: Coords) -> Self {
        Self::new(
            codes::ALREADY_OWNED,
            "ALREADY_OWNED",
            Some(serde_json::json!({ "x": coords.x, "y": coords.y })),
        )
    }

    pub fn already_exists(detail: &str) -> Self {
        Self::detailed(codes::ALREADY_EXISTS, "ALREADY_EXISTS", detail)
    }

    pub fn unauthorized(detail: &str) -> Self {
        Self::detailed(codes::UNAUTHORIZED, "UNAUTHORIZED", detail)
    }
}

impl From<MapError> for RpcError {
    fn from(err: MapError) -> Self {
        match &err {
            MapError::NotFound(what) => Self::not_found(what),
            MapError::AlreadyOwned(coords) => Self::already_owned(*coords),
            MapError::InsufficientFunds {
                required,
                available,
            } => Self::insufficient_balance(*required, *available),
            MapError::Unauthorized(what) => Self::unauthorized(what),
            MapError::InvalidContent(e) => Self::invalid_params(&e.to_string()),
            MapError::InvalidAmount(what) => Self::invalid_params(what),
            MapError::Conflict(what) => Self::already_exists(what),
            MapError::LedgerUnavailable(_) => Self::ledger_unavailable(&err.to_string()),
            MapError::BlobStore(_) | MapError::Publish(_) => {
                error!(error = %err, "request failed on an external dependency");
                Self::internal_error(&err.to_string())
            }
        }
    }
}

/// Deserialize a method's params object.
pub fn parse_params<T: DeserializeOwned>(params: &Value) -> Result<T, RpcError> {
    serde_json::from_value(params.clone()).map_err(|e| RpcError::invalid_params(&e.to_string()))
}

/// Accepts socket connections and answers calls against one
/// [`DaemonState`].
pub struct RpcServer {
    state: Arc<DaemonState>,
    socket_path: PathBuf,
}

impl RpcServer {
    pub fn new(state: Arc<DaemonState>, socket_path: PathBuf) -> Self {
        Self { state, socket_path }
    }

    /// Bind the socket, replacing a stale one left by an unclean exit, and
    /// serve until the task is dropped.
    pub async fn run(&self) -> anyhow::Result<()> {
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path)?;
        }
        let listener = UnixListener::bind(&self.socket_path)?;
        info!(path = ?self.socket_path, "rpc socket listening");

        let mut next_conn: u64 = 0;
        loop {
            let stream = match listener.accept().await {
                Ok((stream, _)) => stream,
                Err(e) => {
                    error!(error = %e, "rpc accept failed");
                    continue;
                }
            };
            next_conn += 1;
            let conn = next_conn;
            let state = self.state.clone();
            tokio::spawn(async move {
                debug!(conn, "rpc client connected");
                match serve_connection(&state, stream).await {
                    Ok(calls) => debug!(conn, calls, "rpc client disconnected"),
                    Err(e) => warn!(conn, error = %e, "rpc connection dropped"),
                }
            });
        }
    }
}

/// Answer calls until the client closes its end. Returns the call count.
async fn serve_connection(state: &Arc<DaemonState>, stream: UnixStream) -> anyhow::Result<u64> {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();
    let mut calls = 0;

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        calls += 1;
        let mut out = serde_json::to_vec(&handle_line(state, &line).await)?;
        out.push(b'\n');
        write_half.write_all(&out).await?;
    }
    Ok(calls)
}

/// Parse and answer one line. Unparseable input gets a parse error with a
/// null id.
pub async fn handle_line(state: &Arc<DaemonState>, line: &str) -> RpcResponse {
    match serde_json::from_str::<RpcRequest>(line) {
        Ok(request) => dispatch_request(state, request).await,
        Err(_) => RpcResponse::reply(Value::Null, Err(RpcError::parse_error())),
    }
}

/// Route a call to its command handler.
pub async fn dispatch_request(state: &Arc<DaemonState>, request: RpcRequest) -> RpcResponse {
    let RpcRequest {
        jsonrpc,
        id,
        method,
        params,
    } = request;
    if jsonrpc != JSONRPC {
        return RpcResponse::reply(id, Err(RpcError::invalid_request()));
    }
    debug!(method = %method, "rpc call");

    let params = &params;
    let outcome = match method.as_str() {
        "get_chunk_bitmap" => commands::tiles::get_chunk_bitmap(state, params).await,
        "recompute_chunk" => commands::tiles::recompute_chunk(state, params).await,
        "get_queue_stats" => commands::tiles::get_queue_stats(state).await,
        "get_tile" => commands::tiles::get_tile(state, params).await,
        "purchase" => commands::tiles::purchase(state, params).await,
        "edit_tile" => commands::tiles::edit_tile(state, params).await,
        "prepare_image_upload" => commands::tiles::prepare_image_upload(state, params).await,
        "create_user" => commands::users::create_user(state, params).await,
        "get_user" => commands::users::get_user(state, params).await,
        "grant_coins" => commands::users::grant_coins(state, params).await,
        other => Err(RpcError::method_not_found(other)),
    };
    RpcResponse::reply(id, outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DaemonConfig;
    use crate::state::testing;
    use baldosa_types::ContentError;

    fn request(method: &str, params: Value) -> RpcRequest {
        RpcRequest {
            jsonrpc: "2.0".to_string(),
            id: serde_json::json!(1),
            method: method.to_string(),
            params,
        }
    }

    #[test]
    fn test_map_error_codes() {
        let err = RpcError::from(MapError::AlreadyOwned(Coords::new(2, -3)));
        assert_eq!(err.code, -32050);
        assert_eq!(err.data, Some(serde_json::json!({"x": 2, "y": -3})));

        let err = RpcError::from(MapError::InsufficientFunds {
            required: 10,
            available: 4,
        });
        assert_eq!(err.code, -32040);

        let err = RpcError::from(MapError::LedgerUnavailable("busy".into()));
        assert_eq!(err.code, -32030);
        assert_eq!(err.message, "LEDGER_UNAVAILABLE");

        assert_eq!(RpcError::from(MapError::NotFound("tile".into())).code, -32020);
        assert_eq!(RpcError::from(MapError::Unauthorized("tile".into())).code, -32060);
        assert_eq!(
            RpcError::from(MapError::InvalidContent(ContentError::TitleRequired)).code,
            -32602
        );
        assert_eq!(RpcError::from(MapError::Publish("down".into())).code, -32603);
        assert_eq!(
            RpcError::from(MapError::InvalidAmount("overflow".into())).code,
            codes::INVALID_PARAMS
        );
    }

    #[tokio::test]
    async fn test_handle_line() {
        let daemon = testing::daemon(DaemonConfig::default());

        let resp = handle_line(&daemon.state, "{not json").await;
        assert_eq!(resp.id, Value::Null);
        assert_eq!(resp.error.expect("error").code, codes::PARSE_ERROR);

        let resp = handle_line(
            &daemon.state,
            r#"{"jsonrpc":"2.0","id":"abc","method":"get_queue_stats"}"#,
        )
        .await;
        assert_eq!(resp.id, serde_json::json!("abc"));
        assert!(resp.error.is_none());
        let wire = serde_json::to_value(&resp).expect("serialize");
        assert_eq!(
            wire,
            serde_json::json!({
                "jsonrpc": "2.0",
                "id": "abc",
                "result": {"accepted": 0, "dropped": 0},
            })
        );
    }

    #[tokio::test]
    async fn test_unknown_method_and_bad_version() {
        let daemon = testing::daemon(DaemonConfig::default());

        let resp = dispatch_request(&daemon.state, request("mine_bitcoin", serde_json::json!({})))
            .await;
        assert_eq!(resp.error.expect("error").code, -32601);

        let mut req = request("get_tile", serde_json::json!({"x": 0, "y": 0}));
        req.jsonrpc = "1.0".to_string();
        let resp = dispatch_request(&daemon.state, req).await;
        assert_eq!(resp.error.expect("error").code, -32600);
    }

    #[tokio::test]
    async fn test_invalid_params() {
        let daemon = testing::daemon(DaemonConfig::default());
        let resp = dispatch_request(
            &daemon.state,
            request("get_chunk_bitmap", serde_json::json!({"x": "zero", "y": 0})),
        )
        .await;
        assert_eq!(resp.error.expect("error").code, -32602);

        let resp = dispatch_request(
            &daemon.state,
            request("get_tile", serde_json::json!({"x": 4_000_000_000_i64, "y": 0})),
        )
        .await;
        assert_eq!(resp.error.expect("error").code, -32602);
    }

    #[tokio::test]
    async fn test_purchase_over_rpc() {
        let daemon = testing::daemon(DaemonConfig::default());
        let resp = dispatch_request(
            &daemon.state,
            request(
                "create_user",
                serde_json::json!({"email": "alice@example.com", "password": "pw"}),
            ),
        )
        .await;
        assert!(resp.error.is_none());
        dispatch_request(
            &daemon.state,
            request(
                "grant_coins",
                serde_json::json!({"email": "alice@example.com", "amount": 15}),
            ),
        )
        .await;

        let buy = serde_json::json!({"user": "alice@example.com", "x": 1, "y": 1});
        let resp = dispatch_request(&daemon.state, request("purchase", buy.clone())).await;
        let tile = resp.result.expect("tile");
        assert_eq!(tile["owner"], "alice@example.com");

        let resp = dispatch_request(&daemon.state, request("purchase", buy)).await;
        assert_eq!(resp.error.expect("error").code, -32050);

        let resp = dispatch_request(
            &daemon.state,
            request("get_user", serde_json::json!({"email": "alice@example.com"})),
        )
        .await;
        assert_eq!(resp.result.expect("user")["coins"], 5);
    }
}
