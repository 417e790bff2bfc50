// Keypool — Unix Domain Socket Server
//
// Listens on a Unix domain socket for JSON-RPC 2.0 requests from local
// processes. Each connection is handled in a spawned tokio task; every
// task shares the same `Arc<Gateway>`, so pool state and telemetry are
// process-wide.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

use crate::gateway::{Gateway, RequestOptions};

use super::error::RpcError;
use super::protocol::{
    JsonRpcRequest, JsonRpcResponse, GATEWAY_FAILURE, INTERNAL_ERROR, INVALID_PARAMS,
    INVALID_REQUEST, METHOD_NOT_FOUND,
};

/// Socket front end for a shared gateway.
pub struct RpcServer {
    gateway: Arc<Gateway>,
    socket_path: PathBuf,
}

impl RpcServer {
    pub fn new(gateway: Arc<Gateway>, socket_path: PathBuf) -> Self {
        Self {
            gateway,
            socket_path,
        }
    }

    /// Default socket path: `$XDG_RUNTIME_DIR/keypool/keypool.sock`
    /// Falls back to `/tmp/keypool/keypool.sock`.
    pub fn default_socket_path() -> PathBuf {
        let runtime_dir = std::env::var("XDG_RUNTIME_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"));
        runtime_dir.join("keypool").join("keypool.sock")
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Serve until `shutdown` resolves, then remove the socket file.
    pub async fn run<F>(&self, shutdown: F) -> Result<(), RpcError>
    where
        F: Future<Output = ()>,
    {
        if let Some(parent) = self.socket_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Remove stale socket file if it exists
        if self.socket_path.exists() {
            tokio::fs::remove_file(&self.socket_path).await?;
        }

        let listener = UnixListener::bind(&self.socket_path)?;

        // Owner-only access
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&self.socket_path, perms)?;
        }

        tracing::info!(
            socket = %self.socket_path.display(),
            "Keypool RPC server listening"
        );

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, _addr)) => {
                        let gateway = Arc::clone(&self.gateway);
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, gateway).await {
                                tracing::error!("Connection handler error: {}", e);
                            }
                        });
                    }
                    Err(e) => tracing::warn!("Accept failed: {}", e),
                },
                _ = &mut shutdown => {
                    tracing::info!("Shutting down RPC server");
                    break;
                }
            }
        }

        if let Err(e) = tokio::fs::remove_file(&self.socket_path).await {
            tracing::warn!(socket = %self.socket_path.display(), "Could not remove socket: {}", e);
        }
        Ok(())
    }
}

/// Read newline-delimited requests from one client and answer each in order.
async fn handle_connection(stream: UnixStream, gateway: Arc<Gateway>) -> Result<(), RpcError> {
    match stream.peer_cred() {
        Ok(cred) => tracing::debug!(pid = ?cred.pid(), uid = cred.uid(), "Client connected"),
        Err(e) => tracing::debug!("Peer credentials unavailable: {}", e),
    }

    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = process_request(&line, &gateway).await;
        let mut json = serde_json::to_string(&response)?;
        json.push('\n');
        writer.write_all(json.as_bytes()).await?;
        writer.flush().await?;
    }

    Ok(())
}

/// Parse and dispatch a single JSON-RPC request.
pub async fn process_request(raw: &str, gateway: &Gateway) -> JsonRpcResponse {
    let request: JsonRpcRequest = match serde_json::from_str(raw) {
        Ok(req) => req,
        Err(e) => return JsonRpcResponse::parse_error(format!("Parse error: {}", e)),
    };

    if let Err(e) = request.validate() {
        return JsonRpcResponse::error(request.id, INVALID_REQUEST, e);
    }

    tracing::debug!(method = %request.method, "RPC call");
    match request.method.as_str() {
        "complete" => handle_complete(gateway, request).await,
        "status" => handle_status(gateway, request.id),
        "reset" => handle_reset(gateway, request),
        "disable" => handle_disable(gateway, request),
        _ => {
            let message = format!("Unknown method: {}", request.method);
            JsonRpcResponse::error(request.id, METHOD_NOT_FOUND, message)
        }
    }
}

// ─── Method Handlers ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CompleteParams {
    prompt: String,
    #[serde(flatten)]
    options: RequestOptions,
}

#[derive(Debug, Deserialize)]
struct ResetParams {
    #[serde(default)]
    identity: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DisableParams {
    identity: String,
}

async fn handle_complete(gateway: &Gateway, request: JsonRpcRequest) -> JsonRpcResponse {
    let params: CompleteParams = match request.params_as() {
        Ok(p) => p,
        Err(e) => return JsonRpcResponse::error(request.id, INVALID_PARAMS, e),
    };
    if params.prompt.trim().is_empty() {
        return JsonRpcResponse::error(request.id, INVALID_PARAMS, "'prompt' must not be empty");
    }

    match gateway.request(&params.prompt, &params.options).await {
        Ok(body) => JsonRpcResponse::success(request.id, Value::Object(body)),
        Err(failure) => JsonRpcResponse::error(request.id, GATEWAY_FAILURE, failure.to_string())
            .with_data(serde_json::json!({ "attempts": failure.attempts() })),
    }
}

fn handle_status(gateway: &Gateway, id: Value) -> JsonRpcResponse {
    match serde_json::to_value(gateway.status()) {
        Ok(status) => JsonRpcResponse::success(id, status),
        Err(e) => JsonRpcResponse::error(id, INTERNAL_ERROR, format!("{}", e)),
    }
}

fn handle_reset(gateway: &Gateway, request: JsonRpcRequest) -> JsonRpcResponse {
    let params: ResetParams = match request.params_as() {
        Ok(p) => p,
        Err(e) => return JsonRpcResponse::error(request.id, INVALID_PARAMS, e),
    };
    let reset = gateway.reset(params.identity.as_deref());
    tracing::info!(identity = ?params.identity, reset, "Reset requested over RPC");
    JsonRpcResponse::success(request.id, serde_json::json!({ "reset": reset }))
}

fn handle_disable(gateway: &Gateway, request: JsonRpcRequest) -> JsonRpcResponse {
    let params: DisableParams = match request.params_as() {
        Ok(p) => p,
        Err(e) => return JsonRpcResponse::error(request.id, INVALID_PARAMS, e),
    };
    let disabled = gateway.disable(&params.identity);
    tracing::info!(identity = %params.identity, disabled, "Disable requested over RPC");
    JsonRpcResponse::success(request.id, serde_json::json!({ "disabled": disabled }))
}

// ─── Tests ───────────────────────────────────────────────────────────────────
