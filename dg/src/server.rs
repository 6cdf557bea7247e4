//! Tool protocol server
//!
//! Line-oriented JSON over a Unix domain socket. Each request line is
//! `{"id"?, "tool", "args"?}`; each response line is the tool envelope with
//! the request id echoed back. `list_tools` is answered by the server itself
//! for schema introspection.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use eyre::{Context, Result};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::context::AppContext;
use crate::errors::ToolError;
use crate::tools::ToolRouter;

/// Maximum request line size
const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// One protocol request
#[derive(Debug, Deserialize)]
pub struct ToolRequest {
    #[serde(default)]
    pub id: Option<Value>,
    pub tool: String,
    #[serde(default)]
    pub args: Value,
}

/// Create and bind the protocol socket, cleaning up stale files
pub fn create_listener_at(socket_path: &Path) -> Result<(UnixListener, PathBuf)> {
    debug!(?socket_path, "create_listener: creating protocol socket");

    if let Some(parent) = socket_path.parent() {
        std::fs::create_dir_all(parent).context("Failed to create socket directory")?;
    }

    if socket_path.exists() {
        debug!(?socket_path, "create_listener: removing stale socket");
        std::fs::remove_file(socket_path).context("Failed to remove stale socket")?;
    }

    let listener = UnixListener::bind(socket_path).context("Failed to bind protocol socket")?;
    debug!(?socket_path, "create_listener: socket bound");

    Ok((listener, socket_path.to_path_buf()))
}

/// Remove the socket file on shutdown
pub fn cleanup_socket(socket_path: &Path) {
    if socket_path.exists()
        && let Err(e) = std::fs::remove_file(socket_path)
    {
        warn!(?socket_path, error = %e, "Failed to remove socket file");
    }
}

/// Accept connections until shutdown fires
pub async fn serve(
    listener: UnixListener,
    ctx: Arc<AppContext>,
    router: Arc<ToolRouter>,
    shutdown: CancellationToken,
) -> Result<()> {
    info!("Tool protocol server started");

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, _) = accepted.context("Failed to accept connection")?;
                let ctx = ctx.clone();
                let router = router.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, ctx, router, shutdown).await {
                        debug!(error = %e, "Connection closed with error");
                    }
                });
            }
            _ = shutdown.cancelled() => {
                info!("Tool protocol server stopping");
                return Ok(());
            }
        }
    }
}

async fn handle_connection(
    stream: UnixStream,
    ctx: Arc<AppContext>,
    router: Arc<ToolRouter>,
    shutdown: CancellationToken,
) -> Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = tokio::select! {
            read = reader.read_line(&mut line) => read.context("Failed to read request")?,
            _ = shutdown.cancelled() => return Ok(()),
        };

        if bytes_read == 0 {
            return Ok(()); // EOF
        }
        if bytes_read > MAX_MESSAGE_SIZE {
            let response = ToolError::invalid_params(
                format!("Request too large: {} bytes", bytes_read),
                "request",
                &format!("line under {} bytes", MAX_MESSAGE_SIZE),
            )
            .to_envelope();
            write_response(&mut write_half, response).await?;
            continue;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<ToolRequest>(trimmed) {
            Ok(request) => {
                debug!(tool = %request.tool, "Request received");
                let mut envelope = dispatch(&request, &ctx, &router).await;
                if let Some(id) = request.id {
                    envelope["id"] = id;
                }
                envelope
            }
            Err(e) => ToolError::invalid_params(
                format!("Malformed request: {}", e),
                "request",
                "JSON object with a 'tool' field",
            )
            .to_envelope(),
        };

        write_response(&mut write_half, response).await?;
    }
}

async fn dispatch(request: &ToolRequest, ctx: &AppContext, router: &ToolRouter) -> Value {
    if request.tool == "list_tools" {
        return json!({"ok": true, "tools": router.describe_tools()});
    }
    router.dispatch(&request.tool, request.args.clone(), ctx).await
}

async fn write_response(
    write_half: &mut tokio::net::unix::OwnedWriteHalf,
    response: Value,
) -> Result<()> {
    let response_json = serde_json::to_string(&response).context("Failed to serialize response")?;
    write_half.write_all(response_json.as_bytes()).await.context("Failed to write response")?;
    write_half.write_all(b"\n").await.context("Failed to write newline")?;
    write_half.flush().await.context("Failed to flush response")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaRegistry;
    use tempfile::TempDir;

    struct TestServer {
        socket_path: PathBuf,
        shutdown: CancellationToken,
        _temp: TempDir,
    }

    async fn start_server() -> TestServer {
        let temp = TempDir::new().unwrap();
        let socket_path = temp.path().join("dredge.sock");

        let ctx = Arc::new(AppContext::in_memory().unwrap());
        let router = Arc::new(ToolRouter::standard(Arc::new(SchemaRegistry::load().unwrap())));
        let (listener, _) = create_listener_at(&socket_path).unwrap();
        let shutdown = CancellationToken::new();

        let serve_shutdown = shutdown.clone();
        tokio::spawn(async move {
            serve(listener, ctx, router, serve_shutdown).await.unwrap();
        });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        TestServer {
            socket_path,
            shutdown,
            _temp: temp,
        }
    }

    async fn roundtrip(stream: &mut UnixStream, request: Value) -> Value {
        let line = serde_json::to_string(&request).unwrap();
        stream.write_all(line.as_bytes()).await.unwrap();
        stream.write_all(b"\n").await.unwrap();

        let mut reader = BufReader::new(stream);
        let mut response = String::new();
        reader.read_line(&mut response).await.unwrap();
        serde_json::from_str(&response).unwrap()
    }

    #[tokio::test]
    async fn test_end_to_end_create_and_status() {
        let server = start_server().await;
        let mut stream = UnixStream::connect(&server.socket_path).await.unwrap();

        let created = roundtrip(
            &mut stream,
            json!({"id": 1, "tool": "create_task", "args": {"query": "caffeine effects"}}),
        )
        .await;
        assert_eq!(created["ok"], true);
        assert_eq!(created["id"], 1);
        let task_id = created["task_id"].as_str().unwrap().to_string();

        // The same connection carries subsequent requests
        let status = roundtrip(
            &mut stream,
            json!({"id": 2, "tool": "get_status", "args": {"task_id": task_id, "wait": 0}}),
        )
        .await;
        assert_eq!(status["ok"], true);
        assert_eq!(status["status"], "created");
        assert_eq!(status["progress"]["queue"]["depth"], 0);

        server.shutdown.cancel();
    }

    #[tokio::test]
    async fn test_malformed_request_is_invalid_params() {
        let server = start_server().await;
        let mut stream = UnixStream::connect(&server.socket_path).await.unwrap();

        stream.write_all(b"this is not json\n").await.unwrap();
        let mut reader = BufReader::new(&mut stream);
        let mut response = String::new();
        reader.read_line(&mut response).await.unwrap();
        let envelope: Value = serde_json::from_str(&response).unwrap();

        assert_eq!(envelope["ok"], false);
        assert_eq!(envelope["error_code"], "INVALID_PARAMS");
        assert!(envelope["error"].as_str().unwrap().contains("Malformed request"));

        server.shutdown.cancel();
    }

    #[tokio::test]
    async fn test_list_tools_introspection() {
        let server = start_server().await;
        let mut stream = UnixStream::connect(&server.socket_path).await.unwrap();

        let listed = roundtrip(&mut stream, json!({"tool": "list_tools"})).await;
        assert_eq!(listed["ok"], true);
        let tools = listed["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 13);
        assert!(tools.iter().any(|t| t["name"] == "queue_targets"));

        server.shutdown.cancel();
    }

    #[tokio::test]
    async fn test_stale_socket_is_replaced() {
        let temp = TempDir::new().unwrap();
        let socket_path = temp.path().join("dredge.sock");
        std::fs::write(&socket_path, "stale").unwrap();

        let result = create_listener_at(&socket_path);
        assert!(result.is_ok());
    }

    #[test]
    fn test_cleanup_socket_tolerates_missing_file() {
        let temp = TempDir::new().unwrap();
        cleanup_socket(&temp.path().join("nonexistent.sock"));
    }
}
