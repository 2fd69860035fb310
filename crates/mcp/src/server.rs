//! MCP server management (spawn, communicate, lifecycle).

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;

use futures::StreamExt;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::protocol::{
    CallToolParams, CallToolResult, InitializeParams, InitializeResult, JsonRpcNotification,
    JsonRpcRequest, JsonRpcResponse, ListToolsResult, RequestId, Tool,
};

/// Default timeout for the handshake and discovery requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// How long `shutdown` waits for the process to exit after closing stdin.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Maximum output size (1MB).
/// Sized for large tool outputs (file reads, search results).
pub const MAX_OUTPUT_SIZE: usize = 1024 * 1024;

/// Configuration for an MCP server.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServerConfig {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

/// The duplex pipe to the server. Held for a whole request/response
/// exchange so concurrent callers never interleave bytes.
///
/// A partly read line stays buffered in the codec, so an exchange dropped
/// mid-read leaves the stream framed for the next one.
struct Channel {
    stdin: ChildStdin,
    stdout: FramedRead<ChildStdout, LinesCodec>,
    /// Set for the duration of a write. Still set afterwards means the
    /// write was cut off and the server saw a partial request.
    torn: bool,
}

impl Channel {
    fn new(stdin: ChildStdin, stdout: ChildStdout) -> Self {
        Self {
            stdin,
            stdout: FramedRead::new(stdout, LinesCodec::new_with_max_length(MAX_OUTPUT_SIZE)),
            torn: false,
        }
    }

    async fn send(&mut self, message: &str) -> Result<()> {
        if self.torn {
            return Err(Error::Desynchronized);
        }
        let mut frame = String::with_capacity(message.len() + 1);
        frame.push_str(message);
        frame.push('\n');

        self.torn = true;
        self.stdin.write_all(frame.as_bytes()).await?;
        self.stdin.flush().await?;
        self.torn = false;
        Ok(())
    }

    /// Read lines until the response for `id` arrives.
    async fn recv(&mut self, server: &str, id: &RequestId) -> Result<JsonRpcResponse> {
        loop {
            let line = match self.stdout.next().await {
                None => return Err(Error::ServerExited),
                Some(Ok(line)) => line,
                Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                    return Err(Error::OutputTooLarge {
                        max: MAX_OUTPUT_SIZE,
                    });
                }
                Some(Err(LinesCodecError::Io(e))) => return Err(e.into()),
            };

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let message: JsonRpcResponse = serde_json::from_str(trimmed)?;
            if !message.is_response() {
                debug!(server, method = ?message.method, "skipping server-initiated message");
                continue;
            }
            if message.id.as_ref() != Some(id) {
                // A reply to a request whose caller gave up (timed out).
                warn!(server, expected = ?id, got = ?message.id, "discarding stale response");
                continue;
            }
            return Ok(message);
        }
    }
}

/// Handle to a running MCP server.
pub struct Server {
    config: ServerConfig,
    process: Mutex<Child>,
    channel: Mutex<Channel>,
    next_id: AtomicI64,
    initialized: AtomicBool,
}

impl Server {
    /// Spawn a new MCP server process.
    pub async fn spawn(config: ServerConfig) -> Result<Self> {
        let mut cmd = Command::new(&config.command);
        cmd.args(&config.args)
            .envs(&config.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut process = cmd.spawn().map_err(Error::Spawn)?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| Error::Spawn(std::io::Error::other("failed to capture stdin")))?;

        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| Error::Spawn(std::io::Error::other("failed to capture stdout")))?;

        debug!(server = %config.name, pid = ?process.id(), "spawned MCP server");

        Ok(Self {
            config,
            process: Mutex::new(process),
            channel: Mutex::new(Channel::new(stdin, stdout)),
            next_id: AtomicI64::new(1),
            initialized: AtomicBool::new(false),
        })
    }

    /// Get the server name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Perform the `initialize` handshake (must be called before other operations).
    pub async fn initialize(&self, limit: Duration) -> Result<InitializeResult> {
        let result: InitializeResult = self
            .request("initialize", Some(InitializeParams::default()), Some(limit))
            .await?;

        self.notify(JsonRpcNotification::new("notifications/initialized"))
            .await?;

        debug!(
            server = %self.config.name,
            remote = %result.server_info.name,
            protocol = %result.protocol_version,
            "MCP handshake complete"
        );

        self.initialized.store(true, Ordering::SeqCst);
        Ok(result)
    }

    /// Check if the server is initialized.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Fetch the server's tools, in the order it declares them.
    pub async fn list_tools(&self, limit: Duration) -> Result<Vec<Tool>> {
        self.ensure_initialized()?;
        let result: ListToolsResult = self
            .request("tools/list", None::<()>, Some(limit))
            .await?;
        Ok(result.tools)
    }

    /// Call a tool by name.
    ///
    /// Not bounded by a timeout here; callers wrap it in their own.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> Result<CallToolResult> {
        self.ensure_initialized()?;

        let params = CallToolParams {
            name: name.to_string(),
            arguments,
        };

        let result: CallToolResult = self.request("tools/call", Some(params), None).await?;

        if result.is_error {
            let error_text = result
                .content
                .iter()
                .filter_map(|c| c.as_text())
                .collect::<Vec<_>>()
                .join("\n");
            return Err(Error::ToolCallFailed(error_text));
        }

        Ok(result)
    }

    /// Check if the server process is still running.
    pub async fn is_running(&self) -> bool {
        let mut process = self.process.lock().await;
        matches!(process.try_wait(), Ok(None))
    }

    /// Shut the server down: close its stdin, give it a moment to exit,
    /// then kill it.
    pub async fn shutdown(self) -> Result<()> {
        let Self {
            config,
            process,
            channel,
            ..
        } = self;

        drop(channel.into_inner());
        let mut process = process.into_inner();

        match timeout(SHUTDOWN_GRACE, process.wait()).await {
            Ok(Ok(status)) => {
                debug!(server = %config.name, %status, "MCP server exited");
            }
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                warn!(server = %config.name, "MCP server did not exit, killing it");
                process.kill().await?;
            }
        }

        Ok(())
    }

    // --- Internal methods ---

    fn ensure_initialized(&self) -> Result<()> {
        if self.is_initialized() {
            Ok(())
        } else {
            Err(Error::NotInitialized)
        }
    }

    fn next_request_id(&self) -> RequestId {
        RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn request<P, R>(
        &self,
        method: &str,
        params: Option<P>,
        limit: Option<Duration>,
    ) -> Result<R>
    where
        P: serde::Serialize,
        R: serde::de::DeserializeOwned,
    {
        let id = self.next_request_id();
        let mut request = JsonRpcRequest::new(id.clone(), method);
        if let Some(p) = params {
            request = request.with_params(p)?;
        }
        let request_json = serde_json::to_string(&request)?;

        let mut channel = self.channel.lock().await;
        let exchange = async {
            channel.send(&request_json).await?;
            channel.recv(&self.config.name, &id).await
        };

        let response = match limit {
            Some(limit) => timeout(limit, exchange)
                .await
                .map_err(|_| Error::Timeout)??,
            None => exchange.await?,
        };

        let result_value = response.into_result()?;
        let result: R = serde_json::from_value(result_value)?;

        Ok(result)
    }

    async fn notify(&self, notification: JsonRpcNotification) -> Result<()> {
        let notification_json = serde_json::to_string(&notification)?;
        self.channel.lock().await.send(&notification_json).await
    }
}
