//! JSON-RPC 2.0 client for the palette server.
//!
//! `PaletteClient` writes framed requests to the server and routes framed
//! responses back to their callers by id. A background task owns the read
//! side; each outstanding call waits on a one-shot slot that is completed by
//! whichever comes first: the matching response, the request timeout, or the
//! transport closing.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::UnixStream;
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::ipc::framing::{write_message, FrameReader};
use crate::ipc::server::GeneratePaletteResult;
use crate::palette::GenerateParams;
use crate::rpc::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, RequestId, METHOD_GENERATE_PALETTE};

/// Default request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(100);
const MAX_CONNECT_RETRY_DELAY: Duration = Duration::from_secs(5);

/// IPC-specific error types.
///
/// Timeouts, transport loss and server-reported errors are distinct variants
/// so callers can tell them apart.
#[derive(Debug, Error)]
pub enum IpcError {
    /// Failed to connect to the server socket or spawn the server.
    #[error("Connection failed: {0}")]
    ConnectionFailed(#[source] std::io::Error),

    /// Request timed out waiting for response.
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The server's output stream closed before a response arrived.
    #[error("Server unavailable: transport closed")]
    TransportClosed,

    /// Protocol-level error (framing, encoding).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Server returned a JSON-RPC error response.
    #[error("Server error {code}: {message}")]
    ServerError {
        /// JSON-RPC error code
        code: i32,
        /// Error message
        message: String,
        /// Optional additional data
        data: Option<serde_json::Value>,
    },
}

impl From<JsonRpcError> for IpcError {
    fn from(err: JsonRpcError) -> Self {
        IpcError::ServerError {
            code: err.code,
            message: err.message,
            data: err.data,
        }
    }
}

/// Resolve the default socket path for the palette server.
///
/// Resolution order:
/// 1. `$XDG_RUNTIME_DIR/colors-rpc.sock` (Linux standard)
/// 2. `~/Library/Caches/colors-rpc.sock` (macOS)
/// 3. `/tmp/colors-rpc.sock` (fallback)
pub fn default_socket_path() -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        return PathBuf::from(runtime_dir).join("colors-rpc.sock");
    }

    if let Some(cache_dir) = dirs::cache_dir() {
        return cache_dir.join("colors-rpc.sock");
    }

    PathBuf::from("/tmp/colors-rpc.sock")
}

type CallResult = Result<serde_json::Value, IpcError>;

/// Outstanding calls keyed by request id.
#[derive(Default)]
struct PendingCalls {
    calls: HashMap<u64, oneshot::Sender<CallResult>>,
    /// Set once the read side is gone; no new calls are accepted.
    closed: bool,
}

type SharedPending = Arc<Mutex<PendingCalls>>;

/// Removes one call's entry when dropped. Ids are never reused, so a late
/// removal cannot touch another call.
struct PendingEntry<'a> {
    pending: &'a SharedPending,
    id: u64,
}

impl Drop for PendingEntry<'_> {
    fn drop(&mut self) {
        lock(self.pending).calls.remove(&self.id);
    }
}

fn lock(pending: &SharedPending) -> MutexGuard<'_, PendingCalls> {
    // A panic while holding the lock cannot leave the map inconsistent.
    pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Client for the palette server.
///
/// # Example
///
/// ```ignore
/// use colors_rpc::ipc::PaletteClient;
/// use colors_rpc::palette::GenerateParams;
///
/// let client = PaletteClient::spawn("colors-server", ["serve"])?;
/// let result = client.generate_palette(&GenerateParams::default()).await?;
/// println!("{}", result.text());
/// ```
pub struct PaletteClient {
    /// Encoded request bodies for the writer task. `None` after shutdown.
    outgoing: Option<mpsc::UnboundedSender<String>>,
    pending: SharedPending,
    /// Monotonically increasing request ID counter.
    request_id: AtomicU64,
    /// Request timeout duration.
    timeout: Duration,
    reader_task: JoinHandle<()>,
    writer_task: JoinHandle<()>,
    /// Reaps the server process, when spawned by this client.
    child_task: Option<JoinHandle<()>>,
}

impl PaletteClient {
    /// Create a client over an existing byte stream pair.
    ///
    /// Must be called within a Tokio runtime: reader and writer tasks are
    /// spawned.
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let pending = SharedPending::default();
        let (outgoing, requests) = mpsc::unbounded_channel();
        let reader_task = tokio::spawn(read_responses(FrameReader::new(reader), Arc::clone(&pending)));
        let writer_task = tokio::spawn(write_requests(writer, requests, Arc::clone(&pending)));

        Self {
            outgoing: Some(outgoing),
            pending,
            request_id: AtomicU64::new(1),
            timeout: DEFAULT_TIMEOUT,
            reader_task,
            writer_task,
            child_task: None,
        }
    }

    /// Spawn a server process and talk to it over its stdin/stdout.
    ///
    /// The server's stderr is inherited. Dropping the client closes the
    /// server's stdin and kills the process.
    ///
    /// # Errors
    ///
    /// Returns `IpcError::ConnectionFailed` if the process cannot be spawned.
    pub fn spawn<I, S>(program: impl AsRef<OsStr>, args: I) -> Result<Self, IpcError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let program = program.as_ref();
        info!("Starting palette server: {}", program.to_string_lossy());

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(IpcError::ConnectionFailed)?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| IpcError::Protocol("Failed to get server stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| IpcError::Protocol("Failed to get server stdout".to_string()))?;

        let mut client = Self::new(stdout, stdin);
        client.child_task = Some(tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => info!("Palette server exited with {}", status),
                Err(e) => warn!("Failed to wait for palette server: {}", e),
            }
        }));
        Ok(client)
    }

    /// Connect to a server started with `serve --socket`.
    ///
    /// # Errors
    ///
    /// Returns `IpcError::ConnectionFailed` when nothing accepts on
    /// `socket_path`.
    pub async fn connect(socket_path: &Path) -> Result<Self, IpcError> {
        let stream = UnixStream::connect(socket_path)
            .await
            .map_err(IpcError::ConnectionFailed)?;
        info!("Connected to palette server at {}", socket_path.display());

        let (read_half, write_half) = stream.into_split();
        Ok(Self::new(read_half, write_half))
    }

    /// Connect to a socket that may not be listening yet.
    ///
    /// Makes `attempts` tries (at least one), sleeping 100ms before the second and
    /// doubling the delay after each failure.
    ///
    /// # Errors
    ///
    /// Returns the last `IpcError::ConnectionFailed` once every attempt has
    /// failed.
    pub async fn connect_with_retry(socket_path: &Path, attempts: u32) -> Result<Self, IpcError> {
        let mut delay = CONNECT_RETRY_DELAY;
        let mut attempt = 1;
        loop {
            match Self::connect(socket_path).await {
                Ok(client) => return Ok(client),
                Err(e) if attempt >= attempts => return Err(e),
                Err(e) => {
                    debug!(
                        "Connecting to {} failed (attempt {}/{}): {}",
                        socket_path.display(),
                        attempt,
                        attempts,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(MAX_CONNECT_RETRY_DELAY);
                    attempt += 1;
                }
            }
        }
    }

    /// Set the request timeout duration.
    ///
    /// Default is 10 seconds.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Number of calls still waiting for a response.
    pub fn pending_count(&self) -> usize {
        lock(&self.pending).calls.len()
    }

    /// Send a JSON-RPC 2.0 request and wait for the response.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Request times out (`IpcError::Timeout`)
    /// - The server went away (`IpcError::TransportClosed`)
    /// - Server returns error (`IpcError::ServerError`)
    /// - The request cannot be encoded or written (`IpcError::Protocol`)
    pub async fn call(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, IpcError> {
        let id = self.next_id();
        let rx = self.register(id)?;
        // Clears the entry however this future ends, including when the
        // caller drops it mid-wait.
        let _entry = PendingEntry {
            pending: &self.pending,
            id,
        };

        let request = JsonRpcRequest::new(method, params, id);
        self.send(&request)?;

        match timeout(self.timeout, rx).await {
            Ok(Ok(result)) => result,
            // Sender dropped without completing: the reader task is gone.
            Ok(Err(_)) => Err(IpcError::TransportClosed),
            Err(_) => {
                warn!("Request {} ({}) timed out after {:?}", id, method, self.timeout);
                Err(IpcError::Timeout(self.timeout))
            }
        }
    }

    /// Call `generatePalette` and decode the typed result.
    ///
    /// # Errors
    ///
    /// Same as [`call`](Self::call), plus `IpcError::Protocol` if the result
    /// does not have the expected shape.
    pub async fn generate_palette(
        &self,
        params: &GenerateParams,
    ) -> Result<GeneratePaletteResult, IpcError> {
        let params = serde_json::to_value(params)
            .map_err(|e| IpcError::Protocol(format!("Failed to serialize params: {}", e)))?;
        let result = self.call(METHOD_GENERATE_PALETTE, params).await?;
        serde_json::from_value(result)
            .map_err(|e| IpcError::Protocol(format!("Failed to parse palette result: {}", e)))
    }

    /// Close the request stream and wait for a spawned server to exit.
    pub async fn shutdown(mut self) {
        // Dropping the sender lets the writer task flush and close the stream.
        self.outgoing.take();
        if let Err(e) = (&mut self.writer_task).await {
            warn!("Writer task ended abnormally: {}", e);
        }
        if let Some(child_task) = self.child_task.take() {
            if let Err(e) = child_task.await {
                warn!("Server wait task ended abnormally: {}", e);
            }
        }
    }

    /// Generate the next request ID.
    fn next_id(&self) -> u64 {
        self.request_id.fetch_add(1, Ordering::Relaxed)
    }

    fn register(&self, id: u64) -> Result<oneshot::Receiver<CallResult>, IpcError> {
        let mut pending = lock(&self.pending);
        if pending.closed {
            return Err(IpcError::TransportClosed);
        }
        let (tx, rx) = oneshot::channel();
        pending.calls.insert(id, tx);
        Ok(rx)
    }

    fn send(&self, request: &JsonRpcRequest) -> Result<(), IpcError> {
        let request_json = serde_json::to_string(request)
            .map_err(|e| IpcError::Protocol(format!("Failed to serialize request: {}", e)))?;

        self.outgoing
            .as_ref()
            .ok_or(IpcError::TransportClosed)?
            .send(request_json)
            .map_err(|_| IpcError::TransportClosed)
    }
}

impl Drop for PaletteClient {
    fn drop(&mut self) {
        self.reader_task.abort();
        // Dropping the owned Child kills it (kill_on_drop).
        if let Some(child_task) = self.child_task.take() {
            child_task.abort();
        }
    }
}

/// Write queued requests until every sender is gone, then close the stream.
///
/// A failed write means the server is unreachable: every pending call fails.
async fn write_requests<W: AsyncWrite + Unpin>(
    mut writer: W,
    mut requests: mpsc::UnboundedReceiver<String>,
    pending: SharedPending,
) {
    while let Some(body) = requests.recv().await {
        if let Err(e) = write_message(&mut writer, &body).await {
            warn!("Failed to write to palette server: {:#}", e);
            fail_all(&pending);
            return;
        }
    }

    if let Err(e) = writer.shutdown().await {
        debug!("Failed to close request stream: {}", e);
    }
}

/// Route responses to pending calls until the stream ends.
async fn read_responses<R: AsyncRead + Unpin>(mut frames: FrameReader<R>, pending: SharedPending) {
    loop {
        let body = match frames.next_message().await {
            Ok(Some(body)) => body,
            Ok(None) => {
                info!("Palette server closed its output stream");
                break;
            }
            Err(e) => {
                warn!("Failed to read from palette server: {:#}", e);
                break;
            }
        };

        let response: JsonRpcResponse = match serde_json::from_str(&body) {
            Ok(response) => response,
            Err(e) => {
                warn!("Failed to parse response body: {}", e);
                continue;
            }
        };

        complete(&pending, response);
    }

    fail_all(&pending);
}

/// Resolve the pending call matching `response`, if any.
fn complete(pending: &SharedPending, response: JsonRpcResponse) {
    let sender = match &response.id {
        Some(RequestId::Number(n)) => n.as_u64().and_then(|id| lock(pending).calls.remove(&id)),
        _ => None,
    };

    let Some(sender) = sender else {
        warn!(
            "Ignoring response with unmatched id {}",
            response
                .id
                .as_ref()
                .map_or_else(|| "null".to_string(), RequestId::to_string)
        );
        return;
    };

    let result = match (response.error, response.result) {
        (Some(error), _) => Err(IpcError::from(error)),
        (None, Some(result)) => Ok(result),
        (None, None) => Err(IpcError::Protocol(
            "Response missing both result and error".to_string(),
        )),
    };

    // The caller may have stopped waiting; nothing to do then.
    let _ = sender.send(result);
}

/// Fail every outstanding call and refuse new ones.
fn fail_all(pending: &SharedPending) {
    let drained: Vec<_> = {
        let mut pending = lock(pending);
        pending.closed = true;
        pending.calls.drain().collect()
    };

    if !drained.is_empty() {
        warn!("Failing {} pending call(s): transport closed", drained.len());
    }
    for (_, sender) in drained {
        let _ = sender.send(Err(IpcError::TransportClosed));
    }
}
