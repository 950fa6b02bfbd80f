//! Server side of the palette protocol.
//!
//! [`Dispatcher`] turns one decoded message body into at most one response.
//! [`serve`] drives it over any async byte stream pair (stdio in the binary);
//! [`serve_socket`] accepts Unix socket connections, one decoder per stream.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::UnixListener;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::ipc::framing::{write_message, FrameDecoder, FrameReader};
use crate::palette::{generate_palette, GenerateParams, PaletteResult};
use crate::rpc::{
    JsonRpcRequest, JsonRpcResponse, RequestId, METHOD_GENERATE_PALETTE, METHOD_NOT_FOUND,
    SERVER_ERROR,
};

/// One segment of displayable result content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

/// Result payload of `generatePalette`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratePaletteResult {
    pub content: Vec<ContentItem>,
    pub palette: PaletteResult,
}

impl GeneratePaletteResult {
    pub fn new(palette: PaletteResult) -> Self {
        Self {
            content: vec![ContentItem {
                kind: "text".to_string(),
                text: palette.formats.css_vars.clone(),
            }],
            palette,
        }
    }

    /// Concatenation of every `text` segment.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter(|c| c.kind == "text")
            .map(|c| c.text.as_str())
            .collect()
    }
}

/// Routes request envelopes to the palette engine.
#[derive(Debug, Default, Clone, Copy)]
pub struct Dispatcher;

impl Dispatcher {
    pub fn new() -> Self {
        Self
    }

    /// Handle one message body.
    ///
    /// Returns `None` when no response must be sent: the body is not a
    /// parseable envelope, or it carries no method (a notification).
    pub fn handle_message(&self, body: &str) -> Option<JsonRpcResponse> {
        let request: JsonRpcRequest = match serde_json::from_str(body) {
            Ok(request) => request,
            Err(e) => {
                warn!("Dropping unparseable request envelope: {}", e);
                return None;
            }
        };

        let Some(method) = request.method.as_deref() else {
            debug!("Ignoring envelope without method");
            return None;
        };

        debug!(
            "Request id={} method={}",
            request.id.as_ref().map_or_else(|| "null".to_string(), RequestId::to_string),
            method
        );

        let response = match method {
            METHOD_GENERATE_PALETTE => match self.generate(request.params) {
                Ok(result) => JsonRpcResponse::success(request.id, result),
                Err(e) => {
                    error!("generatePalette failed: {:#}", e);
                    JsonRpcResponse::failure(request.id, SERVER_ERROR, e.to_string())
                }
            },
            other => JsonRpcResponse::failure(
                request.id,
                METHOD_NOT_FOUND,
                format!("Method not found: {}", other),
            ),
        };
        Some(response)
    }

    fn generate(&self, params: Option<serde_json::Value>) -> Result<serde_json::Value> {
        let params: GenerateParams = match params {
            None | Some(serde_json::Value::Null) => GenerateParams::default(),
            Some(value) => serde_json::from_value(value)?,
        };

        let result = GeneratePaletteResult::new(generate_palette(&params));
        Ok(serde_json::to_value(result)?)
    }
}

/// Serve requests from `reader`, writing responses to `writer`, until EOF.
///
/// # Errors
///
/// Returns an error if reading from or writing to the stream fails.
pub async fn serve<R, W>(reader: R, mut writer: W, config: &ServerConfig) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let dispatcher = Dispatcher::new();
    let mut frames =
        FrameReader::with_decoder(reader, FrameDecoder::with_max_size(config.max_message_size));

    while let Some(body) = frames.next_message().await? {
        let Some(response) = dispatcher.handle_message(&body) else {
            continue;
        };

        let json = serde_json::to_string(&response).context("Failed to serialize response")?;
        write_message(&mut writer, &json).await?;
    }

    info!("Input stream closed; stopping server");
    Ok(())
}

/// Listen on a Unix domain socket and serve each connection independently.
///
/// A stale socket file at `path` is removed before binding.
///
/// # Errors
///
/// Returns an error if the socket cannot be bound or accepting fails.
pub async fn serve_socket(path: &Path, config: &ServerConfig) -> Result<()> {
    if path.exists() {
        std::fs::remove_file(path)
            .with_context(|| format!("Failed to remove stale socket {}", path.display()))?;
    }

    let listener = UnixListener::bind(path)
        .with_context(|| format!("Failed to bind socket {}", path.display()))?;
    info!("Listening on {}", path.display());

    loop {
        let (stream, _) = listener.accept().await.context("Failed to accept connection")?;
        let config = config.clone();
        tokio::spawn(async move {
            let (read_half, write_half) = stream.into_split();
            debug!("Client connected");
            if let Err(e) = serve(read_half, write_half, &config).await {
                warn!("Connection ended with error: {:#}", e);
            }
        });
    }
}
