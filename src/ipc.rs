//! Framed JSON-RPC transport for the palette engine.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐      pipe or Unix socket      ┌─────────────────────┐
//! │  PaletteClient  │  ◄──────────────────────────► │  colors-server      │
//! │ (pending calls) │    JSON-RPC 2.0 + framing     │  (Dispatcher)       │
//! └─────────────────┘                               └─────────────────────┘
//! ```
//!
//! # Protocol
//!
//! Messages use HTTP-style Content-Length framing (same as LSP):
//!
//! ```text
//! Content-Length: 50\r\n
//! \r\n
//! {"jsonrpc":"2.0","method":"generatePalette","id":1}
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use colors_rpc::ipc::PaletteClient;
//! use serde_json::json;
//!
//! let client = PaletteClient::spawn("colors-server", ["serve"])?;
//! let result = client.call("generatePalette", json!({"seed": "#3B82F6"})).await?;
//! ```

mod client;
mod framing;
mod server;

pub use client::{default_socket_path, IpcError, PaletteClient, DEFAULT_TIMEOUT};
pub use framing::{
    encode_message, write_message, FrameDecoder, FrameReader, MAX_MESSAGE_SIZE,
};
pub use server::{serve, serve_socket, ContentItem, Dispatcher, GeneratePaletteResult};
