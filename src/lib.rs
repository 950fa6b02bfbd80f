//! Colors RPC Library
//!
//! Deterministic color palettes and the protocol that serves them:
//!
//! - `color` - hex parsing, WCAG relative luminance and contrast ratio
//! - `scale` - white → seed → black tonal scales
//! - `palette` - semantic tokens, accessibility metadata, CSS rendering
//! - `rpc` - JSON-RPC 2.0 envelope types
//! - `ipc` - Content-Length framing, request dispatcher and client
//! - `config` / `logging` - ambient setup for the `colors-server` binary
//!
//! # Example
//!
//! ```
//! use colors_rpc::palette::{generate_palette, GenerateParams};
//!
//! let palette = generate_palette(&GenerateParams::default());
//! assert_eq!(palette.tokens.len(), 7);
//! assert!(palette.formats.css_vars.contains("--primary-500:"));
//! ```

pub mod color;
pub mod config;
pub mod ipc;
pub mod logging;
pub mod palette;
pub mod rpc;
pub mod scale;
