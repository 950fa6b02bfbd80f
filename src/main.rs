//! colors-server - palette generation over Content-Length framed JSON-RPC.
//!
//! `serve` (the default) answers requests on stdin/stdout or a Unix socket.
//! `generate` runs the palette engine locally; `call` spawns a server (or
//! connects to a socket server) and sends it one `generatePalette` request.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use colors_rpc::config::Config;
use colors_rpc::ipc::{self, PaletteClient};
use colors_rpc::logging;
use colors_rpc::palette::{generate_palette, GenerateParams, Seed};

/// Connection attempts for `call --socket`.
const CONNECT_ATTEMPTS: u32 = 5;

#[derive(Parser, Debug)]
#[command(name = "colors-server", version)]
#[command(about = "Deterministic tonal color palettes over JSON-RPC")]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve requests on stdin/stdout (default) or a Unix socket
    Serve {
        /// Listen on a Unix socket instead of stdio
        #[arg(long, num_args = 0..=1, default_missing_value = "")]
        socket: Option<PathBuf>,
    },
    /// Generate a palette locally and print it
    Generate {
        #[command(flatten)]
        palette: PaletteArgs,

        /// Output format
        #[arg(long, value_enum, default_value_t = Format::Css)]
        format: Format,
    },
    /// Request a palette from a server and print its text content
    Call {
        /// Server program to spawn (defaults to this executable with `serve`)
        #[arg(long, conflicts_with = "socket")]
        server: Option<PathBuf>,

        /// Connect to a running `serve --socket` server instead of spawning one
        #[arg(long, num_args = 0..=1, default_missing_value = "")]
        socket: Option<PathBuf>,

        #[command(flatten)]
        palette: PaletteArgs,
    },
}

#[derive(clap::Args, Debug)]
struct PaletteArgs {
    /// Seed colors for primary, secondary, accent (repeatable)
    #[arg(long)]
    seed: Vec<String>,

    /// Number of shades per token
    #[arg(long)]
    shades: Option<usize>,

    /// Theme name
    #[arg(long)]
    theme: Option<String>,

    /// Mark the palette as dark
    #[arg(long)]
    dark: bool,

    /// Attach contrast and WCAG flags to every shade
    #[arg(long)]
    accessibility: bool,
}

impl PaletteArgs {
    fn to_params(&self) -> GenerateParams {
        GenerateParams {
            theme: self.theme.clone(),
            seed: (!self.seed.is_empty()).then(|| Seed::Many(self.seed.clone())),
            shades: self.shades,
            dark: self.dark.then_some(true),
            include_accessibility: self.accessibility.then_some(true),
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Format {
    Css,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    logging::init(config.log.filter.as_deref());
    tracing::debug!("Starting colors-server v{}", env!("CARGO_PKG_VERSION"));

    match cli.command.unwrap_or(Commands::Serve { socket: None }) {
        Commands::Serve { socket: None } => {
            tracing::info!("Serving on stdio");
            ipc::serve(tokio::io::stdin(), tokio::io::stdout(), &config.server).await
        }
        Commands::Serve { socket: Some(path) } => {
            ipc::serve_socket(&socket_path(path), &config.server).await
        }
        Commands::Generate { palette, format } => {
            let result = generate_palette(&palette.to_params());
            match format {
                Format::Css => println!("{}", result.formats.css_vars),
                Format::Json => println!("{}", serde_json::to_string_pretty(&result)?),
            }
            Ok(())
        }
        Commands::Call {
            server,
            socket,
            palette,
        } => call(server, socket, cli.config.as_deref(), &palette, &config).await,
    }
}

/// An empty `--socket` value means the default socket path.
fn socket_path(path: PathBuf) -> PathBuf {
    if path.as_os_str().is_empty() {
        ipc::default_socket_path()
    } else {
        path
    }
}

async fn call(
    server: Option<PathBuf>,
    socket: Option<PathBuf>,
    config_path: Option<&Path>,
    palette: &PaletteArgs,
    config: &Config,
) -> Result<()> {
    let mut client = match (server, socket) {
        (_, Some(path)) => {
            let path = socket_path(path);
            PaletteClient::connect_with_retry(&path, CONNECT_ATTEMPTS)
                .await
                .with_context(|| format!("Failed to connect to {}", path.display()))?
        }
        (Some(program), None) => PaletteClient::spawn(program, std::iter::empty::<&str>())?,
        (None, None) => {
            // The child inherits COLORS_RPC_CONFIG; an explicit --config is forwarded.
            let exe = std::env::current_exe().context("Failed to locate current executable")?;
            let mut args: Vec<OsString> = Vec::new();
            if let Some(path) = config_path {
                args.push("--config".into());
                args.push(path.as_os_str().to_owned());
            }
            args.push("serve".into());
            PaletteClient::spawn(exe, args)?
        }
    };
    client.set_timeout(config.client.request_timeout());

    let result = client
        .generate_palette(&palette.to_params())
        .await
        .context("generatePalette request failed")?;
    println!("{}", result.text());

    client.shutdown().await;
    Ok(())
}
