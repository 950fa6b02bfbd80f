//! Tracing subscriber setup.
//!
//! Logs go to stderr: when serving over stdio, stdout carries protocol frames.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when neither `RUST_LOG` nor the config file sets one.
///
/// Covers the library target and the `colors-server` binary target.
pub const DEFAULT_FILTER: &str = "colors_rpc=info,colors_server=info";

/// Build the filter: `RUST_LOG`, then `configured`, then [`DEFAULT_FILTER`].
pub fn build_filter(configured: Option<&str>) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        configured
            .and_then(|directive| EnvFilter::try_new(directive).ok())
            .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
    })
}

/// Install the global subscriber. Later calls are ignored.
pub fn init(configured: Option<&str>) {
    let _ = tracing_subscriber::registry()
        .with(build_filter(configured))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::filter::LevelFilter;

    #[test]
    fn test_default_filter_covers_library_and_binary() {
        let directives: Vec<&str> = DEFAULT_FILTER.split(',').collect();
        assert!(directives.contains(&"colors_rpc=info"));
        assert!(directives.contains(&"colors_server=info"));
        assert!(EnvFilter::try_new(DEFAULT_FILTER).is_ok());
    }

    #[test]
    fn test_configured_filter_is_used() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let filter = build_filter(Some("colors_rpc=debug"));
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::DEBUG));

        // An invalid directive falls back to the default.
        let filter = build_filter(Some("colors_rpc=loud"));
        assert_eq!(filter.max_level_hint(), Some(LevelFilter::INFO));
    }
}
