use anyhow::Result;
use std::io;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const DEFAULT_FILTER: &str = "info";

/// Picks the filter from `--log-level`, then `RUST_LOG`, then `info`.
/// An unparsable directive falls back to the default.
pub fn build_filter(level: Option<&str>) -> EnvFilter {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level).ok(),
        None => EnvFilter::try_from_default_env().ok(),
    };
    filter.unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}

/// Installs the global subscriber writing to stderr.
pub fn init_logging(level: Option<&str>) -> Result<()> {
    tracing_subscriber::registry()
        .with(build_filter(level))
        .with(fmt::layer().with_writer(io::stderr).with_target(false))
        .try_init()?;
    info!("logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_level_wins() {
        assert_eq!(build_filter(Some("debug")).to_string(), "debug");
        assert_eq!(build_filter(Some("expat=trace")).to_string(), "expat=trace");
    }

    #[test]
    fn test_missing_level_uses_rust_log_or_default() {
        let expected = match std::env::var("RUST_LOG") {
            Ok(v) => EnvFilter::try_new(v)
                .map(|f| f.to_string())
                .unwrap_or_else(|_| DEFAULT_FILTER.to_string()),
            Err(_) => DEFAULT_FILTER.to_string(),
        };
        assert_eq!(build_filter(None).to_string(), expected);
    }

    #[test]
    fn test_invalid_level_falls_back() {
        assert_eq!(build_filter(Some("expat=loud")).to_string(), DEFAULT_FILTER);
    }
}
