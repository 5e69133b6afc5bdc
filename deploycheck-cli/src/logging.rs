//! Logging initialization.
//!
//! Configures `tracing-subscriber` from the `[general]` section of
//! `DeploycheckConfig`. Events are written to stderr in JSON or pretty form.

use anyhow::Result;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use deploycheck_core::config::GeneralConfig;

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `log_level` when set.
///
/// # Formats
///
/// * `"json"` - JSON lines, for CI log collectors
/// * `"pretty"` - Human-readable colored output
pub fn init_tracing(config: &GeneralConfig) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    match config.log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
                .try_init()
                .map_err(|e| anyhow::anyhow!("failed to initialize JSON tracing subscriber: {e}"))?;
        }
        "pretty" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .pretty()
                        .with_writer(std::io::stderr),
                )
                .try_init()
                .map_err(|e| {
                    anyhow::anyhow!("failed to initialize pretty tracing subscriber: {e}")
                })?;
        }
        other => {
            return Err(anyhow::anyhow!(
                "unknown log format '{other}', expected 'json' or 'pretty'"
            ));
        }
    }

    Ok(())
}
