use std::sync::OnceLock;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "lighteval_rs=debug";
static TRACING_INITIALIZED: OnceLock<()> = OnceLock::new();

#[derive(Debug, Error)]
pub enum TelemetryInitError {
    #[error("invalid tracing filter directive `{directive}`: {source}")]
    InvalidFilter {
        directive: String,
        source: tracing_subscriber::filter::ParseError,
    },
    #[error("failed to install tracing subscriber: {0}")]
    SetGlobalDefault(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Installs a process-global compact tracing subscriber.
///
/// Honors `RUST_LOG` when set, falling back to `lighteval_rs=debug`.
/// Idempotent: calls after the first successful init are no-ops.
pub fn init_tracing() -> Result<(), TelemetryInitError> {
    if TRACING_INITIALIZED.get().is_some() {
        return Ok(());
    }

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(DEFAULT_FILTER).map_err(|source| {
            TelemetryInitError::InvalidFilter {
                directive: DEFAULT_FILTER.to_string(),
                source,
            }
        })?,
    };

    let subscriber = tracing_subscriber::fmt()
        .compact()
        .with_env_filter(filter)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    let _ = TRACING_INITIALIZED.set(());
    Ok(())
}
