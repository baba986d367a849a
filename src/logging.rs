use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::{ProxyError, ProxyResult};

/// Filter used when `RUST_LOG` is unset: `debug` when verbose, `info` otherwise.
#[must_use]
pub fn env_filter(verbose: bool) -> EnvFilter {
    let level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy()
}

/// Installs the global fmt subscriber. Meant for the binary; the library only emits events.
///
/// # Errors
/// Returns [`ProxyError::Configuration`] when a global subscriber is already set.
pub fn init(verbose: bool) -> ProxyResult<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(env_filter(verbose))
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|err| ProxyError::Configuration(format!("can't install logger: {err}")))
}
