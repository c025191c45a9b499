//! Tracing subscriber setup for test runs.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter when `RUST_LOG` is unset.
const DEFAULT_FILTER: &str = "info,effigy_core=debug,effigy_harness=debug";

/// Install a compact subscriber writing through the test capture.
///
/// Respects `RUST_LOG`. Safe to call from every test; only the first
/// call installs.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .compact()
                .without_time()
                .with_target(true)
                .with_test_writer(),
        )
        .try_init();
    if installed.is_err() {
        tracing::trace!("tracing subscriber already installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_init_is_harmless() {
        init_tracing();
        init_tracing();
        tracing::debug!("still alive");
    }
}
