//! Console logging for the command-line loader.

use anyhow::{Context, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Install a console subscriber.
///
/// `RUST_LOG` wins when set; otherwise the level is `info`, raised to `debug`
/// for this crate when `debug` is true.
pub fn init_logging(debug: bool) -> Result<()> {
    let fallback = if debug {
        "info,point_cloud_loader=debug"
    } else {
        "info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(env_filter);

    tracing_subscriber::registry()
        .with(console_layer)
        .try_init()
        .context("failed to install tracing subscriber")
}
