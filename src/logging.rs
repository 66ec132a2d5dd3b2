//! tracing subscriber setup for the CLI.

use anyhow::{Result, anyhow};
use std::io::IsTerminal;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is unset.
pub fn default_filter(verbose: bool) -> &'static str {
    if verbose { "docket=debug,info" } else { "docket=info,warn" }
}

fn use_color() -> bool {
    std::io::stderr().is_terminal() && std::env::var_os("NO_COLOR").is_none()
}

/// Install the global subscriber, writing to stderr.
///
/// `RUST_LOG` takes precedence over `verbose`. With `json` every event is one
/// JSON object per line. Fails if a subscriber is already installed.
pub fn init_tracing(verbose: bool, json: bool) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter(verbose)))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    let installed = if json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(verbose)
                    .with_ansi(use_color())
                    .with_writer(std::io::stderr)
                    .compact(),
            )
            .try_init()
    };
    installed.map_err(|e| anyhow!("Failed to initialise logging: {}", e))
}
