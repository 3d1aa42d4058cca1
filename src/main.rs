//! slack-gate
//!
//! An authenticating reverse proxy for Slack webhooks.
//!
//! # Architecture Overview
//!
//! ```text
//!                          ┌───────────────────────────────────────────────────┐
//!                          │                    SLACK GATE                     │
//!                          │                                                   │
//!     Slack request        │  ┌─────────┐   ┌──────────────────────────────┐   │
//!     ─────────────────────┼─▶│   net   │──▶│       admission chain        │   │
//!                          │  │listener │   │ method → uri → body → sig    │   │
//!                          │  └─────────┘   └──────────────┬───────────────┘   │
//!                          │                               │                   │
//!                          │                               ▼                   │
//!     Response             │                      ┌────────────────┐           │
//!     ◀────────────────────┼──────────────────────│   forwarder    │◀──────────┼──── Upstream
//!                          │                      └────────────────┘           │
//!                          │                                                   │
//!                          │  ┌─────────────────────────────────────────────┐  │
//!                          │  │  config · lifecycle · observability         │  │
//!                          │  └─────────────────────────────────────────────┘  │
//!                          └───────────────────────────────────────────────────┘
//! ```

use clap::Parser;

use slack_gate::config::CliArgs;
use slack_gate::lifecycle::{signals, startup, Shutdown};
use slack_gate::observability::logging;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();
    let config = args.resolve()?;

    logging::init(&config.observability)?;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "slack-gate starting");
    tracing::info!(
        listeners = ?config.listener.addresses,
        upstream = %config.upstream.target,
        tls = config.listener.tls.is_some(),
        max_age_secs = config.signature.max_age_secs,
        "Configuration loaded"
    );

    let shutdown = Shutdown::new();
    let running = startup::start(config, &shutdown).await?;

    let serving = running.wait();
    tokio::pin!(serving);

    tokio::select! {
        result = &mut serving => result?,
        _ = signals::wait_for_signal() => {
            shutdown.trigger();
            serving.await?;
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
