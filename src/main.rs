// src/main.rs

//! # DID / VC / VP System - Main Entry Point
//!
//! Loads settings, creates the DID registry and the demo actors, and starts the API server.
//!
//! ## Configuration
//! Defaults, then `config/did-vp-system.{toml,yaml,json}`, then `SSI__*` environment
//! variables (a `.env` file is honoured). `RUST_LOG` controls log output.

use anyhow::Context;
use did_vp_system::config::Settings;
use did_vp_system::registry::did_registry::InMemoryDidRegistry;
use did_vp_system::services::api_server::ApiServer;
use did_vp_system::services::demo_flow::DemoFlow;
use did_vp_system::wallet::key_management::default_signer;
use log::{debug, info};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

/// Main application entry point
///
/// # Initialization Sequence
/// 1. Load configuration
/// 2. Create the DID registry and register the demo actors
/// 3. Start the challenge janitor
/// 4. Start API server
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let settings = Settings::load().context("failed to load settings")?;
    let addr: SocketAddr = settings
        .bind_address()
        .parse()
        .with_context(|| format!("invalid bind address {}", settings.bind_address()))?;

    // One signer and one registry shared by every actor
    let signer = default_signer();
    let registry = Arc::new(InMemoryDidRegistry::new(signer.clone()));
    let flow = DemoFlow::new(registry, signer, &settings).context("failed to create demo actors")?;

    let actors = flow.actors();
    info!("license issuer: {}", actors.license_issuer_did);
    info!("rental company: {}", actors.rental_company_did);
    info!("car: {}", actors.car_did);
    info!("verifier: {}", actors.verifier_did);
    info!(
        "redemption policy: {:?}",
        settings.verifier.redemption_policy
    );

    let flow = Arc::new(flow);
    // Drop used and expired challenges once per challenge lifetime
    let janitor = flow.clone();
    let period = Duration::from_secs(settings.challenge.ttl_secs.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            let purged = janitor.purge_expired();
            if purged > 0 {
                debug!("purged {} challenges", purged);
            }
        }
    });

    let api_server = ApiServer::new(flow, settings.request_timeout());
    api_server.run(addr).await.context("API server stopped")?;
    Ok(())
}
