//! Vanguard Auth Plugin - Main Entry Point
//!
//! Serves `vcsauth.AuthPluginService` on a loopback address for the VCS host.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use rust_common::init_tracing;
use tonic::transport::Server;
use tracing::{debug, info, warn};

use vanguard_auth::proto::vcsauth::auth_plugin_service_server::AuthPluginServiceServer;
use vanguard_auth::shutdown::{ShutdownCoordinator, run_with_graceful_shutdown, wait_for_signal};
use vanguard_auth::{
    AuthGateway, AuthPluginServiceImpl, CliArgs, Config, GatewayMetrics, HttpIdentityProvider,
    PLUGIN_VERSION,
};

const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(20);
const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let args = CliArgs::parse();
    let config = Config::from_env()?.with_cli(&args)?;

    init_tracing(&config.tracing_config())?;

    let addr = config.listen_addr();

    // Create service implementation
    let metrics = Arc::new(GatewayMetrics::new()?);
    let provider = Arc::new(HttpIdentityProvider::new(&config.http_config())?);
    let gateway = Arc::new(AuthGateway::instrumented(provider, Arc::clone(&metrics)));
    let service = AuthPluginServiceImpl::new(gateway, Arc::clone(&metrics));

    let shutdown_coordinator = ShutdownCoordinator::new();

    let server = Server::builder()
        .http2_keepalive_interval(Some(KEEPALIVE_INTERVAL))
        .http2_keepalive_timeout(Some(KEEPALIVE_TIMEOUT))
        .add_service(AuthPluginServiceServer::new(service))
        .serve_with_shutdown(addr, shutdown_coordinator.subscribe().recv());

    info!(
        version = PLUGIN_VERSION,
        %addr,
        distribution_mode = %config.distribution_mode,
        "Vanguard Auth Plugin started"
    );

    run_with_graceful_shutdown(
        server,
        shutdown_coordinator,
        wait_for_signal(),
        config.shutdown_timeout(),
    )
    .await?;

    match metrics.render() {
        Ok(snapshot) => debug!(metrics = %snapshot, "Final metrics"),
        Err(e) => warn!(error = %e, "Failed to render metrics"),
    }
    info!("Vanguard Auth Plugin stopped");

    Ok(())
}
