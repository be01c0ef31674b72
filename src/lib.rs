pub mod api; // REST surface over the portal service
pub mod cache; // Bounded "last N" order store
pub mod config;
pub mod detect; // New-order change detection
pub mod driver; // Browser automation capability seam
pub mod enrich; // Comment enrichment worker pool
pub mod models;
pub mod portal; // MeditLink service: refresh pipeline + download trigger
pub mod session; // Login state machine + reconnection

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::portal::DentalPlatform;

/// Start the service: launch-on-demand browser, REST API, ctrl-c shutdown.
pub async fn run() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let portal_config = config::PortalConfig::from_env();
    if portal_config.email.is_empty() {
        tracing::warn!("MEDITLINK_EMAIL is not set; logins will fail until it is");
    }

    let factory = Arc::new(driver::cdp::CdpFactory::new(portal_config.clone()));
    let portal = Arc::new(portal::MeditLink::new(factory, portal_config));

    let mut server = match api::start_api_server(portal.clone(), config::bind_addr()).await {
        Ok(server) => server,
        Err(e) => {
            tracing::error!("{e}");
            return;
        }
    };
    tracing::info!("Listening on http://{}", server.addr);

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Signal handler error: {e}");
    }

    tracing::info!("Shutting down");
    portal.logout().await;
    server.shutdown();
}
