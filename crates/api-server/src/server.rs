//! API server: mounts the analytics, nova and management routes on one HTTP
//! listener, plus the Prometheus exporter on its own port.

use crate::intelligence;
use crate::nova;
use crate::rest::{self, AppState};
use axum::routing::get;
use axum::Router;
use goldstone_core::config::AppConfig;
use goldstone_management::{management_router, ManagementState};
use std::net::SocketAddr;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Full application router. The management routes carry their own bearer
/// check; everything else is open.
pub fn build_router(state: AppState, management: ManagementState) -> Router {
    let analytics = Router::new()
        // Nova
        .route("/nova/discover", get(nova::discover))
        .route("/nova/spawns", get(nova::spawns))
        // Log intelligence
        .route("/intelligence/log/components", get(intelligence::components))
        .route("/intelligence/log/loglevels", get(intelligence::loglevels))
        .route("/intelligence/log/facets", get(intelligence::facets))
        .route("/intelligence/log/cockpit/data", get(intelligence::cockpit_data))
        .route("/intelligence/log/search/data", get(intelligence::search_data))
        .route("/intelligence/nodes/new_and_missing", get(intelligence::new_and_missing_nodes))
        .route("/intelligence/compute/hypervisor", get(intelligence::hypervisor_stats))
        // Operational endpoints
        .route("/health", get(rest::health_check))
        .route("/ready", get(rest::readiness))
        .route("/live", get(rest::liveness))
        .with_state(state);

    analytics
        .merge(management_router(management))
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Owns the configuration and both handler states.
pub struct ApiServer {
    config: AppConfig,
    state: AppState,
    management: ManagementState,
}

impl ApiServer {
    pub fn new(config: AppConfig, state: AppState, management: ManagementState) -> Self {
        Self {
            config,
            state,
            management,
        }
    }

    /// Start the HTTP REST server.
    pub async fn start_http(&self) -> anyhow::Result<()> {
        let app = build_router(self.state.clone(), self.management.clone());

        let addr = SocketAddr::new(self.config.api.host.parse()?, self.config.api.http_port);
        info!(addr = %addr, index = %self.state.index, "Starting HTTP server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;
        Ok(())
    }

    /// Install the Prometheus recorder and its scrape listener.
    pub fn start_metrics(&self) -> anyhow::Result<()> {
        if !self.config.metrics.enabled {
            info!("Metrics exporter disabled");
            return Ok(());
        }
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(SocketAddr::new(
                self.config.api.host.parse()?,
                self.config.metrics.port,
            ))
            .install()?;

        info!(port = self.config.metrics.port, "Metrics exporter started");
        Ok(())
    }
}
