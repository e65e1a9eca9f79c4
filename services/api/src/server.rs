use crate::cli::ServeArgs;
use crate::infra::{AppState, InMemoryGateway};
use crate::routes::{api_router, with_health_routes, ApiContext};
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use homeserve::booking::BookingWizard;
use homeserve::config::AppConfig;
use homeserve::error::AppError;
use homeserve::telemetry;
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let gateway = Arc::new(InMemoryGateway::new());
    let wizard = BookingWizard::new(gateway.clone(), &config.booking);
    let context = ApiContext {
        gateway,
        wizard: Arc::new(Mutex::new(wizard)),
        negotiations: Arc::new(Mutex::new(HashMap::new())),
    };

    let app = with_health_routes(api_router(context))
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "homeserve booking service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
