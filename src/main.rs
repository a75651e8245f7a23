use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};

use course_checkout as api;
use course_checkout::{
    gateway::{razorpay::RazorpayGateway, PaymentGateway},
    notifications::{HttpRelayDispatcher, LogDispatcher, NotificationDispatcher},
    repositories::{BoundedStore, CourseStore, InMemoryCourseStore, SqlCourseStore},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = api::config::load_config().context("failed to load configuration")?;
    api::config::init_tracing(cfg.log_level(), cfg.log_json);

    // Course store, bounded by the configured per-operation timeout
    let inner: Arc<dyn CourseStore> = if cfg.uses_memory_store() {
        warn!("using the in-memory course store; data is lost on restart");
        Arc::new(InMemoryCourseStore::new())
    } else {
        let db = api::db::establish_connection_with_config(&(&cfg).into())
            .await
            .context("failed to connect to the database")?;
        api::db::create_schema(&db)
            .await
            .context("failed to prepare the checkout schema")?;
        Arc::new(SqlCourseStore::new(Arc::new(db)))
    };
    let store: Arc<dyn CourseStore> = Arc::new(BoundedStore::new(inner, cfg.store_timeout()));

    let gateway: Arc<dyn PaymentGateway> = Arc::new(
        RazorpayGateway::from_config(&cfg.razorpay).context("failed to build gateway client")?,
    );

    let dispatcher: Arc<dyn NotificationDispatcher> = match cfg.notifications.relay_url.clone() {
        Some(url) => {
            info!(relay = %url, "notification relay enabled");
            Arc::new(
                HttpRelayDispatcher::new(
                    url,
                    cfg.notifications.relay_secret.clone(),
                    cfg.enrollment.notification_timeout(),
                )
                .context("failed to build notification relay client")?,
            )
        }
        None => {
            info!("notification relay not configured; notifications are logged only");
            Arc::new(LogDispatcher)
        }
    };

    let metrics = api::metrics::CheckoutMetrics::new().context("failed to register metrics")?;
    let payments = api::services::PaymentService::from_config(
        &cfg,
        store.clone(),
        gateway,
        dispatcher,
        metrics.clone(),
    );

    let app_state = api::AppState {
        jwt: api::auth::JwtVerifier::new(&cfg.jwt_secret),
        config: Arc::new(cfg.clone()),
        store,
        payments: Arc::new(payments),
        metrics,
    };
    let app = api::build_router(app_state);

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", cfg.host, cfg.port))?;
    info!(
        policy = ?cfg.enrollment.policy,
        "course-checkout listening on http://{}", addr
    );
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}
