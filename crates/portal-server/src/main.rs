use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use portal_api::middleware::require_auth;
use portal_api::{AppState, AppStateInner, auth, reports, students, uploads};
use portal_core::config::PortalConfig;
use portal_core::dispatch::ReportDispatcher;
use portal_core::identity::IdentityResolver;
use portal_core::images::UploadStorage;
use portal_core::mailer::{MailTransport, SmtpMailer};
use portal_core::oauth::{GoogleProvider, IdentityProvider};
use portal_core::reports::ReportStore;
use portal_core::students::StudentRegistry;

/// Image uploads are bounded before the bytes ever reach the resolver.
const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "portal=debug,tower_http=debug".into()),
        )
        .init();

    // Config resolved once; capabilities (dev login, Google, SMTP) are
    // fixed for the life of the process.
    let config = PortalConfig::from_env()?;

    let db = Arc::new(portal_db::Database::open(&config.db_path)?);
    let storage = Arc::new(UploadStorage::new(config.upload_dir.clone()).await?);

    let mailer: Option<Arc<dyn MailTransport>> = match &config.smtp {
        Some(smtp) => {
            info!("SMTP transport configured for relay {}", smtp.host);
            Some(Arc::new(SmtpMailer::from_config(smtp)?))
        }
        None => {
            info!("SMTP not configured; report sending will be rejected");
            None
        }
    };

    let google: Option<Arc<dyn IdentityProvider>> = match &config.google {
        Some(google) => {
            info!("Google OAuth configured");
            Some(Arc::new(GoogleProvider::new(google.clone())))
        }
        None => {
            info!("Google OAuth not configured");
            None
        }
    };

    let dev_enabled = config.dev.is_some();
    if dev_enabled {
        info!("Dev login enabled");
    }

    let state: AppState = Arc::new(AppStateInner {
        identity: IdentityResolver::new(db.clone(), config.dev.clone()),
        students: StudentRegistry::new(db.clone()),
        reports: ReportStore::new(db.clone(), storage.clone()),
        dispatcher: ReportDispatcher::new(db.clone(), storage.clone(), mailer),
        storage,
        google,
        session_secret: config.session_secret.clone(),
    });

    // Routes
    let mut public_routes = Router::new()
        .route("/health", get(health))
        .route("/auth/google", get(auth::google_authorize))
        .route("/auth/google/callback", get(auth::google_callback))
        .route("/uploads/{name}", get(uploads::serve_upload));
    // The dev login only exists as a route when the capability was
    // switched on at startup.
    if dev_enabled {
        public_routes = public_routes.route("/auth/dev", post(auth::dev_login));
    }
    let public_routes = public_routes.with_state(state.clone());

    let protected_routes = Router::new()
        .route("/me", get(auth::me))
        .route(
            "/students",
            post(students::create_student).get(students::list_students),
        )
        .route(
            "/students/{id}",
            get(students::get_student)
                .put(students::update_student)
                .delete(students::delete_student),
        )
        .route(
            "/reports",
            post(reports::create_report).get(reports::list_reports),
        )
        .route(
            "/reports/{id}",
            get(reports::get_report)
                .put(reports::update_report)
                .delete(reports::delete_report),
        )
        .route("/reports/{id}/image", post(reports::upload_image))
        .route("/reports/{id}/send", post(reports::send_report))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            require_auth,
        ))
        .with_state(state);

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Dorm portal listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn health() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({ "status": "ok" }))
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("failed to install SIGTERM handler");
        tokio::select! {
            _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
