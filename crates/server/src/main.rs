use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::get,
    Router,
};
use backend::{Backend, SupabaseBackend, SupabaseConfig};
use site_core::SiteContext;
use storage::{LocalAuthConfig, Storage};
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

mod api;
mod app_state;
mod config;
mod live;
mod pages;
mod sessions;

use app_state::AppState;
use config::{load_settings, prepare_database_url, BackendMode, Settings};
use pages::render::{self, Chrome};

const SESSION_PRUNE_INTERVAL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = load_settings();
    let backend = connect_backend(&settings).await?;
    let state = Arc::new(AppState::new(
        SiteContext::new(backend, settings.resume_bucket.clone()),
        settings.owner.clone(),
        settings.cookie_secure,
    ));
    if let Err(err) = state.site.check_backend().await {
        warn!(error = %err, "backend is not reachable yet; pages will degrade");
    }

    let sessions = state.sessions.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SESSION_PRUNE_INTERVAL);
        loop {
            ticker.tick().await;
            let pruned = sessions.prune();
            if pruned > 0 {
                debug!(pruned, "expired browser sessions dropped");
            }
        }
    });

    let app = build_router(state, settings.max_form_bytes);

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn connect_backend(settings: &Settings) -> anyhow::Result<Arc<dyn Backend>> {
    match settings.backend_mode() {
        BackendMode::Hosted { url, anon_key } => {
            let config = SupabaseConfig::new(&url, anon_key)?;
            info!(url = %config.url, "using hosted backend");
            Ok(Arc::new(SupabaseBackend::new(config)?))
        }
        BackendMode::Local { database_url } => {
            let database_url = prepare_database_url(&database_url)?;
            let mut auth = LocalAuthConfig::default();
            if let Some(secret) = settings.auth_secret.clone() {
                auth.secret = secret;
            }
            auth.token_ttl = chrono::Duration::seconds(settings.auth_token_ttl_seconds);

            let storage = Storage::new(&database_url)
                .await
                .map_err(|error| {
                    error!(
                        %database_url,
                        %error,
                        "failed to open SQLite database; verify parent directory exists and permissions are correct"
                    );
                    error
                })?
                .with_auth(auth);
            info!(%database_url, "using local backend");

            if settings.seed_projects {
                let seeded = storage.seed_projects().await?;
                if seeded > 0 {
                    info!(seeded, "sample projects inserted");
                }
            }
            if let (Some(email), Some(password)) = (&settings.admin_email, &settings.admin_password)
            {
                storage
                    .create_admin(email, password)
                    .await
                    .with_context(|| format!("failed to provision admin '{email}'"))?;
                info!(%email, "admin account ready");
            }
            Ok(Arc::new(storage))
        }
    }
}

fn build_router(state: Arc<AppState>, max_form_bytes: usize) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .merge(pages::routes())
        .nest("/api", api::routes())
        .fallback(not_found)
        .layer(RequestBodyLimitLayer::new(max_form_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.site.check_backend().await {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, "degraded"),
    }
}

async fn not_found(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let chrome = Chrome {
        owner: &state.owner,
        path: "",
        signed_in: false,
        notice: None,
    };
    (
        StatusCode::NOT_FOUND,
        Html(render::page(
            &chrome,
            "Page not found",
            "<h1>Page not found</h1><a class=\"button\" href=\"/\">Return Home</a>",
        )),
    )
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
