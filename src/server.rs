mod auth;
mod rate_limit;

use crate::config::Config;
use crate::engine::{PickOutcome, SelectionQuery, WallpaperEngine};
use crate::ratio::{RatioParams, UaTrustMode};
use crate::selector::NoResultReason;
use anyhow::{Context, Result};
use axum::extract::{ConnectInfo, Query, State};
use axum::http::{header, Extensions, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{middleware, Json, Router};
use rate_limit::RateLimiter;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    engine: Arc<WallpaperEngine>,
    config: Arc<Config>,
    limiter: Arc<RateLimiter>,
}

impl AppState {
    pub fn new(engine: Arc<WallpaperEngine>, config: Config) -> Self {
        let limiter = RateLimiter::new(config.server.rate_limit_rps);
        Self {
            engine,
            config: Arc::new(config),
            limiter: Arc::new(limiter),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct WallpaperParams {
    width: Option<String>,
    height: Option<String>,
    aspect: Option<String>,
    category: Option<String>,
    client_id: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    ok: bool,
    generated_at: String,
    total_count: usize,
    categories: Vec<String>,
    dedup: DedupHealth,
    security: SecurityHealth,
    matching: MatchingHealth,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DedupHealth {
    enabled: bool,
    window: usize,
    keys_in_memory: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SecurityHealth {
    rate_limit_rps: u32,
    auth_enabled: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MatchingHealth {
    top_k: usize,
    ua_trust_mode: UaTrustMode,
    dominant_landscape_ratio: Option<f64>,
    dominant_portrait_ratio: Option<f64>,
    dominant_all_ratio: Option<f64>,
}

#[derive(Serialize)]
struct NotFoundBody {
    error: &'static str,
    detail: NotFoundDetail,
}

#[derive(Serialize)]
struct NotFoundDetail {
    reason: NoResultReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    category: Option<String>,
}

pub fn router(state: AppState) -> Router {
    // Auth is added last so it runs before the rate limiter
    let protected = Router::new()
        .route("/api/wallpaper", get(wallpaper))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit::enforce,
        ))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_token,
        ));

    let assets = ServeDir::new(state.engine.root());

    Router::new()
        .route("/api/health", get(health))
        .merge(protected)
        .nest_service("/assets", assets)
        .with_state(state)
}

pub async fn serve(config: Config) -> Result<()> {
    let engine = Arc::new(WallpaperEngine::new(
        config.catalog.directory.clone(),
        config.selection_settings(),
        config.selection.ua_trust_mode,
    ));
    let catalog = engine
        .rebuild()
        .await
        .context("failed to build initial wallpaper index")?;
    info!(
        wallpapers_dir = %config.catalog.directory.display(),
        total_count = catalog.len(),
        categories = catalog.categories().len(),
        "wallpaper index loaded"
    );

    let refresh = engine.clone().spawn_refresh(config.scan_interval());
    let bind = config.bind_address();
    let app = router(AppState::new(engine, config));

    let listener = TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    info!(address = %bind, "wallpaper api started");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("wallpaper api server failed")?;

    refresh.abort();
    info!("wallpaper api stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let report = state.engine.health();
    Json(HealthResponse {
        ok: true,
        generated_at: report.generated_at,
        total_count: report.total_count,
        categories: report.categories,
        dedup: DedupHealth {
            enabled: report.dedup_enabled,
            window: report.dedup_window,
            keys_in_memory: report.dedup_keys,
        },
        security: SecurityHealth {
            rate_limit_rps: state.config.server.rate_limit_rps,
            auth_enabled: state.config.auth_enabled(),
        },
        matching: MatchingHealth {
            top_k: report.top_k,
            ua_trust_mode: report.ua_trust_mode,
            dominant_landscape_ratio: report.dominant_landscape_ratio,
            dominant_portrait_ratio: report.dominant_portrait_ratio,
            dominant_all_ratio: report.dominant_all_ratio,
        },
    })
}

async fn wallpaper(
    State(state): State<AppState>,
    Query(params): Query<WallpaperParams>,
    headers: HeaderMap,
    extensions: Extensions,
) -> Response {
    let ip = client_ip(&headers, &extensions);
    let client_id = params
        .client_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty());
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let query = SelectionQuery {
        ratio: RatioParams {
            width: params.width.as_deref(),
            height: params.height.as_deref(),
            aspect: params.aspect.as_deref(),
        },
        category: params.category.as_deref(),
        user_agent,
        dedup_key: Some(client_id.unwrap_or(ip.as_str())),
    };

    match state.engine.pick(&query, &mut rand::thread_rng()) {
        PickOutcome::Picked(pick) => {
            info!(
                category = params.category.as_deref().unwrap_or(""),
                client_id = client_id.unwrap_or(""),
                ip = %ip,
                selected = %pick.item.id,
                ratio_source = pick.meta.ratio_source.as_str(),
                device_hint = ?pick.meta.device_hint,
                dedup_applied = pick.meta.dedup_applied,
                "wallpaper selected"
            );
            let location = public_url(&state.config.server.base_url, &pick.item.url_path);
            (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
        }
        PickOutcome::NotFound(reason) => {
            let category = match reason {
                NoResultReason::NoCategoryMatch => params.category.clone(),
                _ => None,
            };
            let body = NotFoundBody {
                error: "no_wallpaper_found",
                detail: NotFoundDetail { reason, category },
            };
            (StatusCode::NOT_FOUND, Json(body)).into_response()
        }
    }
}

/// First `X-Forwarded-For` hop, else the peer address; empty if neither is known
pub(crate) fn client_ip(headers: &HeaderMap, extensions: &Extensions) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_default()
}

fn public_url(base_url: &str, url_path: &str) -> String {
    let path = url_path.trim_start_matches('/');
    format!("{base_url}/assets/{path}")
}
