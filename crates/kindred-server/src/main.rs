mod config;

use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use kindred_api::AppStateInner;
use kindred_api::middleware::decode_claims;
use kindred_db::Database;
use kindred_engine::Engine;
use kindred_gateway::{Hub, connection};
use kindred_push::{ExpoPushGateway, NotificationDispatcher};

use crate::config::ServerConfig;

#[derive(Clone)]
struct GatewayState {
    hub: Hub,
    db: Arc<Database>,
    jwt_secret: Arc<str>,
}

#[derive(Debug, Deserialize)]
struct GatewayQuery {
    token: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kindred=debug,tower_http=debug".into()),
        )
        .init();

    let config = ServerConfig::from_env()?;
    if config.service_key.is_none() {
        warn!("KINDRED_SERVICE_KEY unset: /internal routes will refuse every request");
    }

    // Init database
    let db = Arc::new(Database::open(&config.db_path)?);

    // Shared state
    let hub = Hub::new();
    let gateway = Arc::new(ExpoPushGateway::new(
        config.push_url.clone(),
        config.push_access_token.clone(),
    ));
    let dispatcher = NotificationDispatcher::new(db.clone(), gateway, hub.clone())
        .with_timeout(config.push_timeout);
    let engine = Engine::new(db.clone(), hub.clone(), config.engine)
        .with_notifier(dispatcher.clone());

    let app_state = Arc::new(AppStateInner {
        engine,
        dispatcher,
        jwt_secret: config.jwt_secret.clone(),
        service_key: config.service_key.clone(),
    });

    let ws_route = Router::new()
        .route("/gateway", get(ws_upgrade))
        .with_state(GatewayState {
            hub,
            db,
            jwt_secret: config.jwt_secret.as_str().into(),
        });

    let app = Router::new()
        .merge(kindred_api::router(app_state))
        .merge(ws_route)
        .route("/health", get(|| async { "ok" }))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    info!("Kindred server listening on {}", config.addr);
    info!(
        "Matching: top {} proposals, min score {}",
        config.engine.max_proposals, config.engine.min_score
    );

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Browsers cannot set headers on a WebSocket upgrade, so the JWT rides in
/// the query string and is checked before the upgrade completes.
async fn ws_upgrade(
    State(state): State<GatewayState>,
    Query(query): Query<GatewayQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let Some(claims) = decode_claims(&query.token, &state.jwt_secret) else {
        return StatusCode::UNAUTHORIZED.into_response();
    };

    ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, state.hub, state.db, claims.sub)
    })
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("SIGTERM handler unavailable ({}), waiting for Ctrl+C", e);
                ctrl_c.await.ok();
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
