use axum::{
    extract::{ws::WebSocketUpgrade, Query, State},
    http::{HeaderMap, StatusCode},
    response::Response,
    routing::get,
    Router,
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use crate::{auth::credentials_from_request, error::ApiError, state::AppState, ws_connection::WebSocketConnection};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api/v1", api_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new().route("/ws", get(websocket_upgrade))
}

async fn health() -> StatusCode {
    StatusCode::OK
}

#[derive(Debug, Default, Deserialize)]
struct WsQuery {
    token: Option<String>,
}

/// 先认证再升级；认证失败直接返回 401，不交换任何帧
async fn websocket_upgrade(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let credentials = credentials_from_request(&headers, &state.session_cookie, query.token.as_deref());
    let identity = state.gateway.authenticate(&credentials).await.map_err(|err| {
        tracing::warn!(error = %err, "WebSocket upgrade rejected");
        ApiError::from(err)
    })?;

    tracing::info!(user_id = %identity.id, nickname = %identity.nickname, "WebSocket upgrade accepted");

    let connection = WebSocketConnection::new(state.gateway.clone(), identity, state.ping_interval);
    Ok(ws.on_upgrade(move |socket| connection.run(socket)))
}
