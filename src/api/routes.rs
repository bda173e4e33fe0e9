use crate::admission::Decision;
use crate::api::api_error::APIError;
use crate::api::model::{AskQuery, AskResult, CleanupRequest, PresentRequest, PresentResult};
use crate::api::server::AppState;
use crate::bridge::Dns01Provider;
use crate::error::Error;
use axum::extract::{ConnectInfo, Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_extra::extract::WithRejection;
use serde_json::json;
use std::net::SocketAddr;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub(super) fn new(state: AppState) -> Router {
    Router::new()
        .route("/healthcheck", get(health_check))
        .route("/ask", get(ask))
        .route("/present", post(present))
        .route("/cleanup", post(cleanup))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(state.config.api_timeout))
        .with_state(state)
}

#[allow(clippy::unused_async)]
async fn health_check() -> impl IntoResponse {
    Json(json!({"ok":"healthy"}))
}

async fn ask(
    State(state): State<AppState>,
    WithRejection(Query(query), _): WithRejection<Query<AskQuery>, APIError>,
) -> Result<Json<AskResult>, APIError> {
    match state.admission.should_issue(&query.domain).await {
        Decision::Allow => Ok(Json(AskResult {
            subject: state.admission.subject_for(&query.domain),
        })),
        Decision::Deny(reason) => Err(Error::IssuanceDenied(reason).into()),
    }
}

async fn present(
    State(state): State<AppState>,
    ConnectInfo(client_addr): ConnectInfo<SocketAddr>,
    WithRejection(Json(payload), _): WithRejection<Json<PresentRequest>, APIError>,
) -> Result<Json<PresentResult>, APIError> {
    let client_addr = client_addr.ip();
    if !state.config.challenge_permitted(client_addr) {
        tracing::debug!("rejected present from {client_addr} for \"{}\"", payload.domain);
        return Err(Error::AuthForbidden(client_addr).into());
    }

    if let Err(err) = payload.valid_dns01() {
        tracing::debug!(
            "rejected present from {client_addr} for \"{}\": {err}",
            payload.domain
        );
        return Err(Error::InvalidDNS01.into());
    }

    let record = payload.record_name();
    state.bridge.present(&record, &payload.token).await?;
    tracing::info!("accepted present from {client_addr} for \"{record}\"");
    Ok(Json(PresentResult {
        record,
        token: payload.token,
    }))
}

async fn cleanup(
    State(state): State<AppState>,
    ConnectInfo(client_addr): ConnectInfo<SocketAddr>,
    WithRejection(Json(payload), _): WithRejection<Json<CleanupRequest>, APIError>,
) -> Result<impl IntoResponse, APIError> {
    let client_addr = client_addr.ip();
    if !state.config.challenge_permitted(client_addr) {
        tracing::debug!("rejected cleanup from {client_addr} for \"{}\"", payload.domain);
        return Err(Error::AuthForbidden(client_addr).into());
    }
    state.bridge.withdraw(&payload.domain).await;
    Ok(Json(json!({"ok":"cleaned"})))
}
