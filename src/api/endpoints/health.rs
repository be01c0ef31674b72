//! Service liveness endpoint.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::api::types::ApiContext;
use crate::portal::DentalPlatform;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub connected: bool,
    pub version: &'static str,
}

/// `GET /api/health` — is the service itself up.
pub async fn check(State(ctx): State<ApiContext>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        connected: ctx.portal.is_logged_in().await,
        version: crate::config::APP_VERSION,
    })
}
