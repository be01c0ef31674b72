//! Session endpoints: login, logout, status.
//!
//! Login and logout report textually and never answer with an error
//! status; connectivity problems are an outcome, not a transport failure.

use axum::extract::State;
use axum::Json;

use crate::api::types::ApiContext;
use crate::portal::{DentalPlatform, PortalStatus};

/// `POST /api/portal/login`
pub async fn login(State(ctx): State<ApiContext>) -> String {
    match ctx.portal.login().await {
        Ok(outcome) => outcome.message().to_string(),
        Err(err) => format!("Login failed: {err}"),
    }
}

/// `POST /api/portal/logout` — tear down the session, drop the cache.
pub async fn logout(State(ctx): State<ApiContext>) -> &'static str {
    ctx.portal.logout().await;
    "Logout successful."
}

/// `GET /api/portal/status`
pub async fn status(State(ctx): State<ApiContext>) -> Json<PortalStatus> {
    Json(ctx.portal.status().await)
}
