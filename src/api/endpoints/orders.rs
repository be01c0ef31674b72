//! Order endpoints: recent list, detail, download trigger, cache reset.

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::models::Order;
use crate::portal::DentalPlatform;

#[derive(Serialize)]
pub struct DownloadResponse {
    pub external_id: String,
    pub started: bool,
}

/// `GET /api/portal/orders` — run the refresh pipeline, fall back to the
/// cached view on failure. Always 200 with up to six orders.
pub async fn list(State(ctx): State<ApiContext>) -> Json<Vec<Order>> {
    Json(ctx.portal.fetch_orders().await)
}

/// `GET /api/portal/orders/:id`
pub async fn detail(
    State(ctx): State<ApiContext>,
    Path(external_id): Path<String>,
) -> Result<Json<Order>, ApiError> {
    ctx.portal
        .order_by_external_id(&external_id)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Order {external_id} not found")))
}

/// `POST /api/portal/orders/:id/download` — start the 3D scan download.
pub async fn download(
    State(ctx): State<ApiContext>,
    Path(external_id): Path<String>,
) -> Json<DownloadResponse> {
    let started = ctx.portal.download_scan(&external_id).await;
    Json(DownloadResponse {
        external_id,
        started,
    })
}

/// `POST /api/portal/cache/clear` — explicit cache reset; the session
/// stays connected.
pub async fn clear_cache(State(ctx): State<ApiContext>) -> &'static str {
    ctx.portal.clear_cache();
    "Cache cleared."
}
