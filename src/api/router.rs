//! Portal API router.
//!
//! Returns a composable `Router` that can be mounted on any axum server.
//! Routes are nested under `/api/`; the service binds to localhost, so
//! there is no auth layer in front of them.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::api::endpoints;
use crate::api::types::ApiContext;
use crate::portal::MeditLink;

/// Build the portal API router.
pub fn portal_api_router(portal: Arc<MeditLink>) -> Router {
    let ctx = ApiContext::new(portal);

    let routes = Router::new()
        .route("/health", get(endpoints::health::check))
        .route("/portal/login", post(endpoints::session::login))
        .route("/portal/logout", post(endpoints::session::logout))
        .route("/portal/status", get(endpoints::session::status))
        .route("/portal/orders", get(endpoints::orders::list))
        .route("/portal/orders/:id", get(endpoints::orders::detail))
        .route(
            "/portal/orders/:id/download",
            post(endpoints::orders::download),
        )
        .route("/portal/cache/clear", post(endpoints::orders::clear_cache))
        .with_state(ctx);

    Router::new().nest("/api", routes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{self, PortalConfig};
    use crate::driver::mock::{MockDriver, MockFactory};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use std::path::PathBuf;
    use tower::ServiceExt;

    fn test_config() -> PortalConfig {
        PortalConfig {
            base_url: "https://portal.test".to_string(),
            email: "lab@test".to_string(),
            password: "pw".to_string(),
            download_dir: PathBuf::from("/tmp/dl"),
            headless: true,
        }
    }

    fn script_login(driver: &MockDriver, config: &PortalConfig) {
        let login = config.login_url();
        driver.set_texts(&login, config::LOGIN_INPUT_CSS, &[""]);
        driver.set_texts(&login, config::PASSWORD_INPUT_CSS, &[""]);
        driver.set_texts(&login, config::LOGIN_BUTTON_CSS, &["Log in"]);
        driver.redirect_click(config::LOGIN_BUTTON_CSS, &config.inbox_url());
    }

    fn script_inbox(driver: &MockDriver, config: &PortalConfig, count: usize) {
        let inbox = config.inbox_url();
        let markers = vec![""; count];
        driver.set_texts(&inbox, config::INBOX_ROW_CSS, &markers);
        for row in 1..=count {
            let id = format!("CM-{row}");
            let row_css = config::INBOX_ROW_CSS;
            driver.set_texts(
                &inbox,
                &format!("{row_css}:nth-child({row}) td:nth-child(3) span"),
                &[&format!("Patient {row}")],
            );
            driver.set_texts(
                &inbox,
                &format!("{row_css}:nth-child({row}) td:nth-child(4) span"),
                &[&format!("2024-03-{row:02} 10:00")],
            );
            driver.set_texts(
                &inbox,
                &format!("{row_css}:nth-child({row}) td:nth-child(7) span"),
                &[&id],
            );
            let detail = config.detail_url(&id);
            driver.set_texts(&detail, config::COMMENT_TEXTAREA_CSS, &["note"]);
        }
    }

    fn router_with(driver: Option<Arc<MockDriver>>) -> Router {
        let factory = MockFactory::new();
        if let Some(driver) = driver {
            factory.push(driver);
        }
        portal_api_router(Arc::new(MeditLink::new(factory, test_config())))
    }

    async fn body_string(response: axum::response::Response) -> String {
        let bytes = to_bytes(response.into_body(), 64 * 1024).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn get(router: &Router, uri: &str) -> axum::response::Response {
        router
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn post_req(router: &Router, uri: &str) -> axum::response::Response {
        router
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn status_starts_disconnected_and_empty() {
        let router = router_with(None);
        let response = get(&router, "/api/portal/status").await;
        assert_eq!(response.status(), StatusCode::OK);

        let json: serde_json::Value =
            serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(json["connected"], false);
        assert_eq!(json["cache_size"], 0);
        assert!(json["last_fetch"].is_null());
    }

    #[tokio::test]
    async fn login_reports_textually() {
        let config = test_config();
        let driver = MockDriver::new();
        script_login(&driver, &config);
        let router = router_with(Some(driver));

        let response = post_req(&router, "/api/portal/login").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_string(response).await, "Login successful.");

        let response = post_req(&router, "/api/portal/login").await;
        assert_eq!(body_string(response).await, "Already connected.");
    }

    #[tokio::test]
    async fn failed_login_is_still_a_200_with_text() {
        // No driver scripted: the launch itself fails.
        let router = router_with(None);
        let response = post_req(&router, "/api/portal/login").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_string(response).await.starts_with("Login failed:"));
    }

    #[tokio::test]
    async fn unknown_order_is_404_with_error_body() {
        let router = router_with(None);
        let response = get(&router, "/api/portal/orders/CM-404").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let json: serde_json::Value =
            serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(json["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test(start_paused = true)]
    async fn orders_flow_lists_then_serves_details() {
        let config = test_config();
        let driver = MockDriver::new();
        script_login(&driver, &config);
        script_inbox(&driver, &config, 8);
        let router = router_with(Some(driver));

        let response = get(&router, "/api/portal/orders").await;
        assert_eq!(response.status(), StatusCode::OK);
        let orders: serde_json::Value =
            serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(orders.as_array().unwrap().len(), 6);
        assert_eq!(orders[0]["external_id"], "CM-8");

        let response = get(&router, "/api/portal/orders/CM-3").await;
        assert_eq!(response.status(), StatusCode::OK);
        let order: serde_json::Value =
            serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(order["patient_ref"], "Patient 3");
    }

    #[tokio::test(start_paused = true)]
    async fn logout_clears_connection_and_cache() {
        let config = test_config();
        let driver = MockDriver::new();
        script_login(&driver, &config);
        script_inbox(&driver, &config, 3);
        let router = router_with(Some(driver));

        get(&router, "/api/portal/orders").await;

        let response = post_req(&router, "/api/portal/logout").await;
        assert_eq!(body_string(response).await, "Logout successful.");

        let response = get(&router, "/api/portal/status").await;
        let json: serde_json::Value =
            serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(json["connected"], false);
        assert_eq!(json["cache_size"], 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cache_clear_keeps_session_up() {
        let config = test_config();
        let driver = MockDriver::new();
        script_login(&driver, &config);
        script_inbox(&driver, &config, 3);
        let router = router_with(Some(driver));

        get(&router, "/api/portal/orders").await;
        let response = post_req(&router, "/api/portal/cache/clear").await;
        assert_eq!(body_string(response).await, "Cache cleared.");

        let response = get(&router, "/api/portal/status").await;
        let json: serde_json::Value =
            serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(json["cache_size"], 0);
        assert_eq!(json["connected"], true, "session survives a cache reset");
    }

    #[tokio::test]
    async fn unknown_route_is_404() {
        let router = router_with(None);
        let response = get(&router, "/api/nonexistent").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
