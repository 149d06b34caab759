//! Unauthenticated health-check endpoint.

use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::envelope::json_result;
use crate::AppState;

/// `GET /api/health` — liveness probe.
///
/// Returns status, uptime, and version in the usual envelope. No
/// authentication required, suitable for load-balancer health checks.
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    json_result(json!({
        "status": "ok",
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[cfg(test)]
mod tests {
    use axum::{body::Body, http::Request};

    use crate::routes::test_support::fixture;

    #[tokio::test]
    async fn test_health_needs_no_auth() {
        let fx = fixture();
        let req = Request::builder().uri("/api/health").body(Body::empty()).unwrap();
        let (status, v) = fx.call(req).await;
        assert_eq!(status, 200);
        assert_eq!(v["code"], 0);
        assert_eq!(v["message"], "success");
        assert_eq!(v["data"]["status"], "ok");
        assert_eq!(v["data"]["version"], env!("CARGO_PKG_VERSION"));
        assert!(v["data"]["uptime_secs"].is_u64());
    }
}
