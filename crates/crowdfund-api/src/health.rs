use axum::{Json, extract::State};
use chrono::Utc;

use crowdfund_types::api::HealthResponse;

use crate::AppState;

/// GET /api/health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        success: true,
        status: "OK",
        message: "CrowdFunding API is running",
        timestamp: Utc::now(),
        reconciler: *state.reconciler.borrow(),
    })
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use crate::tests::{get_request, send, test_state};

    #[tokio::test]
    async fn reports_reconciler_state() {
        let state = test_state(false);

        let (status, body) = send(&state, get_request("/api/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["status"], "OK");
        assert_eq!(body["reconciler"], "listening");
        assert!(body["timestamp"].is_string());
    }
}
