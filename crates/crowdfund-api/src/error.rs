use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::{error, warn};

use crowdfund_service::ServiceError;
use crowdfund_types::api::ErrorBody;

use crate::AppState;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// The chain node or the image host failed.
    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Service(ServiceError::Validation(message.into()))
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::Service(ServiceError::NotFound(message.into()))
    }

    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            Self::Service(ServiceError::Validation(m)) => (StatusCode::BAD_REQUEST, m.clone()),
            Self::Service(ServiceError::NotFound(m)) => (StatusCode::NOT_FOUND, m.clone()),
            Self::Service(ServiceError::Conflict(m)) => (StatusCode::CONFLICT, m.clone()),
            Self::Service(ServiceError::Store(_)) | Self::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".into())
            }
            Self::Upstream(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Upstream service error".into()),
        }
    }
}

/// Error chain of a 500 response, carried as a response extension until
/// [`attach_error_details`] decides whether the client may see it.
#[derive(Debug, Clone)]
pub(crate) struct ErrorDetails(String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();

        let body = ErrorBody {
            success: false,
            error: message,
            details: None,
        };
        let mut response = (status, Json(body)).into_response();

        if status.is_server_error() {
            error!("{}", self);
            response.extensions_mut().insert(ErrorDetails(self.to_string()));
        } else {
            warn!("Request rejected ({}): {}", status.as_u16(), self);
        }
        response
    }
}

/// Adds `details` to 500 bodies outside production.
pub(crate) async fn attach_error_details(State(state): State<AppState>, mut response: Response) -> Response {
    let Some(ErrorDetails(details)) = response.extensions_mut().remove::<ErrorDetails>() else {
        return response;
    };
    if state.production {
        return response;
    }

    let status = response.status();
    let body = ErrorBody {
        success: false,
        error: "Internal server error".into(),
        details: Some(details),
    };
    (status, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use axum::{Router, body::Body, http::Request, middleware, routing::get};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use super::*;
    use crate::tests::test_state;

    async fn call(production: bool, uri: &str) -> (StatusCode, ErrorBody) {
        let state = test_state(production);
        let app = Router::new()
            .route("/boom", get(|| async { Err::<(), _>(ApiError::Internal("pool exhausted".into())) }))
            .route("/missing", get(|| async { Err::<(), _>(ApiError::not_found("Campaign not found")) }))
            .layer(middleware::map_response_with_state(state.clone(), attach_error_details))
            .with_state(state);

        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn details_only_outside_production() {
        let (status, body) = call(false, "/boom").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!body.success);
        assert_eq!(body.details.as_deref(), Some("internal error: pool exhausted"));

        let (status, body) = call(true, "/boom").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.error, "Internal server error");
        assert!(body.details.is_none());
    }

    #[tokio::test]
    async fn client_errors_never_carry_details() {
        let (status, body) = call(false, "/missing").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.error, "Campaign not found");
        assert!(body.details.is_none());
    }

    #[test]
    fn conflict_maps_to_409() {
        let err = ApiError::from(ServiceError::Conflict("exists".into()));
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }
}
