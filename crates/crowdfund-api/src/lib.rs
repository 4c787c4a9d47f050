//! HTTP surface of the crowdfunding backend. Every route lives under `/api`.

pub mod campaigns;
pub mod error;
pub mod form;
pub mod health;
pub mod images;
pub mod users;

use std::sync::Arc;

use axum::{Json, Router, http::StatusCode, middleware, response::IntoResponse, routing::get};
use tokio::sync::watch;
use tracing::error;

use crowdfund_chain::ChainReader;
use crowdfund_service::{CampaignService, ServiceResult, UserService};
use crowdfund_types::api::ErrorBody;
use crowdfund_types::events::ReconcilerState;

use crate::error::ApiError;
use crate::images::ImageHost;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub campaigns: CampaignService,
    pub users: UserService,
    /// `None` when chain configuration is missing.
    pub gateway: Option<Arc<dyn ChainReader>>,
    pub images: ImageHost,
    pub reconciler: watch::Receiver<ReconcilerState>,
    /// Hides error details from 500 responses.
    pub production: bool,
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .merge(campaigns::routes())
        .merge(users::routes())
        .route("/health", get(health::health));

    Router::new()
        .nest("/api", api)
        .fallback(not_found)
        .layer(middleware::map_response_with_state(state.clone(), error::attach_error_details))
        .with_state(state)
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorBody {
            success: false,
            error: "Route not found".into(),
            details: None,
        }),
    )
}

/// Runs a synchronous service call off the async runtime.
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> ServiceResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal(e.to_string())
        })?
        .map_err(ApiError::from)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::body::Body;
    use axum::http::{Request, Response, header};
    use axum::routing::post;
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use crowdfund_chain::{ChainError, ChainGateway, EventStream, OnChainCampaign};
    use crowdfund_db::Database;

    use crate::images::ImageHostConfig;

    use super::*;

    pub(crate) fn test_state(production: bool) -> AppState {
        state_with(production, ImageHost::disabled(), None)
    }

    pub(crate) fn state_with(
        production: bool,
        images: ImageHost,
        gateway: Option<Arc<dyn ChainReader>>,
    ) -> AppState {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let (_tx, reconciler) = watch::channel(ReconcilerState::Listening);
        Arc::new(AppStateInner {
            campaigns: CampaignService::new(db.clone()),
            users: UserService::new(db),
            gateway,
            images,
            reconciler,
            production,
        })
    }

    /// An image host backed by a local server that counts uploads and
    /// answers each with a fixed URL.
    pub(crate) async fn counting_image_host() -> (ImageHost, Arc<AtomicUsize>) {
        let uploads = Arc::new(AtomicUsize::new(0));
        let counter = uploads.clone();
        let app = Router::new().route(
            "/upload",
            post(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Json(json!({ "secure_url": UPLOADED_URL }))
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let host = ImageHost::new(ImageHostConfig {
            upload_url: Some(format!("http://{}/upload", addr)),
            upload_preset: Some("test".into()),
        });
        (host, uploads)
    }

    pub(crate) const UPLOADED_URL: &str = "https://img.example/uploaded.png";

    /// Fixed on-chain campaigns, or a transport failure on every read.
    pub(crate) struct FakeChain {
        pub(crate) campaigns: Result<Vec<OnChainCampaign>, ChainError>,
    }

    impl ChainGateway for FakeChain {
        async fn subscribe(&self) -> Result<EventStream, ChainError> {
            Err(ChainError::Transport("no subscriptions".into()))
        }

        async fn get_campaigns(&self) -> Result<Vec<OnChainCampaign>, ChainError> {
            self.campaigns.clone()
        }

        async fn get_donators(&self, campaign_id: u64) -> Result<Vec<(String, String)>, ChainError> {
            let campaigns = self.campaigns.clone()?;
            Ok(campaigns
                .into_iter()
                .find(|c| c.id == campaign_id)
                .map(|c| c.donations)
                .unwrap_or_default())
        }
    }

    pub(crate) const BOUNDARY: &str = "crowdfund-test-boundary";

    /// A multipart body of text fields plus an optional
    /// `(field, file name, content type, bytes)` file part.
    pub(crate) fn multipart_body(fields: &[(&str, &str)], file: Option<(&str, &str, &str, &[u8])>) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                    BOUNDARY, name, value
                )
                .as_bytes(),
            );
        }
        if let Some((name, file_name, content_type, bytes)) = file {
            body.extend_from_slice(
                format!(
                    "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                    BOUNDARY, name, file_name, content_type
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    pub(crate) fn multipart_request(method: &str, uri: &str, body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap()
    }

    pub(crate) fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    pub(crate) fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    pub(crate) async fn send(state: &AppState, request: Request<Body>) -> (StatusCode, Value) {
        let response: Response<Body> = router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn unknown_route_is_json_404() {
        let state = test_state(false);

        let (status, body) = send(&state, get_request("/api/nope")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Route not found");

        let (status, _) = send(&state, get_request("/campaigns")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
