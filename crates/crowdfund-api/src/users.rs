use axum::{
    Json, Router,
    extract::{Multipart, Path, Query, State, multipart::MultipartRejection},
    routing::get,
};
use chrono::Utc;

use crowdfund_service::{ProfileFields, UserRelation, UserService};
use crowdfund_types::api::{Envelope, UserCampaignsQuery};
use crowdfund_types::models::{Campaign, UserProfile, UserStats};

use crate::error::ApiError;
use crate::form::FormData;
use crate::images::ImageKind;
use crate::{AppState, run_blocking};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users/{address}", get(get_profile).put(update_profile))
        .route("/users/{address}/stats", get(get_stats))
        .route("/users/{address}/campaigns", get(list_user_campaigns))
}

/// GET /api/users/{address}: unknown addresses get a zero profile.
pub async fn get_profile(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<Envelope<UserProfile>>, ApiError> {
    let users = state.users.clone();
    let profile = run_blocking(move || users.get_profile(&address)).await?;
    Ok(Json(Envelope::ok(profile)))
}

/// PUT /api/users/{address} (multipart with an optional `avatar` file)
pub async fn update_profile(
    State(state): State<AppState>,
    Path(address): Path<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Envelope<UserProfile>>, ApiError> {
    let multipart = multipart.map_err(|e| ApiError::validation(e.body_text()))?;
    let mut form = FormData::read(multipart, "avatar").await?;

    let mut fields = ProfileFields {
        name: form.take("name"),
        email: form.take("email"),
        bio: form.take("bio"),
        avatar: None,
    };

    if let Some(file) = form.file.take() {
        ImageKind::Avatar.check(&file)?;
        UserService::check_profile(&fields)?;
        let public_id = format!("avatar_{}_{}", address.to_lowercase(), Utc::now().timestamp_millis());
        fields.avatar = state.images.upload_or_warn(ImageKind::Avatar, &public_id, file).await;
    }

    let users = state.users.clone();
    let profile = run_blocking(move || users.update_profile(&address, fields)).await?;

    Ok(Json(Envelope::ok(profile).message("Profile updated successfully")))
}

/// GET /api/users/{address}/stats
pub async fn get_stats(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Json<Envelope<UserStats>>, ApiError> {
    let users = state.users.clone();
    let stats = run_blocking(move || users.get_stats(&address)).await?;
    Ok(Json(Envelope::ok(stats)))
}

/// GET /api/users/{address}/campaigns?type=created|donated
pub async fn list_user_campaigns(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Query(query): Query<UserCampaignsQuery>,
) -> Result<Json<Envelope<Vec<Campaign>>>, ApiError> {
    let relation = UserRelation::parse(query.relation.as_deref())?;

    let users = state.users.clone();
    let campaigns = run_blocking(move || users.list_campaigns_for_user(&address, relation)).await?;

    let count = campaigns.len();
    Ok(Json(Envelope::ok(campaigns).count(count).kind(relation.as_str())))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use std::sync::atomic::Ordering;

    use crate::tests::{
        UPLOADED_URL, counting_image_host, get_request, json_request, multipart_body, multipart_request, send,
        state_with, test_state,
    };

    #[tokio::test]
    async fn unknown_user_gets_zero_profile_and_stats() {
        let state = test_state(false);

        let (status, body) = send(&state, get_request("/api/users/0xNEW")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["address"], "0xnew");
        assert_eq!(body["data"]["totalDonated"], 0.0);

        let (status, body) = send(&state, get_request("/api/users/0xnew/stats")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["campaignsCreated"], 0);
        assert_eq!(body["data"]["totalRaised"], 0.0);
    }

    #[tokio::test]
    async fn profile_update_round_trips() {
        let state = test_state(false);

        let form = multipart_body(&[("name", "Ada"), ("email", "ada@example.com"), ("bio", "hi")], None);
        let (status, body) = send(&state, multipart_request("PUT", "/api/users/0xAbC", form)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Profile updated successfully");
        assert_eq!(body["data"]["address"], "0xabc");
        assert_eq!(body["data"]["name"], "Ada");

        let (_, body) = send(&state, get_request("/api/users/0xabc")).await;
        assert_eq!(body["data"]["email"], "ada@example.com");
    }

    #[tokio::test]
    async fn profile_update_validation() {
        let state = test_state(false);

        let long_bio = "x".repeat(501);
        let form = multipart_body(&[("bio", long_bio.as_str())], None);
        let (status, body) = send(&state, multipart_request("PUT", "/api/users/0xabc", form)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);

        let gif = multipart_body(&[("name", "Ada")], Some(("avatar", "me.gif", "image/gif", b"GIF89a")));
        let (status, _) = send(&state, multipart_request("PUT", "/api/users/0xabc", gif)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn user_campaigns_by_relation() {
        let state = test_state(false);
        let create = multipart_body(&[("contractId", "7"), ("owner", "0xOWNER"), ("title", "T")], None);
        send(&state, multipart_request("POST", "/api/campaigns", create)).await;
        send(
            &state,
            json_request(
                "POST",
                "/api/campaigns/donation",
                json!({"campaignId": "7", "donator": "0xfan", "amount": "3", "transactionHash": "0x7"}),
            ),
        )
        .await;

        let (status, body) = send(&state, get_request("/api/users/0xowner/campaigns")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["type"], "created");
        assert_eq!(body["count"], 1);

        let (_, body) = send(&state, get_request("/api/users/0xFAN/campaigns?type=donated")).await;
        assert_eq!(body["type"], "donated");
        assert_eq!(body["data"][0]["contractId"], 7);

        let (_, body) = send(&state, get_request("/api/users/0xowner/stats")).await;
        assert_eq!(body["data"]["campaignsCreated"], 1);
        assert_eq!(body["data"]["totalRaised"], 3.0);

        let (status, _) = send(&state, get_request("/api/users/0xowner/campaigns?type=liked")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn invalid_profile_uploads_no_avatar() {
        let (images, uploads) = counting_image_host().await;
        let state = state_with(false, images, None);
        let png = Some(("avatar", "me.png", "image/png", &b"\x89PNG"[..]));

        let bad_email = multipart_body(&[("email", "nope")], png);
        let (status, _) = send(&state, multipart_request("PUT", "/api/users/0xabc", bad_email)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(uploads.load(Ordering::SeqCst), 0);

        let good = multipart_body(&[("name", "Ada")], png);
        let (status, body) = send(&state, multipart_request("PUT", "/api/users/0xabc", good)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["avatar"], UPLOADED_URL);
        assert_eq!(uploads.load(Ordering::SeqCst), 1);
    }
}
