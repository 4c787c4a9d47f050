use axum::{
    Json, Router,
    extract::{Multipart, Path, Query, State, rejection::JsonRejection, multipart::MultipartRejection},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use chrono::Utc;
use tracing::{info, warn};

use crowdfund_chain::sync;
use crowdfund_service::{
    CampaignKey, CampaignSort, CampaignStatus, ListFilter, NewCampaign, NewDonation,
};
use crowdfund_types::api::{
    CampaignListQuery, Envelope, RecordDonationRequest, StringOrNumber, SyncReport,
};
use crowdfund_types::models::{Campaign, Category};

use crate::error::ApiError;
use crate::form::FormData;
use crate::images::ImageKind;
use crate::{AppState, run_blocking};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/campaigns", get(list_campaigns).post(create_campaign))
        .route("/campaigns/sync", get(sync_campaigns))
        .route("/campaigns/donation", post(record_donation))
        .route("/campaigns/{key}", get(get_campaign))
}

/// GET /api/campaigns?category=&status=&sort=
pub async fn list_campaigns(
    State(state): State<AppState>,
    Query(query): Query<CampaignListQuery>,
) -> Result<Json<Envelope<Vec<Campaign>>>, ApiError> {
    let category = match query.category.as_deref().map(str::trim) {
        None | Some("") | Some("all") => None,
        Some(raw) => Some(raw.parse::<Category>().map_err(ApiError::validation)?),
    };
    let filter = ListFilter {
        category,
        status: query.status.as_deref().and_then(CampaignStatus::parse),
    };
    let sort = query.sort.as_deref().map(CampaignSort::parse).unwrap_or_default();

    let campaigns = state.campaigns.clone();
    let list = run_blocking(move || campaigns.list_campaigns(&filter, sort)).await?;

    let count = list.len();
    Ok(Json(Envelope::ok(list).count(count)))
}

/// GET /api/campaigns/{key}: `key` is the internal UUID or the contract id.
pub async fn get_campaign(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<Envelope<Campaign>>, ApiError> {
    let key = CampaignKey::parse(&key).ok_or_else(|| ApiError::not_found("Campaign not found"))?;

    let campaigns = state.campaigns.clone();
    let campaign = run_blocking(move || campaigns.get_campaign(key)).await?;
    Ok(Json(Envelope::ok(campaign)))
}

/// POST /api/campaigns (multipart with an optional `image` file)
pub async fn create_campaign(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let multipart = multipart.map_err(|e| ApiError::validation(e.body_text()))?;
    let mut form = FormData::read(multipart, "image").await?;

    let mut input = NewCampaign {
        contract_id: form.take("contractId"),
        owner: form.take("owner"),
        title: form.take("title"),
        description: form.take("description"),
        target: form.take("target"),
        deadline: form.take("deadline"),
        category: form.take("category"),
        image: None,
    };

    if let Some(file) = form.file.take() {
        ImageKind::Campaign.check(&file)?;
        // A rejected request must not upload anything.
        let campaigns = state.campaigns.clone();
        let pending = input.clone();
        run_blocking(move || campaigns.check_new_campaign(&pending)).await?;

        let public_id = format!(
            "campaign_{}_{}",
            input.contract_id.as_deref().unwrap_or("unknown").trim(),
            Utc::now().timestamp_millis()
        );
        input.image = state.images.upload_or_warn(ImageKind::Campaign, &public_id, file).await;
    }

    let campaigns = state.campaigns.clone();
    let campaign = run_blocking(move || campaigns.create_campaign(input)).await?;

    Ok((
        StatusCode::CREATED,
        Json(Envelope::ok(campaign).message("Campaign created successfully")),
    ))
}

/// POST /api/campaigns/donation
pub async fn record_donation(
    State(state): State<AppState>,
    payload: Result<Json<RecordDonationRequest>, JsonRejection>,
) -> Result<Json<Envelope<Campaign>>, ApiError> {
    let Json(req) = payload.map_err(|e| ApiError::validation(e.body_text()))?;

    let campaign_id = required(req.campaign_id.map(StringOrNumber::into_string), "Campaign ID is required")?;
    let contract_id: u64 = campaign_id.parse().map_err(|_| {
        ApiError::validation(format!("Campaign ID must be a non-negative integer, got `{}`", campaign_id))
    })?;
    let donator = required(req.donator, "Donator address is required")?;
    let amount = required(req.amount.map(StringOrNumber::into_string), "Donation amount is required")?;

    let donation = NewDonation {
        contract_id,
        donator,
        amount,
        transaction_hash: req.transaction_hash,
    };
    let campaigns = state.campaigns.clone();
    let outcome = run_blocking(move || campaigns.record_donation(donation)).await?;

    let message = if outcome.is_new() {
        "Donation recorded successfully"
    } else {
        "Donation already recorded"
    };
    Ok(Json(Envelope::ok(outcome.into_campaign()).message(message)))
}

/// GET /api/campaigns/sync: read-only comparison against the chain.
pub async fn sync_campaigns(State(state): State<AppState>) -> Result<Json<Envelope<SyncReport>>, ApiError> {
    let Some(gateway) = state.gateway.clone() else {
        let report = SyncReport {
            note: Some("Chain sync unavailable: no chain connection configured".into()),
            ..Default::default()
        };
        return Ok(Json(Envelope::ok(report).message("Chain sync unavailable")));
    };

    let campaigns = state.campaigns.clone();
    let stored = run_blocking(move || campaigns.list_campaigns(&ListFilter::default(), CampaignSort::Newest)).await?;

    let report = sync::report(gateway.as_ref(), &stored).await.map_err(|e| {
        warn!("Sync could not read from chain: {}", e);
        ApiError::Upstream(e.to_string())
    })?;
    info!(
        "Sync report: {} on chain, {} missing, {} mismatched",
        report.on_chain_campaigns,
        report.missing_in_store.len(),
        report.mismatched.len()
    );
    Ok(Json(Envelope::ok(report)))
}

fn required(value: Option<String>, message: &str) -> Result<String, ApiError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::validation(message))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use std::sync::Arc;
    use std::sync::atomic::Ordering;

    use crowdfund_chain::{ChainError, OnChainCampaign};

    use crate::images::ImageHost;
    use crate::tests::{
        FakeChain, UPLOADED_URL, counting_image_host, get_request, json_request, multipart_body, multipart_request,
        send, state_with, test_state,
    };

    const OWNER: &str = "0xABC0000000000000000000000000000000000001";
    const DONOR: &str = "0xDEF0000000000000000000000000000000000002";

    fn create_body(contract_id: &str, extra: &[(&str, &str)]) -> Vec<u8> {
        let mut fields = vec![
            ("contractId", contract_id),
            ("owner", OWNER),
            ("title", "T"),
            ("target", "1000000000000000000"),
        ];
        fields.extend_from_slice(extra);
        multipart_body(&fields, None)
    }

    #[tokio::test]
    async fn create_donate_and_replay() {
        let state = test_state(false);

        let (status, body) = send(&state, multipart_request("POST", "/api/campaigns", create_body("1", &[]))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["message"], "Campaign created successfully");
        assert_eq!(body["data"]["owner"], OWNER.to_lowercase());
        assert_eq!(body["data"]["amountCollected"], "0");
        let id = body["data"]["id"].as_str().unwrap().to_string();

        let donation = json!({
            "campaignId": 1,
            "donator": DONOR,
            "amount": "500000000000000000",
            "transactionHash": "0x1"
        });
        let (status, body) = send(&state, json_request("POST", "/api/campaigns/donation", donation.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Donation recorded successfully");
        assert_eq!(body["data"]["amountCollected"], "500000000000000000");
        assert_eq!(body["data"]["totalDonations"], 1);

        let (status, body) = send(&state, json_request("POST", "/api/campaigns/donation", donation)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Donation already recorded");
        assert_eq!(body["data"]["totalDonations"], 1);

        let (status, body) = send(&state, get_request(&format!("/api/campaigns/{}", id))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["contractId"], 1);
        assert_eq!(body["data"]["donators"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_contract_id_is_409() {
        let state = test_state(false);
        send(&state, multipart_request("POST", "/api/campaigns", create_body("5", &[]))).await;

        let (status, body) = send(
            &state,
            multipart_request("POST", "/api/campaigns", create_body("5", &[("description", "other")])),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Campaign with this contract ID already exists");
    }

    #[tokio::test]
    async fn create_validates_fields_and_images() {
        let state = test_state(false);

        let missing_title = multipart_body(&[("contractId", "1"), ("owner", OWNER)], None);
        let (status, body) = send(&state, multipart_request("POST", "/api/campaigns", missing_title)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Campaign title is required");

        let pdf = multipart_body(
            &[("contractId", "1"), ("owner", OWNER), ("title", "T")],
            Some(("image", "plan.pdf", "application/pdf", b"%PDF")),
        );
        let (status, _) = send(&state, multipart_request("POST", "/api/campaigns", pdf)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &state,
            json_request("POST", "/api/campaigns", json!({"contractId": 1})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn image_upload_failure_falls_back_to_placeholder() {
        let state = test_state(false);

        let body = multipart_body(
            &[("contractId", "3"), ("owner", OWNER), ("title", "T")],
            Some(("image", "cover.png", "image/png", b"\x89PNG")),
        );
        let (status, body) = send(&state, multipart_request("POST", "/api/campaigns", body)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["image"], crowdfund_service::campaigns::DEFAULT_CAMPAIGN_IMAGE);
    }

    #[tokio::test]
    async fn donation_requires_fields_and_known_campaign() {
        let state = test_state(false);

        let (status, body) = send(
            &state,
            json_request("POST", "/api/campaigns/donation", json!({"campaignId": "1", "amount": "1"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Donator address is required");

        let (status, _) = send(
            &state,
            json_request("POST", "/api/campaigns/donation", json!({"campaignId": "x", "donator": DONOR, "amount": "1"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(
            &state,
            json_request("POST", "/api/campaigns/donation", json!({"campaignId": 99, "donator": DONOR, "amount": "1"})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Campaign not found");
    }

    #[tokio::test]
    async fn list_filters_and_counts() {
        let state = test_state(false);
        send(&state, multipart_request("POST", "/api/campaigns", create_body("1", &[("category", "health")]))).await;
        send(&state, multipart_request("POST", "/api/campaigns", create_body("2", &[]))).await;

        let (status, body) = send(&state, get_request("/api/campaigns")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 2);
        assert_eq!(body["data"][0]["contractId"], 2);

        let (_, body) = send(&state, get_request("/api/campaigns?category=all&sort=ending")).await;
        assert_eq!(body["count"], 2);

        let (_, body) = send(&state, get_request("/api/campaigns?category=health")).await;
        assert_eq!(body["count"], 1);
        assert_eq!(body["data"][0]["contractId"], 1);

        let (status, _) = send(&state, get_request("/api/campaigns?category=sports")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_keys_are_404() {
        let state = test_state(false);

        let (status, _) = send(&state, get_request("/api/campaigns/not-a-key")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = send(&state, get_request("/api/campaigns/12")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Campaign not found");
    }

    #[tokio::test]
    async fn sync_without_gateway_reports_unavailable() {
        let state = test_state(false);

        let (status, body) = send(&state, get_request("/api/campaigns/sync")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["onChainCampaigns"], 0);
        assert!(body["data"]["note"].as_str().unwrap().contains("unavailable"));
    }

    #[tokio::test]
    async fn rejected_create_uploads_nothing() {
        let (images, uploads) = counting_image_host().await;
        let state = state_with(false, images, None);
        let png = Some(("image", "cover.png", "image/png", &b"\x89PNG"[..]));

        let missing_title = multipart_body(&[("contractId", "1"), ("owner", OWNER)], png);
        let (status, _) = send(&state, multipart_request("POST", "/api/campaigns", missing_title)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(uploads.load(Ordering::SeqCst), 0);

        let first = multipart_body(&[("contractId", "1"), ("owner", OWNER), ("title", "T")], png);
        let (status, body) = send(&state, multipart_request("POST", "/api/campaigns", first)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["data"]["image"], UPLOADED_URL);
        assert_eq!(uploads.load(Ordering::SeqCst), 1);

        let duplicate = multipart_body(&[("contractId", "1"), ("owner", OWNER), ("title", "T")], png);
        let (status, _) = send(&state, multipart_request("POST", "/api/campaigns", duplicate)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(uploads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn negative_donation_is_400() {
        let state = test_state(false);
        send(&state, multipart_request("POST", "/api/campaigns", create_body("1", &[]))).await;

        let (status, body) = send(
            &state,
            json_request("POST", "/api/campaigns/donation", json!({"campaignId": 1, "donator": DONOR, "amount": "-400"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);

        let (_, body) = send(&state, get_request("/api/campaigns/1")).await;
        assert_eq!(body["data"]["amountCollected"], "0");
    }

    fn on_chain(id: u64, amount: &str, donations: &[(&str, &str)]) -> OnChainCampaign {
        OnChainCampaign {
            id,
            owner: OWNER.to_lowercase(),
            title: "T".into(),
            description: String::new(),
            target: "1".into(),
            deadline: 0,
            amount_collected: amount.into(),
            image: String::new(),
            donations: donations.iter().map(|(d, a)| (d.to_string(), a.to_string())).collect(),
            withdrawn: false,
        }
    }

    #[tokio::test]
    async fn sync_reports_chain_differences() {
        let donor = DONOR.to_lowercase();
        let chain = FakeChain {
            campaigns: Ok(vec![
                on_chain(1, "3", &[(donor.as_str(), "1"), (donor.as_str(), "2")]),
                on_chain(2, "0", &[]),
            ]),
        };
        let state = state_with(false, ImageHost::disabled(), Some(Arc::new(chain)));
        send(&state, multipart_request("POST", "/api/campaigns", create_body("1", &[]))).await;
        send(
            &state,
            json_request(
                "POST",
                "/api/campaigns/donation",
                json!({"campaignId": 1, "donator": DONOR, "amount": "1", "transactionHash": "0x1"}),
            ),
        )
        .await;

        let (status, body) = send(&state, get_request("/api/campaigns/sync")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["onChainCampaigns"], 2);
        assert_eq!(body["data"]["missingInStore"], json!([2]));
        let mismatch = &body["data"]["mismatched"][0];
        assert_eq!(mismatch["contractId"], 1);
        assert_eq!(mismatch["storedAmount"], "1");
        assert_eq!(mismatch["chainAmount"], "3");
        assert_eq!(mismatch["unrecorded"], json!([{"donator": donor, "amount": "2"}]));
    }

    #[tokio::test]
    async fn sync_chain_failure_is_500() {
        let chain = FakeChain {
            campaigns: Err(ChainError::Transport("connection refused".into())),
        };
        let state = state_with(false, ImageHost::disabled(), Some(Arc::new(chain)));

        let (status, body) = send(&state, get_request("/api/campaigns/sync")).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Upstream service error");
    }
}
