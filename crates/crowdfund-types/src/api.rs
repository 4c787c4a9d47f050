use serde::{Deserialize, Serialize};

use crate::events::ReconcilerState;

// -- Envelope --

/// Success envelope shared by every JSON route: `{ success, data, ... }`.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
            message: None,
            count: None,
            kind: None,
        }
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }

    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }
}

/// Failure envelope: `{ success: false, error, details? }`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

// -- Campaigns --

#[derive(Debug, Default, Deserialize)]
pub struct CampaignListQuery {
    pub category: Option<String>,
    pub status: Option<String>,
    pub sort: Option<String>,
}

/// JSON clients send ids and wei amounts either quoted or bare.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum StringOrNumber {
    Number(serde_json::Number),
    Text(String),
}

impl StringOrNumber {
    pub fn into_string(self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Text(s) => s,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordDonationRequest {
    pub campaign_id: Option<StringOrNumber>,
    pub donator: Option<String>,
    pub amount: Option<StringOrNumber>,
    pub transaction_hash: Option<String>,
}

// -- Users --

#[derive(Debug, Default, Deserialize)]
pub struct UserCampaignsQuery {
    #[serde(rename = "type")]
    pub relation: Option<String>,
}

// -- Health / sync --

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub success: bool,
    pub status: &'static str,
    pub message: &'static str,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub reconciler: ReconcilerState,
}

/// Read-only comparison of on-chain campaigns against stored ones.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub on_chain_campaigns: usize,
    pub missing_in_store: Vec<u64>,
    pub mismatched: Vec<SyncMismatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMismatch {
    pub contract_id: u64,
    pub stored_amount: String,
    pub chain_amount: String,
    pub stored_donations: u64,
    pub chain_donations: u64,
    /// On-chain donations with no matching stored entry.
    pub unrecorded: Vec<ChainDonation>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainDonation {
    pub donator: String,
    pub amount: String,
}
