use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Campaign categories accepted by the web client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Education,
    Health,
    Environment,
    Technology,
    Community,
    #[default]
    Other,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Self::Education,
        Self::Health,
        Self::Environment,
        Self::Technology,
        Self::Community,
        Self::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Education => "education",
            Self::Health => "health",
            Self::Environment => "environment",
            Self::Technology => "technology",
            Self::Community => "community",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("`{}` is not a valid category", s))
    }
}

/// A crowdfunding campaign mirrored from the chain.
///
/// `target` and `amount_collected` are wei-scale integers carried as base-10
/// strings; they must never pass through an f64 on the happy path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub id: Uuid,
    pub contract_id: u64,
    pub owner: String,
    pub title: String,
    pub description: String,
    pub category: Category,
    pub image: String,
    pub target: String,
    pub amount_collected: String,
    pub deadline: DateTime<Utc>,
    pub donators: Vec<Donator>,
    pub total_donations: u64,
    pub withdrawn: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One append-only donation entry on a campaign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Donator {
    pub address: String,
    pub amount: String,
    pub timestamp: DateTime<Utc>,
    pub transaction_hash: Option<String>,
}

/// Per-address profile with lossy f64 aggregates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub address: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub bio: Option<String>,
    pub avatar: String,
    pub campaigns_created: Vec<Uuid>,
    pub campaigns_donated: Vec<DonationRecord>,
    pub total_donated: f64,
    pub total_raised: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    /// Zero-valued profile returned for addresses with no stored record.
    pub fn empty(address: &str) -> Self {
        let now = Utc::now();
        Self {
            address: address.to_lowercase(),
            name: None,
            email: None,
            bio: None,
            avatar: String::new(),
            campaigns_created: vec![],
            campaigns_donated: vec![],
            total_donated: 0.0,
            total_raised: 0.0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Entry in a user's donation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonationRecord {
    pub campaign_id: Uuid,
    pub amount: String,
    pub date: DateTime<Utc>,
    pub transaction_hash: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub campaigns_created: usize,
    pub total_raised: f64,
    pub campaigns_donated: usize,
    pub total_donated: f64,
}

impl From<&UserProfile> for UserStats {
    fn from(profile: &UserProfile) -> Self {
        Self {
            campaigns_created: profile.campaigns_created.len(),
            total_raised: profile.total_raised,
            campaigns_donated: profile.campaigns_donated.len(),
            total_donated: profile.total_donated,
        }
    }
}
