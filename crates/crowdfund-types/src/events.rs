use serde::{Deserialize, Serialize};

/// Contract events the reconciler subscribes to.
#[derive(Debug, Clone, PartialEq)]
pub enum ChainEvent {
    /// A campaign was created on chain. Only corroborates the API write.
    CampaignCreated {
        campaign_id: u64,
        owner: String,
        title: String,
        target: String,
        deadline: u64,
        transaction_hash: Option<String>,
    },

    /// A donation landed on chain.
    DonationReceived {
        campaign_id: u64,
        donator: String,
        amount: String,
        transaction_hash: Option<String>,
    },
}

impl ChainEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CampaignCreated { .. } => "CampaignCreated",
            Self::DonationReceived { .. } => "DonationReceived",
        }
    }

    pub fn campaign_id(&self) -> u64 {
        match self {
            Self::CampaignCreated { campaign_id, .. } => *campaign_id,
            Self::DonationReceived { campaign_id, .. } => *campaign_id,
        }
    }
}

/// Lifecycle of the chain subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReconcilerState {
    Disconnected,
    Connecting,
    Listening,
    Reconnecting,
}
