//! Campaign and user services shared by the HTTP handlers and the chain
//! reconciler. Both paths go through the same donation merge.

pub mod amount;
pub mod campaigns;
mod convert;
pub mod users;

pub use campaigns::{
    CampaignKey, CampaignService, CampaignSort, CampaignStatus, DonationOutcome, ListFilter,
    NewCampaign, NewDonation,
};
pub use users::{ProfileFields, UserRelation, UserService};

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Missing or malformed input.
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    /// A record with the same unique key already exists.
    #[error("{0}")]
    Conflict(String),

    #[error("store error: {0:#}")]
    Store(#[from] anyhow::Error),
}
