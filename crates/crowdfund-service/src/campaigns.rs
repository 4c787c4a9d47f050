use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};
use tracing::{info, warn};
use uuid::Uuid;

use crowdfund_db::models::{CampaignFilter, CampaignOrder, CampaignRow, DonationWrite, DonatorRow, UserDonationRow};
use crowdfund_db::{Database, is_unique_violation};
use crowdfund_types::models::{Campaign, Category};

use crate::convert::{campaign_from_row, format_time};
use crate::{ServiceError, ServiceResult, amount};

/// Shown when a campaign is created without an image or the upload failed.
pub const DEFAULT_CAMPAIGN_IMAGE: &str =
    "https://images.unsplash.com/photo-1532619675605-1ede6c2ed2b0?w=500&h=300&fit=crop";

/// How a campaign is addressed from the outside.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CampaignKey {
    ById(Uuid),
    ByContractId(u64),
}

impl CampaignKey {
    /// A UUID selects by internal id, a non-negative integer by contract id.
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if let Ok(id) = raw.parse::<Uuid>() {
            return Some(Self::ById(id));
        }
        raw.parse::<u64>().ok().map(Self::ByContractId)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CampaignStatus {
    /// Deadline strictly in the future.
    Active,
    /// Deadline now or in the past.
    Ended,
}

impl CampaignStatus {
    /// Unknown values mean "no status filter".
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "active" => Some(Self::Active),
            "ended" => Some(Self::Ended),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CampaignSort {
    #[default]
    Newest,
    Ending,
    /// Target descending, compared numerically.
    Amount,
}

impl CampaignSort {
    /// Unknown values fall back to newest first.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "ending" => Self::Ending,
            "amount" => Self::Amount,
            _ => Self::Newest,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub category: Option<Category>,
    pub status: Option<CampaignStatus>,
}

/// Raw campaign fields as submitted by the client.
#[derive(Debug, Clone, Default)]
pub struct NewCampaign {
    pub contract_id: Option<String>,
    pub owner: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub target: Option<String>,
    /// Unix seconds.
    pub deadline: Option<String>,
    pub category: Option<String>,
    pub image: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewDonation {
    pub contract_id: u64,
    pub donator: String,
    pub amount: String,
    pub transaction_hash: Option<String>,
}

#[derive(Debug, Clone)]
pub enum DonationOutcome {
    Recorded(Campaign),
    /// The transaction hash was already on the campaign; nothing changed.
    AlreadyRecorded(Campaign),
}

impl DonationOutcome {
    pub fn campaign(&self) -> &Campaign {
        match self {
            Self::Recorded(c) | Self::AlreadyRecorded(c) => c,
        }
    }

    pub fn into_campaign(self) -> Campaign {
        match self {
            Self::Recorded(c) | Self::AlreadyRecorded(c) => c,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Self::Recorded(_))
    }
}

#[derive(Clone)]
pub struct CampaignService {
    db: Arc<Database>,
}

impl CampaignService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn list_campaigns(&self, filter: &ListFilter, sort: CampaignSort) -> ServiceResult<Vec<Campaign>> {
        let now = format_time(Utc::now());
        let mut query = CampaignFilter {
            category: filter.category.map(|c| c.as_str().to_string()),
            order: match sort {
                CampaignSort::Ending => CampaignOrder::DeadlineAscending,
                CampaignSort::Newest | CampaignSort::Amount => CampaignOrder::NewestFirst,
            },
            ..Default::default()
        };
        match filter.status {
            Some(CampaignStatus::Active) => query.deadline_after = Some(now),
            Some(CampaignStatus::Ended) => query.deadline_until = Some(now),
            None => {}
        }

        let mut rows = self.db.list_campaigns(&query)?;
        if sort == CampaignSort::Amount {
            rows.sort_by(|a, b| amount::compare(&b.target, &a.target));
        }

        Ok(rows.into_iter().map(campaign_from_row).collect())
    }

    pub fn get_campaign(&self, key: CampaignKey) -> ServiceResult<Campaign> {
        let row = match key {
            CampaignKey::ById(id) => self.db.get_campaign_by_id(&id.to_string())?,
            CampaignKey::ByContractId(contract_id) => {
                self.db.get_campaign_by_contract_id(to_store_id(contract_id)?)?
            }
        };

        row.map(campaign_from_row)
            .ok_or_else(|| ServiceError::NotFound("Campaign not found".into()))
    }

    /// Looks a campaign up by contract id without treating absence as an error.
    pub fn find_by_contract_id(&self, contract_id: u64) -> ServiceResult<Option<Campaign>> {
        let row = self.db.get_campaign_by_contract_id(to_store_id(contract_id)?)?;
        Ok(row.map(campaign_from_row))
    }

    /// Runs every check [`create_campaign`](Self::create_campaign) makes
    /// before writing, so callers can refuse a request before doing side
    /// work such as uploading its image.
    pub fn check_new_campaign(&self, input: &NewCampaign) -> ServiceResult<()> {
        let checked = CheckedCampaign::from_input(input)?;
        self.ensure_contract_id_free(&checked)
    }

    pub fn create_campaign(&self, input: NewCampaign) -> ServiceResult<Campaign> {
        let checked = CheckedCampaign::from_input(&input)?;
        self.ensure_contract_id_free(&checked)?;
        let CheckedCampaign {
            contract_id,
            store_id,
            owner,
            title,
            category,
            deadline,
        } = checked;

        let now = format_time(Utc::now());
        let row = CampaignRow {
            id: Uuid::new_v4().to_string(),
            contract_id: store_id,
            owner,
            title,
            description: non_blank(input.description.as_deref()).unwrap_or_else(|| "No description provided".into()),
            category: category.as_str().to_string(),
            image: non_blank(input.image.as_deref()).unwrap_or_else(|| DEFAULT_CAMPAIGN_IMAGE.into()),
            target: non_blank(input.target.as_deref()).unwrap_or_else(|| "0".into()),
            amount_collected: "0".into(),
            deadline: format_time(deadline),
            total_donations: 0,
            withdrawn: false,
            is_active: true,
            created_at: now.clone(),
            updated_at: now.clone(),
            donators: vec![],
        };

        self.db.insert_campaign(&row).map_err(|e| {
            if is_unique_violation(&e) {
                ServiceError::Conflict("Campaign with this contract ID already exists".into())
            } else {
                ServiceError::Store(e)
            }
        })?;

        info!("Campaign {} created for contract ID {} by {}", row.id, contract_id, row.owner);

        if let Err(e) = self.db.add_created_campaign(&row.owner, &row.id, &now) {
            warn!("Failed to update owner profile {}: {:#}", row.owner, e);
        }

        Ok(campaign_from_row(row))
    }

    fn ensure_contract_id_free(&self, checked: &CheckedCampaign) -> ServiceResult<()> {
        if let Some(existing) = self.db.get_campaign_by_contract_id(checked.store_id)? {
            warn!(
                "Campaign with contract ID {} already exists ({})",
                checked.contract_id, existing.id
            );
            return Err(ServiceError::Conflict(
                "Campaign with this contract ID already exists".into(),
            ));
        }
        Ok(())
    }

    /// Merges one donation into its campaign.
    ///
    /// Replaying a `(contract_id, transaction_hash)` pair that is already
    /// recorded returns [`DonationOutcome::AlreadyRecorded`] and changes
    /// nothing. Donations without a hash cannot be deduplicated.
    pub fn record_donation(&self, donation: NewDonation) -> ServiceResult<DonationOutcome> {
        let store_id = to_store_id(donation.contract_id)?;
        let donator = donation.donator.trim().to_lowercase();
        if donator.is_empty() {
            return Err(ServiceError::Validation("Donator address is required".into()));
        }
        let amount = donation.amount.trim().to_string();
        if amount.is_empty() {
            return Err(ServiceError::Validation("Donation amount is required".into()));
        }
        amount::check_donation(&amount).map_err(ServiceError::Validation)?;
        let transaction_hash = donation
            .transaction_hash
            .map(|h| h.trim().to_lowercase())
            .filter(|h| !h.is_empty());

        let now = format_time(Utc::now());
        let entry = DonatorRow {
            address: donator.clone(),
            amount: amount.clone(),
            timestamp: now.clone(),
            transaction_hash: transaction_hash.clone(),
        };

        let row = match self.db.record_donation(store_id, &entry, amount::merge)? {
            DonationWrite::CampaignMissing => {
                return Err(ServiceError::NotFound("Campaign not found".into()));
            }
            DonationWrite::Duplicate(row) => {
                info!(
                    "Donation {} on campaign {} already recorded, skipping",
                    transaction_hash.as_deref().unwrap_or("-"),
                    donation.contract_id
                );
                return Ok(DonationOutcome::AlreadyRecorded(campaign_from_row(row)));
            }
            DonationWrite::Applied(row) => row,
        };

        info!(
            "Donation of {} from {} recorded on campaign {} (total {})",
            amount, donator, donation.contract_id, row.amount_collected
        );

        let approx = amount::to_f64(&amount);
        let history = UserDonationRow {
            campaign_id: row.id.clone(),
            amount,
            date: now.clone(),
            transaction_hash,
        };
        if let Err(e) = self.db.add_user_donation(&donator, &history, approx) {
            warn!("Failed to update donator profile {}: {:#}", donator, e);
        }
        if let Err(e) = self.db.add_user_raised(&row.owner, approx, &now) {
            warn!("Failed to update owner totals {}: {:#}", row.owner, e);
        }

        Ok(DonationOutcome::Recorded(campaign_from_row(row)))
    }
}

fn to_store_id(contract_id: u64) -> ServiceResult<i64> {
    i64::try_from(contract_id)
        .map_err(|_| ServiceError::Validation(format!("Contract ID {} is out of range", contract_id)))
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

fn required(value: Option<&str>, message: &str) -> ServiceResult<String> {
    non_blank(value).ok_or_else(|| ServiceError::Validation(message.to_string()))
}

/// Campaign fields that passed validation.
struct CheckedCampaign {
    contract_id: u64,
    store_id: i64,
    owner: String,
    title: String,
    category: Category,
    deadline: DateTime<Utc>,
}

impl CheckedCampaign {
    fn from_input(input: &NewCampaign) -> ServiceResult<Self> {
        let raw_id = required(input.contract_id.as_deref(), "Contract ID is required")?;
        let contract_id: u64 = raw_id.parse().map_err(|_| {
            ServiceError::Validation(format!("Contract ID must be a non-negative integer, got `{}`", raw_id))
        })?;
        let store_id = to_store_id(contract_id)?;
        let owner = required(input.owner.as_deref(), "Owner address is required")?.to_lowercase();
        let title = required(input.title.as_deref(), "Campaign title is required")?;

        let category = match non_blank(input.category.as_deref()) {
            Some(raw) => raw.parse::<Category>().map_err(ServiceError::Validation)?,
            None => Category::Other,
        };
        let deadline = match non_blank(input.deadline.as_deref()) {
            Some(raw) => parse_unix_deadline(&raw)?,
            None => Utc::now(),
        };

        Ok(Self {
            contract_id,
            store_id,
            owner,
            title,
            category,
            deadline,
        })
    }
}

/// Deadlines are stored as RFC 3339 text, which only has room for four
/// digit years.
fn parse_unix_deadline(raw: &str) -> ServiceResult<DateTime<Utc>> {
    raw.parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .filter(|t| (0..=9999).contains(&t.year()))
        .ok_or_else(|| {
            ServiceError::Validation(format!(
                "Deadline must be unix seconds between years 0 and 9999, got `{}`",
                raw
            ))
        })
}
