/// Database row types. These map directly to SQLite rows.
/// Distinct from crowdfund-types models to keep the DB layer independent.
/// Timestamps are RFC 3339 strings in UTC with millisecond precision, so they
/// sort lexicographically.

#[derive(Debug, Clone)]
pub struct CampaignRow {
    pub id: String,
    pub contract_id: i64,
    pub owner: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub image: String,
    pub target: String,
    pub amount_collected: String,
    pub deadline: String,
    pub total_donations: i64,
    pub withdrawn: bool,
    pub is_active: bool,
    pub created_at: String,
    pub updated_at: String,
    pub donators: Vec<DonatorRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DonatorRow {
    pub address: String,
    pub amount: String,
    pub timestamp: String,
    pub transaction_hash: Option<String>,
}

#[derive(Debug, Clone)]
pub struct UserRow {
    pub address: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub bio: Option<String>,
    pub avatar: String,
    pub total_donated: f64,
    pub total_raised: f64,
    pub created_at: String,
    pub updated_at: String,
    pub campaigns_created: Vec<String>,
    pub campaigns_donated: Vec<UserDonationRow>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserDonationRow {
    pub campaign_id: String,
    pub amount: String,
    pub date: String,
    pub transaction_hash: Option<String>,
}

/// Profile fields written by a profile update. `avatar: None` keeps the
/// stored avatar.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub bio: Option<String>,
    pub avatar: Option<String>,
}

/// Filters for campaign listing. All set filters are ANDed.
#[derive(Debug, Clone, Default)]
pub struct CampaignFilter {
    pub category: Option<String>,
    /// Keep campaigns whose deadline is strictly after this instant.
    pub deadline_after: Option<String>,
    /// Keep campaigns whose deadline is at or before this instant.
    pub deadline_until: Option<String>,
    pub owner: Option<String>,
    /// Keep campaigns holding a donator entry from this address.
    pub donator: Option<String>,
    pub order: CampaignOrder,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CampaignOrder {
    #[default]
    NewestFirst,
    DeadlineAscending,
}

/// Result of the donation merge transaction.
#[derive(Debug)]
pub enum DonationWrite {
    CampaignMissing,
    /// A donator entry with the same transaction hash already exists.
    Duplicate(CampaignRow),
    Applied(CampaignRow),
}
