use chrono::{DateTime, SecondsFormat, Utc};
use tracing::warn;
use uuid::Uuid;

use crowdfund_db::models::{CampaignRow, DonatorRow, UserDonationRow, UserRow};
use crowdfund_types::models::{Campaign, Category, DonationRecord, Donator, UserProfile};

/// Storage format for timestamps; fixed width so it sorts as text.
pub(crate) fn format_time(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn parse_time(raw: &str, field: &str, owner: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|e| {
            warn!("Corrupt {} '{}' on '{}': {}", field, raw, owner, e);
            DateTime::default()
        })
}

fn parse_uuid(raw: &str, field: &str, owner: &str) -> Uuid {
    raw.parse().unwrap_or_else(|e| {
        warn!("Corrupt {} '{}' on '{}': {}", field, raw, owner, e);
        Uuid::default()
    })
}

pub(crate) fn campaign_from_row(row: CampaignRow) -> Campaign {
    let id = parse_uuid(&row.id, "id", &row.id);
    let category = row.category.parse::<Category>().unwrap_or_else(|e| {
        warn!("Corrupt category on campaign '{}': {}", row.id, e);
        Category::Other
    });
    let contract_id = u64::try_from(row.contract_id).unwrap_or_else(|_| {
        warn!("Negative contract_id {} on campaign '{}'", row.contract_id, row.id);
        0
    });

    let donators = row
        .donators
        .iter()
        .map(|d| donator_from_row(d, &row.id))
        .collect();

    Campaign {
        id,
        contract_id,
        owner: row.owner,
        title: row.title,
        description: row.description,
        category,
        image: row.image,
        target: row.target,
        amount_collected: row.amount_collected,
        deadline: parse_time(&row.deadline, "deadline", &row.id),
        donators,
        total_donations: row.total_donations.max(0) as u64,
        withdrawn: row.withdrawn,
        is_active: row.is_active,
        created_at: parse_time(&row.created_at, "created_at", &row.id),
        updated_at: parse_time(&row.updated_at, "updated_at", &row.id),
    }
}

fn donator_from_row(row: &DonatorRow, campaign_id: &str) -> Donator {
    Donator {
        address: row.address.clone(),
        amount: row.amount.clone(),
        timestamp: parse_time(&row.timestamp, "donator timestamp", campaign_id),
        transaction_hash: row.transaction_hash.clone(),
    }
}

pub(crate) fn user_from_row(row: UserRow) -> UserProfile {
    let campaigns_created = row
        .campaigns_created
        .iter()
        .map(|id| parse_uuid(id, "created campaign id", &row.address))
        .collect();
    let campaigns_donated = row
        .campaigns_donated
        .iter()
        .map(|d| donation_from_row(d, &row.address))
        .collect();

    UserProfile {
        created_at: parse_time(&row.created_at, "created_at", &row.address),
        updated_at: parse_time(&row.updated_at, "updated_at", &row.address),
        address: row.address,
        name: row.name,
        email: row.email,
        bio: row.bio,
        avatar: row.avatar,
        campaigns_created,
        campaigns_donated,
        total_donated: row.total_donated,
        total_raised: row.total_raised,
    }
}

fn donation_from_row(row: &UserDonationRow, address: &str) -> DonationRecord {
    DonationRecord {
        campaign_id: parse_uuid(&row.campaign_id, "donated campaign id", address),
        amount: row.amount.clone(),
        date: parse_time(&row.date, "donation date", address),
        transaction_hash: row.transaction_hash.clone(),
    }
}
