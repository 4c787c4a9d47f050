use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crowdfund_db::Database;
use crowdfund_db::models::{CampaignFilter, ProfileUpdate};
use crowdfund_types::models::{Campaign, UserProfile, UserStats};

use crate::convert::{campaign_from_row, format_time, user_from_row};
use crate::{ServiceError, ServiceResult};

const MAX_BIO_CHARS: usize = 500;

/// Profile fields from a profile update. Missing text fields are cleared;
/// a missing avatar keeps the stored one.
#[derive(Debug, Clone, Default)]
pub struct ProfileFields {
    pub name: Option<String>,
    pub email: Option<String>,
    pub bio: Option<String>,
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UserRelation {
    #[default]
    Created,
    Donated,
}

impl UserRelation {
    pub fn parse(raw: Option<&str>) -> ServiceResult<Self> {
        match raw {
            None | Some("created") => Ok(Self::Created),
            Some("donated") => Ok(Self::Donated),
            Some(other) => Err(ServiceError::Validation(format!(
                "Campaign relation must be `created` or `donated`, got `{}`",
                other
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Donated => "donated",
        }
    }
}

#[derive(Clone)]
pub struct UserService {
    db: Arc<Database>,
}

impl UserService {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// The validation [`update_profile`](Self::update_profile) applies,
    /// without touching the store.
    pub fn check_profile(fields: &ProfileFields) -> ServiceResult<()> {
        checked_text(fields).map(|_| ())
    }

    /// Stored profile, or a zero-valued one when the address is unknown.
    pub fn get_profile(&self, address: &str) -> ServiceResult<UserProfile> {
        let address = address.to_lowercase();
        match self.db.get_user(&address)? {
            Some(row) => Ok(user_from_row(row)),
            None => {
                info!("No profile for {}, returning default", address);
                Ok(UserProfile::empty(&address))
            }
        }
    }

    pub fn update_profile(&self, address: &str, fields: ProfileFields) -> ServiceResult<UserProfile> {
        let address = address.to_lowercase();

        let (bio, email) = checked_text(&fields)?;

        let update = ProfileUpdate {
            name: trimmed(fields.name.as_deref()),
            email,
            bio,
            avatar: trimmed(fields.avatar.as_deref()),
        };
        let row = self.db.upsert_profile(&address, &update, &format_time(Utc::now()))?;

        info!("Profile updated for {}", address);
        Ok(user_from_row(row))
    }

    pub fn get_stats(&self, address: &str) -> ServiceResult<UserStats> {
        let profile = self.get_profile(address)?;
        Ok(UserStats::from(&profile))
    }

    /// Campaigns owned by, or donated to by, `address`. Newest first.
    pub fn list_campaigns_for_user(&self, address: &str, relation: UserRelation) -> ServiceResult<Vec<Campaign>> {
        let address = address.to_lowercase();
        let filter = match relation {
            UserRelation::Created => CampaignFilter {
                owner: Some(address),
                ..Default::default()
            },
            UserRelation::Donated => CampaignFilter {
                donator: Some(address),
                ..Default::default()
            },
        };

        let rows = self.db.list_campaigns(&filter)?;
        Ok(rows.into_iter().map(campaign_from_row).collect())
    }
}

fn trimmed(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

/// Trimmed bio and lowercased email, validated.
fn checked_text(fields: &ProfileFields) -> ServiceResult<(Option<String>, Option<String>)> {
    let bio = trimmed(fields.bio.as_deref());
    if let Some(bio) = &bio {
        if bio.chars().count() > MAX_BIO_CHARS {
            return Err(ServiceError::Validation(format!(
                "Bio cannot exceed {} characters",
                MAX_BIO_CHARS
            )));
        }
    }
    let email = trimmed(fields.email.as_deref()).map(|e| e.to_lowercase());
    if let Some(email) = &email {
        if !email.contains('@') {
            return Err(ServiceError::Validation(format!("`{}` is not a valid email", email)));
        }
    }
    Ok((bio, email))
}
