use std::collections::HashMap;

use crate::Database;
use crate::models::{
    CampaignFilter, CampaignOrder, CampaignRow, DonationWrite, DonatorRow, ProfileUpdate,
    UserDonationRow, UserRow,
};
use anyhow::{Result, anyhow};
use rusqlite::Connection;
use rusqlite::types::ToSql;

const CAMPAIGN_COLUMNS: &str = "id, contract_id, owner, title, description, category, image, target, \
     amount_collected, deadline, total_donations, withdrawn, is_active, created_at, updated_at";

impl Database {
    // -- Campaigns --

    /// Inserts a new campaign. A duplicate `contract_id` fails with a UNIQUE
    /// constraint error (see [`crate::is_unique_violation`]).
    pub fn insert_campaign(&self, row: &CampaignRow) -> Result<()> {
        self.with_conn_mut(|conn| {
            conn.execute(
                &format!(
                    "INSERT INTO campaigns ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                    CAMPAIGN_COLUMNS
                ),
                rusqlite::params![
                    row.id,
                    row.contract_id,
                    row.owner,
                    row.title,
                    row.description,
                    row.category,
                    row.image,
                    row.target,
                    row.amount_collected,
                    row.deadline,
                    row.total_donations,
                    row.withdrawn,
                    row.is_active,
                    row.created_at,
                    row.updated_at,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_campaign_by_id(&self, id: &str) -> Result<Option<CampaignRow>> {
        self.with_conn(|conn| query_campaign(conn, "id = ?1", &id))
    }

    pub fn get_campaign_by_contract_id(&self, contract_id: i64) -> Result<Option<CampaignRow>> {
        self.with_conn(|conn| query_campaign(conn, "contract_id = ?1", &contract_id))
    }

    pub fn list_campaigns(&self, filter: &CampaignFilter) -> Result<Vec<CampaignRow>> {
        self.with_conn(|conn| query_campaigns(conn, filter))
    }

    /// Appends a donator entry and merges its amount into `amount_collected`
    /// in one transaction.
    ///
    /// `merge(previous_total, amount)` computes the new total. When the entry
    /// carries a transaction hash already present on the campaign, nothing is
    /// written and the stored campaign is returned as a duplicate.
    pub fn record_donation<F>(
        &self,
        contract_id: i64,
        donator: &DonatorRow,
        merge: F,
    ) -> Result<DonationWrite>
    where
        F: FnOnce(&str, &str) -> String,
    {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let current = tx
                .query_row(
                    "SELECT id, amount_collected, total_donations FROM campaigns WHERE contract_id = ?1",
                    [contract_id],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, i64>(2)?,
                        ))
                    },
                )
                .optional()?;

            let Some((campaign_id, collected, total_donations)) = current else {
                return Ok(DonationWrite::CampaignMissing);
            };

            if let Some(hash) = &donator.transaction_hash {
                let seen: bool = tx.query_row(
                    "SELECT EXISTS(SELECT 1 FROM donators WHERE campaign_id = ?1 AND transaction_hash = ?2)",
                    rusqlite::params![campaign_id, hash],
                    |row| row.get(0),
                )?;
                if seen {
                    let row = query_campaign(&tx, "id = ?1", &campaign_id)?
                        .ok_or_else(|| anyhow!("Campaign vanished mid-transaction: {}", campaign_id))?;
                    return Ok(DonationWrite::Duplicate(row));
                }
            }

            let amount_collected = merge(&collected, &donator.amount);

            tx.execute(
                "INSERT INTO donators (campaign_id, seq, address, amount, timestamp, transaction_hash)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    campaign_id,
                    total_donations,
                    donator.address,
                    donator.amount,
                    donator.timestamp,
                    donator.transaction_hash,
                ],
            )?;

            tx.execute(
                "UPDATE campaigns
                 SET amount_collected = ?1, total_donations = total_donations + 1, updated_at = ?2
                 WHERE id = ?3",
                rusqlite::params![amount_collected, donator.timestamp, campaign_id],
            )?;

            let row = query_campaign(&tx, "id = ?1", &campaign_id)?
                .ok_or_else(|| anyhow!("Campaign vanished mid-transaction: {}", campaign_id))?;
            tx.commit()?;

            Ok(DonationWrite::Applied(row))
        })
    }

    // -- Users --

    pub fn get_user(&self, address: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, address))
    }

    /// Upserts the user and links a campaign they created.
    pub fn add_created_campaign(&self, address: &str, campaign_id: &str, now: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            touch_user(&tx, address, now)?;
            tx.execute(
                "INSERT OR IGNORE INTO user_campaigns_created (address, campaign_id) VALUES (?1, ?2)",
                rusqlite::params![address, campaign_id],
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    /// Upserts the user, appends a donation-history entry and adds
    /// `increment` to `total_donated`.
    pub fn add_user_donation(
        &self,
        address: &str,
        donation: &UserDonationRow,
        increment: f64,
    ) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            touch_user(&tx, address, &donation.date)?;
            tx.execute(
                "UPDATE users SET total_donated = total_donated + ?1 WHERE address = ?2",
                rusqlite::params![increment, address],
            )?;
            tx.execute(
                "INSERT INTO user_donations (address, campaign_id, amount, date, transaction_hash)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    address,
                    donation.campaign_id,
                    donation.amount,
                    donation.date,
                    donation.transaction_hash,
                ],
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    /// Upserts the user and adds `increment` to `total_raised`.
    pub fn add_user_raised(&self, address: &str, increment: f64, now: &str) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            touch_user(&tx, address, now)?;
            tx.execute(
                "UPDATE users SET total_raised = total_raised + ?1 WHERE address = ?2",
                rusqlite::params![increment, address],
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    /// Writes profile fields, creating the user when absent. Returns the
    /// stored row.
    pub fn upsert_profile(&self, address: &str, update: &ProfileUpdate, now: &str) -> Result<UserRow> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO users (address, name, email, bio, avatar, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, COALESCE(?5, ''), ?6, ?6)
                 ON CONFLICT(address) DO UPDATE SET
                     name = excluded.name,
                     email = excluded.email,
                     bio = excluded.bio,
                     avatar = COALESCE(?5, users.avatar),
                     updated_at = excluded.updated_at",
                rusqlite::params![address, update.name, update.email, update.bio, update.avatar, now],
            )?;
            query_user(conn, address)?.ok_or_else(|| anyhow!("User vanished after upsert: {}", address))
        })
    }
}

fn map_campaign(row: &rusqlite::Row<'_>) -> rusqlite::Result<CampaignRow> {
    Ok(CampaignRow {
        id: row.get(0)?,
        contract_id: row.get(1)?,
        owner: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        category: row.get(5)?,
        image: row.get(6)?,
        target: row.get(7)?,
        amount_collected: row.get(8)?,
        deadline: row.get(9)?,
        total_donations: row.get(10)?,
        withdrawn: row.get(11)?,
        is_active: row.get(12)?,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
        donators: vec![],
    })
}

fn query_campaign(conn: &Connection, predicate: &str, param: &dyn ToSql) -> Result<Option<CampaignRow>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM campaigns WHERE {}",
        CAMPAIGN_COLUMNS, predicate
    ))?;

    let row = stmt.query_row([param], map_campaign).optional()?;

    match row {
        Some(row) => {
            let mut rows = vec![row];
            attach_donators(conn, &mut rows)?;
            Ok(rows.pop())
        }
        None => Ok(None),
    }
}

fn query_campaigns(conn: &Connection, filter: &CampaignFilter) -> Result<Vec<CampaignRow>> {
    let mut clauses: Vec<String> = Vec::new();
    let mut params: Vec<Box<dyn ToSql>> = Vec::new();

    let mut push = |clause: &str, value: String| {
        params.push(Box::new(value));
        clauses.push(clause.replace('?', &format!("?{}", params.len())));
    };

    if let Some(category) = &filter.category {
        push("category = ?", category.clone());
    }
    if let Some(after) = &filter.deadline_after {
        push("deadline > ?", after.clone());
    }
    if let Some(until) = &filter.deadline_until {
        push("deadline <= ?", until.clone());
    }
    if let Some(owner) = &filter.owner {
        push("owner = ?", owner.clone());
    }
    if let Some(donator) = &filter.donator {
        push("id IN (SELECT campaign_id FROM donators WHERE address = ?)", donator.clone());
    }

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };
    let order_sql = match filter.order {
        CampaignOrder::NewestFirst => "created_at DESC, rowid DESC",
        CampaignOrder::DeadlineAscending => "deadline ASC, rowid ASC",
    };

    let sql = format!(
        "SELECT {} FROM campaigns{} ORDER BY {}",
        CAMPAIGN_COLUMNS, where_sql, order_sql
    );

    let mut stmt = conn.prepare(&sql)?;
    let refs: Vec<&dyn ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let mut rows = stmt
        .query_map(refs.as_slice(), map_campaign)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    attach_donators(conn, &mut rows)?;
    Ok(rows)
}

/// Batch-fetch donator entries for a set of campaigns, in list order.
fn attach_donators(conn: &Connection, campaigns: &mut [CampaignRow]) -> Result<()> {
    if campaigns.is_empty() {
        return Ok(());
    }

    let placeholders: Vec<String> = (1..=campaigns.len()).map(|i| format!("?{}", i)).collect();
    let sql = format!(
        "SELECT campaign_id, address, amount, timestamp, transaction_hash FROM donators
         WHERE campaign_id IN ({})
         ORDER BY campaign_id, seq",
        placeholders.join(", ")
    );

    let mut stmt = conn.prepare(&sql)?;
    let params: Vec<&dyn ToSql> = campaigns.iter().map(|c| &c.id as &dyn ToSql).collect();

    let mut by_campaign: HashMap<String, Vec<DonatorRow>> = HashMap::new();
    let rows = stmt.query_map(params.as_slice(), |row| {
        Ok((
            row.get::<_, String>(0)?,
            DonatorRow {
                address: row.get(1)?,
                amount: row.get(2)?,
                timestamp: row.get(3)?,
                transaction_hash: row.get(4)?,
            },
        ))
    })?;
    for row in rows {
        let (campaign_id, donator) = row?;
        by_campaign.entry(campaign_id).or_default().push(donator);
    }

    for campaign in campaigns.iter_mut() {
        campaign.donators = by_campaign.remove(&campaign.id).unwrap_or_default();
    }
    Ok(())
}

fn touch_user(conn: &Connection, address: &str, now: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO users (address, created_at, updated_at) VALUES (?1, ?2, ?2)
         ON CONFLICT(address) DO UPDATE SET updated_at = excluded.updated_at",
        rusqlite::params![address, now],
    )?;
    Ok(())
}

fn query_user(conn: &Connection, address: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(
        "SELECT address, name, email, bio, avatar, total_donated, total_raised, created_at, updated_at
         FROM users WHERE address = ?1",
    )?;

    let user = stmt
        .query_row([address], |row| {
            Ok(UserRow {
                address: row.get(0)?,
                name: row.get(1)?,
                email: row.get(2)?,
                bio: row.get(3)?,
                avatar: row.get(4)?,
                total_donated: row.get(5)?,
                total_raised: row.get(6)?,
                created_at: row.get(7)?,
                updated_at: row.get(8)?,
                campaigns_created: vec![],
                campaigns_donated: vec![],
            })
        })
        .optional()?;

    let Some(mut user) = user else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT c.id FROM user_campaigns_created u
         JOIN campaigns c ON c.id = u.campaign_id
         WHERE u.address = ?1
         ORDER BY c.created_at DESC",
    )?;
    user.campaigns_created = stmt
        .query_map([address], |row| row.get(0))?
        .collect::<std::result::Result<Vec<String>, _>>()?;

    let mut stmt = conn.prepare(
        "SELECT campaign_id, amount, date, transaction_hash FROM user_donations
         WHERE address = ?1
         ORDER BY id",
    )?;
    user.campaigns_donated = stmt
        .query_map([address], |row| {
            Ok(UserDonationRow {
                campaign_id: row.get(0)?,
                amount: row.get(1)?,
                date: row.get(2)?,
                transaction_hash: row.get(3)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(Some(user))
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
