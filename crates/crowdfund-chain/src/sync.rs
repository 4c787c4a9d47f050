//! Read-only comparison of chain state against the store.

use std::cmp::Ordering;
use std::collections::HashMap;

use tracing::debug;

use crowdfund_service::amount;
use crowdfund_types::api::{ChainDonation, SyncMismatch, SyncReport};
use crowdfund_types::models::{Campaign, Donator};

use crate::ChainError;
use crate::gateway::{ChainReader, OnChainCampaign};

/// Builds a [`SyncReport`] from live chain reads. Every mismatched campaign
/// gets its on-chain donator list fetched to name the donations the store
/// is missing.
pub async fn report(chain: &dyn ChainReader, stored: &[Campaign]) -> Result<SyncReport, ChainError> {
    let on_chain = chain.campaigns().await?;
    let mut report = compare(&on_chain, stored);

    let by_contract_id: HashMap<u64, &Campaign> = stored.iter().map(|c| (c.contract_id, c)).collect();
    for mismatch in &mut report.mismatched {
        let Some(local) = by_contract_id.get(&mismatch.contract_id) else {
            continue;
        };
        let donators = chain.donators(mismatch.contract_id).await?;
        mismatch.unrecorded = unrecorded(&donators, &local.donators);
        debug!(
            "Campaign {} has {} unrecorded donations",
            mismatch.contract_id,
            mismatch.unrecorded.len()
        );
    }

    Ok(report)
}

/// Lists on-chain campaigns the store does not know about, and stored
/// campaigns whose collected amount or donation count disagrees with chain.
pub fn compare(on_chain: &[OnChainCampaign], stored: &[Campaign]) -> SyncReport {
    let by_contract_id: HashMap<u64, &Campaign> = stored.iter().map(|c| (c.contract_id, c)).collect();

    let mut report = SyncReport {
        on_chain_campaigns: on_chain.len(),
        ..Default::default()
    };

    for chain in on_chain {
        let Some(local) = by_contract_id.get(&chain.id) else {
            report.missing_in_store.push(chain.id);
            continue;
        };

        let chain_donations = chain.donations.len() as u64;
        let amount_differs = amount::compare(&local.amount_collected, &chain.amount_collected) != Ordering::Equal;
        if amount_differs || local.total_donations != chain_donations {
            report.mismatched.push(SyncMismatch {
                contract_id: chain.id,
                stored_amount: local.amount_collected.clone(),
                chain_amount: chain.amount_collected.clone(),
                stored_donations: local.total_donations,
                chain_donations,
                unrecorded: vec![],
            });
        }
    }

    report
}

/// On-chain `(donator, amount)` pairs left over after matching each against
/// at most one stored entry.
fn unrecorded(on_chain: &[(String, String)], stored: &[Donator]) -> Vec<ChainDonation> {
    let mut remaining: HashMap<(String, String), usize> = HashMap::new();
    for d in stored {
        *remaining.entry(donation_key(&d.address, &d.amount)).or_default() += 1;
    }

    on_chain
        .iter()
        .filter(|(donator, value)| match remaining.get_mut(&donation_key(donator, value)) {
            Some(count) if *count > 0 => {
                *count -= 1;
                false
            }
            _ => true,
        })
        .map(|(donator, value)| ChainDonation {
            donator: donator.clone(),
            amount: value.clone(),
        })
        .collect()
}

fn donation_key(address: &str, value: &str) -> (String, String) {
    let value = amount::parse_wei(value)
        .map(|v| v.to_string())
        .unwrap_or_else(|| value.trim().to_string());
    (address.trim().to_lowercase(), value)
}
