//! Statistics generation from the ledger database
//!
//! This module provides functionality for extracting and displaying
//! ledger statistics from the storage layer.

use crate::state::UrlStatus;
use crate::storage::Storage;
use crate::url::UrlKind;
use crate::FurlongError;
use std::collections::BTreeMap;

/// Ledger statistics summary
#[derive(Debug, Clone, Default)]
pub struct LedgerStatistics {
    /// Total number of stored addresses
    pub total: u64,

    /// Row counts for every (kind, status) pair present
    pub by_kind_and_status: BTreeMap<(UrlKind, UrlStatus), u64>,
}

impl LedgerStatistics {
    pub fn count(&self, kind: UrlKind, status: UrlStatus) -> u64 {
        self.by_kind_and_status
            .get(&(kind, status))
            .copied()
            .unwrap_or(0)
    }

    pub fn total_for_kind(&self, kind: UrlKind) -> u64 {
        UrlStatus::all_statuses()
            .iter()
            .map(|status| self.count(kind, *status))
            .sum()
    }

    pub fn total_for_status(&self, status: UrlStatus) -> u64 {
        self.by_kind_and_status
            .iter()
            .filter(|((_, s), _)| *s == status)
            .map(|(_, count)| count)
            .sum()
    }

    /// Entity addresses (all kinds but `unknown`)
    pub fn entities(&self) -> u64 {
        UrlKind::ENTITIES
            .iter()
            .map(|kind| self.total_for_kind(*kind))
            .sum()
    }
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(LedgerStatistics)` - Successfully loaded statistics
/// * `Err(FurlongError)` - Failed to query statistics
pub fn load_statistics(storage: &dyn Storage) -> Result<LedgerStatistics, FurlongError> {
    let by_kind_and_status = storage.counts_by_kind_and_status()?;
    let total = by_kind_and_status.values().sum();

    Ok(LedgerStatistics {
        total,
        by_kind_and_status,
    })
}

/// Prints statistics to stdout as a kind × status table
pub fn print_statistics(stats: &LedgerStatistics) {
    println!("=== Ledger Statistics ===\n");

    println!("Overview:");
    println!("  Total addresses: {}", stats.total);
    println!("  Entity addresses: {}", stats.entities());
    println!();

    let statuses = UrlStatus::all_statuses();
    print!("  {:<10}", "kind");
    for status in &statuses {
        print!("{:>14}", status.to_db_string());
    }
    println!("{:>10}", "total");

    for kind in UrlKind::ENTITIES.iter().chain([UrlKind::Unknown].iter()) {
        print!("  {:<10}", kind.to_db_string());
        for status in &statuses {
            print!("{:>14}", stats.count(*kind, *status));
        }
        println!("{:>10}", stats.total_for_kind(*kind));
    }
    println!();

    let done = stats.total_for_status(UrlStatus::Succeeded);
    let entities = stats.entities();
    let completion = if entities > 0 {
        (done as f64 / entities as f64) * 100.0
    } else {
        0.0
    };

    println!(
        "Scraped: {:.1}% ({} / {} entity addresses successful)",
        completion, done, entities
    );
}
