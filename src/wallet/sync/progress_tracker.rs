//! Progress tracking for polling cycles.
//!
//! This module provides the `CycleProgressTracker`, which counts what happened to each account
//! during one polling cycle: account fetches, asset detail fetches, and how many decorations were
//! newly learned. The controller logs its summary when the cycle finishes and keeps the last
//! summary around for diagnostics.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::{info, warn};

/// Service for tracking the progress of one polling cycle
#[derive(Debug, Clone)]
pub struct CycleProgressTracker {
    /// When the cycle was accepted
    started_at: DateTime<Utc>,
    /// Accounts the cycle was started for
    expected_accounts: HashSet<String>,
    accounts_fetched: usize,
    accounts_failed: usize,
    asset_details_fetched: usize,
    asset_details_failed: usize,
    /// Decorations that were not cached before this cycle
    new_asset_details: usize,
    /// Accounts that reached a terminal state in this cycle
    settled_accounts: HashSet<String>,
}

impl CycleProgressTracker {
    /// Create a tracker for a cycle over the given accounts.
    pub fn new(addresses: impl IntoIterator<Item = String>) -> Self {
        Self {
            started_at: Utc::now(),
            expected_accounts: addresses.into_iter().collect(),
            accounts_fetched: 0,
            accounts_failed: 0,
            asset_details_fetched: 0,
            asset_details_failed: 0,
            new_asset_details: 0,
            settled_accounts: HashSet::new(),
        }
    }

    /// Tracker for a cycle whose account list is learned as it runs.
    pub fn empty() -> Self {
        Self::new(std::iter::empty())
    }

    pub fn expect_account(&mut self, address: &str) {
        self.expected_accounts.insert(address.to_string());
    }

    pub fn record_account_fetched(&mut self) {
        self.accounts_fetched += 1;
    }

    /// A failed account fetch also settles the account, no asset details follow.
    pub fn record_account_failed(&mut self, address: &str) {
        self.accounts_failed += 1;
        self.settled_accounts.insert(address.to_string());
    }

    pub fn record_asset_details_fetched(&mut self, address: &str, new_decorations: usize) {
        self.asset_details_fetched += 1;
        self.new_asset_details += new_decorations;
        self.settled_accounts.insert(address.to_string());
    }

    pub fn record_asset_details_failed(&mut self, address: &str) {
        self.asset_details_failed += 1;
        self.settled_accounts.insert(address.to_string());
    }

    /// Accounts that never reached a terminal state, i.e. whose chain was cancelled.
    pub fn unsettled_accounts(&self) -> Vec<String> {
        let mut unsettled: Vec<String> = self
            .expected_accounts
            .difference(&self.settled_accounts)
            .cloned()
            .collect();
        unsettled.sort();
        unsettled
    }

    /// Log the cycle summary, warning about accounts that did not settle.
    pub fn log_completion(&self) {
        let stats = self.get_stats();
        info!("{}", stats.summary());

        for address in &stats.unsettled_accounts {
            warn!("Account {} did not settle during the cycle", address);
        }
    }

    /// Get cycle statistics as a CycleStats struct
    pub fn get_stats(&self) -> CycleStats {
        CycleStats {
            started_at: self.started_at,
            duration_ms: (Utc::now() - self.started_at).num_milliseconds().max(0) as u64,
            accounts_total: self.expected_accounts.len(),
            accounts_fetched: self.accounts_fetched,
            accounts_failed: self.accounts_failed,
            asset_details_fetched: self.asset_details_fetched,
            asset_details_failed: self.asset_details_failed,
            new_asset_details: self.new_asset_details,
            unsettled_accounts: self.unsettled_accounts(),
        }
    }
}

/// Statistics about one polling cycle
#[derive(Debug, Clone, PartialEq)]
pub struct CycleStats {
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub accounts_total: usize,
    pub accounts_fetched: usize,
    pub accounts_failed: usize,
    pub asset_details_fetched: usize,
    pub asset_details_failed: usize,
    pub new_asset_details: usize,
    pub unsettled_accounts: Vec<String>,
}

impl CycleStats {
    /// Get a human-readable summary of the cycle statistics
    pub fn summary(&self) -> String {
        format!(
            "Cycle over {} accounts in {}ms: {} fetched, {} failed, asset details {} ok / {} failed, {} new decorations{}",
            self.accounts_total,
            self.duration_ms,
            self.accounts_fetched,
            self.accounts_failed,
            self.asset_details_fetched,
            self.asset_details_failed,
            self.new_asset_details,
            if self.unsettled_accounts.is_empty() {
                String::new()
            } else {
                format!(" ({} unsettled)", self.unsettled_accounts.len())
            }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn counts_outcomes_and_unsettled_accounts() {
        let mut tracker = CycleProgressTracker::new(["A".to_string(), "B".to_string()]);
        tracker.expect_account("C");

        tracker.record_account_fetched();
        tracker.record_asset_details_fetched("A", 3);
        tracker.record_account_failed("B");

        let stats = tracker.get_stats();
        assert_eq!(stats.accounts_total, 3);
        assert_eq!(stats.accounts_fetched, 1);
        assert_eq!(stats.accounts_failed, 1);
        assert_eq!(stats.new_asset_details, 3);
        assert_eq!(stats.unsettled_accounts, vec!["C".to_string()]);
        assert!(stats.summary().ends_with("(1 unsettled)"));
    }

    #[test]
    fn settled_cycle_has_plain_summary() {
        let mut tracker = CycleProgressTracker::empty();
        tracker.expect_account("A");
        tracker.record_account_fetched();
        tracker.record_asset_details_failed("A");

        let summary = tracker.get_stats().summary();
        assert!(summary.contains("asset details 0 ok / 1 failed"));
        assert!(!summary.contains("unsettled"));
    }
}
