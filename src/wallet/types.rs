use crate::indexer::IndexerError;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};

/// An account the user keeps on this device.
///
/// Carries the local hints needed to show something sensible before the chain has
/// answered, or when the chain has never seen the address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalAccount {
    pub address: String,
    pub name: Option<String>,
    /// Watch accounts have no signing key on this device.
    #[serde(default)]
    pub is_watch_account: bool,
    #[serde(default)]
    pub preferred_order: i32,
    /// Signed with a paired ledger device.
    #[serde(default)]
    pub is_ledger: bool,
}

impl LocalAccount {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: None,
            is_watch_account: false,
            preferred_order: 0,
            is_ledger: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_ledger(mut self) -> Self {
        self.is_ledger = true;
        self
    }
}

/// Source of the accounts and preferences of the signed-in user.
pub trait LocalAccountSource: Send + Sync {
    fn local_accounts(&self) -> Vec<LocalAccount>;

    fn preferred_currency(&self) -> Option<String>;

    fn remove_account(&self, address: &str);

    /// Whether a signing key for `address` is stored on this device.
    fn has_private_data(&self, address: &str) -> bool;
}

/// In-memory session used by the binary and by tests.
#[derive(Debug, Default)]
pub struct InMemorySession {
    accounts: RwLock<Vec<LocalAccount>>,
    currency: RwLock<Option<String>>,
    private_data: RwLock<HashSet<String>>,
}

impl InMemorySession {
    pub fn new(accounts: Vec<LocalAccount>, currency: Option<String>) -> Self {
        Self {
            accounts: RwLock::new(accounts),
            currency: RwLock::new(currency),
            private_data: RwLock::new(HashSet::new()),
        }
    }

    pub fn add_account(&self, account: LocalAccount) {
        let mut accounts = self.accounts.write().unwrap_or_else(PoisonError::into_inner);
        accounts.retain(|a| a.address != account.address);
        accounts.push(account);
    }

    pub fn set_preferred_currency(&self, currency: Option<String>) {
        *self.currency.write().unwrap_or_else(PoisonError::into_inner) = currency;
    }

    /// Record that a signing key for `address` is held on this device.
    pub fn store_private_data(&self, address: impl Into<String>) {
        self.private_data
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(address.into());
    }
}

impl LocalAccountSource for InMemorySession {
    fn local_accounts(&self) -> Vec<LocalAccount> {
        self.accounts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn preferred_currency(&self) -> Option<String> {
        self.currency
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn remove_account(&self, address: &str) {
        self.accounts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|a| a.address != address);
    }

    fn has_private_data(&self, address: &str) -> bool {
        self.private_data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(address)
    }
}

/// Error types for the sync engine.
///
/// Cloneable so a failure can be kept inside an account or currency status.
#[derive(Debug, Clone, thiserror::Error)]
pub enum WalletSyncError {
    #[error("Indexer error: {0}")]
    IndexerError(Arc<IndexerError>),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Skipped because an upstream fetch failed: {0}")]
    UpstreamDependencyFailed(Box<WalletSyncError>),

    #[error("Missing input: {0}")]
    MissingInput(&'static str),

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },

    #[error("Runtime error: {0}")]
    RuntimeError(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Short name used across the crate.
pub type SyncError = WalletSyncError;

impl From<IndexerError> for WalletSyncError {
    fn from(error: IndexerError) -> Self {
        WalletSyncError::IndexerError(Arc::new(error))
    }
}

impl WalletSyncError {
    /// Whether this error only reports a deliberate cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, WalletSyncError::Cancelled)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, WalletSyncError::IndexerError(e) if e.is_not_found())
    }
}
