//! Account and asset state sync for Algorand wallets.
//!
//! The [`wallet::SharedDataController`] keeps a cached view of the user's accounts, the
//! decorations of the assets they hold and the preferred currency rate, refreshed on every new
//! round confirmed by the node.

pub mod config;
pub mod indexer;
pub mod utils;
pub mod wallet;
