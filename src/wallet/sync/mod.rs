//! Wallet Synchronization Module
//!
//! This module provides the services that keep a wallet's accounts, asset details and currency
//! rate in step with the Algorand chain. It is composed of several submodules, each responsible
//! for a specific aspect of the sync process:
//!
//! - `round_watcher`: Long-polls the node and signals every new round.
//! - `block_processor`: Runs one polling cycle per signal and reports progress as block events.
//! - `account_fetch` / `asset_detail_fetch`: The two fetch operations chained per account.
//! - `shared_data_controller`: The main entry point. Owns the cache, turns block events into
//!   account statuses and publishes coarse events to observers.
//! - `events`: Block events, controller events and their handler/observer traits.
//! - `cache`, `publisher`, `progress_tracker`, `updates_monitor`: Supporting services.
//!
//! Only one cycle runs at a time. Stopping the controller cancels the cycle in flight silently.

/// Fetch operation for a single account
pub mod account_fetch;
/// Batched, cancellable fetch of asset decorations
pub mod asset_detail_fetch;
/// Polling cycle driver
pub mod block_processor;
/// Copy-on-write account and asset cache
pub mod cache;
/// Event system for decoupled communication during sync
pub mod events;
/// Tracks cycle progress and statistics
pub mod progress_tracker;
/// Delivery of controller events on a dedicated thread
pub mod publisher;
/// New-round signal source
pub mod round_watcher;
/// Main coordinator for the wallet sync process
pub mod shared_data_controller;
/// Tracks pending opt-in and opt-out requests
pub mod updates_monitor;

#[cfg(test)]
mod mock_api;

pub use account_fetch::AccountFetchOperation;
pub use asset_detail_fetch::AssetDetailGroupFetchOperation;
pub use block_processor::{BlockProcessor, BlockRequest};
pub use events::{BlockEvent, SharedDataControllerEvent, SharedDataControllerObserver};
pub use progress_tracker::{CycleProgressTracker, CycleStats};
pub use round_watcher::{BlockCycle, RoundWatcher};
pub use shared_data_controller::{PollingStatus, SharedDataController};
pub use updates_monitor::{BlockchainUpdatesMonitor, OptInStatus, OptOutStatus};
