//! Event system for block processing.
//!
//! The block processor reports every step of a polling cycle as a [`BlockEvent`]. Events are
//! funneled through a single event task and handed to the registered [`BlockEventHandler`]s one
//! at a time, so handlers never run concurrently with each other. The shared data controller
//! turns these fine-grained events into coarse [`SharedDataControllerEvent`]s for its observers.

use crate::indexer::{AssetDecoration, AssetId, Currency};
use crate::wallet::{Account, AccountHandle, CurrencyHandle, LocalAccount, WalletSyncError};

use std::collections::HashMap;

/// Events emitted by the block processor during one polling cycle.
///
/// For a single account the order is always `WillFetchAccount`, then `DidFetchAccount` or
/// `DidFailToFetchAccount`, then (after a successful fetch) `WillFetchAssetDetails` followed by
/// its outcome. There is no ordering between accounts. `DidFinish` is always the last event of a
/// cycle.
#[derive(Debug, Clone)]
pub enum BlockEvent {
    /// A new cycle was accepted
    WillStart,
    WillFetchAccount(LocalAccount),
    DidFetchAccount(Account),
    DidFailToFetchAccount {
        local_account: LocalAccount,
        error: WalletSyncError,
    },
    WillFetchAssetDetails(Account),
    DidFetchAssetDetails {
        account: Account,
        new_asset_details: HashMap<AssetId, AssetDecoration>,
    },
    DidFailToFetchAssetDetails {
        account: Account,
        error: WalletSyncError,
    },
    WillFetchCurrency,
    DidFetchCurrency(Currency),
    DidFailToFetchCurrency(WalletSyncError),
    /// Every chain of the cycle has completed
    DidFinish,
}

impl BlockEvent {
    /// Short name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            BlockEvent::WillStart => "willStart",
            BlockEvent::WillFetchAccount(_) => "willFetchAccount",
            BlockEvent::DidFetchAccount(_) => "didFetchAccount",
            BlockEvent::DidFailToFetchAccount { .. } => "didFailToFetchAccount",
            BlockEvent::WillFetchAssetDetails(_) => "willFetchAssetDetails",
            BlockEvent::DidFetchAssetDetails { .. } => "didFetchAssetDetails",
            BlockEvent::DidFailToFetchAssetDetails { .. } => "didFailToFetchAssetDetails",
            BlockEvent::WillFetchCurrency => "willFetchCurrency",
            BlockEvent::DidFetchCurrency(_) => "didFetchCurrency",
            BlockEvent::DidFailToFetchCurrency(_) => "didFailToFetchCurrency",
            BlockEvent::DidFinish => "didFinish",
        }
    }
}

/// Trait for handling block events.
///
/// Handlers are invoked from the processor's event task while the event gate is held, so they
/// must not block on anything that waits for the block processor itself.
pub trait BlockEventHandler: Send + Sync {
    /// Handle a block event.
    fn handle(&self, event: &BlockEvent) -> Result<(), WalletSyncError>;

    /// Get the name of this handler for logging and diagnostics.
    fn name(&self) -> &'static str;
}

/// Event dispatcher that manages multiple event handlers.
///
/// Handlers are called in the order they are registered. Errors from one handler are logged and
/// do not stop the others from running.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: Vec<std::sync::Arc<dyn BlockEventHandler>>,
}

impl EventDispatcher {
    /// Create a new, empty event dispatcher.
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    /// Register a new event handler.
    pub fn register_handler(&mut self, handler: std::sync::Arc<dyn BlockEventHandler>) {
        self.handlers.push(handler);
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Dispatch an event to all registered handlers.
    pub fn dispatch(&self, event: &BlockEvent) {
        for handler in &self.handlers {
            if let Err(e) = handler.handle(event) {
                tracing::error!(
                    "Handler {} failed to process {}: {}",
                    handler.name(),
                    event.name(),
                    e
                );
            }
        }
    }
}

/// Coarse lifecycle events published to shared data controller observers.
#[derive(Debug, Clone)]
pub enum SharedDataControllerEvent {
    DidBecomeIdle,
    /// A polling cycle started; `first` is set until one cycle has completed since the last reset
    DidStartRunning { first: bool },
    DidUpdateAccountCollection(AccountHandle),
    DidUpdateAssetDetailCollection,
    DidUpdateCurrency(CurrencyHandle),
    DidFinishRunning,
}

impl SharedDataControllerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SharedDataControllerEvent::DidBecomeIdle => "didBecomeIdle",
            SharedDataControllerEvent::DidStartRunning { .. } => "didStartRunning",
            SharedDataControllerEvent::DidUpdateAccountCollection(_) => {
                "didUpdateAccountCollection"
            }
            SharedDataControllerEvent::DidUpdateAssetDetailCollection => {
                "didUpdateAssetDetailCollection"
            }
            SharedDataControllerEvent::DidUpdateCurrency(_) => "didUpdateCurrency",
            SharedDataControllerEvent::DidFinishRunning => "didFinishRunning",
        }
    }
}

/// Receives controller events, always on the delivery thread.
pub trait SharedDataControllerObserver: Send + Sync {
    fn shared_data_controller_did_publish(&self, event: &SharedDataControllerEvent);
}
