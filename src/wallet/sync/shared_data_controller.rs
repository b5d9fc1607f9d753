//! Shared data controller and integration point for all sync services.
//!
//! This module defines the `SharedDataController`, which owns the account/asset cache and the
//! block processor. It is responsible for:
//! - Turning block events into account status transitions on the cache
//! - Publishing coarse lifecycle events to observers on the delivery thread
//! - Starting, stopping and resetting polling
//! - Answering rekey and opt-in/opt-out queries against the cached state
//!
//! The controller is an explicitly constructed service; create one per session and share it.

use crate::config::SyncConfig;
use crate::indexer::{AssetDecoration, AssetId, ChainApi, TransactionParams};
use crate::utils::format_algos;
use crate::wallet::sync::{
    block_processor::{BlockProcessor, BlockRequest, BlockRequestSource, ProcessorConfig},
    cache::SyncCache,
    events::{
        BlockEvent, BlockEventHandler, SharedDataControllerEvent, SharedDataControllerObserver,
    },
    progress_tracker::{CycleProgressTracker, CycleStats},
    publisher::EventPublisher,
    round_watcher::{BlockCycle, RoundWatcher, WatcherConfig},
    updates_monitor::{BlockchainUpdatesMonitor, OptInStatus, OptOutStatus},
};
use crate::wallet::{
    Account, AccountCollection, AccountHandle, AccountStatus, AssetDetailCollection,
    CurrencyHandle, LocalAccount, LocalAccountSource, WalletSyncError, determine_authorization,
};

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

/// Polling status of the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollingStatus {
    /// Never started, or reset
    Idle,
    /// A cycle is running
    Running,
    /// Polling was stopped
    Suspended,
    /// The last cycle completed and the next block is awaited
    Completed,
}

#[derive(Debug)]
struct PollingState {
    status: PollingStatus,
    first_round_completed: bool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Main controller that keeps the wallet's view of the chain fresh.
pub struct SharedDataController {
    state: Arc<ControllerState>,
    processor: BlockProcessor,
}

impl SharedDataController {
    /// Create a controller polling rounds from the node through `api`.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(
        api: Arc<dyn ChainApi>,
        session: Arc<dyn LocalAccountSource>,
        config: &SyncConfig,
    ) -> Result<Self, WalletSyncError> {
        let watcher = RoundWatcher::new(api.clone(), WatcherConfig::from(config))?;
        Self::with_block_cycle(api, session, Box::new(watcher), config)
    }

    /// Create a controller driven by a custom block cycle.
    pub fn with_block_cycle(
        api: Arc<dyn ChainApi>,
        session: Arc<dyn LocalAccountSource>,
        cycle: Box<dyn BlockCycle>,
        config: &SyncConfig,
    ) -> Result<Self, WalletSyncError> {
        let runtime = Handle::try_current()
            .map_err(|e| WalletSyncError::RuntimeError(format!("No Tokio runtime: {}", e)))?;

        let state = Arc::new(ControllerState {
            api: api.clone(),
            session,
            cache: SyncCache::new(),
            publisher: EventPublisher::new()?,
            monitor: BlockchainUpdatesMonitor::new(),
            polling: Mutex::new(PollingState {
                status: PollingStatus::Idle,
                first_round_completed: false,
            }),
            progress: Mutex::new(None),
            last_cycle_stats: Mutex::new(None),
            transaction_params: Mutex::new(None),
            runtime,
        });

        let processor = BlockProcessor::new(
            api,
            cycle,
            state.clone(),
            ProcessorConfig::from(config),
        )?;
        processor.register_handler(state.clone());

        Ok(Self { state, processor })
    }

    /// Start polling and prime the transaction params cache.
    pub fn start_polling(&self) {
        info!("Starting polling");
        self.state.set_status(PollingStatus::Running);
        self.processor.start();
        self.state.refresh_transaction_params_in_background();
    }

    /// Stop polling; the cycle in flight is cancelled and reports nothing more.
    pub fn stop_polling(&self) {
        info!("Stopping polling");
        self.state.set_status(PollingStatus::Suspended);
        self.processor.stop();
    }

    /// Stop, wipe the cache and start again from scratch.
    pub fn reset(&self) {
        self.cancel();
        self.start_polling();
    }

    /// Stop and wipe the cache without restarting.
    pub fn cancel(&self) {
        self.stop_polling();
        self.state.cache.clear();
        *lock(&self.state.progress) = None;
        {
            let mut polling = lock(&self.state.polling);
            polling.first_round_completed = false;
            polling.status = PollingStatus::Idle;
        }
        info!("Sync state reset");
        self.state.publish(SharedDataControllerEvent::DidBecomeIdle);
    }

    /// Poll again from scratch so values are shown in the newly preferred currency.
    pub fn reset_polling_after_preferred_currency_was_changed(&self) {
        self.reset();
    }

    /// Forget an account: drop it from the session and the cache, then poll again.
    pub fn reset_polling_after_removing(&self, address: &str) {
        self.stop_polling();
        self.state.session.remove_account(address);
        if self.state.cache.update_accounts(|accounts| accounts.remove(address)).is_some() {
            debug!("Removed account {} from the cache", address);
        }
        self.start_polling();
    }

    /// Register an observer. It immediately receives the event matching the current status.
    /// Only a weak reference is kept.
    pub fn add<O: SharedDataControllerObserver + 'static>(&self, observer: &Arc<O>) {
        let observer: Arc<dyn SharedDataControllerObserver> = observer.clone();
        let observer = Arc::downgrade(&observer);
        self.state.publisher.add(observer.clone());
        self.state
            .publisher
            .publish_to(observer, self.state.current_status_event());
    }

    pub fn remove<O: SharedDataControllerObserver + 'static>(&self, observer: &Arc<O>) {
        let observer: Arc<dyn SharedDataControllerObserver> = observer.clone();
        self.state.publisher.remove(&Arc::downgrade(&observer));
    }

    pub fn account_collection(&self) -> Arc<AccountCollection> {
        self.state.cache.accounts()
    }

    pub fn asset_detail_collection(&self) -> Arc<AssetDetailCollection> {
        self.state.cache.asset_details()
    }

    /// Seed the decoration cache with decorations from a trusted source.
    pub fn prime_asset_details(&self, decorations: impl IntoIterator<Item = AssetDecoration>) {
        self.state.cache.merge_asset_details(decorations);
        self.state
            .publish(SharedDataControllerEvent::DidUpdateAssetDetailCollection);
    }

    pub fn currency(&self) -> CurrencyHandle {
        self.state.cache.currency()
    }

    pub fn status(&self) -> PollingStatus {
        lock(&self.state.polling).status
    }

    /// Whether one polling round completed since the last reset.
    pub fn is_available(&self) -> bool {
        lock(&self.state.polling).first_round_completed
    }

    /// Whether there is anything to poll for.
    pub fn is_polling_available(&self) -> bool {
        !self.state.session.local_accounts().is_empty()
    }

    pub fn last_cycle_stats(&self) -> Option<CycleStats> {
        lock(&self.state.last_cycle_stats).clone()
    }

    /// Transaction params, served from the cache when enabled and a previous fetch succeeded.
    /// A cached answer is refreshed in the background.
    pub async fn get_transaction_params(
        &self,
        cache_enabled: bool,
    ) -> Result<TransactionParams, WalletSyncError> {
        if cache_enabled {
            let cached = lock(&self.state.transaction_params).clone();
            if let Some(Ok(params)) = cached {
                self.state.refresh_transaction_params_in_background();
                return Ok(params);
            }
        }

        self.state.fetch_transaction_params().await
    }

    /// Cached accounts whose signing authority is `address`.
    pub fn rekeyed_accounts(&self, address: &str) -> Vec<AccountHandle> {
        self.state
            .cache
            .accounts()
            .rekeyed_accounts(address)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Cached account signing for `address`.
    pub fn auth_account(&self, address: &str) -> Option<AccountHandle> {
        self.state.cache.accounts().auth_account(address).cloned()
    }

    pub fn blockchain_updates_monitor(&self) -> &BlockchainUpdatesMonitor {
        &self.state.monitor
    }

    pub fn has_opted_in(&self, asset_id: AssetId, address: &str) -> OptInStatus {
        let pending = self.state.monitor.has_pending_opt_in_request(address, asset_id);
        let held = self.state.holds_asset(address, asset_id);

        match (pending, held) {
            (true, false) => OptInStatus::Pending,
            (_, true) => OptInStatus::OptedIn,
            (false, false) => OptInStatus::Rejected,
        }
    }

    pub fn has_opted_out(&self, asset_id: AssetId, address: &str) -> OptOutStatus {
        let pending = self.state.monitor.has_pending_opt_out_request(address, asset_id);
        let gone = !self.state.holds_asset(address, asset_id);

        match (pending, gone) {
            (true, false) => OptOutStatus::Pending,
            (_, true) => OptOutStatus::OptedOut,
            (false, false) => OptOutStatus::Rejected,
        }
    }
}

/// State shared between the controller and the block processor.
///
/// Serves the processor's requests and handles its events. Events arrive one at a time on the
/// processor's event task, which makes this the only writer of the cache.
struct ControllerState {
    api: Arc<dyn ChainApi>,
    session: Arc<dyn LocalAccountSource>,
    cache: SyncCache,
    publisher: EventPublisher,
    monitor: BlockchainUpdatesMonitor,
    polling: Mutex<PollingState>,
    progress: Mutex<Option<CycleProgressTracker>>,
    last_cycle_stats: Mutex<Option<CycleStats>>,
    transaction_params: Mutex<Option<Result<TransactionParams, WalletSyncError>>>,
    runtime: Handle,
}

impl ControllerState {
    fn set_status(&self, status: PollingStatus) {
        lock(&self.polling).status = status;
    }

    fn publish(&self, event: SharedDataControllerEvent) {
        debug!("Publishing {}", event.name());
        self.publisher.publish(event);
    }

    fn current_status_event(&self) -> SharedDataControllerEvent {
        let polling = lock(&self.polling);
        match polling.status {
            PollingStatus::Idle => SharedDataControllerEvent::DidBecomeIdle,
            PollingStatus::Running => SharedDataControllerEvent::DidStartRunning {
                first: !polling.first_round_completed,
            },
            PollingStatus::Suspended if polling.first_round_completed => {
                SharedDataControllerEvent::DidFinishRunning
            }
            PollingStatus::Suspended => SharedDataControllerEvent::DidBecomeIdle,
            PollingStatus::Completed => SharedDataControllerEvent::DidFinishRunning,
        }
    }

    fn holds_asset(&self, address: &str, asset_id: AssetId) -> bool {
        self.cache
            .accounts()
            .get(address)
            .is_some_and(|handle| handle.value.is_opted_in(asset_id))
    }

    fn with_progress(&self, record: impl FnOnce(&mut CycleProgressTracker)) {
        if let Some(tracker) = lock(&self.progress).as_mut() {
            record(tracker);
        }
    }

    async fn fetch_transaction_params(&self) -> Result<TransactionParams, WalletSyncError> {
        let result = self
            .api
            .transaction_params()
            .await
            .map_err(WalletSyncError::from);
        *lock(&self.transaction_params) = Some(result.clone());
        result
    }

    fn refresh_transaction_params_in_background(self: &Arc<Self>) {
        let state = self.clone();
        self.runtime.spawn(async move {
            if let Err(e) = state.fetch_transaction_params().await {
                warn!("Failed to refresh transaction params: {}", e);
            }
        });
    }

    /// Apply `update` to the cached handle of `address` and publish the result.
    fn update_handle(
        &self,
        address: &str,
        update: impl FnOnce(&mut AccountHandle) -> Result<(), WalletSyncError>,
    ) -> Result<(), WalletSyncError> {
        let handle = self.cache.update_accounts(|accounts| {
            let handle = accounts
                .get_mut(address)
                .ok_or(WalletSyncError::MissingInput("cached account handle"))?;
            update(handle)?;
            Ok::<_, WalletSyncError>(handle.clone())
        })?;

        debug!("Account {} is {}", address, handle.status().name());
        self.publish(SharedDataControllerEvent::DidUpdateAccountCollection(handle));
        Ok(())
    }

    fn will_start(&self) {
        let first = {
            let mut polling = lock(&self.polling);
            polling.status = PollingStatus::Running;
            !polling.first_round_completed
        };
        *lock(&self.progress) = Some(CycleProgressTracker::empty());

        self.publish(SharedDataControllerEvent::DidStartRunning { first });
    }

    fn will_fetch_account(&self, local_account: &LocalAccount) -> Result<(), WalletSyncError> {
        let address = local_account.address.as_str();
        let handle = self.cache.update_accounts(|accounts| {
            if let Some(handle) = accounts.get_mut(address).filter(|h| h.can_refresh()) {
                handle.transition(AccountStatus::Refreshing)?;
                return Ok::<_, WalletSyncError>(handle.clone());
            }

            let handle = AccountHandle::loading(Account::empty(local_account));
            accounts.insert(handle.clone());
            Ok(handle)
        })?;

        self.with_progress(|tracker| tracker.expect_account(address));
        self.publish(SharedDataControllerEvent::DidUpdateAccountCollection(handle));
        Ok(())
    }

    fn did_fetch_account(&self, account: &Account) -> Result<(), WalletSyncError> {
        info!(
            "Fetched {} at round {:?}: {} ALGO, {} assets",
            account.address,
            account.round,
            format_algos(account.amount),
            account.assets.len()
        );

        self.update_handle(&account.address, |handle| {
            let mut value = account.clone();
            value.inherit_compound_assets(&handle.value);
            value.authorization = handle.value.authorization;
            handle.transition_with_value(AccountStatus::UpToDate, value)
        })?;
        self.with_progress(|tracker| tracker.record_account_fetched());
        Ok(())
    }

    fn did_fail_to_fetch_account(
        &self,
        local_account: &LocalAccount,
        error: &WalletSyncError,
    ) -> Result<(), WalletSyncError> {
        let address = local_account.address.as_str();
        if !self.cache.accounts().contains(address) {
            self.cache.update_accounts(|accounts| {
                accounts.insert(AccountHandle::loading(Account::empty(local_account)))
            });
        }

        self.update_handle(address, |handle| {
            if matches!(handle.status(), AccountStatus::Refreshing) {
                handle.transition(AccountStatus::Expired(error.clone()))
            } else {
                handle.transition_with_value(
                    AccountStatus::Failed(error.clone()),
                    Account::empty(local_account),
                )
            }
        })?;
        self.with_progress(|tracker| tracker.record_account_failed(address));
        Ok(())
    }

    fn will_fetch_asset_details(&self, account: &Account) -> Result<(), WalletSyncError> {
        self.update_handle(&account.address, |handle| {
            let next = if handle.has_synced_asset_details() {
                AccountStatus::RefreshingAssetDetails
            } else {
                AccountStatus::LoadingAssetDetails
            };
            handle.transition(next)
        })
    }

    fn did_fetch_asset_details(
        &self,
        account: &Account,
        new_asset_details: &HashMap<AssetId, AssetDecoration>,
    ) -> Result<(), WalletSyncError> {
        if !new_asset_details.is_empty() {
            self.cache
                .merge_asset_details(new_asset_details.values().cloned());
            self.publish(SharedDataControllerEvent::DidUpdateAssetDetailCollection);
        }

        self.update_handle(&account.address, |handle| {
            let mut value = account.clone();
            value.authorization = handle.value.authorization;
            handle.transition_with_value(AccountStatus::Ready, value)
        })?;

        self.monitor.complete_updates(account);
        self.with_progress(|tracker| {
            tracker.record_asset_details_fetched(&account.address, new_asset_details.len())
        });
        Ok(())
    }

    fn did_fail_to_fetch_asset_details(
        &self,
        account: &Account,
        error: &WalletSyncError,
    ) -> Result<(), WalletSyncError> {
        self.update_handle(&account.address, |handle| {
            if matches!(handle.status(), AccountStatus::RefreshingAssetDetails) {
                // The previous buckets stay as the last good view.
                handle.transition(AccountStatus::ExpiredAssetDetails(error.clone()))
            } else {
                let mut value = account.clone();
                value.authorization = handle.value.authorization;
                handle.transition_with_value(AccountStatus::FailedAssetDetails(error.clone()), value)
            }
        })?;
        self.with_progress(|tracker| tracker.record_asset_details_failed(&account.address));
        Ok(())
    }

    fn update_currency(&self, update: impl FnOnce(CurrencyHandle) -> CurrencyHandle) {
        let currency = self.cache.update_currency(update);
        self.publish(SharedDataControllerEvent::DidUpdateCurrency(currency));
    }

    /// Classify who can sign for every cached account.
    fn update_authorizations(&self) {
        self.cache.update_accounts(|accounts| {
            let snapshot: &AccountCollection = accounts;
            let authorizations: Vec<_> = snapshot
                .iter()
                .map(|handle| {
                    let authorization =
                        determine_authorization(&handle.value, snapshot, self.session.as_ref());
                    (handle.address().to_string(), authorization)
                })
                .collect();

            for (address, authorization) in authorizations {
                if let Some(handle) = accounts.get_mut(&address) {
                    if handle.value.authorization != authorization {
                        debug!("Account {} authorization is {}", address, authorization.name());
                    }
                    handle.value.authorization = authorization;
                }
            }
        });
    }

    fn did_finish(&self) {
        self.update_authorizations();

        if let Some(tracker) = lock(&self.progress).take() {
            tracker.log_completion();
            *lock(&self.last_cycle_stats) = Some(tracker.get_stats());
        }

        self.monitor.remove_completed_updates();

        let finished_running = {
            let mut polling = lock(&self.polling);
            polling.first_round_completed = true;
            if polling.status == PollingStatus::Running {
                polling.status = PollingStatus::Completed;
                true
            } else {
                false
            }
        };

        if finished_running {
            self.publish(SharedDataControllerEvent::DidFinishRunning);
        }
    }
}

impl BlockRequestSource for ControllerState {
    fn make_request(&self) -> BlockRequest {
        BlockRequest {
            local_accounts: self.session.local_accounts(),
            cached_accounts: self.cache.accounts(),
            cached_asset_details: self.cache.asset_details(),
            currency_id: self.session.preferred_currency(),
        }
    }
}

impl BlockEventHandler for ControllerState {
    fn handle(&self, event: &BlockEvent) -> Result<(), WalletSyncError> {
        match event {
            BlockEvent::WillStart => self.will_start(),
            BlockEvent::WillFetchAccount(local_account) => {
                self.will_fetch_account(local_account)?
            }
            BlockEvent::DidFetchAccount(account) => self.did_fetch_account(account)?,
            BlockEvent::DidFailToFetchAccount {
                local_account,
                error,
            } => self.did_fail_to_fetch_account(local_account, error)?,
            BlockEvent::WillFetchAssetDetails(account) => {
                self.will_fetch_asset_details(account)?
            }
            BlockEvent::DidFetchAssetDetails {
                account,
                new_asset_details,
            } => self.did_fetch_asset_details(account, new_asset_details)?,
            BlockEvent::DidFailToFetchAssetDetails { account, error } => {
                self.did_fail_to_fetch_asset_details(account, error)?
            }
            BlockEvent::WillFetchCurrency => self.update_currency(CurrencyHandle::refreshing),
            BlockEvent::DidFetchCurrency(currency) => {
                let currency = currency.clone();
                self.update_currency(|_| CurrencyHandle::ready(currency))
            }
            BlockEvent::DidFailToFetchCurrency(error) => {
                let error = error.clone();
                self.update_currency(|previous| previous.failed(error))
            }
            BlockEvent::DidFinish => self.did_finish(),
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "SharedDataController"
    }
}
