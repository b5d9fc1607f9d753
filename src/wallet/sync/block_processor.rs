//! Per-block orchestration of account and asset detail fetches.
//!
//! On every signal of the block cycle the processor snapshots a [`BlockRequest`] and runs one
//! chain per local account on the Tokio pool: fetch the account, then fetch its asset details.
//! A barrier task waits for every chain before emitting `DidFinish`. Only one cycle is in flight
//! at a time; a signal arriving while a cycle runs is dropped.
//!
//! Events travel through a single unbounded channel drained by one event task, which hands them
//! to the registered handlers while holding the event gate. Each cycle stamps its events with the
//! generation it started in, and [`BlockProcessor::stop`] bumps the generation under the gate, so
//! nothing from a stopped cycle reaches a handler once `stop` has returned.

use crate::config::SyncConfig;
use crate::indexer::ChainApi;
use crate::wallet::sync::account_fetch::AccountFetchOperation;
use crate::wallet::sync::asset_detail_fetch::{
	AssetDetailGroupFetchInput, AssetDetailGroupFetchOperation,
};
use crate::wallet::sync::events::{BlockEvent, BlockEventHandler, EventDispatcher};
use crate::wallet::sync::round_watcher::BlockCycle;
use crate::wallet::{AccountCollection, AssetDetailCollection, LocalAccount, WalletSyncError};

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Everything one cycle needs, captured when the cycle starts.
#[derive(Debug, Clone, Default)]
pub struct BlockRequest {
	pub local_accounts: Vec<LocalAccount>,
	pub cached_accounts: Arc<AccountCollection>,
	pub cached_asset_details: Arc<AssetDetailCollection>,
	/// Preferred currency to refresh this cycle, if any.
	pub currency_id: Option<String>,
}

/// Builds the request of a new cycle.
pub trait BlockRequestSource: Send + Sync {
	fn make_request(&self) -> BlockRequest;
}

#[derive(Debug, Clone)]
pub struct ProcessorConfig {
	pub asset_batch_size: usize,
	pub max_concurrent_asset_batches: usize,
}

impl Default for ProcessorConfig {
	fn default() -> Self {
		Self::from(&SyncConfig::default())
	}
}

impl From<&SyncConfig> for ProcessorConfig {
	fn from(config: &SyncConfig) -> Self {
		Self {
			asset_batch_size: config.asset_batch_size,
			max_concurrent_asset_batches: config.max_concurrent_asset_batches.max(1),
		}
	}
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Envelope {
	generation: u64,
	event: BlockEvent,
}

struct EventGate {
	generation: u64,
	dispatcher: EventDispatcher,
}

struct ActiveCycle {
	id: u64,
	token: CancellationToken,
	/// Accounts whose chain has not finished yet
	pending_accounts: HashSet<String>,
}

/// Bookkeeping of the cycle in flight.
#[derive(Default)]
struct OperationQueue {
	active: Option<ActiveCycle>,
	next_id: u64,
}

impl OperationQueue {
	fn is_available(&self) -> bool {
		self.active.is_none()
	}

	fn begin(&mut self) -> Option<(u64, CancellationToken)> {
		if !self.is_available() {
			return None;
		}

		self.next_id += 1;
		let token = CancellationToken::new();
		self.active = Some(ActiveCycle {
			id: self.next_id,
			token: token.clone(),
			pending_accounts: HashSet::new(),
		});
		Some((self.next_id, token))
	}

	fn active_mut(&mut self, id: u64) -> Option<&mut ActiveCycle> {
		self.active.as_mut().filter(|cycle| cycle.id == id)
	}

	fn enqueue_account(&mut self, id: u64, address: &str) {
		if let Some(cycle) = self.active_mut(id) {
			cycle.pending_accounts.insert(address.to_string());
		}
	}

	fn dequeue_account(&mut self, id: u64, address: &str) {
		if let Some(cycle) = self.active_mut(id) {
			cycle.pending_accounts.remove(address);
		}
	}

	fn pending_account_count(&self) -> usize {
		self.active
			.as_ref()
			.map_or(0, |cycle| cycle.pending_accounts.len())
	}

	fn finish(&mut self, id: u64) {
		if self.active.as_ref().is_some_and(|cycle| cycle.id == id) {
			self.active = None;
		}
	}

	fn cancel_all(&mut self) {
		if let Some(cycle) = self.active.take() {
			cycle.token.cancel();
		}
	}
}

struct ProcessorCore {
	api: Arc<dyn ChainApi>,
	source: Arc<dyn BlockRequestSource>,
	config: ProcessorConfig,
	batch_pool: Arc<Semaphore>,
	runtime: Handle,
	queue: Mutex<OperationQueue>,
	gate: Arc<Mutex<EventGate>>,
	events: UnboundedSender<Envelope>,
	current_request: Mutex<Option<Arc<BlockRequest>>>,
}

impl ProcessorCore {
	fn emit(&self, generation: u64, event: BlockEvent) {
		if self.events.send(Envelope { generation, event }).is_err() {
			debug!("Event task is gone, dropping block event");
		}
	}

	fn on_block(self: &Arc<Self>) {
		let generation = lock(&self.gate).generation;
		let Some((cycle_id, token)) = lock(&self.queue).begin() else {
			debug!("Previous cycle still running, skipping block");
			return;
		};

		let request = Arc::new(self.source.make_request());
		*lock(&self.current_request) = Some(request.clone());
		info!(
			"Starting cycle {} for {} accounts",
			cycle_id,
			request.local_accounts.len()
		);

		let cycle = CycleContext {
			core: self.clone(),
			id: cycle_id,
			generation,
			token: token.clone(),
			request: request.clone(),
		};

		self.emit(generation, BlockEvent::WillStart);

		let mut chains = Vec::with_capacity(request.local_accounts.len() + 1);
		for local_account in &request.local_accounts {
			lock(&self.queue).enqueue_account(cycle_id, &local_account.address);
			self.emit(generation, BlockEvent::WillFetchAccount(local_account.clone()));
			chains.push(
				self.runtime
					.spawn(cycle.clone().run_account_chain(local_account.clone())),
			);
		}
		if let Some(currency_id) = request.currency_id.clone() {
			chains.push(self.runtime.spawn(cycle.clone().run_currency(currency_id)));
		}

		self.runtime.spawn(async move {
			for joined in futures::future::join_all(chains).await {
				if let Err(e) = joined {
					warn!("Cycle {} chain task failed: {}", cycle.id, e);
				}
			}

			if !cycle.token.is_cancelled() {
				debug!("Cycle {} finished", cycle.id);
				cycle.core.emit(cycle.generation, BlockEvent::DidFinish);
			}
			lock(&cycle.core.queue).finish(cycle.id);
		});
	}

	fn cancel_all(&self) {
		lock(&self.gate).generation += 1;
		lock(&self.queue).cancel_all();
		*lock(&self.current_request) = None;
	}
}

#[derive(Clone)]
struct CycleContext {
	core: Arc<ProcessorCore>,
	id: u64,
	generation: u64,
	token: CancellationToken,
	request: Arc<BlockRequest>,
}

impl CycleContext {
	fn emit(&self, event: BlockEvent) {
		self.core.emit(self.generation, event);
	}

	async fn run_account_chain(self, local_account: LocalAccount) {
		let address = local_account.address.clone();
		let fetch = AccountFetchOperation::new(self.core.api.clone(), local_account);

		let Some(result) = fetch.execute(&self.token).await else {
			return;
		};

		let mut input = AssetDetailGroupFetchInput {
			account: None,
			cached_accounts: self.request.cached_accounts.clone(),
			cached_asset_details: self.request.cached_asset_details.clone(),
			upstream_error: None,
		};
		match result {
			Ok(account) => {
				self.emit(BlockEvent::DidFetchAccount(account.clone()));
				self.emit(BlockEvent::WillFetchAssetDetails(account.clone()));
				input.account = Some(account);
			}
			Err(error) => {
				warn!("Failed to fetch account {}: {}", address, error);
				self.emit(BlockEvent::DidFailToFetchAccount {
					local_account: fetch.local_account().clone(),
					error: error.clone(),
				});
				input.upstream_error = Some(error);
			}
		}

		let asset_details = AssetDetailGroupFetchOperation::new(
			self.core.api.clone(),
			self.core.batch_pool.clone(),
			self.core.config.asset_batch_size,
		);
		match asset_details.execute(input, &self.token).await {
			Ok(output) => {
				self.emit(BlockEvent::DidFetchAssetDetails {
					account: output.account,
					new_asset_details: output.new_asset_details,
				});
			}
			Err(failure) if failure.error.is_cancelled() => return,
			Err(failure) => {
				// Without an account the failure is the upstream one, already reported.
				if let Some(account) = failure.account {
					warn!("Failed to fetch asset details of {}: {}", address, failure.error);
					self.emit(BlockEvent::DidFailToFetchAssetDetails {
						account,
						error: failure.error,
					});
				}
			}
		}

		lock(&self.core.queue).dequeue_account(self.id, &address);
	}

	async fn run_currency(self, currency_id: String) {
		self.emit(BlockEvent::WillFetchCurrency);

		let result = tokio::select! {
			biased;
			_ = self.token.cancelled() => return,
			result = self.core.api.fetch_currency(&currency_id) => result,
		};
		match result {
			Ok(currency) => self.emit(BlockEvent::DidFetchCurrency(currency)),
			Err(e) => {
				warn!("Failed to fetch currency {}: {}", currency_id, e);
				self.emit(BlockEvent::DidFailToFetchCurrency(e.into()));
			}
		}
	}
}

async fn drain_events(gate: Arc<Mutex<EventGate>>, mut receiver: UnboundedReceiver<Envelope>) {
	while let Some(envelope) = receiver.recv().await {
		let gate = lock(&gate);
		if envelope.generation != gate.generation {
			debug!("Dropping stale {} event", envelope.event.name());
			continue;
		}
		gate.dispatcher.dispatch(&envelope.event);
	}
}

/// Drives polling cycles off a [`BlockCycle`].
pub struct BlockProcessor {
	core: Arc<ProcessorCore>,
	cycle: Box<dyn BlockCycle>,
}

impl BlockProcessor {
	/// Create a processor bound to the current Tokio runtime. The event task starts right away.
	pub fn new(
		api: Arc<dyn ChainApi>,
		cycle: Box<dyn BlockCycle>,
		source: Arc<dyn BlockRequestSource>,
		config: ProcessorConfig,
	) -> Result<Self, WalletSyncError> {
		let runtime = Handle::try_current()
			.map_err(|e| WalletSyncError::RuntimeError(format!("No Tokio runtime: {}", e)))?;

		let gate = Arc::new(Mutex::new(EventGate {
			generation: 0,
			dispatcher: EventDispatcher::new(),
		}));
		let (events, receiver) = mpsc::unbounded_channel();
		runtime.spawn(drain_events(gate.clone(), receiver));

		let core = ProcessorCore {
			api,
			source,
			batch_pool: Arc::new(Semaphore::new(config.max_concurrent_asset_batches)),
			config,
			runtime,
			queue: Mutex::new(OperationQueue::default()),
			gate,
			events,
			current_request: Mutex::new(None),
		};

		Ok(Self {
			core: Arc::new(core),
			cycle,
		})
	}

	/// Register a handler for block events. Must not be called from inside a handler.
	pub fn register_handler(&self, handler: Arc<dyn BlockEventHandler>) {
		lock(&self.core.gate).dispatcher.register_handler(handler);
	}

	/// Subscribe to the block cycle.
	pub fn start(&self) {
		let core = self.core.clone();
		self.cycle.start(Box::new(move || core.on_block()));
	}

	/// Stop the block cycle and cancel the cycle in flight. No event reaches a handler after
	/// this returns. Must not be called from inside a handler.
	pub fn stop(&self) {
		self.cycle.stop();
		self.core.cancel_all();
	}

	/// Whether a new cycle would be accepted.
	pub fn is_available(&self) -> bool {
		lock(&self.core.queue).is_available()
	}

	/// Accounts of the running cycle whose chain has not finished.
	pub fn pending_account_count(&self) -> usize {
		lock(&self.core.queue).pending_account_count()
	}

	pub fn current_request(&self) -> Option<Arc<BlockRequest>> {
		lock(&self.core.current_request).clone()
	}
}

impl Drop for BlockProcessor {
	fn drop(&mut self) {
		self.cycle.stop();
		lock(&self.core.queue).cancel_all();
	}
}
