//! Scriptable in-memory [`ChainApi`] used by the sync tests.

use crate::indexer::*;
use crate::wallet::sync::round_watcher::{BlockCallback, BlockCycle};

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

#[derive(Debug, Clone)]
pub(crate) enum AccountScript {
	Found(AccountData),
	Fail(String),
	/// Never answers; only ends when the request future is dropped.
	Hang,
}

/// Counts a request as cancelled when its future is dropped before completing.
struct InFlight<'a> {
	cancelled: &'a AtomicUsize,
	completed: bool,
}

impl<'a> InFlight<'a> {
	fn new(cancelled: &'a AtomicUsize) -> Self {
		Self {
			cancelled,
			completed: false,
		}
	}

	fn complete(mut self) {
		self.completed = true;
	}
}

impl Drop for InFlight<'_> {
	fn drop(&mut self) {
		if !self.completed {
			self.cancelled.fetch_add(1, Ordering::SeqCst);
		}
	}
}

#[derive(Default)]
pub(crate) struct MockChainApi {
	accounts: Mutex<HashMap<String, AccountScript>>,
	account_delay: Mutex<Duration>,
	decorations: Mutex<HashMap<AssetId, AssetDecoration>>,
	failing_assets: Mutex<HashSet<AssetId>>,
	hanging_assets: Mutex<HashSet<AssetId>>,
	asset_delay: Mutex<Duration>,
	currency: Mutex<Option<Currency>>,
	round: AtomicU64,
	round_delay: Mutex<Duration>,
	failing_waits: AtomicUsize,
	failing_params: AtomicUsize,

	pub account_requests: Mutex<Vec<String>>,
	pub asset_requests: Mutex<Vec<Vec<AssetId>>>,
	pub waited_rounds: Mutex<Vec<u64>>,
	pub params_requests: AtomicUsize,
	pub currency_requests: AtomicUsize,
	pub cancelled_requests: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockChainApi {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_account(self, data: AccountData) -> Self {
		lock(&self.accounts).insert(data.address.clone(), AccountScript::Found(data));
		self
	}

	pub fn script_account(&self, address: &str, script: AccountScript) {
		lock(&self.accounts).insert(address.to_string(), script);
	}

	pub fn with_account_delay(self, delay: Duration) -> Self {
		*lock(&self.account_delay) = delay;
		self
	}

	pub fn with_decorations(self, decorations: impl IntoIterator<Item = AssetDecoration>) -> Self {
		lock(&self.decorations).extend(decorations.into_iter().map(|d| (d.id, d)));
		self
	}

	/// Any batch containing one of these ids fails.
	pub fn with_failing_assets(self, ids: impl IntoIterator<Item = AssetId>) -> Self {
		lock(&self.failing_assets).extend(ids);
		self
	}

	/// Any batch containing one of these ids never answers.
	pub fn with_hanging_assets(self, ids: impl IntoIterator<Item = AssetId>) -> Self {
		lock(&self.hanging_assets).extend(ids);
		self
	}

	pub fn with_asset_delay(self, delay: Duration) -> Self {
		*lock(&self.asset_delay) = delay;
		self
	}

	pub fn with_currency(self, currency: Currency) -> Self {
		*lock(&self.currency) = Some(currency);
		self
	}

	pub fn with_round(self, round: u64) -> Self {
		self.round.store(round, Ordering::SeqCst);
		self
	}

	pub fn with_round_delay(self, delay: Duration) -> Self {
		*lock(&self.round_delay) = delay;
		self
	}

	pub fn fail_next_waits(&self, count: usize) {
		self.failing_waits.store(count, Ordering::SeqCst);
	}

	pub fn fail_next_params(&self, count: usize) {
		self.failing_params.store(count, Ordering::SeqCst);
	}

	pub fn asset_requests(&self) -> Vec<Vec<AssetId>> {
		lock(&self.asset_requests).clone()
	}

	pub fn account_requests(&self) -> Vec<String> {
		lock(&self.account_requests).clone()
	}

	pub fn waited_rounds(&self) -> Vec<u64> {
		lock(&self.waited_rounds).clone()
	}

	pub fn cancelled(&self) -> usize {
		self.cancelled_requests.load(Ordering::SeqCst)
	}

	fn take_failure(counter: &AtomicUsize) -> bool {
		counter
			.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
			.is_ok()
	}
}

pub(crate) fn decoration(id: AssetId, collectible: bool) -> AssetDecoration {
	AssetDecoration {
		id,
		name: Some(format!("Asset {}", id)),
		unit_name: Some(format!("A{}", id)),
		decimals: if collectible { 0 } else { 6 },
		verification_tier: VerificationTier::Unverified,
		collectible: collectible.then(CollectibleInfo::default),
		usd_value: None,
	}
}

pub(crate) fn account_data(address: &str, amount: u64, asset_ids: &[AssetId]) -> AccountData {
	AccountData {
		address: address.to_string(),
		amount,
		round: 1,
		assets: asset_ids
			.iter()
			.map(|id| AssetHoldingData {
				asset_id: *id,
				amount: 1,
				is_frozen: false,
				deleted: false,
				opted_in_at_round: Some(1),
			})
			.collect(),
		..AccountData::default()
	}
}

#[async_trait::async_trait]
impl ChainApi for MockChainApi {
	async fn fetch_account(&self, address: &str) -> Result<AccountResponse, IndexerError> {
		lock(&self.account_requests).push(address.to_string());
		let guard = InFlight::new(&self.cancelled_requests);

		let delay = *lock(&self.account_delay);
		if !delay.is_zero() {
			tokio::time::sleep(delay).await;
		}

		let script = lock(&self.accounts).get(address).cloned();
		let result = match script {
			Some(AccountScript::Found(account)) => Ok(AccountResponse {
				current_round: account.round,
				account,
			}),
			Some(AccountScript::Fail(message)) => Err(IndexerError::Transport(message)),
			Some(AccountScript::Hang) => {
				std::future::pending::<()>().await;
				Err(IndexerError::Transport("unreachable".to_string()))
			}
			None => Err(IndexerError::NotFound),
		};
		guard.complete();
		result
	}

	async fn fetch_asset_details(
		&self,
		ids: &[AssetId],
	) -> Result<Vec<AssetDecoration>, IndexerError> {
		lock(&self.asset_requests).push(ids.to_vec());
		let guard = InFlight::new(&self.cancelled_requests);

		let hangs = {
			let hanging = lock(&self.hanging_assets);
			ids.iter().any(|id| hanging.contains(id))
		};
		if hangs {
			std::future::pending::<()>().await;
		}

		let delay = *lock(&self.asset_delay);
		if !delay.is_zero() {
			tokio::time::sleep(delay).await;
		}

		let fails = {
			let failing = lock(&self.failing_assets);
			ids.iter().any(|id| failing.contains(id))
		};
		let result = if fails {
			Err(IndexerError::Status {
				status: 500,
				body: "asset batch failed".to_string(),
			})
		} else {
			let decorations = lock(&self.decorations);
			Ok(ids.iter().filter_map(|id| decorations.get(id).cloned()).collect())
		};
		guard.complete();
		result
	}

	async fn transaction_params(&self) -> Result<TransactionParams, IndexerError> {
		self.params_requests.fetch_add(1, Ordering::SeqCst);
		if Self::take_failure(&self.failing_params) {
			return Err(IndexerError::Transport("params unavailable".to_string()));
		}

		Ok(TransactionParams {
			last_round: self.round.load(Ordering::SeqCst),
			fee: 0,
			min_fee: 1000,
			genesis_id: "testnet-v1.0".to_string(),
			genesis_hash: "SGO1GKSzyE7IEPItTxCByw9x8FmnrCDexi9/cOUJOiI=".to_string(),
			consensus_version: "future".to_string(),
		})
	}

	async fn wait_for_round(&self, round: u64) -> Result<NodeStatus, IndexerError> {
		lock(&self.waited_rounds).push(round);
		let guard = InFlight::new(&self.cancelled_requests);

		let delay = *lock(&self.round_delay);
		tokio::time::sleep(delay).await;

		let result = if Self::take_failure(&self.failing_waits) {
			Err(IndexerError::Transport("wait failed".to_string()))
		} else {
			self.round.fetch_max(round, Ordering::SeqCst);
			Ok(NodeStatus {
				last_round: round,
				time_since_last_round: 0,
				catchup_time: 0,
			})
		};
		guard.complete();
		result
	}

	async fn fetch_currency(&self, currency_id: &str) -> Result<Currency, IndexerError> {
		self.currency_requests.fetch_add(1, Ordering::SeqCst);
		lock(&self.currency)
			.clone()
			.filter(|currency| currency.id == currency_id)
			.ok_or(IndexerError::NotFound)
	}
}

/// Block cycle fired by hand.
#[derive(Clone, Default)]
pub(crate) struct ManualCycle {
	callback: Arc<Mutex<Option<BlockCallback>>>,
	pub starts: Arc<AtomicUsize>,
	pub stops: Arc<AtomicUsize>,
}

impl ManualCycle {
	pub fn new() -> Self {
		Self::default()
	}

	/// Signal a new block; returns false when nobody is listening.
	pub fn fire(&self) -> bool {
		match lock(&self.callback).as_ref() {
			Some(callback) => {
				callback();
				true
			}
			None => false,
		}
	}
}

impl BlockCycle for ManualCycle {
	fn start(&self, on_receive: BlockCallback) {
		self.starts.fetch_add(1, Ordering::SeqCst);
		*lock(&self.callback) = Some(on_receive);
	}

	fn stop(&self) {
		self.stops.fetch_add(1, Ordering::SeqCst);
		*lock(&self.callback) = None;
	}
}

/// Poll `condition` until it holds or two seconds pass.
pub(crate) async fn eventually(condition: impl Fn() -> bool) -> bool {
	for _ in 0..200 {
		if condition() {
			return true;
		}
		tokio::time::sleep(Duration::from_millis(10)).await;
	}
	condition()
}
