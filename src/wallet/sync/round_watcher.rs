//! Long-poll loop signalling every new round confirmed by the node.

use crate::config::SyncConfig;
use crate::indexer::ChainApi;
use crate::wallet::WalletSyncError;

use backoff::ExponentialBackoff;
use backoff::backoff::Backoff;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub type BlockCallback = Box<dyn Fn() + Send + Sync>;

/// Source of "a new block arrived" signals driving the block processor.
pub trait BlockCycle: Send + Sync {
	/// Start signalling; replaces any previous callback.
	fn start(&self, on_receive: BlockCallback);

	/// Stop signalling. The callback never runs once this returns.
	fn stop(&self);
}

#[derive(Debug, Clone)]
pub struct WatcherConfig {
	/// Signal once as soon as the current round is known.
	pub fire_on_start: bool,
	pub initial_retry: Duration,
	pub max_retry: Duration,
}

impl Default for WatcherConfig {
	fn default() -> Self {
		Self {
			fire_on_start: true,
			initial_retry: Duration::from_millis(500),
			max_retry: Duration::from_secs(30),
		}
	}
}

impl From<&SyncConfig> for WatcherConfig {
	fn from(config: &SyncConfig) -> Self {
		Self {
			fire_on_start: config.fire_on_start,
			initial_retry: config.watcher_initial_retry(),
			max_retry: config.watcher_max_retry(),
		}
	}
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
	mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Watches the node for new rounds.
///
/// Without a known round it first asks for the transaction params to learn the current one, then
/// waits for `round + 1` over and over. Failures are never fatal: the known round is forgotten,
/// the loop sleeps with exponential backoff and starts over from the params.
pub struct RoundWatcher {
	api: Arc<dyn ChainApi>,
	runtime: Handle,
	config: WatcherConfig,
	last_round: Arc<Mutex<Option<u64>>>,
	callback: Arc<Mutex<Option<BlockCallback>>>,
	running: Mutex<Option<CancellationToken>>,
}

impl RoundWatcher {
	/// Create a watcher bound to the current Tokio runtime.
	pub fn new(api: Arc<dyn ChainApi>, config: WatcherConfig) -> Result<Self, WalletSyncError> {
		let runtime = Handle::try_current()
			.map_err(|e| WalletSyncError::RuntimeError(format!("No Tokio runtime: {}", e)))?;

		Ok(Self {
			api,
			runtime,
			config,
			last_round: Arc::new(Mutex::new(None)),
			callback: Arc::new(Mutex::new(None)),
			running: Mutex::new(None),
		})
	}

	pub fn last_round(&self) -> Option<u64> {
		*lock(&self.last_round)
	}

	pub fn is_running(&self) -> bool {
		lock(&self.running).is_some()
	}
}

impl BlockCycle for RoundWatcher {
	fn start(&self, on_receive: BlockCallback) {
		self.stop();

		*lock(&self.callback) = Some(on_receive);
		let token = CancellationToken::new();
		*lock(&self.running) = Some(token.clone());

		let watch = WatchLoop {
			api: self.api.clone(),
			config: self.config.clone(),
			last_round: self.last_round.clone(),
			callback: self.callback.clone(),
			token,
		};
		self.runtime.spawn(watch.run());
		debug!("Round watcher started");
	}

	fn stop(&self) {
		if let Some(token) = lock(&self.running).take() {
			token.cancel();
			debug!("Round watcher stopped");
		}
		// Waits for a callback that is running right now.
		*lock(&self.callback) = None;
	}
}

impl Drop for RoundWatcher {
	fn drop(&mut self) {
		if let Some(token) = lock(&self.running).take() {
			token.cancel();
		}
	}
}

struct WatchLoop {
	api: Arc<dyn ChainApi>,
	config: WatcherConfig,
	last_round: Arc<Mutex<Option<u64>>>,
	callback: Arc<Mutex<Option<BlockCallback>>>,
	token: CancellationToken,
}

impl WatchLoop {
	async fn run(self) {
		let mut backoff = ExponentialBackoff {
			initial_interval: self.config.initial_retry,
			current_interval: self.config.initial_retry,
			max_interval: self.config.max_retry,
			max_elapsed_time: None,
			..ExponentialBackoff::default()
		};
		let mut fire_next = self.config.fire_on_start;

		loop {
			let known_round = *lock(&self.last_round);
			let round = match known_round {
				Some(round) => round,
				None => {
					let params = tokio::select! {
						biased;
						_ = self.token.cancelled() => return,
						params = self.api.transaction_params() => params,
					};
					match params {
						Ok(params) => {
							info!("Current round is {}", params.last_round);
							*lock(&self.last_round) = Some(params.last_round);
							params.last_round
						}
						Err(e) => {
							warn!("Failed to fetch transaction params, waiting from round 0: {}", e);
							0
						}
					}
				}
			};

			if fire_next {
				fire_next = false;
				self.notify();
			}

			let next_round = round + 1;
			let status = tokio::select! {
				biased;
				_ = self.token.cancelled() => return,
				status = self.api.wait_for_round(next_round) => status,
			};

			match status {
				Ok(status) => {
					let confirmed = status.last_round.max(next_round);
					debug!("Round {} confirmed", confirmed);
					*lock(&self.last_round) = Some(confirmed);
					backoff.reset();
					self.notify();
				}
				Err(e) => {
					*lock(&self.last_round) = None;
					let delay = backoff.next_backoff().unwrap_or(self.config.max_retry);
					warn!("Waiting for round {} failed, retrying in {:?}: {}", next_round, delay, e);
					tokio::select! {
						biased;
						_ = self.token.cancelled() => return,
						_ = tokio::time::sleep(delay) => {}
					}
				}
			}
		}
	}

	fn notify(&self) {
		let callback = lock(&self.callback);
		if self.token.is_cancelled() {
			return;
		}
		if let Some(callback) = callback.as_ref() {
			callback();
		}
	}
}
