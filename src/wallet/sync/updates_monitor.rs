//! Tracking of opt-in and opt-out requests until the chain reflects them.

use crate::indexer::AssetId;
use crate::wallet::Account;

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptInStatus {
	Pending,
	OptedIn,
	Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptOutStatus {
	Pending,
	OptedOut,
	Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UpdateKind {
	OptIn,
	OptOut,
}

#[derive(Debug, Clone, Copy)]
struct MonitoredUpdate {
	kind: UpdateKind,
	completed: bool,
}

/// Pending opt-in/opt-out requests keyed by account address and asset id.
///
/// A request is completed once fetched asset details show the expected holding change, and
/// completed requests are dropped at the end of the cycle that observed them.
#[derive(Debug, Default)]
pub struct BlockchainUpdatesMonitor {
	updates: Mutex<HashMap<(String, AssetId), MonitoredUpdate>>,
}

impl BlockchainUpdatesMonitor {
	pub fn new() -> Self {
		Self::default()
	}

	fn table(&self) -> std::sync::MutexGuard<'_, HashMap<(String, AssetId), MonitoredUpdate>> {
		self.updates.lock().unwrap_or_else(PoisonError::into_inner)
	}

	fn start_monitoring(&self, address: &str, asset_id: AssetId, kind: UpdateKind) {
		self.table().insert(
			(address.to_string(), asset_id),
			MonitoredUpdate {
				kind,
				completed: false,
			},
		);
	}

	fn has_pending(&self, address: &str, asset_id: AssetId, kind: UpdateKind) -> bool {
		self.table()
			.get(&(address.to_string(), asset_id))
			.is_some_and(|update| update.kind == kind && !update.completed)
	}

	pub fn start_monitoring_opt_in(&self, address: &str, asset_id: AssetId) {
		self.start_monitoring(address, asset_id, UpdateKind::OptIn);
	}

	pub fn start_monitoring_opt_out(&self, address: &str, asset_id: AssetId) {
		self.start_monitoring(address, asset_id, UpdateKind::OptOut);
	}

	/// Forget a request, e.g. because its transaction was never sent.
	pub fn cancel_monitoring(&self, address: &str, asset_id: AssetId) {
		self.table().remove(&(address.to_string(), asset_id));
	}

	pub fn has_pending_opt_in_request(&self, address: &str, asset_id: AssetId) -> bool {
		self.has_pending(address, asset_id, UpdateKind::OptIn)
	}

	pub fn has_pending_opt_out_request(&self, address: &str, asset_id: AssetId) -> bool {
		self.has_pending(address, asset_id, UpdateKind::OptOut)
	}

	pub fn has_any_pending_request(&self, address: &str) -> bool {
		self.table()
			.iter()
			.any(|((owner, _), update)| owner == address && !update.completed)
	}

	/// Mark the requests of `account` that its current holdings satisfy. Returns how many
	/// requests were completed.
	pub fn complete_updates(&self, account: &Account) -> usize {
		let mut completed = 0;
		for ((address, asset_id), update) in self.table().iter_mut() {
			if address != &account.address || update.completed {
				continue;
			}

			let held = account.is_opted_in(*asset_id);
			let satisfied = match update.kind {
				UpdateKind::OptIn => held,
				UpdateKind::OptOut => !held,
			};
			if satisfied {
				update.completed = true;
				completed += 1;
			}
		}

		if completed > 0 {
			debug!("{} blockchain updates completed for {}", completed, account.address);
		}
		completed
	}

	pub fn remove_completed_updates(&self) {
		self.table().retain(|_, update| !update.completed);
	}

	pub fn len(&self) -> usize {
		self.table().len()
	}

	pub fn is_empty(&self) -> bool {
		self.table().is_empty()
	}
}
