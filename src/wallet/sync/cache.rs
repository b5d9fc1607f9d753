//! Account/asset cache holding the last known good state.
//!
//! Readers get cheap `Arc` snapshots that never change under them. The single writer (the
//! controller's event handler) mutates through copy-on-write, so a snapshot handed out earlier
//! keeps seeing the state it was taken from.

use crate::indexer::AssetDecoration;
use crate::wallet::{AccountCollection, AssetDetailCollection, CurrencyHandle};

use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug, Default)]
pub struct SyncCache {
	accounts: RwLock<Arc<AccountCollection>>,
	asset_details: RwLock<Arc<AssetDetailCollection>>,
	currency: RwLock<CurrencyHandle>,
}

impl SyncCache {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn accounts(&self) -> Arc<AccountCollection> {
		self.accounts
			.read()
			.unwrap_or_else(PoisonError::into_inner)
			.clone()
	}

	pub fn asset_details(&self) -> Arc<AssetDetailCollection> {
		self.asset_details
			.read()
			.unwrap_or_else(PoisonError::into_inner)
			.clone()
	}

	pub fn currency(&self) -> CurrencyHandle {
		self.currency
			.read()
			.unwrap_or_else(PoisonError::into_inner)
			.clone()
	}

	pub fn update_accounts<R>(&self, update: impl FnOnce(&mut AccountCollection) -> R) -> R {
		let mut accounts = self.accounts.write().unwrap_or_else(PoisonError::into_inner);
		update(Arc::make_mut(&mut accounts))
	}

	/// Merge decorations; later values replace earlier ones for the same id.
	pub fn merge_asset_details(&self, decorations: impl IntoIterator<Item = AssetDecoration>) {
		let mut details = self.asset_details.write().unwrap_or_else(PoisonError::into_inner);
		Arc::make_mut(&mut details).extend(decorations);
	}

	pub fn update_currency(&self, update: impl FnOnce(CurrencyHandle) -> CurrencyHandle) -> CurrencyHandle {
		let mut currency = self.currency.write().unwrap_or_else(PoisonError::into_inner);
		let next = update(std::mem::take(&mut *currency));
		*currency = next.clone();
		next
	}

	/// Forget every account, decoration and the currency.
	pub fn clear(&self) {
		*self.accounts.write().unwrap_or_else(PoisonError::into_inner) = Arc::default();
		*self.asset_details.write().unwrap_or_else(PoisonError::into_inner) = Arc::default();
		*self.currency.write().unwrap_or_else(PoisonError::into_inner) = CurrencyHandle::Idle;
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::wallet::sync::mock_api::decoration;
	use crate::wallet::{Account, AccountHandle, LocalAccount};

	#[test]
	fn snapshots_are_isolated_from_later_writes() {
		let cache = SyncCache::new();
		let local = LocalAccount::new("ADDR");
		cache.update_accounts(|accounts| accounts.insert(AccountHandle::loading(Account::empty(&local))));

		let before = cache.accounts();
		cache.update_accounts(|accounts| accounts.remove("ADDR"));

		assert!(before.contains("ADDR"));
		assert!(cache.accounts().is_empty());
	}

	#[test]
	fn merge_and_clear() {
		let cache = SyncCache::new();
		cache.merge_asset_details([decoration(1, false), decoration(2, true)]);
		assert_eq!(cache.asset_details().len(), 2);
		assert!(cache.asset_details().get(2).map(|d| d.is_collectible()).unwrap_or(false));

		cache.clear();
		assert!(cache.asset_details().is_empty());
		assert!(cache.accounts().is_empty());
		assert!(matches!(cache.currency(), CurrencyHandle::Idle));
	}
}
