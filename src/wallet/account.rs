//! Account state, its sync status, and the address/asset keyed collections the cache holds.

use crate::indexer::{AccountData, AssetDecoration, AssetHoldingData, AssetId};
use crate::wallet::{AccountAuthorization, LocalAccount, SyncError};

use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Amount of one asset held by an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetHolding {
	pub id: AssetId,
	pub amount: u64,
	pub is_frozen: bool,
	pub opted_in_at_round: Option<u64>,
}

impl From<AssetHoldingData> for AssetHolding {
	fn from(data: AssetHoldingData) -> Self {
		Self {
			id: data.asset_id,
			amount: data.amount,
			is_frozen: data.is_frozen,
			opted_in_at_round: data.opted_in_at_round,
		}
	}
}

/// A fungible holding resolved against its decoration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StandardAsset {
	pub holding: AssetHolding,
	pub decoration: AssetDecoration,
}

impl StandardAsset {
	pub fn id(&self) -> AssetId {
		self.holding.id
	}

	/// Holding amount scaled by the asset decimals.
	pub fn decimal_amount(&self) -> f64 {
		self.holding.amount as f64 / 10f64.powi(self.decoration.decimals as i32)
	}
}

/// A non-fungible holding resolved against its decoration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectibleAsset {
	pub holding: AssetHolding,
	pub decoration: AssetDecoration,
}

impl CollectibleAsset {
	pub fn id(&self) -> AssetId {
		self.holding.id
	}

	/// Opted-in collectibles can have a zero balance.
	pub fn is_owned(&self) -> bool {
		self.holding.amount > 0
	}
}

/// Snapshot of one account's on-chain state.
///
/// Besides the raw holdings, the account carries two buckets of holdings resolved
/// against their decorations, one for fungible assets and one for collectibles. The
/// buckets are rebuilt from scratch every time asset details are fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
	pub address: String,
	pub name: Option<String>,
	pub is_watch_account: bool,
	pub is_ledger: bool,
	/// Classified at the end of every polling cycle.
	pub authorization: AccountAuthorization,
	/// Balance in microalgos.
	pub amount: u64,
	pub amount_without_pending_rewards: u64,
	pub min_balance: u64,
	pub pending_rewards: u64,
	/// Round at which the indexer produced this snapshot.
	pub round: Option<u64>,
	pub participation_status: Option<String>,
	pub auth_address: Option<String>,
	pub created_at_round: Option<u64>,
	pub assets: Vec<AssetHolding>,
	standard_assets: Vec<StandardAsset>,
	standard_asset_index: HashMap<AssetId, usize>,
	collectible_assets: Vec<CollectibleAsset>,
	collectible_asset_index: HashMap<AssetId, usize>,
}

impl Account {
	/// Account with only local hints, used before the first fetch and for addresses the
	/// indexer has never seen.
	pub fn empty(local_account: &LocalAccount) -> Self {
		Self {
			address: local_account.address.clone(),
			name: local_account.name.clone(),
			is_watch_account: local_account.is_watch_account,
			is_ledger: local_account.is_ledger,
			authorization: AccountAuthorization::Unknown,
			amount: 0,
			amount_without_pending_rewards: 0,
			min_balance: 0,
			pending_rewards: 0,
			round: None,
			participation_status: None,
			auth_address: None,
			created_at_round: None,
			assets: Vec::new(),
			standard_assets: Vec::new(),
			standard_asset_index: HashMap::new(),
			collectible_assets: Vec::new(),
			collectible_asset_index: HashMap::new(),
		}
	}

	/// Build an account from an indexer response. Deleted holdings are dropped.
	pub fn from_response(data: AccountData, local_account: &LocalAccount) -> Self {
		let assets = data
			.assets
			.into_iter()
			.filter(|holding| !holding.deleted)
			.map(AssetHolding::from)
			.collect();

		Self {
			address: data.address,
			amount: data.amount,
			amount_without_pending_rewards: data.amount_without_pending_rewards,
			min_balance: data.min_balance,
			pending_rewards: data.pending_rewards,
			round: Some(data.round),
			participation_status: data.status,
			auth_address: data.auth_address,
			created_at_round: data.created_at_round,
			assets,
			..Self::empty(local_account)
		}
	}

	pub fn asset_ids(&self) -> impl Iterator<Item = AssetId> + '_ {
		self.assets.iter().map(|holding| holding.id)
	}

	pub fn holding(&self, id: AssetId) -> Option<&AssetHolding> {
		self.assets.iter().find(|holding| holding.id == id)
	}

	pub fn is_opted_in(&self, id: AssetId) -> bool {
		self.holding(id).is_some()
	}

	/// Signing authority was moved to another address.
	pub fn is_rekeyed(&self) -> bool {
		self.auth_address
			.as_deref()
			.is_some_and(|auth| auth != self.address)
	}

	pub fn standard_assets(&self) -> &[StandardAsset] {
		&self.standard_assets
	}

	pub fn standard_asset(&self, id: AssetId) -> Option<&StandardAsset> {
		self.standard_asset_index
			.get(&id)
			.and_then(|index| self.standard_assets.get(*index))
	}

	pub fn collectible_assets(&self) -> &[CollectibleAsset] {
		&self.collectible_assets
	}

	pub fn collectible_asset(&self, id: AssetId) -> Option<&CollectibleAsset> {
		self.collectible_asset_index
			.get(&id)
			.and_then(|index| self.collectible_assets.get(*index))
	}

	/// Replace both buckets and rebuild their indexes.
	pub fn set_compound_assets(
		&mut self,
		standard_assets: Vec<StandardAsset>,
		collectible_assets: Vec<CollectibleAsset>,
	) {
		self.standard_asset_index = standard_assets
			.iter()
			.enumerate()
			.map(|(index, asset)| (asset.id(), index))
			.collect();
		self.collectible_asset_index = collectible_assets
			.iter()
			.enumerate()
			.map(|(index, asset)| (asset.id(), index))
			.collect();
		self.standard_assets = standard_assets;
		self.collectible_assets = collectible_assets;
	}

	pub fn remove_all_compound_assets(&mut self) {
		self.set_compound_assets(Vec::new(), Vec::new());
	}

	/// Drop the holdings together with both buckets.
	pub fn clear_assets(&mut self) {
		self.assets.clear();
		self.remove_all_compound_assets();
	}

	/// Carry the resolved buckets of a previous snapshot over to this one, so the last
	/// known asset view survives until details are fetched again.
	pub fn inherit_compound_assets(&mut self, previous: &Account) {
		self.set_compound_assets(
			previous.standard_assets.clone(),
			previous.collectible_assets.clone(),
		);
	}
}

/// Sync status of an [`AccountHandle`].
///
/// The asset detail statuses are only reachable from `UpToDate`, i.e. after the base
/// account fetch succeeded. Transitions are checked by [`AccountStatus::can_transition_to`].
#[derive(Debug, Clone)]
pub enum AccountStatus {
	Idle,
	Loading,
	Refreshing,
	Failed(SyncError),
	Expired(SyncError),
	UpToDate,
	LoadingAssetDetails,
	RefreshingAssetDetails,
	FailedAssetDetails(SyncError),
	ExpiredAssetDetails(SyncError),
	Ready,
}

impl AccountStatus {
	pub fn name(&self) -> &'static str {
		match self {
			AccountStatus::Idle => "idle",
			AccountStatus::Loading => "loading",
			AccountStatus::Refreshing => "refreshing",
			AccountStatus::Failed(_) => "failed",
			AccountStatus::Expired(_) => "expired",
			AccountStatus::UpToDate => "upToDate",
			AccountStatus::LoadingAssetDetails => "loadingAssetDetails",
			AccountStatus::RefreshingAssetDetails => "refreshingAssetDetails",
			AccountStatus::FailedAssetDetails(_) => "failedAssetDetails",
			AccountStatus::ExpiredAssetDetails(_) => "expiredAssetDetails",
			AccountStatus::Ready => "ready",
		}
	}

	/// At or after `UpToDate`.
	pub fn is_up_to_date(&self) -> bool {
		matches!(
			self,
			AccountStatus::UpToDate
				| AccountStatus::LoadingAssetDetails
				| AccountStatus::RefreshingAssetDetails
				| AccountStatus::FailedAssetDetails(_)
				| AccountStatus::ExpiredAssetDetails(_)
				| AccountStatus::Ready
		)
	}

	pub fn is_ready(&self) -> bool {
		matches!(self, AccountStatus::Ready)
	}

	/// Everything except a brand-new account that has not produced a value yet.
	pub fn can_refresh(&self) -> bool {
		!matches!(
			self,
			AccountStatus::Idle | AccountStatus::Loading | AccountStatus::Failed(_)
		)
	}

	pub fn error(&self) -> Option<&SyncError> {
		match self {
			AccountStatus::Failed(e)
			| AccountStatus::Expired(e)
			| AccountStatus::FailedAssetDetails(e)
			| AccountStatus::ExpiredAssetDetails(e) => Some(e),
			_ => None,
		}
	}

	pub fn can_transition_to(&self, next: &AccountStatus) -> bool {
		use AccountStatus::*;

		if matches!(next, Refreshing) {
			return self.can_refresh();
		}

		matches!(
			(self, next),
			(Idle, Loading)
				| (Failed(_), Loading)
				| (Loading, UpToDate)
				| (Loading, Failed(_))
				| (Refreshing, UpToDate)
				| (Refreshing, Expired(_))
				| (UpToDate, LoadingAssetDetails)
				| (UpToDate, RefreshingAssetDetails)
				| (LoadingAssetDetails, Ready)
				| (LoadingAssetDetails, FailedAssetDetails(_))
				| (RefreshingAssetDetails, Ready)
				| (RefreshingAssetDetails, ExpiredAssetDetails(_))
		)
	}
}

/// Cached account value tagged with the outcome of its latest refresh.
#[derive(Debug, Clone)]
pub struct AccountHandle {
	pub value: Account,
	status: AccountStatus,
	/// When asset details last completed for this account.
	synced_at: Option<DateTime<Utc>>,
}

impl AccountHandle {
	pub fn idle(value: Account) -> Self {
		Self {
			value,
			status: AccountStatus::Idle,
			synced_at: None,
		}
	}

	pub fn loading(value: Account) -> Self {
		Self {
			value,
			status: AccountStatus::Loading,
			synced_at: None,
		}
	}

	pub fn status(&self) -> &AccountStatus {
		&self.status
	}

	pub fn address(&self) -> &str {
		&self.value.address
	}

	pub fn synced_at(&self) -> Option<DateTime<Utc>> {
		self.synced_at
	}

	pub fn is_up_to_date(&self) -> bool {
		self.status.is_up_to_date()
	}

	pub fn is_ready(&self) -> bool {
		self.status.is_ready()
	}

	pub fn can_refresh(&self) -> bool {
		self.status.can_refresh()
	}

	/// Whether the value came from the chain at least once.
	pub fn is_available(&self) -> bool {
		self.status.can_refresh()
	}

	/// Whether asset details completed at least once for this account.
	pub fn has_synced_asset_details(&self) -> bool {
		self.synced_at.is_some()
	}

	/// Move to `next`, keeping the current value.
	pub fn transition(&mut self, next: AccountStatus) -> Result<(), SyncError> {
		if !self.status.can_transition_to(&next) {
			return Err(SyncError::InvalidTransition {
				from: self.status.name(),
				to: next.name(),
			});
		}

		if next.is_ready() {
			self.synced_at = Some(Utc::now());
		}
		self.status = next;
		Ok(())
	}

	/// Move to `next` and replace the value.
	pub fn transition_with_value(
		&mut self,
		next: AccountStatus,
		value: Account,
	) -> Result<(), SyncError> {
		self.transition(next)?;
		self.value = value;
		Ok(())
	}
}

/// Account handles keyed by address.
#[derive(Debug, Clone, Default)]
pub struct AccountCollection {
	handles: HashMap<String, AccountHandle>,
}

impl AccountCollection {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn get(&self, address: &str) -> Option<&AccountHandle> {
		self.handles.get(address)
	}

	pub fn get_mut(&mut self, address: &str) -> Option<&mut AccountHandle> {
		self.handles.get_mut(address)
	}

	/// Insert or replace the handle stored under its account address.
	pub fn insert(&mut self, handle: AccountHandle) {
		self.handles.insert(handle.value.address.clone(), handle);
	}

	pub fn remove(&mut self, address: &str) -> Option<AccountHandle> {
		self.handles.remove(address)
	}

	pub fn contains(&self, address: &str) -> bool {
		self.handles.contains_key(address)
	}

	pub fn len(&self) -> usize {
		self.handles.len()
	}

	pub fn is_empty(&self) -> bool {
		self.handles.is_empty()
	}

	pub fn clear(&mut self) {
		self.handles.clear();
	}

	pub fn iter(&self) -> impl Iterator<Item = &AccountHandle> {
		self.handles.values()
	}

	/// Handles whose signing authority was moved to `address`.
	pub fn rekeyed_accounts(&self, address: &str) -> Vec<&AccountHandle> {
		self.handles
			.values()
			.filter(|handle| {
				handle.value.is_rekeyed() && handle.value.auth_address.as_deref() == Some(address)
			})
			.collect()
	}

	/// Handle of the account that signs for `address`, when it is one of ours.
	pub fn auth_account(&self, address: &str) -> Option<&AccountHandle> {
		let auth_address = self.get(address)?.value.auth_address.as_deref()?;
		self.get(auth_address)
	}
}

/// Asset decorations keyed by asset id, shared by every account.
#[derive(Debug, Clone, Default)]
pub struct AssetDetailCollection {
	decorations: HashMap<AssetId, AssetDecoration>,
}

impl AssetDetailCollection {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn get(&self, id: AssetId) -> Option<&AssetDecoration> {
		self.decorations.get(&id)
	}

	pub fn contains(&self, id: AssetId) -> bool {
		self.decorations.contains_key(&id)
	}

	pub fn insert(&mut self, decoration: AssetDecoration) {
		self.decorations.insert(decoration.id, decoration);
	}

	pub fn len(&self) -> usize {
		self.decorations.len()
	}

	pub fn is_empty(&self) -> bool {
		self.decorations.is_empty()
	}

	pub fn clear(&mut self) {
		self.decorations.clear();
	}

	pub fn iter(&self) -> impl Iterator<Item = &AssetDecoration> {
		self.decorations.values()
	}
}

impl Extend<AssetDecoration> for AssetDetailCollection {
	fn extend<T: IntoIterator<Item = AssetDecoration>>(&mut self, iter: T) {
		for decoration in iter {
			self.insert(decoration);
		}
	}
}

impl FromIterator<AssetDecoration> for AssetDetailCollection {
	fn from_iter<T: IntoIterator<Item = AssetDecoration>>(iter: T) -> Self {
		let mut collection = Self::new();
		collection.extend(iter);
		collection
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::indexer::IndexerError;

	fn account(address: &str) -> Account {
		Account::empty(&LocalAccount::new(address))
	}

	fn error() -> SyncError {
		IndexerError::Transport("offline".to_string()).into()
	}

	#[test]
	fn ready_is_unreachable_without_up_to_date() {
		let mut handle = AccountHandle::loading(account("A"));
		assert!(handle.transition(AccountStatus::Ready).is_err());
		assert!(handle.transition(AccountStatus::LoadingAssetDetails).is_err());

		handle.transition(AccountStatus::UpToDate).unwrap();
		handle.transition(AccountStatus::LoadingAssetDetails).unwrap();
		handle.transition(AccountStatus::Ready).unwrap();
		assert!(handle.is_ready());
		assert!(handle.has_synced_asset_details());
	}

	#[test]
	fn refresh_is_refused_for_brand_new_accounts() {
		let loading = AccountHandle::loading(account("A"));
		assert!(!loading.can_refresh());

		let mut failed = AccountHandle::loading(account("A"));
		failed.transition(AccountStatus::Failed(error())).unwrap();
		assert!(!failed.can_refresh());
		assert!(matches!(
			failed.transition(AccountStatus::Refreshing),
			Err(SyncError::InvalidTransition { from: "failed", to: "refreshing" })
		));
	}

	#[test]
	fn every_status_from_up_to_date_on_can_refresh() {
		let statuses = [
			AccountStatus::Refreshing,
			AccountStatus::Expired(error()),
			AccountStatus::UpToDate,
			AccountStatus::LoadingAssetDetails,
			AccountStatus::RefreshingAssetDetails,
			AccountStatus::FailedAssetDetails(error()),
			AccountStatus::ExpiredAssetDetails(error()),
			AccountStatus::Ready,
		];

		for status in statuses {
			assert!(status.can_refresh(), "{} should refresh", status.name());
			assert!(status.can_transition_to(&AccountStatus::Refreshing));
		}
	}

	#[test]
	fn up_to_date_covers_asset_detail_statuses() {
		assert!(!AccountStatus::Refreshing.is_up_to_date());
		assert!(!AccountStatus::Expired(error()).is_up_to_date());
		assert!(AccountStatus::UpToDate.is_up_to_date());
		assert!(AccountStatus::FailedAssetDetails(error()).is_up_to_date());
		assert!(AccountStatus::Ready.is_up_to_date());
	}

	#[test]
	fn deleted_holdings_are_dropped_from_responses() {
		let data = AccountData {
			address: "A".to_string(),
			amount: 10,
			assets: vec![
				AssetHoldingData {
					asset_id: 1,
					amount: 1,
					is_frozen: false,
					deleted: false,
					opted_in_at_round: None,
				},
				AssetHoldingData {
					asset_id: 2,
					amount: 1,
					is_frozen: false,
					deleted: true,
					opted_in_at_round: None,
				},
			],
			..AccountData::default()
		};

		let account = Account::from_response(data, &LocalAccount::new("A").with_name("Main"));
		assert_eq!(account.asset_ids().collect::<Vec<_>>(), vec![1]);
		assert_eq!(account.name.as_deref(), Some("Main"));
	}

	#[test]
	fn rekey_lookups_follow_auth_addresses() {
		let mut collection = AccountCollection::new();
		let mut rekeyed = account("A");
		rekeyed.auth_address = Some("B".to_string());
		collection.insert(AccountHandle::idle(rekeyed));
		collection.insert(AccountHandle::idle(account("B")));

		let rekeyed_to_b = collection.rekeyed_accounts("B");
		assert_eq!(rekeyed_to_b.len(), 1);
		assert_eq!(rekeyed_to_b[0].address(), "A");
		assert_eq!(collection.auth_account("A").unwrap().address(), "B");
		assert!(collection.auth_account("B").is_none());
	}
}
