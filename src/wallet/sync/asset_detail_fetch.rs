//! Fetching of the asset decorations an account needs.
//!
//! Only assets that are new since the cached snapshot of the account (or whose decoration was
//! never cached) are requested. Requests are split into batches that run concurrently, bounded
//! by a semaphore shared by every account of the cycle.

use crate::config::ASSET_QUERY_LIMIT;
use crate::indexer::{AssetDecoration, AssetId, ChainApi};
use crate::wallet::{
	Account, AccountCollection, AssetDetailCollection, CollectibleAsset, StandardAsset,
	WalletSyncError,
};

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Input of one asset detail group fetch.
#[derive(Debug, Clone, Default)]
pub struct AssetDetailGroupFetchInput {
	/// Freshly fetched account; absent when the account fetch failed.
	pub account: Option<Account>,
	pub cached_accounts: Arc<AccountCollection>,
	pub cached_asset_details: Arc<AssetDetailCollection>,
	/// Error of the account fetch this operation depends on.
	pub upstream_error: Option<WalletSyncError>,
}

#[derive(Debug, Clone)]
pub struct AssetDetailGroupFetchOutput {
	/// The account with both asset buckets rebuilt.
	pub account: Account,
	/// Decorations fetched by this operation, not previously cached.
	pub new_asset_details: HashMap<AssetId, AssetDecoration>,
}

#[derive(Debug, Clone)]
pub struct AssetDetailGroupFetchFailure {
	/// The account with its asset list cleared, when there was one.
	pub account: Option<Account>,
	pub error: WalletSyncError,
}

pub struct AssetDetailGroupFetchOperation {
	api: Arc<dyn ChainApi>,
	batch_pool: Arc<Semaphore>,
	batch_size: usize,
}

impl AssetDetailGroupFetchOperation {
	pub fn new(api: Arc<dyn ChainApi>, batch_pool: Arc<Semaphore>, batch_size: usize) -> Self {
		Self {
			api,
			batch_pool,
			batch_size: batch_size.clamp(1, ASSET_QUERY_LIMIT),
		}
	}

	/// Asset ids of `account` that have to be fetched: ids the cached snapshot of the account did
	/// not hold, plus ids without a cached decoration. Order follows the account's holdings.
	pub fn new_asset_ids(
		account: &Account,
		cached_accounts: &AccountCollection,
		cached_asset_details: &AssetDetailCollection,
	) -> Vec<AssetId> {
		let cached_account = cached_accounts.get(&account.address);
		let mut seen = HashSet::new();

		account
			.asset_ids()
			.filter(|id| seen.insert(*id))
			.filter(|id| {
				let previously_held = cached_account.is_some_and(|handle| handle.value.is_opted_in(*id));
				!previously_held || !cached_asset_details.contains(*id)
			})
			.collect()
	}

	pub async fn execute(
		&self,
		input: AssetDetailGroupFetchInput,
		token: &CancellationToken,
	) -> Result<AssetDetailGroupFetchOutput, AssetDetailGroupFetchFailure> {
		let AssetDetailGroupFetchInput {
			account,
			cached_accounts,
			cached_asset_details,
			upstream_error,
		} = input;

		if let Some(error) = upstream_error {
			return Err(AssetDetailGroupFetchFailure {
				account,
				error: WalletSyncError::UpstreamDependencyFailed(Box::new(error)),
			});
		}

		let Some(mut account) = account else {
			return Err(AssetDetailGroupFetchFailure {
				account: None,
				error: WalletSyncError::MissingInput("account"),
			});
		};

		if token.is_cancelled() {
			return Err(AssetDetailGroupFetchFailure {
				account: Some(account),
				error: WalletSyncError::Cancelled,
			});
		}

		let new_ids = Self::new_asset_ids(&account, &cached_accounts, &cached_asset_details);
		debug!(
			"Account {} holds {} assets, {} need decorations",
			account.address,
			account.assets.len(),
			new_ids.len()
		);

		let new_asset_details = match self.fetch_batches(&new_ids, token).await {
			Ok(details) => details,
			Err(error) => {
				account.clear_assets();
				return Err(AssetDetailGroupFetchFailure {
					account: Some(account),
					error,
				});
			}
		};

		let mut standard_assets = Vec::new();
		let mut collectible_assets = Vec::new();
		for holding in &account.assets {
			let Some(decoration) = new_asset_details
				.get(&holding.id)
				.or_else(|| cached_asset_details.get(holding.id))
			else {
				warn!("No decoration for asset {} of {}", holding.id, account.address);
				continue;
			};

			if decoration.is_collectible() {
				collectible_assets.push(CollectibleAsset {
					holding: holding.clone(),
					decoration: decoration.clone(),
				});
			} else {
				standard_assets.push(StandardAsset {
					holding: holding.clone(),
					decoration: decoration.clone(),
				});
			}
		}
		account.set_compound_assets(standard_assets, collectible_assets);

		Ok(AssetDetailGroupFetchOutput {
			account,
			new_asset_details,
		})
	}

	/// Fetch all batches concurrently. The first failing batch cancels its siblings and its error
	/// is the one reported.
	async fn fetch_batches(
		&self,
		ids: &[AssetId],
		token: &CancellationToken,
	) -> Result<HashMap<AssetId, AssetDecoration>, WalletSyncError> {
		let mut details = HashMap::new();
		if ids.is_empty() {
			return Ok(details);
		}

		let group = token.child_token();
		// Abandoning this future must not leave batches running.
		let _abort_on_drop = group.clone().drop_guard();

		let mut batches: FuturesUnordered<_> = ids
			.chunks(self.batch_size)
			.map(|batch| {
				tokio::spawn(fetch_batch(
					self.api.clone(),
					self.batch_pool.clone(),
					batch.to_vec(),
					group.clone(),
				))
			})
			.collect();

		let mut first_error = None;
		while let Some(joined) = batches.next().await {
			let result = joined.unwrap_or_else(|e| {
				Err(WalletSyncError::RuntimeError(format!("Asset batch task failed: {}", e)))
			});

			match result {
				Ok(decorations) => {
					details.extend(decorations.into_iter().map(|decoration| (decoration.id, decoration)));
				}
				Err(error) if error.is_cancelled() => {}
				Err(error) => {
					if first_error.is_none() {
						debug!("Asset batch failed, cancelling the remaining batches: {}", error);
						first_error = Some(error);
						group.cancel();
					}
				}
			}
		}

		if let Some(error) = first_error {
			return Err(error);
		}
		if token.is_cancelled() {
			return Err(WalletSyncError::Cancelled);
		}
		Ok(details)
	}
}

async fn fetch_batch(
	api: Arc<dyn ChainApi>,
	batch_pool: Arc<Semaphore>,
	ids: Vec<AssetId>,
	token: CancellationToken,
) -> Result<Vec<AssetDecoration>, WalletSyncError> {
	let _permit = tokio::select! {
		biased;
		_ = token.cancelled() => return Err(WalletSyncError::Cancelled),
		permit = batch_pool.acquire_owned() => permit.map_err(|_| {
			WalletSyncError::RuntimeError("Asset batch pool is closed".to_string())
		})?,
	};

	tokio::select! {
		biased;
		_ = token.cancelled() => Err(WalletSyncError::Cancelled),
		decorations = api.fetch_asset_details(&ids) => decorations.map_err(WalletSyncError::from),
	}
}
