//! Fetching of a single account from the indexer.

use crate::indexer::ChainApi;
use crate::wallet::{Account, LocalAccount, WalletSyncError};

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Fetches the state of one local account.
///
/// An address the indexer has never seen is not an error: it yields an empty account built from
/// the local hints, so brand-new accounts show up with a zero balance.
pub struct AccountFetchOperation {
	api: Arc<dyn ChainApi>,
	local_account: LocalAccount,
}

impl AccountFetchOperation {
	pub fn new(api: Arc<dyn ChainApi>, local_account: LocalAccount) -> Self {
		Self { api, local_account }
	}

	pub fn local_account(&self) -> &LocalAccount {
		&self.local_account
	}

	/// Run the fetch. Returns `None` when `token` is cancelled before a result is produced; the
	/// in-flight request is dropped in that case.
	pub async fn execute(
		&self,
		token: &CancellationToken,
	) -> Option<Result<Account, WalletSyncError>> {
		if token.is_cancelled() {
			return None;
		}

		let address = self.local_account.address.as_str();
		let response = tokio::select! {
			biased;
			_ = token.cancelled() => {
				debug!("Account fetch for {} cancelled", address);
				return None;
			}
			response = self.api.fetch_account(address) => response,
		};

		if token.is_cancelled() {
			return None;
		}

		let result = match response {
			Ok(response) => Ok(Account::from_response(response.account, &self.local_account)),
			Err(e) if e.is_not_found() => {
				debug!("Account {} not found on chain, using an empty account", address);
				Ok(Account::empty(&self.local_account))
			}
			Err(e) => Err(WalletSyncError::from(e)),
		};
		Some(result)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::indexer::AssetHoldingData;
	use crate::wallet::sync::mock_api::{AccountScript, MockChainApi, account_data};
	use std::time::Duration;

	#[tokio::test]
	async fn fetched_account_drops_deleted_holdings() {
		let mut data = account_data("ADDR", 5_000_000, &[1, 2]);
		data.assets.push(AssetHoldingData {
			asset_id: 3,
			amount: 0,
			is_frozen: false,
			deleted: true,
			opted_in_at_round: None,
		});
		let api = Arc::new(MockChainApi::new().with_account(data));
		let operation = AccountFetchOperation::new(api, LocalAccount::new("ADDR").with_name("Main"));

		let account = operation
			.execute(&CancellationToken::new())
			.await
			.unwrap()
			.unwrap();
		assert_eq!(account.amount, 5_000_000);
		assert_eq!(account.asset_ids().collect::<Vec<_>>(), vec![1, 2]);
		assert_eq!(account.name.as_deref(), Some("Main"));
	}

	#[tokio::test]
	async fn not_found_is_an_empty_account() {
		let api = Arc::new(MockChainApi::new());
		let local = LocalAccount::new("NEW").with_name("Fresh");
		let operation = AccountFetchOperation::new(api, local.clone());

		let account = operation
			.execute(&CancellationToken::new())
			.await
			.unwrap()
			.unwrap();
		assert_eq!(account, Account::empty(&local));
		assert_eq!(account.amount, 0);
	}

	#[tokio::test]
	async fn transport_failure_is_an_error() {
		let api = MockChainApi::new();
		api.script_account("ADDR", AccountScript::Fail("connection reset".to_string()));
		let operation = AccountFetchOperation::new(Arc::new(api), LocalAccount::new("ADDR"));

		let result = operation.execute(&CancellationToken::new()).await.unwrap();
		assert!(matches!(result, Err(WalletSyncError::IndexerError(_))));
	}

	#[tokio::test]
	async fn cancellation_is_silent_and_drops_the_request() {
		let api = Arc::new(MockChainApi::new());
		api.script_account("ADDR", AccountScript::Hang);
		let operation = AccountFetchOperation::new(api.clone(), LocalAccount::new("ADDR"));

		let token = CancellationToken::new();
		let canceller = token.clone();
		tokio::spawn(async move {
			tokio::time::sleep(Duration::from_millis(20)).await;
			canceller.cancel();
		});

		assert!(operation.execute(&token).await.is_none());
		assert_eq!(api.account_requests(), vec!["ADDR".to_string()]);
		assert_eq!(api.cancelled(), 1);
	}

	#[tokio::test]
	async fn cancelled_before_start_makes_no_request() {
		let api = Arc::new(MockChainApi::new());
		let operation = AccountFetchOperation::new(api.clone(), LocalAccount::new("ADDR"));

		let token = CancellationToken::new();
		token.cancel();
		assert!(operation.execute(&token).await.is_none());
		assert!(api.account_requests().is_empty());
	}
}
