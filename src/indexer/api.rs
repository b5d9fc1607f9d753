//! Abstract contract of the remote chain and indexer endpoints consumed by the sync engine.

use super::types::*;

/// Endpoints the sync engine depends on.
///
/// Every call is a plain request/response future. Dropping the future cancels the
/// request at the transport level, which is how operations abort in-flight calls.
#[async_trait::async_trait]
pub trait ChainApi: Send + Sync {
	/// Fetch one account. A missing account must be reported as [`IndexerError::NotFound`].
	async fn fetch_account(&self, address: &str) -> Result<AccountResponse, IndexerError>;

	/// Fetch decorations for at most one page of asset ids.
	async fn fetch_asset_details(
		&self,
		ids: &[AssetId],
	) -> Result<Vec<AssetDecoration>, IndexerError>;

	/// Current suggested transaction parameters, including the last confirmed round.
	async fn transaction_params(&self) -> Result<TransactionParams, IndexerError>;

	/// Long-poll until the node has confirmed `round`.
	async fn wait_for_round(&self, round: u64) -> Result<NodeStatus, IndexerError>;

	/// Exchange rate for the given currency id.
	async fn fetch_currency(&self, currency_id: &str) -> Result<Currency, IndexerError>;
}
