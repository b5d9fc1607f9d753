//! Runtime configuration for the sync engine and its HTTP client.

use crate::wallet::SyncError;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Hard page-size limit of the asset decoration endpoint.
pub const ASSET_QUERY_LIMIT: usize = 100;

/// Configuration for the sync engine
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
	/// Base URL of the algod node used for rounds and transaction params.
	pub node_url: String,
	/// Base URL of the indexer used for account state.
	pub indexer_url: String,
	/// Base URL of the mobile API serving asset decorations and currency rates.
	pub mobile_api_url: String,
	pub node_api_token: Option<String>,
	pub mobile_api_key: Option<String>,
	/// Timeout for every request except the round long-poll.
	pub request_timeout_secs: u64,
	/// Maximum number of asset ids per decoration request.
	pub asset_batch_size: usize,
	/// Maximum number of decoration batches in flight across all accounts.
	pub max_concurrent_asset_batches: usize,
	/// Whether the round watcher signals once as soon as it learns the current round.
	pub fire_on_start: bool,
	/// First delay before asking the node again after a failed round request.
	pub watcher_initial_retry_ms: u64,
	/// Upper bound for the delay between failed round requests.
	pub watcher_max_retry_ms: u64,
	/// Preferred currency id (e.g. `USD`); no currency is polled when unset.
	pub currency_id: Option<String>,
}

impl Default for SyncConfig {
	fn default() -> Self {
		Self {
			node_url: "https://mainnet-api.algonode.cloud".to_string(),
			indexer_url: "https://mainnet-idx.algonode.cloud".to_string(),
			mobile_api_url: "https://mainnet.api.perawallet.app".to_string(),
			node_api_token: None,
			mobile_api_key: None,
			request_timeout_secs: 30,
			asset_batch_size: ASSET_QUERY_LIMIT,
			max_concurrent_asset_batches: 8,
			fire_on_start: true,
			watcher_initial_retry_ms: 500,
			watcher_max_retry_ms: 30_000,
			currency_id: None,
		}
	}
}

impl SyncConfig {
	/// Load a configuration from a JSON file; missing fields keep their defaults.
	pub fn from_file(path: &Path) -> Result<Self, SyncError> {
		let content = std::fs::read_to_string(path).map_err(|e| {
			SyncError::Config(format!("Failed to read config file {:?}: {}", path, e))
		})?;
		let config: SyncConfig = serde_json::from_str(&content)
			.map_err(|e| SyncError::Config(format!("Failed to parse config file: {}", e)))?;
		config.validate()?;
		Ok(config)
	}

	/// Reject values the sync engine cannot work with.
	pub fn validate(&self) -> Result<(), SyncError> {
		if self.asset_batch_size == 0 || self.asset_batch_size > ASSET_QUERY_LIMIT {
			return Err(SyncError::Config(format!(
				"asset_batch_size must be between 1 and {}",
				ASSET_QUERY_LIMIT
			)));
		}
		if self.max_concurrent_asset_batches == 0 {
			return Err(SyncError::Config(
				"max_concurrent_asset_batches must be at least 1".to_string(),
			));
		}
		if self.watcher_initial_retry_ms > self.watcher_max_retry_ms {
			return Err(SyncError::Config(
				"watcher_initial_retry_ms cannot exceed watcher_max_retry_ms".to_string(),
			));
		}
		Ok(())
	}

	pub fn request_timeout(&self) -> Duration {
		Duration::from_secs(self.request_timeout_secs)
	}

	pub fn watcher_initial_retry(&self) -> Duration {
		Duration::from_millis(self.watcher_initial_retry_ms)
	}

	pub fn watcher_max_retry(&self) -> Duration {
		Duration::from_millis(self.watcher_max_retry_ms)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn partial_json_keeps_defaults() {
		let config: SyncConfig =
			serde_json::from_str(r#"{"currency_id": "EUR", "asset_batch_size": 50}"#).unwrap();
		assert_eq!(config.currency_id.as_deref(), Some("EUR"));
		assert_eq!(config.asset_batch_size, 50);
		assert_eq!(config.request_timeout_secs, 30);
		assert!(config.validate().is_ok());
	}

	#[test]
	fn oversized_batches_are_rejected() {
		let config = SyncConfig {
			asset_batch_size: 101,
			..SyncConfig::default()
		};
		assert!(matches!(config.validate(), Err(SyncError::Config(_))));
	}
}
