//!
//! HTTP client for the Algorand node, indexer and mobile API.
//!
//! This module provides the async client the sync engine uses in production. Account state
//! comes from the indexer, rounds and transaction params from algod, and asset decorations
//! and currency rates from the mobile API. All methods are async and designed for Tokio.

use super::api::ChainApi;
use super::types::*;
use crate::config::SyncConfig;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

/// Header carrying the algod/indexer API token.
const NODE_TOKEN_HEADER: &str = "X-Algo-API-Token";
/// Header carrying the mobile API key.
const MOBILE_KEY_HEADER: &str = "X-API-Key";

#[derive(Debug, Clone, Copy)]
enum Target {
	Node,
	Indexer,
	Mobile,
}

/// Algorand node, indexer and mobile API client
#[derive(Clone)]
pub struct AlgorandApiClient {
	/// Client used for every regular request, bounded by the configured timeout.
	http_client: Client,
	/// Client for the round long-poll, which has no client-side timeout.
	long_poll_client: Client,
	node_url: String,
	indexer_url: String,
	mobile_api_url: String,
	node_api_token: Option<String>,
	mobile_api_key: Option<String>,
}

impl AlgorandApiClient {
	/// Create a new client.
	///
	/// # Arguments
	/// * `node_url` - Base URL of the algod node.
	/// * `indexer_url` - Base URL of the indexer.
	/// * `mobile_api_url` - Base URL of the mobile API serving decorations and currencies.
	/// * `timeout` - Timeout applied to every request except the round long-poll.
	pub fn new(
		node_url: String,
		indexer_url: String,
		mobile_api_url: String,
		timeout: Duration,
	) -> Result<Self, IndexerError> {
		let http_client = Client::builder().timeout(timeout).build()?;
		let long_poll_client = Client::builder().pool_idle_timeout(None).build()?;

		Ok(Self {
			http_client,
			long_poll_client,
			node_url: parse_base(node_url)?,
			indexer_url: parse_base(indexer_url)?,
			mobile_api_url: parse_base(mobile_api_url)?,
			node_api_token: None,
			mobile_api_key: None,
		})
	}

	/// Build a client from the sync configuration.
	pub fn from_config(config: &SyncConfig) -> Result<Self, IndexerError> {
		let client = Self::new(
			config.node_url.clone(),
			config.indexer_url.clone(),
			config.mobile_api_url.clone(),
			config.request_timeout(),
		)?
		.with_node_api_token(config.node_api_token.clone())
		.with_mobile_api_key(config.mobile_api_key.clone());
		Ok(client)
	}

	pub fn with_node_api_token(mut self, token: Option<String>) -> Self {
		self.node_api_token = token;
		self
	}

	pub fn with_mobile_api_key(mut self, key: Option<String>) -> Self {
		self.mobile_api_key = key;
		self
	}

	fn request(&self, client: &Client, target: Target, path: &str) -> RequestBuilder {
		let (base, header) = match target {
			Target::Node => (
				&self.node_url,
				self.node_api_token.as_ref().map(|t| (NODE_TOKEN_HEADER, t)),
			),
			Target::Indexer => (
				&self.indexer_url,
				self.node_api_token.as_ref().map(|t| (NODE_TOKEN_HEADER, t)),
			),
			Target::Mobile => (
				&self.mobile_api_url,
				self.mobile_api_key.as_ref().map(|k| (MOBILE_KEY_HEADER, k)),
			),
		};

		let request = client.get(format!("{}{}", base, path));
		match header {
			Some((name, value)) => request.header(name, value),
			None => request,
		}
	}

	/// Send a GET request and decode the JSON body.
	///
	/// HTTP 404 is reported as [`IndexerError::NotFound`] so callers can tell a missing
	/// resource apart from a transport or server failure.
	async fn execute<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, IndexerError> {
		let response = request.send().await?;
		let status = response.status();

		if status == StatusCode::NOT_FOUND {
			return Err(IndexerError::NotFound);
		}

		if !status.is_success() {
			let body = response.text().await.unwrap_or_default();
			warn!("Request failed with status {}: {}", status, body);
			return Err(IndexerError::Status {
				status: status.as_u16(),
				body,
			});
		}

		let bytes = response.bytes().await?;
		Ok(serde_json::from_slice(&bytes)?)
	}
}

#[async_trait::async_trait]
impl ChainApi for AlgorandApiClient {
	async fn fetch_account(&self, address: &str) -> Result<AccountResponse, IndexerError> {
		debug!("Fetching account {}", address);
		let request = self
			.request(&self.http_client, Target::Indexer, &format!("/v2/accounts/{}", address))
			.query(&[("include-all", "false")]);
		self.execute(request).await
	}

	async fn fetch_asset_details(
		&self,
		ids: &[AssetId],
	) -> Result<Vec<AssetDecoration>, IndexerError> {
		let joined = ids
			.iter()
			.map(|id| id.to_string())
			.collect::<Vec<_>>()
			.join(",");
		let limit = ids.len().to_string();
		debug!("Fetching {} asset decorations", ids.len());

		let request = self
			.request(&self.http_client, Target::Mobile, "/v1/assets/")
			.query(&[("asset_ids", joined.as_str()), ("limit", limit.as_str())]);
		let list: ListResponse<AssetDecoration> = self.execute(request).await?;
		Ok(list.results)
	}

	async fn transaction_params(&self) -> Result<TransactionParams, IndexerError> {
		let request = self.request(&self.http_client, Target::Node, "/v2/transactions/params");
		self.execute(request).await
	}

	async fn wait_for_round(&self, round: u64) -> Result<NodeStatus, IndexerError> {
		// The node endpoint returns once the round after the given one is confirmed.
		let path = format!("/v2/status/wait-for-block-after/{}", round.saturating_sub(1));
		let request = self.request(&self.long_poll_client, Target::Node, &path);
		self.execute(request).await
	}

	async fn fetch_currency(&self, currency_id: &str) -> Result<Currency, IndexerError> {
		let path = format!("/v1/currencies/{}/", currency_id);
		let request = self.request(&self.http_client, Target::Mobile, &path);
		self.execute(request).await
	}
}

/// Validate a base URL and drop its trailing slashes.
fn parse_base(url: String) -> Result<String, IndexerError> {
	let trimmed = url.trim_end_matches('/');
	match Url::parse(trimmed) {
		Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => Ok(trimmed.to_string()),
		Ok(_) => Err(IndexerError::InvalidUrl(format!("{} is not an http(s) URL", url))),
		Err(e) => Err(IndexerError::InvalidUrl(format!("{}: {}", url, e))),
	}
}
