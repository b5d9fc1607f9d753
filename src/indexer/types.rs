//! Wire types returned by the algod node, the indexer and the mobile API.

use serde::{Deserialize, Serialize};

/// Identifier of an Algorand Standard Asset.
pub type AssetId = u64;

/// Response envelope of `GET /v2/accounts/{address}` on the indexer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountResponse {
    pub account: AccountData,
    #[serde(rename = "current-round")]
    pub current_round: u64,
}

/// On-chain account state as reported by the indexer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AccountData {
    pub address: String,
    /// Balance in microalgos, pending rewards included.
    pub amount: u64,
    #[serde(default)]
    pub amount_without_pending_rewards: u64,
    #[serde(default)]
    pub min_balance: u64,
    #[serde(default)]
    pub pending_rewards: u64,
    #[serde(default)]
    pub rewards: u64,
    #[serde(default)]
    pub round: u64,
    /// Participation status (`Offline`, `Online`, `NotParticipating`).
    #[serde(default)]
    pub status: Option<String>,
    /// Address of the account that signs for this one after a rekey.
    #[serde(default, rename = "auth-addr")]
    pub auth_address: Option<String>,
    #[serde(default)]
    pub assets: Vec<AssetHoldingData>,
    #[serde(default)]
    pub created_at_round: Option<u64>,
    #[serde(default)]
    pub deleted: bool,
}

/// A single asset holding inside an account response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AssetHoldingData {
    pub asset_id: AssetId,
    pub amount: u64,
    #[serde(default)]
    pub is_frozen: bool,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub opted_in_at_round: Option<u64>,
}

/// Verification tier assigned to an asset by the mobile API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationTier {
    Trusted,
    Verified,
    #[default]
    Unverified,
    Suspicious,
}

/// Collectible (NFT) metadata attached to an asset decoration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectibleInfo {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub standard: Option<String>,
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub collection_name: Option<String>,
}

/// Asset metadata ("decoration") shared by every account that holds the asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetDecoration {
    #[serde(rename = "asset_id")]
    pub id: AssetId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub unit_name: Option<String>,
    #[serde(default, rename = "fraction_decimals")]
    pub decimals: u32,
    #[serde(default)]
    pub verification_tier: VerificationTier,
    #[serde(default)]
    pub collectible: Option<CollectibleInfo>,
    #[serde(default)]
    pub usd_value: Option<String>,
}

impl AssetDecoration {
    /// Whether holdings of this asset belong in the collectible bucket.
    pub fn is_collectible(&self) -> bool {
        self.collectible.is_some()
    }
}

/// Paginated list envelope used by the mobile API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResponse<T> {
    pub results: Vec<T>,
    #[serde(default)]
    pub next: Option<String>,
}

/// Suggested transaction parameters from `GET /v2/transactions/params`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TransactionParams {
    pub last_round: u64,
    #[serde(default)]
    pub fee: u64,
    #[serde(default)]
    pub min_fee: u64,
    #[serde(default)]
    pub genesis_id: String,
    #[serde(default)]
    pub genesis_hash: String,
    #[serde(default)]
    pub consensus_version: String,
}

/// Node status returned by the round long-poll endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NodeStatus {
    pub last_round: u64,
    #[serde(default)]
    pub time_since_last_round: u64,
    #[serde(default)]
    pub catchup_time: u64,
}

/// Exchange rate of a fiat currency against ALGO, as served by the mobile API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Currency {
    #[serde(rename = "currency_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub symbol: Option<String>,
    /// Price of one ALGO in this currency, as a decimal string.
    #[serde(default)]
    pub exchange_price: Option<String>,
    #[serde(default)]
    pub usd_value: Option<String>,
    #[serde(default)]
    pub last_updated_at: Option<String>,
}

impl Currency {
    /// Parsed ALGO price in this currency, if the API reported one.
    pub fn algo_value(&self) -> Option<f64> {
        self.exchange_price.as_deref()?.parse().ok()
    }
}

/// Error types for node, indexer and mobile API calls
#[derive(Debug, thiserror::Error)]
pub enum IndexerError {
    #[error("Resource not found")]
    NotFound,

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl IndexerError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, IndexerError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn account_response_parses_indexer_json() {
        let raw = r#"{
            "account": {
                "address": "ADDR",
                "amount": 5000000,
                "amount-without-pending-rewards": 5000000,
                "min-balance": 200000,
                "round": 42,
                "status": "Offline",
                "auth-addr": "AUTH",
                "assets": [
                    {"asset-id": 31566704, "amount": 10, "is-frozen": false, "deleted": false, "opted-in-at-round": 7},
                    {"asset-id": 2, "amount": 0, "deleted": true}
                ]
            },
            "current-round": 43
        }"#;

        let response: AccountResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(response.current_round, 43);
        assert_eq!(response.account.auth_address.as_deref(), Some("AUTH"));
        assert_eq!(response.account.assets.len(), 2);
        assert_eq!(response.account.assets[0].opted_in_at_round, Some(7));
        assert!(response.account.assets[1].deleted);
    }

    #[test]
    fn decoration_collectible_flag_follows_payload() {
        let raw = r#"{"results": [
            {"asset_id": 1, "name": "USDC", "unit_name": "USDC", "fraction_decimals": 6, "verification_tier": "trusted"},
            {"asset_id": 2, "name": "Art", "fraction_decimals": 0, "verification_tier": "unverified",
             "collectible": {"title": "Art #1", "standard": "arc3", "media_type": "image"}}
        ]}"#;

        let list: ListResponse<AssetDecoration> = serde_json::from_str(raw).unwrap();
        assert_eq!(list.results[0].verification_tier, VerificationTier::Trusted);
        assert!(!list.results[0].is_collectible());
        assert!(list.results[1].is_collectible());
    }

    #[test]
    fn currency_parses_exchange_price() {
        let raw = r#"{"currency_id": "EUR", "name": "Euro", "symbol": "€", "exchange_price": "0.1725"}"#;
        let currency: Currency = serde_json::from_str(raw).unwrap();
        assert_eq!(currency.algo_value(), Some(0.1725));
    }
}
