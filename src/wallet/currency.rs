use crate::indexer::Currency;
use crate::wallet::SyncError;

use chrono::{DateTime, Utc};

/// Cached exchange rate of the preferred currency and the outcome of its latest refresh.
#[derive(Debug, Clone, Default)]
pub enum CurrencyHandle {
	#[default]
	Idle,
	Loading,
	/// Refresh in flight; keeps the previous value when there was one.
	Refreshing(Option<Box<CurrencyHandle>>),
	Ready {
		currency: Currency,
		fetched_at: DateTime<Utc>,
	},
	/// Latest refresh failed; the last good rate is still served.
	Expired {
		currency: Currency,
		fetched_at: DateTime<Utc>,
		error: SyncError,
	},
	Fault(SyncError),
}

impl CurrencyHandle {
	/// Handle to show while a new fetch is in flight.
	pub fn refreshing(self) -> Self {
		match self {
			CurrencyHandle::Idle | CurrencyHandle::Loading | CurrencyHandle::Fault(_) => {
				CurrencyHandle::Loading
			}
			previous @ (CurrencyHandle::Ready { .. } | CurrencyHandle::Expired { .. }) => {
				CurrencyHandle::Refreshing(Some(Box::new(previous)))
			}
			refreshing @ CurrencyHandle::Refreshing(_) => refreshing,
		}
	}

	/// Handle after a failed fetch; a previous value survives the failure next to the error.
	pub fn failed(self, error: SyncError) -> Self {
		match self {
			CurrencyHandle::Refreshing(Some(previous)) => previous.failed(error),
			CurrencyHandle::Ready {
				currency,
				fetched_at,
			}
			| CurrencyHandle::Expired {
				currency,
				fetched_at,
				..
			} => CurrencyHandle::Expired {
				currency,
				fetched_at,
				error,
			},
			_ => CurrencyHandle::Fault(error),
		}
	}

	pub fn ready(currency: Currency) -> Self {
		CurrencyHandle::Ready {
			currency,
			fetched_at: Utc::now(),
		}
	}

	/// Last successfully fetched value, including the one kept during a refresh.
	pub fn value(&self) -> Option<&Currency> {
		match self {
			CurrencyHandle::Ready { currency, .. } | CurrencyHandle::Expired { currency, .. } => {
				Some(currency)
			}
			CurrencyHandle::Refreshing(Some(previous)) => previous.value(),
			_ => None,
		}
	}

	/// Error of the latest failed fetch, if it has not been superseded by a success.
	pub fn error(&self) -> Option<&SyncError> {
		match self {
			CurrencyHandle::Expired { error, .. } | CurrencyHandle::Fault(error) => Some(error),
			CurrencyHandle::Refreshing(Some(previous)) => previous.error(),
			_ => None,
		}
	}

	pub fn is_available(&self) -> bool {
		self.value().is_some()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::indexer::IndexerError;

	fn usd() -> Currency {
		Currency {
			id: "USD".to_string(),
			name: "US Dollar".to_string(),
			symbol: Some("$".to_string()),
			exchange_price: Some("0.19".to_string()),
			usd_value: Some("1".to_string()),
			last_updated_at: None,
		}
	}

	#[test]
	fn first_fetch_failure_becomes_fault() {
		let handle = CurrencyHandle::Idle.refreshing();
		assert!(matches!(handle, CurrencyHandle::Loading));

		let handle = handle.failed(IndexerError::Transport("down".to_string()).into());
		assert!(matches!(handle, CurrencyHandle::Fault(_)));
		assert!(!handle.is_available());
	}

	#[test]
	fn refresh_failure_keeps_previous_rate() {
		let handle = CurrencyHandle::ready(usd()).refreshing();
		assert_eq!(handle.value().map(|c| c.id.as_str()), Some("USD"));

		let handle = handle.failed(IndexerError::Transport("timeout".to_string()).into());
		assert!(matches!(handle, CurrencyHandle::Expired { .. }));
		assert_eq!(handle.value().map(|c| c.id.as_str()), Some("USD"));
		assert!(handle.error().is_some_and(|e| e.to_string().contains("timeout")));
	}

	#[test]
	fn repeated_refresh_failures_keep_the_rate_and_latest_error() {
		let expired = CurrencyHandle::ready(usd())
			.refreshing()
			.failed(SyncError::Cancelled);

		let refreshing = expired.refreshing();
		assert!(refreshing.error().is_some());
		assert_eq!(refreshing.value().map(|c| c.id.as_str()), Some("USD"));

		let failed_again = refreshing.failed(IndexerError::NotFound.into());
		assert!(matches!(
			failed_again.error(),
			Some(SyncError::IndexerError(e)) if e.is_not_found()
		));
		assert_eq!(failed_again.value().map(|c| c.id.as_str()), Some("USD"));
		assert!(CurrencyHandle::ready(usd()).error().is_none());
	}
}
