//! Who can sign for an account, derived from the cached collection and the local keys.

use crate::wallet::{Account, AccountCollection, LocalAccountSource};

/// Signing authority of an account as seen from this device.
///
/// Rekeyed variants name the kind of the account itself first and the kind of its auth
/// account second.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AccountAuthorization {
	/// Not classified yet, or the account has no value from the chain.
	#[default]
	Unknown,
	Watch,
	Standard,
	Ledger,
	/// Neither a key nor a ledger is known for the account.
	NoAuthInLocal,
	StandardToLedgerRekeyed,
	LedgerToLedgerRekeyed,
	UnknownToLedgerRekeyed,
	StandardToStandardRekeyed,
	LedgerToStandardRekeyed,
	UnknownToStandardRekeyed,
	StandardToNoAuthInLocalRekeyed,
	LedgerToNoAuthInLocalRekeyed,
	UnknownToNoAuthInLocalRekeyed,
}

impl AccountAuthorization {
	pub fn name(&self) -> &'static str {
		match self {
			AccountAuthorization::Unknown => "unknown",
			AccountAuthorization::Watch => "watch",
			AccountAuthorization::Standard => "standard",
			AccountAuthorization::Ledger => "ledger",
			AccountAuthorization::NoAuthInLocal => "noAuthInLocal",
			AccountAuthorization::StandardToLedgerRekeyed => "standardToLedgerRekeyed",
			AccountAuthorization::LedgerToLedgerRekeyed => "ledgerToLedgerRekeyed",
			AccountAuthorization::UnknownToLedgerRekeyed => "unknownToLedgerRekeyed",
			AccountAuthorization::StandardToStandardRekeyed => "standardToStandardRekeyed",
			AccountAuthorization::LedgerToStandardRekeyed => "ledgerToStandardRekeyed",
			AccountAuthorization::UnknownToStandardRekeyed => "unknownToStandardRekeyed",
			AccountAuthorization::StandardToNoAuthInLocalRekeyed => {
				"standardToNoAuthInLocalRekeyed"
			}
			AccountAuthorization::LedgerToNoAuthInLocalRekeyed => "ledgerToNoAuthInLocalRekeyed",
			AccountAuthorization::UnknownToNoAuthInLocalRekeyed => {
				"unknownToNoAuthInLocalRekeyed"
			}
		}
	}

	pub fn is_rekeyed(&self) -> bool {
		matches!(
			self,
			AccountAuthorization::StandardToLedgerRekeyed
				| AccountAuthorization::LedgerToLedgerRekeyed
				| AccountAuthorization::UnknownToLedgerRekeyed
				| AccountAuthorization::StandardToStandardRekeyed
				| AccountAuthorization::LedgerToStandardRekeyed
				| AccountAuthorization::UnknownToStandardRekeyed
				| AccountAuthorization::StandardToNoAuthInLocalRekeyed
				| AccountAuthorization::LedgerToNoAuthInLocalRekeyed
				| AccountAuthorization::UnknownToNoAuthInLocalRekeyed
		)
	}

	/// Whether this device can produce a signature for the account.
	pub fn can_sign(&self) -> bool {
		matches!(
			self,
			AccountAuthorization::Standard
				| AccountAuthorization::Ledger
				| AccountAuthorization::StandardToLedgerRekeyed
				| AccountAuthorization::LedgerToLedgerRekeyed
				| AccountAuthorization::UnknownToLedgerRekeyed
				| AccountAuthorization::StandardToStandardRekeyed
				| AccountAuthorization::LedgerToStandardRekeyed
				| AccountAuthorization::UnknownToStandardRekeyed
		)
	}
}

/// Kind of signer the account itself has on this device.
enum OwnSigner {
	Standard,
	Ledger,
	Unknown,
}

fn own_signer(account: &Account, session: &dyn LocalAccountSource) -> OwnSigner {
	if session.has_private_data(&account.address) {
		OwnSigner::Standard
	} else if account.is_ledger {
		OwnSigner::Ledger
	} else {
		OwnSigner::Unknown
	}
}

/// Classify the signing authority of `account` against the accounts in `accounts`.
pub fn determine_authorization(
	account: &Account,
	accounts: &AccountCollection,
	session: &dyn LocalAccountSource,
) -> AccountAuthorization {
	if account.is_watch_account {
		return AccountAuthorization::Watch;
	}

	if accounts
		.get(&account.address)
		.is_some_and(|handle| !handle.is_available())
	{
		return AccountAuthorization::Unknown;
	}

	if let Some(auth_address) = account.auth_address.as_deref() {
		return determine_rekeyed(account, auth_address, accounts, session);
	}

	if account.is_ledger {
		return AccountAuthorization::Ledger;
	}

	if session.has_private_data(&account.address) {
		AccountAuthorization::Standard
	} else {
		AccountAuthorization::NoAuthInLocal
	}
}

fn determine_rekeyed(
	account: &Account,
	auth_address: &str,
	accounts: &AccountCollection,
	session: &dyn LocalAccountSource,
) -> AccountAuthorization {
	use AccountAuthorization::*;

	let auth_account = accounts.get(auth_address).map(|handle| &handle.value);
	let own = own_signer(account, session);

	if auth_account.is_some_and(|auth| auth.is_ledger) {
		return match own {
			OwnSigner::Standard => StandardToLedgerRekeyed,
			OwnSigner::Ledger => LedgerToLedgerRekeyed,
			OwnSigner::Unknown => UnknownToLedgerRekeyed,
		};
	}

	if auth_account.is_some_and(|auth| session.has_private_data(&auth.address)) {
		return match own {
			OwnSigner::Standard => StandardToStandardRekeyed,
			OwnSigner::Ledger => LedgerToStandardRekeyed,
			OwnSigner::Unknown => UnknownToStandardRekeyed,
		};
	}

	match own {
		OwnSigner::Standard => StandardToNoAuthInLocalRekeyed,
		OwnSigner::Ledger => LedgerToNoAuthInLocalRekeyed,
		OwnSigner::Unknown => UnknownToNoAuthInLocalRekeyed,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::wallet::{AccountHandle, AccountStatus, InMemorySession, LocalAccount};

	fn available(local: LocalAccount, auth_address: Option<&str>) -> AccountHandle {
		let mut value = Account::empty(&local);
		value.auth_address = auth_address.map(str::to_string);
		let mut handle = AccountHandle::loading(value);
		handle.transition(AccountStatus::UpToDate).unwrap();
		handle
	}

	fn collection(handles: Vec<AccountHandle>) -> AccountCollection {
		let mut accounts = AccountCollection::new();
		for handle in handles {
			accounts.insert(handle);
		}
		accounts
	}

	fn classify(
		accounts: &AccountCollection,
		session: &InMemorySession,
		address: &str,
	) -> AccountAuthorization {
		determine_authorization(&accounts.get(address).unwrap().value, accounts, session)
	}

	#[test]
	fn plain_accounts() {
		let session = InMemorySession::default();
		session.store_private_data("KEY");
		let mut watch = LocalAccount::new("WATCH");
		watch.is_watch_account = true;

		let accounts = collection(vec![
			available(LocalAccount::new("KEY"), None),
			available(LocalAccount::new("LEDGER").with_ledger(), None),
			available(LocalAccount::new("BARE"), None),
			available(watch, None),
			AccountHandle::loading(Account::empty(&LocalAccount::new("NEW"))),
		]);

		assert_eq!(classify(&accounts, &session, "KEY"), AccountAuthorization::Standard);
		assert_eq!(classify(&accounts, &session, "LEDGER"), AccountAuthorization::Ledger);
		assert_eq!(classify(&accounts, &session, "BARE"), AccountAuthorization::NoAuthInLocal);
		assert_eq!(classify(&accounts, &session, "WATCH"), AccountAuthorization::Watch);
		assert_eq!(classify(&accounts, &session, "NEW"), AccountAuthorization::Unknown);
		assert!(!AccountAuthorization::NoAuthInLocal.can_sign());
	}

	#[test]
	fn rekeyed_accounts_follow_their_auth_account() {
		let session = InMemorySession::default();
		session.store_private_data("KEY");
		session.store_private_data("TO_KEY");

		let accounts = collection(vec![
			available(LocalAccount::new("KEY"), None),
			available(LocalAccount::new("LEDGER").with_ledger(), None),
			available(LocalAccount::new("TO_KEY"), Some("KEY")),
			available(LocalAccount::new("TO_LEDGER").with_ledger(), Some("LEDGER")),
			available(LocalAccount::new("TO_OUTSIDER"), Some("OUTSIDER")),
		]);

		assert_eq!(
			classify(&accounts, &session, "TO_KEY"),
			AccountAuthorization::StandardToStandardRekeyed
		);
		assert_eq!(
			classify(&accounts, &session, "TO_LEDGER"),
			AccountAuthorization::LedgerToLedgerRekeyed
		);
		let outsider = classify(&accounts, &session, "TO_OUTSIDER");
		assert_eq!(outsider, AccountAuthorization::UnknownToNoAuthInLocalRekeyed);
		assert!(outsider.is_rekeyed());
		assert!(!outsider.can_sign());
	}
}
