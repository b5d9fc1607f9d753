pub mod account;
pub mod authorization;
pub mod currency;
pub mod sync;
pub mod types;

pub use account::*;
pub use authorization::{AccountAuthorization, determine_authorization};
pub use currency::CurrencyHandle;
pub use sync::SharedDataController;
pub use types::*;
