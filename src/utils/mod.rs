//!
//! Utility module for the sync engine.
//!
//! Re-exports formatting helpers used when logging balances.
/// Utility functions for formatting and display
pub mod index;

pub use index::{ALGO_DECIMALS, format_algos, format_token_amount};
