//! Chain integration module for the Algorand node, indexer and mobile API
//!
//! This module provides the abstract endpoint contract used by the sync engine, the HTTP
//! client that implements it, and the wire types shared by both.

/// Endpoint contract consumed by the sync engine
mod api;
/// HTTP client for the node, indexer and mobile API
mod client;
/// Type definitions for wire data structures
mod types;

pub use api::ChainApi;
pub use client::AlgorandApiClient;
pub use types::*;
