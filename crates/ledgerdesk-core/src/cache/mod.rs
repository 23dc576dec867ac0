//! Local caching for offline access to ledger listings.
//!
//! `CacheManager` keeps the last fetched GL transactions as JSON in the
//! cache directory. Cached data is considered stale after 60 minutes.

pub mod manager;

pub use manager::{CacheManager, CachedData};
