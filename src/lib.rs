//! Contract feed: loads collection contracts from the backend, merges the
//! auxiliary tables into one record per contract, and drives filtering,
//! navigation, email enrichment and export over the result.

pub mod cli;
pub mod cursor;
pub mod db;
pub mod emails;
pub mod error;
pub mod export;
pub mod filter;
pub mod helpers;
pub mod prefs;
pub mod query;
pub mod state;
pub mod synthesis;
pub mod types;
pub mod worker;

pub use error::FeedError;
pub use state::FeedSession;
pub use types::{Config, ContractRecord, LoadRequest};
