//! Export an Ethereum address's transaction history from an Etherscan-style
//! explorer into a single CSV file.

pub mod aggregator;
pub mod config;
pub mod error;
pub mod explorer;
pub mod export;
pub mod fetcher;
pub mod models;
pub mod normalizer;
pub mod retry;
pub mod spill;

pub use aggregator::{HistoryAggregator, RunOutcome, TrackerState};
pub use config::TrackerConfig;
pub use error::{ExplorerError, NormalizationError, TrackerError};
pub use explorer::{EtherscanClient, ExplorerApi, PageQuery};
pub use models::{Category, NormalizedRow, RawRecord};
