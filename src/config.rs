use std::path::PathBuf;
use std::time::Duration;

use crate::error::TrackerError;
use crate::models::Category;

pub const DEFAULT_API_URL: &str = "https://api.etherscan.io/api";
pub const DEFAULT_PAGE_SIZE: usize = 1000;
/// The explorer refuses `page * offset` beyond this many records.
pub const DEFAULT_PAGE_CEILING: usize = 10_000;
pub const DEFAULT_SPILL_THRESHOLD: usize = 10_000;
pub const DEFAULT_BATCH_SIZE: usize = 1000;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_RATE_LIMIT_DELAY_MS: u64 = 200;
pub const DEFAULT_RATE_LIMIT_DELAY: Duration = Duration::from_millis(DEFAULT_RATE_LIMIT_DELAY_MS);
pub const DEFAULT_END_BLOCK: u64 = 99_999_999;

/// Everything a run needs, handed to each component at construction.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub api_url: String,
    pub api_key: String,
    pub page_size: usize,
    pub page_ceiling: usize,
    pub end_block: u64,
    pub max_retries: u32,
    /// Minimum spacing between any two outbound requests.
    pub rate_limit_delay: Duration,
    /// Delay before the first retry; doubles on each further attempt.
    pub retry_backoff: Duration,
    pub request_timeout: Duration,
    pub batch_size: usize,
    pub spill_threshold: usize,
    pub output_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub categories: Vec<Category>,
    /// Split `txlist` entries into transfers, contract calls and failures.
    pub classify_native: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_key: String::new(),
            page_size: DEFAULT_PAGE_SIZE,
            page_ceiling: DEFAULT_PAGE_CEILING,
            end_block: DEFAULT_END_BLOCK,
            max_retries: DEFAULT_MAX_RETRIES,
            rate_limit_delay: DEFAULT_RATE_LIMIT_DELAY,
            retry_backoff: DEFAULT_RATE_LIMIT_DELAY * 2,
            request_timeout: Duration::from_secs(30),
            batch_size: DEFAULT_BATCH_SIZE,
            spill_threshold: DEFAULT_SPILL_THRESHOLD,
            output_dir: PathBuf::from("data/output"),
            temp_dir: PathBuf::from("data/temp"),
            categories: Category::DEFAULT_RUN.to_vec(),
            classify_native: false,
        }
    }
}

impl TrackerConfig {
    /// Wire in ERC-1155 transfers and native-feed classification.
    pub fn with_all_categories(mut self) -> Self {
        self.categories = Category::EXTENDED_RUN.to_vec();
        self.classify_native = true;
        self
    }

    pub fn validate(&self) -> Result<(), TrackerError> {
        if self.page_size == 0 {
            return Err(TrackerError::Config("page size must be positive".into()));
        }
        if self.page_ceiling < self.page_size {
            return Err(TrackerError::Config(format!(
                "page ceiling {} is smaller than one page of {}",
                self.page_ceiling, self.page_size
            )));
        }
        if self.batch_size == 0 {
            return Err(TrackerError::Config("batch size must be positive".into()));
        }
        if self.categories.is_empty() {
            return Err(TrackerError::Config("no categories selected".into()));
        }
        Ok(())
    }
}
