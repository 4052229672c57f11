use std::path::PathBuf;

use tracing::{info, warn};

use crate::config::TrackerConfig;
use crate::error::TrackerError;
use crate::explorer::ExplorerApi;
use crate::export;
use crate::fetcher::CategoryFetcher;
use crate::models::{self, Category, RawRecord};
use crate::normalizer;
use crate::spill;

/// Per-run accumulation of fetched records.
#[derive(Debug)]
pub struct TrackerState {
    address: String,
    record_count: usize,
    records: Vec<RawRecord>,
    uses_spill_mode: bool,
}

impl TrackerState {
    pub fn new(address: String) -> Self {
        Self { address, record_count: 0, records: Vec::new(), uses_spill_mode: false }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn record_count(&self) -> usize {
        self.record_count
    }

    pub fn uses_spill_mode(&self) -> bool {
        self.uses_spill_mode
    }

    /// Append one category's records. Exceeding `threshold` switches the run
    /// to spill mode for good.
    pub fn absorb(&mut self, category: Category, records: Vec<RawRecord>, threshold: usize) {
        self.record_count += records.len();
        self.records.extend(records);
        if !self.uses_spill_mode && self.record_count > threshold {
            info!(%category, records = self.record_count, threshold, "large history, switching to spill mode");
            self.uses_spill_mode = true;
        }
    }

    pub fn into_records(self) -> Vec<RawRecord> {
        self.records
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Nothing was fetched in any category; no file is written.
    Empty { address: String },
    Exported { path: PathBuf, rows: usize, fetched: usize, spilled: bool },
}

/// Drives the fetch -> normalize -> export pipeline for one address.
pub struct HistoryAggregator<A> {
    api: A,
    config: TrackerConfig,
}

impl<A: ExplorerApi> HistoryAggregator<A> {
    pub fn new(api: A, config: TrackerConfig) -> Self {
        Self { api, config }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub async fn run(&self, address: &str) -> Result<RunOutcome, TrackerError> {
        self.config.validate()?;
        let address = models::checksum_address(address)?;
        let state = self.fetch_all(&address).await;

        if state.record_count() == 0 {
            info!(%address, "no transactions found, nothing to export");
            return Ok(RunOutcome::Empty { address });
        }
        info!(%address, records = state.record_count(), spill = state.uses_spill_mode(), "fetch complete");

        let path = export::output_path(&self.config.output_dir, &address);
        let fetched = state.record_count();
        let spilled = state.uses_spill_mode();
        let rows = if spilled {
            spill::spill_and_merge(
                state.into_records(),
                self.config.batch_size,
                &self.config.temp_dir,
                &address,
                &path,
            )?
        } else {
            let mut rows = normalizer::normalize_batch(&state.into_records());
            models::sort_newest_first(&mut rows);
            export::write_csv(&path, rows)
                .map_err(|source| TrackerError::Export { path: path.clone(), source })?
        };

        if rows < fetched {
            warn!(fetched, rows, "some records could not be normalized and were skipped");
        }
        info!(path = %path.display(), rows, "export complete");
        Ok(RunOutcome::Exported { path, rows, fetched, spilled })
    }

    /// Fetch every configured category in order. Processing starts only after
    /// the last category is in.
    async fn fetch_all(&self, address: &str) -> TrackerState {
        let fetcher = CategoryFetcher::new(&self.api, &self.config);
        let mut state = TrackerState::new(address.to_string());
        for &category in &self.config.categories {
            let records = fetcher.fetch_category(state.address(), category).await;
            state.absorb(category, records, self.config.spill_threshold);
        }
        state
    }
}
