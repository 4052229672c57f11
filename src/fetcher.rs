use tracing::{debug, info, warn};

use crate::config::TrackerConfig;
use crate::explorer::{ExplorerApi, PageQuery};
use crate::models::{Category, RawRecord, RecordFields};

/// Pulls every raw record of one category for an address.
pub struct CategoryFetcher<'a, A: ?Sized> {
    api: &'a A,
    config: &'a TrackerConfig,
}

impl<'a, A: ExplorerApi + ?Sized> CategoryFetcher<'a, A> {
    pub fn new(api: &'a A, config: &'a TrackerConfig) -> Self {
        Self { api, config }
    }

    /// Page through the category until a short or empty page. Once
    /// `page * page_size` reaches the explorer's ceiling the query is
    /// re-windowed on block height (`startblock = highest + 1`, page 1) after
    /// every full page.
    pub async fn fetch_category(&self, address: &str, category: Category) -> Vec<RawRecord> {
        let page_size = self.config.page_size;
        let mut query = PageQuery::first_page(category.action(), address, self.config);
        let mut records = Vec::new();
        let mut block_cursor = false;

        loop {
            let page = self.fetch_page(&query, category).await;
            if page.is_empty() {
                break;
            }

            let len = page.len();
            let highest_block = page
                .iter()
                .filter_map(|fields| fields.get("blockNumber")?.trim().parse::<u64>().ok())
                .max();
            if let Some(highest) = highest_block.filter(|_| block_cursor) {
                if highest < query.start_block {
                    warn!(%category, highest, start_block = query.start_block, "explorer returned a page below the block window, stopping");
                    break;
                }
            }
            records.extend(page.into_iter().map(|fields| self.tag(category, fields)));
            debug!(%category, page = query.page, start_block = query.start_block, fetched = records.len(), "page fetched");

            if len < page_size {
                break;
            }

            if block_cursor || query.page * page_size >= self.config.page_ceiling {
                let Some(highest) = highest_block else {
                    warn!(%category, "page has no block numbers, cannot continue past the page ceiling");
                    break;
                };
                if !block_cursor {
                    info!(%category, fetched = records.len(), next_block = highest + 1, "page ceiling reached, switching to block cursor");
                    block_cursor = true;
                }
                if highest >= query.end_block {
                    break;
                }
                query.start_block = highest + 1;
                query.page = 1;
            } else {
                query.page += 1;
            }
        }

        info!(%category, fetched = records.len(), "category complete");
        records
    }

    async fn fetch_page(&self, query: &PageQuery, category: Category) -> Vec<RecordFields> {
        match self.api.fetch_page(query).await {
            Ok(page) => page,
            Err(e) => {
                warn!(%category, page = query.page, start_block = query.start_block, error = %e, "giving up on page, continuing with partial data");
                Vec::new()
            }
        }
    }

    fn tag(&self, category: Category, fields: RecordFields) -> RawRecord {
        let category = if category == Category::NativeTransfer && self.config.classify_native {
            Category::classify_native(&fields)
        } else {
            category
        };
        RawRecord::new(category, fields)
    }
}
