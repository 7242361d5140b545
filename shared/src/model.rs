use crate::catalog::CatalogConfig;
use crate::config::Config;
use crate::event::RecordUid;
use crate::pagination::PaginationState;
use crate::query_cache::QueryCache;
use crate::record::{Page, Record};
use crate::report_store::ReportStore;
use crate::AppError;

/// Core state. Mutated only by `App::update`.
pub struct Model {
    pub catalog: CatalogConfig,
    pub pagination: PaginationState,
    pub pages: QueryCache<u32, Page>,
    pub records: QueryCache<RecordUid, Record>,
    /// Title filter; survives page navigation.
    pub filter: String,
    pub reports: ReportStore,
    pub selected: Option<RecordUid>,
    /// Last failed user action (reports, validation). Page and detail fetch
    /// errors are tracked per key in the caches instead.
    pub active_error: Option<AppError>,
}

impl Model {
    pub fn from_config(config: &Config) -> Self {
        Self {
            catalog: config.catalog.clone(),
            pagination: PaginationState::new(
                config.pagination.page_size,
                config.pagination.max_visible_pages,
            ),
            pages: QueryCache::new(config.cache.page_capacity()).keep_previous_data(),
            records: QueryCache::new(config.cache.record_capacity()),
            filter: String::new(),
            reports: ReportStore::new(),
            selected: None,
            active_error: None,
        }
    }

    /// Rebuilds everything derived from `config`. Cached catalog data is
    /// dropped; reports, the filter and the selection are kept.
    pub fn reconfigure(&mut self, config: &Config) {
        let fresh = Self::from_config(config);
        self.catalog = fresh.catalog;
        self.pagination = fresh.pagination;
        self.pages = fresh.pages;
        self.records = fresh.records;
    }

    pub fn current_page(&self) -> u32 {
        self.pagination.current_page()
    }
}

impl Default for Model {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl std::fmt::Debug for Model {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Model")
            .field("catalog", &self.catalog.list_url)
            .field("pagination", &self.pagination)
            .field("cached_pages", &self.pages.len())
            .field("cached_records", &self.records.len())
            .field("filter", &self.filter)
            .field("reports", &self.reports.len())
            .field("selected", &self.selected)
            .field("active_error", &self.active_error)
            .finish()
    }
}
