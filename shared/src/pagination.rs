//! Pagination controller.
//!
//! `current_page` is authoritative on the client; `total_pages` comes from
//! the server and is reconciled each time page data arrives.

use serde::{Deserialize, Serialize};
use tracing::info;

/// Navigation requested by the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NavIntent {
    First,
    Previous,
    Page(u32),
    Next,
    Last,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationState {
    current_page: u32,
    page_size: u32,
    total_pages: u32,
    max_visible: u32,
}

impl PaginationState {
    pub fn new(page_size: u32, max_visible: u32) -> Self {
        Self {
            current_page: 1,
            page_size: page_size.max(1),
            total_pages: 1,
            max_visible,
        }
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn total_pages(&self) -> u32 {
        self.total_pages
    }

    /// Provisional: not clamped to `total_pages` until data arrives.
    pub fn go_to_page(&mut self, n: u32) -> u32 {
        self.current_page = n.max(1);
        info!(page = self.current_page, "navigated");
        self.current_page
    }

    pub fn navigate(&mut self, intent: NavIntent) -> u32 {
        let target = match intent {
            NavIntent::First => 1,
            NavIntent::Previous => self.current_page.saturating_sub(1),
            NavIntent::Page(n) => n,
            NavIntent::Next => self.current_page.saturating_add(1).min(self.total_pages.max(self.current_page)),
            NavIntent::Last => self.total_pages,
        };
        self.go_to_page(target)
    }

    /// Reconciles with the server's total. Returns `true` when the current
    /// page was out of range and has been clamped.
    pub fn on_page_data_arrived(&mut self, total_count: u64) -> bool {
        self.total_pages = total_pages_for(total_count, self.page_size);
        if self.current_page > self.total_pages {
            info!(
                from = self.current_page,
                to = self.total_pages,
                "clamped out-of-range page"
            );
            self.current_page = self.total_pages;
            return true;
        }
        false
    }

    pub fn has_previous(&self) -> bool {
        self.current_page > 1
    }

    pub fn has_next(&self) -> bool {
        self.current_page < self.total_pages
    }

    pub fn visible_window(&self) -> Vec<u32> {
        compute_visible_window(self.current_page, self.total_pages, self.max_visible)
    }
}

/// `ceil(total / page_size)`, never less than one.
pub fn total_pages_for(total_count: u64, page_size: u32) -> u32 {
    let size = u64::from(page_size.max(1));
    let pages = total_count.div_ceil(size).max(1);
    u32::try_from(pages).unwrap_or(u32::MAX)
}

/// Page buttons around `current`.
///
/// `start = max(current - max_visible / 2, 1)`,
/// `end = min(start + max_visible - 1, total)`. Near the end the window
/// shrinks instead of sliding back.
pub fn compute_visible_window(current: u32, total: u32, max_visible: u32) -> Vec<u32> {
    if max_visible == 0 || total == 0 {
        return Vec::new();
    }
    let start = current.saturating_sub(max_visible / 2).max(1);
    let end = start.saturating_add(max_visible - 1).min(total);
    (start..=end).collect()
}
