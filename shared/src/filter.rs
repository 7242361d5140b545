//! Title filter over the records of the current page.

use crate::record::Record;

/// Case-insensitive substring match on `title`, order preserving.
///
/// The query is used as typed; surrounding whitespace is significant.
pub fn filter_records(items: &[Record], query: &str) -> Vec<Record> {
    if query.is_empty() {
        return items.to_vec();
    }
    let needle = query.to_lowercase();
    items
        .iter()
        .filter(|r| r.title.to_lowercase().contains(&needle))
        .cloned()
        .collect()
}
