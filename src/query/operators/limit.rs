//! Offset/limit pagination
//!
//! Slices an ordered record set into one page plus a continuation cursor.
//! The cursor is the next offset rendered as a string; it is not opaque
//! and carries no integrity protection.

use crate::types::Record;

/// One page of records
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// Records in `[offset, offset + limit)`
    pub data: Vec<Record>,
    /// Whether records remain after this page
    pub has_more: bool,
    /// Offset of the next page, present iff `has_more`
    pub next_cursor: Option<String>,
}

/// Slice `records` to `[offset, offset + limit)`
///
/// An offset at or past the end yields an empty page.
pub fn paginate(records: Vec<Record>, offset: usize, limit: usize) -> Page {
    let total = records.len();
    let end = offset.saturating_add(limit);
    let has_more = end < total;

    let data = records
        .into_iter()
        .skip(offset)
        .take(limit)
        .collect();

    Page {
        data,
        has_more,
        next_cursor: has_more.then(|| end.to_string()),
    }
}
