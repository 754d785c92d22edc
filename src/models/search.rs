use serde::{Deserialize, Serialize};

use super::track::Track;

/// Catalog artist; tracks refer to it through `artist_ids`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artist {
    pub artist_id: i32,
    pub name: String,
}

/// One page of catalog search results
///
/// `total` counts every distinct match, not only the ones on this page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchPage {
    pub tracks: Vec<Track>,
    pub total: usize,
    pub has_more: bool,
    pub offset: usize,
    pub limit: usize,
}

impl SearchPage {
    pub fn new(tracks: Vec<Track>, total: usize, offset: usize, limit: usize) -> Self {
        Self {
            tracks,
            total,
            has_more: offset.saturating_add(limit) < total,
            offset,
            limit,
        }
    }

    pub fn empty(offset: usize, limit: usize) -> Self {
        Self::new(Vec::new(), 0, offset, limit)
    }
}

/// `ILIKE` pattern matching `query` anywhere, with wildcards in `query` taken literally
pub fn like_pattern(query: &str) -> String {
    let mut pattern = String::with_capacity(query.len() + 2);
    pattern.push('%');
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}
