use serde::{Deserialize, Serialize};

use crate::{FilterCriteria, LaneId};

/// Page size used when nothing else is configured.
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// A lane's bookmark: which page to ask for next and whether there is one.
///
/// Once `has_more` is false no further page is requested until the lane is
/// reset by a new filter or a reload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageCursor {
    pub next_page: u32,
    pub has_more: bool,
}

impl PageCursor {
    /// Cursor of a lane that has not fetched anything yet.
    pub fn initial() -> Self {
        Self {
            next_page: 1,
            has_more: true,
        }
    }

    /// Cursor after page `page` has been merged.
    pub fn after(page: u32, has_more: bool) -> Self {
        Self {
            next_page: page.saturating_add(1),
            has_more,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        !self.has_more
    }
}

impl Default for PageCursor {
    fn default() -> Self {
        Self::initial()
    }
}

/// How a fetched batch is merged back into its lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchMode {
    /// Discard current records; always requests page 1.
    Replace,
    /// Concatenate onto current records; requests the cursor's next page.
    Append,
}

impl std::fmt::Display for FetchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FetchMode::Replace => f.write_str("replace"),
            FetchMode::Append => f.write_str("append"),
        }
    }
}

/// Everything a record source needs to produce one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    pub lane: LaneId,
    pub filter: FilterCriteria,
    /// 1-based page index.
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    /// Zero-based index of the first record on this page.
    pub fn offset(&self) -> usize {
        self.page.saturating_sub(1) as usize * self.page_size as usize
    }
}

/// One page as returned by a record source.
///
/// `has_more` and `total_count` are optional because not every backend
/// reports them; the engine falls back to comparing the batch length
/// against the requested page size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageBatch<R> {
    pub records: Vec<R>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_more: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_count: Option<u64>,
}

impl<R> PageBatch<R> {
    pub fn new(records: Vec<R>) -> Self {
        Self {
            records,
            has_more: None,
            total_count: None,
        }
    }

    pub fn with_has_more(mut self, has_more: bool) -> Self {
        self.has_more = Some(has_more);
        self
    }

    pub fn with_total_count(mut self, total: u64) -> Self {
        self.total_count = Some(total);
        self
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
