use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Server-side filter for one lane: an optional date window plus a free-text
/// search term.
///
/// Values are immutable snapshots. A lane swaps its whole criteria at once
/// when a filter is applied; it never edits one in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterCriteria {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub search: String,
}

impl FilterCriteria {
    pub fn search(term: impl Into<String>) -> Self {
        Self {
            search: term.into(),
            ..Self::default()
        }
    }

    pub fn date_range(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self {
            start_date: start,
            end_date: end,
            search: String::new(),
        }
    }

    /// No date bound and a blank search term.
    pub fn is_empty(&self) -> bool {
        self.start_date.is_none() && self.end_date.is_none() && self.search.trim().is_empty()
    }

    /// `start <= end` whenever both bounds are present.
    pub fn has_ordered_range(&self) -> bool {
        match (self.start_date, self.end_date) {
            (Some(start), Some(end)) => start <= end,
            _ => true,
        }
    }

    /// Search term with surrounding whitespace removed, `None` when blank.
    pub fn search_term(&self) -> Option<&str> {
        let term = self.search.trim();
        (!term.is_empty()).then_some(term)
    }

    /// Whether `date` falls inside the inclusive window.
    pub fn contains_date(&self, date: NaiveDate) -> bool {
        self.start_date.is_none_or(|start| date >= start)
            && self.end_date.is_none_or(|end| date <= end)
    }

    /// Produce a new snapshot with `patch` layered on top.
    pub fn patched(&self, patch: &FilterPatch) -> Self {
        Self {
            start_date: patch.start_date.unwrap_or(self.start_date),
            end_date: patch.end_date.unwrap_or(self.end_date),
            search: patch
                .search
                .clone()
                .unwrap_or_else(|| self.search.clone()),
        }
    }
}

/// A partial edit to a filter draft.
///
/// The outer `Option` says whether the field is touched at all; for the
/// dates the inner `Option` is the new value, so `Some(None)` clears a bound.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<Option<NaiveDate>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<Option<NaiveDate>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
}

impl FilterPatch {
    pub fn search(term: impl Into<String>) -> Self {
        Self {
            search: Some(term.into()),
            ..Self::default()
        }
    }

    pub fn start_date(date: Option<NaiveDate>) -> Self {
        Self {
            start_date: Some(date),
            ..Self::default()
        }
    }

    pub fn end_date(date: Option<NaiveDate>) -> Self {
        Self {
            end_date: Some(date),
            ..Self::default()
        }
    }

    pub fn clear_search() -> Self {
        Self::search(String::new())
    }

    pub fn clear_date_range() -> Self {
        Self {
            start_date: Some(None),
            end_date: Some(None),
            search: None,
        }
    }

    pub fn with_search(mut self, term: impl Into<String>) -> Self {
        self.search = Some(term.into());
        self
    }

    pub fn with_start_date(mut self, date: Option<NaiveDate>) -> Self {
        self.start_date = Some(date);
        self
    }

    pub fn with_end_date(mut self, date: Option<NaiveDate>) -> Self {
        self.end_date = Some(date);
        self
    }
}
