use std::collections::HashMap;
use std::time::Duration;

use chrono::NaiveDate;
use ledger_feed_protocol::{FilterCriteria, LaneId, PageBatch, PageRequest};
use serde_json::Value;

use super::RecordSource;
use super::normalize::normalize_payload;
use crate::error::SourceError;

/// Lets the in-memory source apply a lane filter to a record.
pub trait FilterTarget {
    /// Date the record is filed under, if it has one. Records without a date
    /// are excluded as soon as the filter carries a date bound.
    fn record_date(&self) -> Option<NaiveDate>;

    /// Case-insensitive match of the record's text fields against an
    /// already lowercased search term.
    fn matches_search(&self, term_lower: &str) -> bool;

    fn matches(&self, filter: &FilterCriteria) -> bool {
        let date_ok = if filter.start_date.is_none() && filter.end_date.is_none() {
            true
        } else {
            self.record_date()
                .is_some_and(|date| filter.contains_date(date))
        };
        date_ok
            && filter
                .search_term()
                .is_none_or(|term| self.matches_search(&term.to_lowercase()))
    }
}

/// Field consulted for the record date of JSON records.
const DATE_FIELDS: &[&str] = &["date", "createdAt", "created_at", "transactionDate"];

impl FilterTarget for Value {
    fn record_date(&self) -> Option<NaiveDate> {
        let raw = DATE_FIELDS
            .iter()
            .find_map(|field| self.get(*field).and_then(Value::as_str))?;
        // Accept full timestamps by looking at the date prefix only.
        NaiveDate::parse_from_str(raw.get(..10)?, "%Y-%m-%d").ok()
    }

    fn matches_search(&self, term_lower: &str) -> bool {
        match self {
            Value::String(s) => s.to_lowercase().contains(term_lower),
            Value::Array(items) => items.iter().any(|v| v.matches_search(term_lower)),
            Value::Object(fields) => fields.values().any(|v| v.matches_search(term_lower)),
            Value::Null | Value::Bool(_) | Value::Number(_) => false,
        }
    }
}

/// Deterministic record source serving pages out of per-lane vectors.
///
/// Used by tests and by the terminal demo in place of a remote API. Filtering
/// happens "server-side" here, so the engine sees exactly what a paginated
/// backend would send.
#[derive(Debug, Clone)]
pub struct MemorySource<R> {
    lanes: HashMap<LaneId, Vec<R>>,
    latency: Option<Duration>,
    report_has_more: bool,
}

impl<R> Default for MemorySource<R> {
    fn default() -> Self {
        Self {
            lanes: HashMap::new(),
            latency: None,
            report_has_more: true,
        }
    }
}

impl<R> MemorySource<R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lane(mut self, lane: impl Into<LaneId>, records: Vec<R>) -> Self {
        self.lanes.insert(lane.into(), records);
        self
    }

    /// Sleep this long before answering each request.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// When false, pages carry no `has_more`/`total_count` and the engine has
    /// to infer exhaustion from the batch size.
    pub fn with_paging_signals(mut self, enabled: bool) -> Self {
        self.report_has_more = enabled;
        self
    }

    pub fn lane_len(&self, lane: &str) -> usize {
        self.lanes.get(lane).map_or(0, Vec::len)
    }
}

impl MemorySource<Value> {
    /// Build from a JSON object mapping lane names to page payloads, e.g.
    /// `{"customers": {"records": [...]}, "vendors": [...]}`.
    pub fn from_fixture(fixture: &Value) -> Result<Self, SourceError> {
        let Value::Object(lanes) = fixture else {
            return Err(SourceError::malformed(
                "fixture must be an object keyed by lane name",
            ));
        };
        let mut source = Self::new();
        for (name, payload) in lanes {
            let batch = normalize_payload(payload)
                .map_err(|e| SourceError::malformed(format!("lane '{name}': {e}")))?;
            source.lanes.insert(LaneId::from(name.as_str()), batch.records);
        }
        Ok(source)
    }
}

#[async_trait::async_trait]
impl<R> RecordSource for MemorySource<R>
where
    R: FilterTarget + Clone + Send + Sync,
{
    type Record = R;

    async fn fetch_page(&self, request: &PageRequest) -> Result<PageBatch<R>, SourceError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let Some(records) = self.lanes.get(&request.lane) else {
            return Err(SourceError::Server {
                status: 404,
                message: format!("no such collection '{}'", request.lane),
            });
        };
        if request.page == 0 || request.page_size == 0 {
            return Err(SourceError::Server {
                status: 400,
                message: format!(
                    "invalid page {} / size {}",
                    request.page, request.page_size
                ),
            });
        }

        let matching: Vec<&R> = records
            .iter()
            .filter(|r| r.matches(&request.filter))
            .collect();
        let total = matching.len();
        let page: Vec<R> = matching
            .into_iter()
            .skip(request.offset())
            .take(request.page_size as usize)
            .cloned()
            .collect();

        let batch = PageBatch::new(page);
        if !self.report_has_more {
            return Ok(batch);
        }
        let end = request.offset() + batch.len();
        Ok(batch
            .with_has_more(end < total)
            .with_total_count(total as u64))
    }
}
