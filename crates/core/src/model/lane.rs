use ledger_feed_protocol::{ErrorInfo, FetchMode, FilterCriteria, LaneId, PageCursor};
use serde::{Deserialize, Serialize};

/// Identity of one issued fetch. Unique for the lifetime of a controller,
/// so a result can always be matched to the exact request that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TicketId(pub u64);

/// The fetch currently outstanding for a lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InFlight {
    pub ticket: TicketId,
    pub mode: FetchMode,
    /// Filter generation the request was built from.
    pub generation: u64,
}

/// Where a lane is in its load cycle, derived from its state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LanePhase {
    /// Nothing fetched yet for the current filter.
    Empty,
    Loading(FetchMode),
    /// Records present and more pages available.
    Populated,
    /// Last page reached for the current filter.
    Exhausted,
    /// The last fetch failed; any earlier records are still held.
    Error,
}

/// One independent record stream.
///
/// Holds the records, cursor, filter and flags for a single lane and exposes
/// total state transitions. It knows nothing about other lanes or about how
/// records are fetched.
#[derive(Debug, Clone)]
pub struct Lane<R> {
    id: LaneId,
    records: Vec<R>,
    cursor: PageCursor,
    filter: FilterCriteria,
    in_flight: Option<InFlight>,
    has_loaded_once: bool,
    total_count: u64,
    error: Option<ErrorInfo>,
    generation: u64,
}

impl<R> Lane<R> {
    pub fn new(id: LaneId) -> Self {
        Self {
            id,
            records: Vec::new(),
            cursor: PageCursor::initial(),
            filter: FilterCriteria::default(),
            in_flight: None,
            has_loaded_once: false,
            total_count: 0,
            error: None,
            generation: 0,
        }
    }

    pub fn id(&self) -> &LaneId {
        &self.id
    }

    pub fn records(&self) -> &[R] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn cursor(&self) -> PageCursor {
        self.cursor
    }

    pub fn filter(&self) -> &FilterCriteria {
        &self.filter
    }

    pub fn is_loading(&self) -> bool {
        self.in_flight.is_some()
    }

    pub fn in_flight(&self) -> Option<InFlight> {
        self.in_flight
    }

    pub fn has_loaded_once(&self) -> bool {
        self.has_loaded_once
    }

    pub fn total_count(&self) -> u64 {
        self.total_count
    }

    pub fn error(&self) -> Option<&ErrorInfo> {
        self.error.as_ref()
    }

    /// Bumped every time the filter is committed or the lane is reset.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn phase(&self) -> LanePhase {
        if let Some(flight) = self.in_flight {
            LanePhase::Loading(flight.mode)
        } else if self.error.is_some() {
            LanePhase::Error
        } else if !self.has_loaded_once {
            LanePhase::Empty
        } else if self.cursor.is_exhausted() {
            LanePhase::Exhausted
        } else {
            LanePhase::Populated
        }
    }

    /// Result of a filtering fetch: drop everything held and start over from
    /// `records`.
    pub fn replace_records(&mut self, records: Vec<R>, cursor: PageCursor, total_count: u64) {
        self.records = records;
        self.cursor = cursor;
        self.total_count = total_count;
    }

    /// Result of a load-more fetch: extend in arrival order.
    pub fn append_records(&mut self, more: Vec<R>, cursor: PageCursor) {
        self.records.extend(more);
        self.cursor = cursor;
    }

    pub fn set_total_count(&mut self, total: u64) {
        self.total_count = total;
    }

    /// `isLoading = true`, remembering which request holds the flag.
    pub fn mark_loading(&mut self, flight: InFlight) {
        self.in_flight = Some(flight);
    }

    /// `isLoading = false`.
    pub fn clear_loading(&mut self) {
        self.in_flight = None;
    }

    pub fn mark_error(&mut self, info: ErrorInfo) {
        self.error = Some(info);
    }

    pub fn clear_error(&mut self) {
        self.error = None;
    }

    pub fn mark_loaded_once(&mut self) {
        self.has_loaded_once = true;
    }

    /// Commit a new filter snapshot. Any fetch still in flight was built from
    /// the old filter and will be treated as stale when it lands.
    pub fn set_filter(&mut self, filter: FilterCriteria) {
        self.filter = filter;
        self.generation += 1;
    }

    /// Back to `Empty` for the current filter. The in-flight marker is kept
    /// so the one-request-per-lane guard still holds until it lands.
    pub fn reset(&mut self) {
        self.records.clear();
        self.cursor = PageCursor::initial();
        self.has_loaded_once = false;
        self.total_count = 0;
        self.error = None;
        self.generation += 1;
    }
}

impl<R: Clone> Lane<R> {
    pub fn snapshot(&self) -> LaneState<R> {
        LaneState {
            id: self.id.clone(),
            records: self.records.clone(),
            cursor: self.cursor,
            filter: self.filter.clone(),
            is_loading: self.is_loading(),
            has_loaded_once: self.has_loaded_once,
            total_count: self.total_count,
            error: self.error.clone(),
            phase: self.phase(),
        }
    }
}

/// Read-only copy of a lane handed to the UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaneState<R> {
    pub id: LaneId,
    pub records: Vec<R>,
    pub cursor: PageCursor,
    pub filter: FilterCriteria,
    pub is_loading: bool,
    pub has_loaded_once: bool,
    pub total_count: u64,
    pub error: Option<ErrorInfo>,
    pub phase: LanePhase,
}
