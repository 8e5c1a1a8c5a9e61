use std::sync::atomic::{AtomicU64, Ordering};

use ledger_feed_protocol::{ErrorInfo, FetchMode, PageBatch, PageCursor, PageRequest};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::SourceError;
use crate::model::{InFlight, Lane, TicketId};

/// Why a fetch request did not go out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    /// A fetch for this lane is already in flight.
    AlreadyLoading,
    /// Append requested but the cursor says there is nothing left.
    Exhausted,
    /// Retry requested on a lane whose last fetch did not fail.
    NothingToRetry,
    /// Tab already loaded; selecting it again does not refetch.
    AlreadyActivated,
    /// Scroll position not close enough to the end, or trigger detached.
    NotNearEnd,
    /// The lane is not the visible tab; it loads on its next selection.
    TabInactive,
}

/// Why a completed fetch was dropped instead of merged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiscardReason {
    /// The filter changed (or the lane was reset) while the request was out.
    Stale,
    /// The lane is gone or no longer waiting on this request.
    LaneGone,
}

/// What happened to one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FetchOutcome {
    Skipped(SkipReason),
    Merged {
        mode: FetchMode,
        received: usize,
        has_more: bool,
    },
    Failed(ErrorInfo),
    Discarded(DiscardReason),
    /// A Replace will go out as soon as the request in flight lands.
    Queued,
}

impl FetchOutcome {
    /// Whether a request was actually sent to the source.
    pub fn was_issued(&self) -> bool {
        !matches!(self, FetchOutcome::Skipped(_) | FetchOutcome::Queued)
    }
}

/// A request that passed the guard and now owns its lane's loading flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchTicket {
    pub id: TicketId,
    pub mode: FetchMode,
    pub generation: u64,
    pub request: PageRequest,
}

/// Sole authority over starting fetches and merging their results.
///
/// `begin` sets the lane's loading flag before anything is sent; `complete`
/// clears it only after the merge or the error has been recorded. At most
/// one request per lane is ever outstanding.
#[derive(Debug)]
pub struct FetchCoordinator {
    page_size: u32,
    next_ticket: AtomicU64,
}

impl FetchCoordinator {
    pub fn new(page_size: u32) -> Self {
        Self {
            page_size: page_size.max(1),
            next_ticket: AtomicU64::new(1),
        }
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Check the guard and, if it holds, claim the lane for a new request.
    pub fn begin<R>(&self, lane: &mut Lane<R>, mode: FetchMode) -> Result<FetchTicket, SkipReason> {
        if lane.is_loading() {
            debug!(lane = %lane.id(), %mode, "fetch skipped: already loading");
            return Err(SkipReason::AlreadyLoading);
        }
        if mode == FetchMode::Append && lane.cursor().is_exhausted() {
            debug!(lane = %lane.id(), "fetch skipped: no more pages");
            return Err(SkipReason::Exhausted);
        }

        let page = match mode {
            FetchMode::Replace => 1,
            FetchMode::Append => lane.cursor().next_page,
        };
        let id = TicketId(self.next_ticket.fetch_add(1, Ordering::Relaxed));
        let generation = lane.generation();

        lane.mark_loading(InFlight {
            ticket: id,
            mode,
            generation,
        });
        lane.clear_error();

        info!(lane = %lane.id(), %mode, page, page_size = self.page_size, "fetch started");
        Ok(FetchTicket {
            id,
            mode,
            generation,
            request: PageRequest {
                lane: lane.id().clone(),
                filter: lane.filter().clone(),
                page,
                page_size: self.page_size,
            },
        })
    }

    /// Merge a finished request back into its lane.
    ///
    /// Failures leave records and cursor untouched. A result whose ticket no
    /// longer owns the lane is dropped without touching anything; a result
    /// built from an outdated filter only releases the loading flag.
    pub fn complete<R>(
        &self,
        lane: &mut Lane<R>,
        ticket: &FetchTicket,
        result: Result<PageBatch<R>, SourceError>,
    ) -> FetchOutcome {
        let Some(flight) = lane.in_flight().filter(|f| f.ticket == ticket.id) else {
            debug!(lane = %lane.id(), ticket = ticket.id.0, "result dropped: lane not waiting on it");
            return FetchOutcome::Discarded(DiscardReason::LaneGone);
        };
        if flight.generation != lane.generation() {
            lane.clear_loading();
            debug!(lane = %lane.id(), mode = %ticket.mode, "result dropped: filter changed while loading");
            return FetchOutcome::Discarded(DiscardReason::Stale);
        }

        match result {
            Ok(batch) => {
                let received = batch.len();
                let has_more = derive_has_more(received, batch.has_more, ticket.request.page_size);
                let cursor = PageCursor::after(ticket.request.page, has_more);
                match ticket.mode {
                    FetchMode::Replace => {
                        let total = batch.total_count.unwrap_or(received as u64);
                        lane.replace_records(batch.records, cursor, total);
                    }
                    FetchMode::Append => {
                        let total_hint = batch.total_count;
                        lane.append_records(batch.records, cursor);
                        let held = lane.len() as u64;
                        lane.set_total_count(total_hint.unwrap_or(lane.total_count()).max(held));
                    }
                }
                lane.mark_loaded_once();
                lane.clear_loading();
                info!(
                    lane = %lane.id(),
                    mode = %ticket.mode,
                    page = ticket.request.page,
                    records = received,
                    held = lane.len(),
                    has_more,
                    "fetch merged"
                );
                FetchOutcome::Merged {
                    mode: ticket.mode,
                    received,
                    has_more,
                }
            }
            Err(err) => {
                let info = ErrorInfo::from(&err);
                warn!(lane = %lane.id(), mode = %ticket.mode, page = ticket.request.page, error = %err, "fetch failed");
                lane.mark_error(info.clone());
                lane.clear_loading();
                FetchOutcome::Failed(info)
            }
        }
    }
}

/// Decide whether more pages follow a batch.
///
/// An explicit `false` or an empty batch ends the stream. Without an explicit
/// signal a short batch (fewer than `page_size` records) does too.
pub fn derive_has_more(received: usize, explicit: Option<bool>, page_size: u32) -> bool {
    if received == 0 {
        return false;
    }
    match explicit {
        Some(flag) => flag,
        None => received >= page_size as usize,
    }
}
