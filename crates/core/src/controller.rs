//! The public face of the engine.
//!
//! `FeedController` owns every lane, routes UI actions to the right one and
//! drives requests through the `FetchCoordinator`. All lane state sits behind
//! a single lock that is never held across an `.await`, so concurrent calls
//! see the same loading guard that interleaved UI callbacks would.

use std::collections::HashMap;

use ledger_feed_protocol::{FetchMode, FilterCriteria, FilterPatch, LaneId};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::activation::{Activation, LazyTabActivator};
use crate::config::{ConfigError, FeedConfig};
use crate::error::{FeedError, ValidationError};
use crate::fetch::{DiscardReason, FetchCoordinator, FetchOutcome, FetchTicket, SkipReason};
use crate::model::{Lane, LaneState, TicketId};
use crate::observer::{FeedEvent, Observers, SubscriptionId};
use crate::scroll::ScrollTrigger;
use crate::source::RecordSource;

/// A lane plus the controller-side bookkeeping around it.
#[derive(Debug)]
struct LaneSlot<R> {
    lane: Lane<R>,
    /// Filter being edited, not yet applied.
    draft: FilterCriteria,
    /// A Replace is owed as soon as the in-flight request lands.
    pending_replace: bool,
    /// Mode of the last request if it failed.
    last_failed: Option<FetchMode>,
}

impl<R> LaneSlot<R> {
    fn new(id: LaneId) -> Self {
        Self {
            lane: Lane::new(id),
            draft: FilterCriteria::default(),
            pending_replace: false,
            last_failed: None,
        }
    }

    /// Validate the draft and make it the lane's filter.
    fn commit_draft(&mut self) -> Result<(), FeedError> {
        if let (Some(start), Some(end)) = (self.draft.start_date, self.draft.end_date)
            && start > end
        {
            return Err(ValidationError::InvertedDateRange { start, end }.into());
        }
        self.lane.set_filter(self.draft.clone());
        self.last_failed = None;
        info!(lane = %self.lane.id(), filter = ?self.draft, "filter applied");
        Ok(())
    }
}

#[derive(Debug)]
struct FeedState<R> {
    lanes: HashMap<LaneId, LaneSlot<R>>,
    /// Lanes in display order.
    order: Vec<LaneId>,
    activator: LazyTabActivator,
}

/// What an action wants done once its lane is locked.
enum Plan {
    /// Issue `mode` now if the guard allows it.
    Fetch(FetchMode),
    /// Issue a Replace now, or right after the in-flight request lands.
    Replace,
    Skip { reason: SkipReason, changed: bool },
}

enum Start {
    Issued(FetchTicket),
    Done { outcome: FetchOutcome, changed: bool },
}

/// Multi-lane feed controller.
pub struct FeedController<S: RecordSource> {
    source: S,
    config: FeedConfig,
    coordinator: FetchCoordinator,
    state: Mutex<FeedState<S::Record>>,
    observers: Observers,
}

impl<S: RecordSource> FeedController<S> {
    /// One empty lane per configured id.
    ///
    /// Construction does no I/O, so the initial tab is not activated here:
    /// call `start` (or `select_tab`) once to issue its first Replace.
    pub fn new(source: S, config: FeedConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let lanes = config
            .lanes
            .iter()
            .map(|id| (id.clone(), LaneSlot::new(id.clone())))
            .collect();
        Ok(Self {
            coordinator: FetchCoordinator::new(config.page_size),
            state: Mutex::new(FeedState {
                lanes,
                order: config.lanes.clone(),
                activator: LazyTabActivator::new(),
            }),
            source,
            config,
            observers: Observers::new(),
        })
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn page_size(&self) -> u32 {
        self.coordinator.page_size()
    }

    // --- Change notification ---

    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&FeedEvent) + Send + Sync + 'static,
    {
        self.observers.subscribe(callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }

    // --- Read accessors ---

    pub fn lane_ids(&self) -> Vec<LaneId> {
        self.state.lock().order.clone()
    }

    pub fn active_tab(&self) -> Option<LaneId> {
        self.state.lock().activator.active().cloned()
    }

    pub fn activation(&self, id: &LaneId) -> Option<Activation> {
        let state = self.state.lock();
        state
            .lanes
            .contains_key(id)
            .then(|| state.activator.state(id))
    }

    /// Run `f` against a lane without copying its records.
    pub fn with_lane<T>(&self, id: &LaneId, f: impl FnOnce(&Lane<S::Record>) -> T) -> Option<T> {
        self.state.lock().lanes.get(id).map(|slot| f(&slot.lane))
    }

    pub fn filter_draft(&self, id: &LaneId) -> Option<FilterCriteria> {
        self.state.lock().lanes.get(id).map(|slot| slot.draft.clone())
    }

    /// A scroll trigger for `id` using the configured threshold.
    pub fn scroll_trigger(&self, id: &LaneId) -> Result<ScrollTrigger, FeedError> {
        if !self.state.lock().lanes.contains_key(id) {
            return Err(FeedError::UnknownLane(id.clone()));
        }
        Ok(ScrollTrigger::new(id.clone(), self.config.scroll_threshold))
    }

    // --- Actions ---

    /// Activate the configured initial tab.
    pub async fn start(&self) -> Result<FetchOutcome, FeedError> {
        let initial = self
            .config
            .initial_tab()
            .cloned()
            .or_else(|| self.state.lock().order.first().cloned());
        match initial {
            Some(id) => self.select_tab(&id).await,
            None => Ok(FetchOutcome::Skipped(SkipReason::TabInactive)),
        }
    }

    /// Show `id`. Its first Replace goes out on first selection only.
    pub async fn select_tab(&self, id: &LaneId) -> Result<FetchOutcome, FeedError> {
        let (tab_changed, needs_load) = {
            let mut state = self.state.lock();
            if !state.lanes.contains_key(id) {
                return Err(FeedError::UnknownLane(id.clone()));
            }
            let changed = !state.activator.is_active(id);
            (changed, state.activator.select(id))
        };
        if tab_changed {
            info!(lane = %id, "tab selected");
            self.observers.notify(&FeedEvent::TabSelected(id.clone()));
        }
        if !needs_load {
            return Ok(FetchOutcome::Skipped(SkipReason::AlreadyActivated));
        }

        self.drive(id, |_, activator| {
            Ok(if activator.state(id) == Activation::NotLoaded {
                Plan::Fetch(FetchMode::Replace)
            } else {
                Plan::Skip {
                    reason: SkipReason::AlreadyActivated,
                    changed: false,
                }
            })
        })
        .await
    }

    /// Edit the pending filter. Nothing is fetched.
    pub fn update_filter_draft(
        &self,
        id: &LaneId,
        patch: &FilterPatch,
    ) -> Result<FilterCriteria, FeedError> {
        let mut state = self.state.lock();
        let slot = state
            .lanes
            .get_mut(id)
            .ok_or_else(|| FeedError::UnknownLane(id.clone()))?;
        slot.draft = slot.draft.patched(patch);
        Ok(slot.draft.clone())
    }

    /// Commit the draft and reload the lane from page 1.
    ///
    /// An inverted date range is rejected before anything changes. If a
    /// request is already out, the Replace is queued behind it and the
    /// outdated result is dropped on arrival.
    pub async fn apply_filter(&self, id: &LaneId) -> Result<FetchOutcome, FeedError> {
        self.drive(id, |slot, _| {
            slot.commit_draft()?;
            Ok(Plan::Replace)
        })
        .await
    }

    pub async fn clear_search(&self, id: &LaneId) -> Result<FetchOutcome, FeedError> {
        self.patch_and_apply(id, &FilterPatch::clear_search()).await
    }

    pub async fn clear_date_range(&self, id: &LaneId) -> Result<FetchOutcome, FeedError> {
        self.patch_and_apply(id, &FilterPatch::clear_date_range())
            .await
    }

    async fn patch_and_apply(
        &self,
        id: &LaneId,
        patch: &FilterPatch,
    ) -> Result<FetchOutcome, FeedError> {
        self.drive(id, |slot, _| {
            slot.draft = slot.draft.patched(patch);
            slot.commit_draft()?;
            Ok(Plan::Replace)
        })
        .await
    }

    /// Fetch the next page, if there is one and nothing is in flight.
    pub async fn load_more(&self, id: &LaneId) -> Result<FetchOutcome, FeedError> {
        self.drive(id, |_, _| Ok(Plan::Fetch(FetchMode::Append)))
            .await
    }

    /// Re-issue the request that last failed on `id`.
    pub async fn retry(&self, id: &LaneId) -> Result<FetchOutcome, FeedError> {
        self.drive(id, |slot, _| {
            Ok(match slot.last_failed {
                Some(mode) if slot.lane.error().is_some() => Plan::Fetch(mode),
                _ => Plan::Skip {
                    reason: SkipReason::NothingToRetry,
                    changed: false,
                },
            })
        })
        .await
    }

    /// Clear the lane's error message. Returns whether there was one.
    pub fn dismiss_error(&self, id: &LaneId) -> Result<bool, FeedError> {
        let had_error = {
            let mut state = self.state.lock();
            let slot = state
                .lanes
                .get_mut(id)
                .ok_or_else(|| FeedError::UnknownLane(id.clone()))?;
            let had = slot.lane.error().is_some();
            slot.lane.clear_error();
            slot.last_failed = None;
            had
        };
        if had_error {
            self.observers.notify(&FeedEvent::LaneChanged(id.clone()));
        }
        Ok(had_error)
    }

    /// Drop the lane's records and start it over with its current filter.
    /// The active tab reloads immediately; any other tab reloads on its next
    /// selection.
    pub async fn reload(&self, id: &LaneId) -> Result<FetchOutcome, FeedError> {
        self.drive(id, |slot, activator| {
            slot.lane.reset();
            slot.last_failed = None;
            activator.reset(slot.lane.id());
            info!(lane = %slot.lane.id(), "lane reset");
            Ok(if activator.is_active(slot.lane.id()) {
                Plan::Replace
            } else {
                Plan::Skip {
                    reason: SkipReason::TabInactive,
                    changed: true,
                }
            })
        })
        .await
    }

    /// Add an empty lane. Returns false if it already exists.
    pub fn add_lane(&self, id: LaneId) -> bool {
        {
            let mut state = self.state.lock();
            if state.lanes.contains_key(&id) {
                return false;
            }
            state.lanes.insert(id.clone(), LaneSlot::new(id.clone()));
            state.order.push(id.clone());
        }
        info!(lane = %id, "lane added");
        self.observers.notify(&FeedEvent::LaneAdded(id));
        true
    }

    /// Remove a lane. A request still in flight for it completes, but its
    /// result is thrown away.
    pub fn remove_lane(&self, id: &LaneId) -> bool {
        {
            let mut state = self.state.lock();
            if state.lanes.remove(id).is_none() {
                return false;
            }
            state.order.retain(|lane| lane != id);
            state.activator.forget(id);
        }
        info!(lane = %id, "lane removed");
        self.observers.notify(&FeedEvent::LaneRemoved(id.clone()));
        true
    }

    // --- Request driver ---

    /// Lock the lane, let `prepare` decide what to do, and carry out the
    /// resulting request, including any Replace queued behind it.
    async fn drive<F>(&self, id: &LaneId, prepare: F) -> Result<FetchOutcome, FeedError>
    where
        F: FnOnce(&mut LaneSlot<S::Record>, &mut LazyTabActivator) -> Result<Plan, FeedError>,
    {
        let start = {
            let mut state = self.state.lock();
            let FeedState {
                lanes, activator, ..
            } = &mut *state;
            let slot = lanes
                .get_mut(id)
                .ok_or_else(|| FeedError::UnknownLane(id.clone()))?;
            match prepare(&mut *slot, &mut *activator)? {
                Plan::Skip { reason, changed } => Start::Done {
                    outcome: FetchOutcome::Skipped(reason),
                    changed,
                },
                Plan::Fetch(mode) => match self.begin(slot, activator, mode) {
                    Ok(ticket) => Start::Issued(ticket),
                    Err(reason) => Start::Done {
                        outcome: FetchOutcome::Skipped(reason),
                        changed: false,
                    },
                },
                Plan::Replace => match self.begin(slot, activator, FetchMode::Replace) {
                    Ok(ticket) => Start::Issued(ticket),
                    Err(_) => {
                        slot.pending_replace = true;
                        debug!(lane = %id, "replace queued behind in-flight request");
                        Start::Done {
                            outcome: FetchOutcome::Queued,
                            changed: true,
                        }
                    }
                },
            }
        };

        let mut ticket = match start {
            Start::Issued(ticket) => ticket,
            Start::Done { outcome, changed } => {
                if changed {
                    self.observers.notify(&FeedEvent::LaneChanged(id.clone()));
                }
                return Ok(outcome);
            }
        };
        let mut guard = AbandonGuard {
            feed: self,
            lane: id,
            ticket: Some((ticket.id, ticket.mode)),
        };
        self.observers.notify(&FeedEvent::LaneChanged(id.clone()));

        loop {
            let result = self.source.fetch_page(&ticket.request).await;

            let (outcome, follow_up) = {
                let mut state = self.state.lock();
                guard.ticket = None;
                let FeedState {
                    lanes, activator, ..
                } = &mut *state;
                let Some(slot) = lanes.get_mut(id) else {
                    debug!(lane = %id, "result dropped: lane removed");
                    return Ok(FetchOutcome::Discarded(DiscardReason::LaneGone));
                };
                let outcome = self.coordinator.complete(&mut slot.lane, &ticket, result);
                if outcome == FetchOutcome::Discarded(DiscardReason::LaneGone) {
                    // The lane was replaced by a fresh one; its bookkeeping is
                    // not ours to touch.
                    return Ok(outcome);
                }
                self.settle(slot, activator, &ticket, &outcome);

                let follow_up = if std::mem::take(&mut slot.pending_replace) {
                    self.begin(slot, activator, FetchMode::Replace).ok()
                } else {
                    None
                };
                guard.ticket = follow_up.as_ref().map(|next| (next.id, next.mode));
                (outcome, follow_up)
            };
            self.observers.notify(&FeedEvent::LaneChanged(id.clone()));

            match follow_up {
                Some(next) => ticket = next,
                None => return Ok(outcome),
            }
        }
    }

    fn begin(
        &self,
        slot: &mut LaneSlot<S::Record>,
        activator: &mut LazyTabActivator,
        mode: FetchMode,
    ) -> Result<FetchTicket, SkipReason> {
        let ticket = self.coordinator.begin(&mut slot.lane, mode)?;
        if mode == FetchMode::Replace {
            activator.on_replace_started(slot.lane.id());
        }
        Ok(ticket)
    }

    /// Controller-side bookkeeping after the coordinator has merged a result.
    fn settle(
        &self,
        slot: &mut LaneSlot<S::Record>,
        activator: &mut LazyTabActivator,
        ticket: &FetchTicket,
        outcome: &FetchOutcome,
    ) {
        let id = slot.lane.id().clone();
        match outcome {
            FetchOutcome::Merged { .. } => {
                slot.last_failed = None;
                if ticket.mode == FetchMode::Replace {
                    activator.on_replace_succeeded(&id);
                }
            }
            FetchOutcome::Failed(_) => {
                slot.last_failed = Some(ticket.mode);
                if ticket.mode == FetchMode::Replace {
                    activator.on_replace_failed(&id);
                }
            }
            FetchOutcome::Discarded(_) => {
                if ticket.mode == FetchMode::Replace {
                    activator.on_replace_failed(&id);
                }
            }
            FetchOutcome::Skipped(_) | FetchOutcome::Queued => {}
        }
    }
}

/// Releases a lane whose request was abandoned: if the future driving it is
/// dropped before the result is merged, the lane must not stay loading.
struct AbandonGuard<'a, S: RecordSource> {
    feed: &'a FeedController<S>,
    lane: &'a LaneId,
    ticket: Option<(TicketId, FetchMode)>,
}

impl<S: RecordSource> Drop for AbandonGuard<'_, S> {
    fn drop(&mut self) {
        let Some((ticket, mode)) = self.ticket.take() else {
            return;
        };
        let released = {
            let mut state = self.feed.state.lock();
            let FeedState {
                lanes, activator, ..
            } = &mut *state;
            match lanes.get_mut(self.lane) {
                Some(slot) if slot.lane.in_flight().is_some_and(|f| f.ticket == ticket) => {
                    slot.lane.clear_loading();
                    if std::mem::take(&mut slot.pending_replace) {
                        // Records belong to the previous filter; start over.
                        slot.lane.reset();
                        activator.reset(self.lane);
                    } else if mode == FetchMode::Replace {
                        activator.on_replace_failed(self.lane);
                    }
                    true
                }
                _ => false,
            }
        };
        if released {
            debug!(lane = %self.lane, %mode, "request abandoned, lane released");
            self.feed
                .observers
                .notify(&FeedEvent::LaneChanged(self.lane.clone()));
        }
    }
}

impl<S> FeedController<S>
where
    S: RecordSource,
    S::Record: Clone,
{
    /// Read-only copy of a lane.
    pub fn lane_state(&self, id: &LaneId) -> Option<LaneState<S::Record>> {
        self.state.lock().lanes.get(id).map(|slot| slot.lane.snapshot())
    }
}

impl<S: RecordSource> std::fmt::Debug for FeedController<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedController")
            .field("config", &self.config)
            .field("lanes", &self.lane_ids())
            .field("observers", &self.observers)
            .finish_non_exhaustive()
    }
}
