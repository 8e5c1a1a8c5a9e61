use std::collections::HashMap;

use ledger_feed_protocol::LaneId;
use serde::{Deserialize, Serialize};

/// Per-lane first-load state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Activation {
    #[default]
    NotLoaded,
    Loading,
    Loaded,
}

/// Defers each lane's first fetch until its tab is first shown.
///
/// A lane becomes `Loading` when its first Replace goes out, `Loaded` once a
/// Replace succeeds, and drops back to `NotLoaded` if that first attempt
/// fails so the next tab selection retries it. Selecting a `Loaded` tab
/// again does nothing.
#[derive(Debug, Clone, Default)]
pub struct LazyTabActivator {
    states: HashMap<LaneId, Activation>,
    active: Option<LaneId>,
}

impl LazyTabActivator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> Option<&LaneId> {
        self.active.as_ref()
    }

    pub fn state(&self, lane: &LaneId) -> Activation {
        self.states.get(lane).copied().unwrap_or_default()
    }

    /// Make `lane` the visible tab. Returns true when its first load still
    /// has to be issued.
    pub fn select(&mut self, lane: &LaneId) -> bool {
        self.active = Some(lane.clone());
        self.state(lane) == Activation::NotLoaded
    }

    pub fn is_active(&self, lane: &LaneId) -> bool {
        self.active.as_ref() == Some(lane)
    }

    /// A Replace went out for `lane`.
    pub fn on_replace_started(&mut self, lane: &LaneId) {
        let state = self.states.entry(lane.clone()).or_default();
        if *state == Activation::NotLoaded {
            *state = Activation::Loading;
        }
    }

    pub fn on_replace_succeeded(&mut self, lane: &LaneId) {
        self.states.insert(lane.clone(), Activation::Loaded);
    }

    /// A Replace failed or was dropped. Only an unfinished first load is
    /// rolled back; a loaded tab stays loaded and keeps its data.
    pub fn on_replace_failed(&mut self, lane: &LaneId) {
        if let Some(state) = self.states.get_mut(lane)
            && *state == Activation::Loading
        {
            *state = Activation::NotLoaded;
        }
    }

    /// Forget everything about `lane`, e.g. on reload or removal.
    pub fn reset(&mut self, lane: &LaneId) {
        self.states.remove(lane);
    }

    pub fn forget(&mut self, lane: &LaneId) {
        self.reset(lane);
        if self.is_active(lane) {
            self.active = None;
        }
    }
}
