use std::sync::atomic::{AtomicBool, Ordering};

use ledger_feed_protocol::LaneId;
use serde::{Deserialize, Serialize};

use crate::controller::FeedController;
use crate::error::FeedError;
use crate::fetch::{FetchOutcome, SkipReason};
use crate::source::RecordSource;

/// Scroll geometry of a lane's list, in logical units (pixels, rows, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Viewport {
    /// Distance scrolled from the top.
    pub offset: u32,
    /// Height of the visible window.
    pub visible: u32,
    /// Height of the whole list.
    pub content: u32,
}

impl Viewport {
    pub fn new(offset: u32, visible: u32, content: u32) -> Self {
        Self {
            offset,
            visible,
            content,
        }
    }

    /// Units left below the visible window. Zero when the list is shorter
    /// than the window.
    pub fn remaining(&self) -> u32 {
        self.content
            .saturating_sub(self.offset.saturating_add(self.visible))
    }
}

/// Turns "scrolled near the end" into a load-more request for one lane.
///
/// Repeated signals need no debouncing: the coordinator ignores them while a
/// request is out or once the lane is exhausted. `detach` stops the trigger
/// when its view is torn down; a request already sent still completes.
#[derive(Debug)]
pub struct ScrollTrigger {
    lane: LaneId,
    threshold: u32,
    attached: AtomicBool,
}

impl ScrollTrigger {
    pub fn new(lane: LaneId, threshold: u32) -> Self {
        Self {
            lane,
            threshold,
            attached: AtomicBool::new(true),
        }
    }

    pub fn lane(&self) -> &LaneId {
        &self.lane
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn is_near_bottom(&self, viewport: &Viewport) -> bool {
        viewport.remaining() <= self.threshold
    }

    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::Acquire)
    }

    pub fn detach(&self) {
        self.attached.store(false, Ordering::Release);
    }

    /// Handle one scroll signal.
    pub async fn on_scroll<S: RecordSource>(
        &self,
        feed: &FeedController<S>,
        viewport: Viewport,
    ) -> Result<FetchOutcome, FeedError> {
        if !self.is_attached() || !self.is_near_bottom(&viewport) {
            return Ok(FetchOutcome::Skipped(SkipReason::NotNearEnd));
        }
        feed.load_more(&self.lane).await
    }
}
