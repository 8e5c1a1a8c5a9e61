use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::NaiveDate;
use crossterm::event::KeyCode;
use ledger_feed_core::{
    FeedController, FeedError, FetchOutcome, MemorySource, ScrollTrigger, SubscriptionId, Viewport,
};
use ledger_feed_protocol::{FilterPatch, LaneId};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::runtime::Handle;

pub type Feed = FeedController<MemorySource<Value>>;

/// What the keyboard is currently editing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Search(String),
    StartDate(String),
    EndDate(String),
}

/// Per-tab scroll position.
struct LaneView {
    trigger: Arc<ScrollTrigger>,
    offset: usize,
    selected: usize,
}

pub struct App {
    feed: Arc<Feed>,
    runtime: Handle,
    lanes: Vec<LaneId>,
    tab: usize,
    views: HashMap<LaneId, LaneView>,
    pub mode: InputMode,
    status: Arc<Mutex<Option<String>>>,
    dirty: Arc<AtomicBool>,
    subscription: Option<SubscriptionId>,
    /// Table rows that fit on screen; set by the renderer every frame.
    pub visible_rows: usize,
    pub quit: bool,
}

impl App {
    pub fn new(feed: Arc<Feed>, runtime: Handle) -> Self {
        let lanes = feed.lane_ids();
        let views = lanes
            .iter()
            .filter_map(|id| {
                let trigger = feed.scroll_trigger(id).ok()?;
                Some((
                    id.clone(),
                    LaneView {
                        trigger: Arc::new(trigger),
                        offset: 0,
                        selected: 0,
                    },
                ))
            })
            .collect();

        let dirty = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&dirty);
        let subscription = feed.subscribe(move |_| flag.store(true, Ordering::Release));

        Self {
            feed,
            runtime,
            lanes,
            tab: 0,
            views,
            mode: InputMode::Normal,
            status: Arc::new(Mutex::new(None)),
            dirty,
            subscription: Some(subscription),
            visible_rows: 20,
            quit: false,
        }
    }

    pub fn feed(&self) -> &Feed {
        &self.feed
    }

    pub fn lanes(&self) -> &[LaneId] {
        &self.lanes
    }

    pub fn tab_index(&self) -> usize {
        self.tab
    }

    pub fn active_lane(&self) -> Option<&LaneId> {
        self.lanes.get(self.tab)
    }

    /// (offset, selected) of the active tab.
    pub fn scroll_position(&self) -> (usize, usize) {
        self.active_lane()
            .and_then(|id| self.views.get(id))
            .map_or((0, 0), |v| (v.offset, v.selected))
    }

    pub fn status(&self) -> Option<String> {
        self.status.lock().clone()
    }

    /// Whether anything changed since the last call.
    pub fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::AcqRel)
    }

    pub fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    pub fn start(&mut self) {
        if let Some(initial) = self.feed.config().initial_tab() {
            if let Some(idx) = self.lanes.iter().position(|l| l == initial) {
                self.tab = idx;
            }
        }
        self.spawn("start", |feed| async move { feed.start().await });
    }

    pub fn shutdown(&mut self) {
        for view in self.views.values() {
            view.trigger.detach();
        }
        if let Some(id) = self.subscription.take() {
            self.feed.unsubscribe(id);
        }
    }

    pub fn on_key(&mut self, code: KeyCode) {
        match std::mem::replace(&mut self.mode, InputMode::Normal) {
            InputMode::Normal => self.on_normal_key(code),
            InputMode::Search(buf) => {
                if let Some(term) = edit_buffer(&mut self.mode, buf, code, InputMode::Search) {
                    self.submit_search(term);
                }
            }
            InputMode::StartDate(buf) => {
                if let Some(text) = edit_buffer(&mut self.mode, buf, code, InputMode::StartDate) {
                    self.submit_date(&text, FilterPatch::start_date);
                }
            }
            InputMode::EndDate(buf) => {
                if let Some(text) = edit_buffer(&mut self.mode, buf, code, InputMode::EndDate) {
                    self.submit_date(&text, FilterPatch::end_date);
                }
            }
        }
        self.mark_dirty();
    }

    fn on_normal_key(&mut self, code: KeyCode) {
        let Some(lane) = self.active_lane().cloned() else {
            if matches!(code, KeyCode::Char('q') | KeyCode::Esc) {
                self.quit = true;
            }
            return;
        };
        match code {
            KeyCode::Char('q') | KeyCode::Esc => self.quit = true,
            KeyCode::Tab | KeyCode::Right => self.switch_tab(1),
            KeyCode::BackTab | KeyCode::Left => self.switch_tab(-1),
            KeyCode::Down | KeyCode::Char('j') => self.scroll_by(1),
            KeyCode::Up | KeyCode::Char('k') => self.scroll_by(-1),
            KeyCode::PageDown => self.scroll_by(self.visible_rows as isize),
            KeyCode::PageUp => self.scroll_by(-(self.visible_rows as isize)),
            KeyCode::End => self.scroll_by(isize::MAX / 2),
            KeyCode::Home => self.scroll_by(isize::MIN / 2),
            KeyCode::Char('/') => {
                let draft = self.feed.filter_draft(&lane).unwrap_or_default();
                self.mode = InputMode::Search(draft.search);
            }
            KeyCode::Char('s') => {
                let draft = self.feed.filter_draft(&lane).unwrap_or_default();
                self.mode = InputMode::StartDate(format_date(draft.start_date));
            }
            KeyCode::Char('e') => {
                let draft = self.feed.filter_draft(&lane).unwrap_or_default();
                self.mode = InputMode::EndDate(format_date(draft.end_date));
            }
            KeyCode::Char('a') => {
                self.spawn("apply filter", |feed| async move { feed.apply_filter(&lane).await });
            }
            KeyCode::Char('c') => {
                self.spawn("clear search", |feed| async move { feed.clear_search(&lane).await });
            }
            KeyCode::Char('d') => {
                self.spawn("clear dates", |feed| async move {
                    feed.clear_date_range(&lane).await
                });
            }
            KeyCode::Char('m') => {
                self.spawn("load more", |feed| async move { feed.load_more(&lane).await });
            }
            KeyCode::Char('r') => {
                self.spawn("retry", |feed| async move { feed.retry(&lane).await });
            }
            KeyCode::Char('R') => {
                self.reset_scroll(&lane);
                self.spawn("reload", |feed| async move { feed.reload(&lane).await });
            }
            KeyCode::Char('x') => {
                match self.feed.dismiss_error(&lane) {
                    Ok(_) => *self.status.lock() = None,
                    Err(err) => self.set_status(err.to_string()),
                }
            }
            _ => {}
        }
    }

    fn switch_tab(&mut self, step: isize) {
        if self.lanes.is_empty() {
            return;
        }
        let len = self.lanes.len() as isize;
        self.tab = (self.tab as isize + step).rem_euclid(len) as usize;
        if let Some(lane) = self.active_lane().cloned() {
            self.spawn("select tab", |feed| async move { feed.select_tab(&lane).await });
        }
    }

    /// Move the selection and report the new viewport to the lane's trigger.
    pub fn scroll_by(&mut self, delta: isize) {
        let Some(lane) = self.active_lane().cloned() else {
            return;
        };
        let held = self.feed.with_lane(&lane, |l| l.len()).unwrap_or(0);
        let visible = self.visible_rows.max(1);
        let Some(view) = self.views.get_mut(&lane) else {
            return;
        };

        let last = held.saturating_sub(1) as isize;
        view.selected = (view.selected as isize).saturating_add(delta).clamp(0, last.max(0)) as usize;
        if view.selected < view.offset {
            view.offset = view.selected;
        } else if view.selected >= view.offset + visible {
            view.offset = view.selected + 1 - visible;
        }

        let viewport = Viewport::new(
            u32::try_from(view.offset).unwrap_or(u32::MAX),
            u32::try_from(visible).unwrap_or(u32::MAX),
            u32::try_from(held).unwrap_or(u32::MAX),
        );
        let trigger = Arc::clone(&view.trigger);
        if trigger.is_near_bottom(&viewport) {
            self.spawn("scroll", |feed| async move {
                trigger.on_scroll(feed.as_ref(), viewport).await
            });
        }
    }

    /// Keep the selection inside the lane after records were replaced.
    pub fn clamp_scroll(&mut self, held: usize) {
        let Some(lane) = self.active_lane().cloned() else {
            return;
        };
        if let Some(view) = self.views.get_mut(&lane) {
            view.selected = view.selected.min(held.saturating_sub(1));
            view.offset = view.offset.min(view.selected);
        }
    }

    fn reset_scroll(&mut self, lane: &LaneId) {
        if let Some(view) = self.views.get_mut(lane) {
            view.offset = 0;
            view.selected = 0;
        }
    }

    fn submit_search(&mut self, term: String) {
        let Some(lane) = self.active_lane().cloned() else {
            return;
        };
        if let Err(err) = self.feed.update_filter_draft(&lane, &FilterPatch::search(term)) {
            self.set_status(err.to_string());
            return;
        }
        self.reset_scroll(&lane);
        self.spawn("search", |feed| async move { feed.apply_filter(&lane).await });
    }

    /// Store a date bound in the draft; applied with `a`.
    fn submit_date(&mut self, text: &str, patch: fn(Option<NaiveDate>) -> FilterPatch) {
        let Some(lane) = self.active_lane().cloned() else {
            return;
        };
        let date = match parse_date(text) {
            Ok(date) => date,
            Err(msg) => {
                self.set_status(msg);
                return;
            }
        };
        match self.feed.update_filter_draft(&lane, &patch(date)) {
            Ok(_) => self.set_status("date set; press 'a' to apply".to_string()),
            Err(err) => self.set_status(err.to_string()),
        }
    }

    fn set_status(&self, msg: String) {
        *self.status.lock() = Some(msg);
        self.mark_dirty();
    }

    /// Run a controller action on the runtime. Rejected actions (unknown lane,
    /// invalid filter) end up in the status line; fetch failures are shown
    /// from the lane itself.
    fn spawn<F, Fut>(&self, label: &'static str, action: F)
    where
        F: FnOnce(Arc<Feed>) -> Fut,
        Fut: Future<Output = Result<FetchOutcome, FeedError>> + Send + 'static,
    {
        let fut = action(Arc::clone(&self.feed));
        let status = Arc::clone(&self.status);
        let dirty = Arc::clone(&self.dirty);
        self.runtime.spawn(async move {
            match fut.await {
                Ok(outcome) => {
                    tracing::debug!(action = label, ?outcome, "action finished");
                    if !matches!(outcome, FetchOutcome::Skipped(_)) {
                        *status.lock() = None;
                    }
                }
                Err(err) => {
                    tracing::warn!(action = label, error = %err, "action rejected");
                    *status.lock() = Some(err.to_string());
                }
            }
            dirty.store(true, Ordering::Release);
        });
    }
}

/// Apply one key to a text buffer. Returns the finished text on Enter and
/// leaves `mode` as Normal on Enter/Esc, otherwise puts the edited buffer
/// back through `wrap`.
fn edit_buffer(
    mode: &mut InputMode,
    mut buf: String,
    code: KeyCode,
    wrap: fn(String) -> InputMode,
) -> Option<String> {
    match code {
        KeyCode::Enter => return Some(buf),
        KeyCode::Esc => return None,
        KeyCode::Backspace => {
            buf.pop();
        }
        KeyCode::Char(c) => buf.push(c),
        _ => {}
    }
    *mode = wrap(buf);
    None
}

fn parse_date(text: &str) -> Result<Option<NaiveDate>, String> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map(Some)
        .map_err(|_| format!("'{text}' is not a YYYY-MM-DD date"))
}

fn format_date(date: Option<NaiveDate>) -> String {
    date.map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}
