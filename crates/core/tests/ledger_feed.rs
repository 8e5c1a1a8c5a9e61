//! Integration tests: drive the feed controller against a scripted record
//! source and check the paging, filtering and lane-isolation behavior end to
//! end.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use ledger_feed_core::protocol::{
    ErrorKind, FetchMode, FilterCriteria, FilterPatch, LaneId, PageBatch, PageRequest,
};
use ledger_feed_core::{
    Activation, DiscardReason, FeedConfig, FeedController, FeedEvent, FetchOutcome, Lane,
    LanePhase, LaneState, MemorySource, RecordSource, SkipReason, SourceError, Viewport,
};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::oneshot;

type Reply = Result<PageBatch<String>, SourceError>;

enum Step {
    Reply(Reply),
    Hold(oneshot::Receiver<Reply>),
}

/// Answers requests from a queue of scripted steps and records every request
/// it receives.
#[derive(Default)]
struct ScriptedSource {
    requests: Mutex<Vec<PageRequest>>,
    steps: Mutex<VecDeque<Step>>,
}

impl ScriptedSource {
    fn reply(&self, reply: Reply) {
        self.steps.lock().push_back(Step::Reply(reply));
    }

    /// Queue a response that is only delivered once the returned sender fires.
    fn hold(&self) -> oneshot::Sender<Reply> {
        let (tx, rx) = oneshot::channel();
        self.steps.lock().push_back(Step::Hold(rx));
        tx
    }

    fn requests(&self) -> Vec<PageRequest> {
        self.requests.lock().clone()
    }

    fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait::async_trait]
impl RecordSource for ScriptedSource {
    type Record = String;

    async fn fetch_page(&self, request: &PageRequest) -> Reply {
        self.requests.lock().push(request.clone());
        let step = self.steps.lock().pop_front();
        match step {
            Some(Step::Reply(reply)) => reply,
            Some(Step::Hold(rx)) => rx
                .await
                .unwrap_or_else(|_| Err(SourceError::Transport("held reply dropped".into()))),
            None => Err(SourceError::Transport("no scripted reply".into())),
        }
    }
}

fn records(prefix: &str, range: std::ops::Range<usize>) -> Vec<String> {
    range.map(|i| format!("{prefix}-{i}")).collect()
}

fn batch(prefix: &str, range: std::ops::Range<usize>) -> PageBatch<String> {
    PageBatch::new(records(prefix, range))
}

fn customers() -> LaneId {
    LaneId::new(LaneId::CUSTOMERS)
}

fn vendors() -> LaneId {
    LaneId::new(LaneId::VENDORS)
}

fn scripted() -> (Arc<ScriptedSource>, Arc<FeedController<Arc<ScriptedSource>>>) {
    let source = Arc::new(ScriptedSource::default());
    let feed = FeedController::new(Arc::clone(&source), FeedConfig::default())
        .expect("default config is valid");
    (source, Arc::new(feed))
}

fn state<S: RecordSource>(feed: &FeedController<S>, id: &LaneId) -> LaneState<S::Record>
where
    S::Record: Clone,
{
    feed.lane_state(id).expect("lane exists")
}

/// Yield until the source has seen `n` requests.
async fn wait_for_requests(source: &ScriptedSource, n: usize) {
    for _ in 0..1000 {
        if source.request_count() >= n {
            return;
        }
        tokio::task::yield_now().await;
    }
    assert!(source.request_count() >= n, "source never saw {n} requests");
}

/// Scenario A then B: first page, then a short second page.
async fn load_25_customers(source: &ScriptedSource, feed: &FeedController<Arc<ScriptedSource>>) {
    source.reply(Ok(batch("c", 0..20).with_has_more(true)));
    feed.select_tab(&customers()).await.expect("select customers");
    source.reply(Ok(batch("c", 20..25)));
    feed.load_more(&customers()).await.expect("load more");
}

#[tokio::test]
async fn first_tab_selection_fetches_page_one() {
    let (source, feed) = scripted();
    source.reply(Ok(batch("c", 0..20).with_has_more(true)));

    let outcome = feed.select_tab(&customers()).await;
    assert_eq!(
        outcome,
        Ok(FetchOutcome::Merged {
            mode: FetchMode::Replace,
            received: 20,
            has_more: true
        })
    );

    let requests = source.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].lane, customers());
    assert_eq!(requests[0].page, 1);
    assert_eq!(requests[0].page_size, 20);
    assert!(requests[0].filter.is_empty());

    let state = state(&feed, &customers());
    assert_eq!(state.records.len(), 20);
    assert_eq!(state.cursor.next_page, 2);
    assert!(state.cursor.has_more);
    assert!(state.has_loaded_once);
    assert_eq!(state.phase, LanePhase::Populated);
}

#[tokio::test]
async fn short_page_without_signal_exhausts_the_lane() {
    let (source, feed) = scripted();
    source.reply(Ok(batch("c", 0..20).with_has_more(true)));
    feed.select_tab(&customers()).await.expect("select customers");

    source.reply(Ok(batch("c", 20..25)));
    let outcome = feed.load_more(&customers()).await;
    assert_eq!(
        outcome,
        Ok(FetchOutcome::Merged {
            mode: FetchMode::Append,
            received: 5,
            has_more: false
        })
    );
    assert_eq!(source.requests()[1].page, 2);

    let lane = state(&feed, &customers());
    assert_eq!(lane.records.len(), 25);
    assert!(!lane.cursor.has_more);
    assert_eq!(lane.phase, LanePhase::Exhausted);

    for _ in 0..3 {
        assert_eq!(
            feed.load_more(&customers()).await,
            Ok(FetchOutcome::Skipped(SkipReason::Exhausted))
        );
    }
    assert_eq!(source.request_count(), 2);
}

#[tokio::test]
async fn applying_a_filter_replaces_all_records() {
    let (source, feed) = scripted();
    load_25_customers(&source, &feed).await;

    feed.update_filter_draft(&customers(), &FilterPatch::search("acme"))
        .expect("customers lane exists");
    source.reply(Ok(batch("acme", 0..3)));
    let outcome = feed.apply_filter(&customers()).await.expect("apply filter");
    assert!(matches!(outcome, FetchOutcome::Merged { received: 3, .. }));

    let last = source.requests().pop().expect("a request was sent");
    assert_eq!(last.page, 1);
    assert_eq!(last.filter.search, "acme");

    let state = state(&feed, &customers());
    assert_eq!(state.records, records("acme", 0..3));
    assert_eq!(state.filter.search, "acme");
    assert_eq!(state.total_count, 3);
}

#[tokio::test]
async fn failed_replace_keeps_previous_records() {
    let (source, feed) = scripted();
    load_25_customers(&source, &feed).await;
    let before = state(&feed, &customers());

    feed.update_filter_draft(&customers(), &FilterPatch::search("acme"))
        .expect("customers lane exists");
    source.reply(Err(SourceError::Server {
        status: 500,
        message: "internal".into(),
    }));
    let outcome = feed.apply_filter(&customers()).await;
    assert!(matches!(
        outcome,
        Ok(FetchOutcome::Failed(ref info)) if info.kind == ErrorKind::Server { status: 500 }
    ));

    let after = state(&feed, &customers());
    assert_eq!(after.records, before.records);
    assert_eq!(after.cursor, before.cursor);
    assert!(!after.is_loading);
    assert!(after.has_loaded_once);
    assert!(after.error.is_some());
    assert_eq!(after.phase, LanePhase::Error);
}

#[tokio::test]
async fn failed_first_load_is_retried_on_reselection() {
    let (source, feed) = scripted();
    source.reply(Err(SourceError::Transport("connection refused".into())));
    feed.select_tab(&customers()).await.expect("select customers");

    let lane = state(&feed, &customers());
    assert!(!lane.has_loaded_once);
    assert!(lane.error.is_some());
    assert!(!lane.is_loading);
    assert_eq!(feed.activation(&customers()), Some(Activation::NotLoaded));

    source.reply(Ok(batch("v", 0..1)));
    feed.select_tab(&vendors()).await.expect("select vendors");
    source.reply(Ok(batch("c", 0..4)));
    let outcome = feed.select_tab(&customers()).await.expect("select customers");
    assert!(matches!(outcome, FetchOutcome::Merged { received: 4, .. }));
    assert_eq!(feed.activation(&customers()), Some(Activation::Loaded));
}

#[tokio::test]
async fn loaded_tab_is_not_refetched() {
    let (source, feed) = scripted();
    source.reply(Ok(batch("c", 0..20)));
    feed.select_tab(&customers()).await.expect("select customers");
    source.reply(Ok(batch("v", 0..2)));
    feed.select_tab(&vendors()).await.expect("select vendors");

    let outcome = feed.select_tab(&customers()).await;
    assert_eq!(
        outcome,
        Ok(FetchOutcome::Skipped(SkipReason::AlreadyActivated))
    );
    assert_eq!(source.request_count(), 2);
    assert_eq!(feed.active_tab(), Some(customers()));
}

#[tokio::test]
async fn lanes_do_not_touch_each_other() {
    let (source, feed) = scripted();
    source.reply(Ok(batch("c", 0..20)));
    feed.select_tab(&customers()).await.expect("select customers");

    // Customers append held in flight while vendors loads.
    let release = source.hold();
    let task_feed = Arc::clone(&feed);
    let pending = tokio::spawn(async move { task_feed.load_more(&customers()).await });
    wait_for_requests(&source, 2).await;
    assert!(state(&feed, &customers()).is_loading);

    source.reply(Ok(batch("v", 0..7)));
    feed.select_tab(&vendors()).await.expect("select vendors");
    let vendor_state = state(&feed, &vendors());

    release
        .send(Ok(batch("c", 20..40)))
        .expect("append still waiting");
    let outcome = pending.await.expect("task joins").expect("load more");
    assert!(matches!(outcome, FetchOutcome::Merged { received: 20, .. }));

    let vendors_now = state(&feed, &vendors());
    assert_eq!(vendors_now, vendor_state);
    assert_eq!(vendors_now.records, records("v", 0..7));
    assert!(!vendors_now.is_loading);

    let customers_now = state(&feed, &customers());
    assert_eq!(customers_now.records.len(), 40);
    assert_eq!(customers_now.records[39], "c-39");
}

#[tokio::test]
async fn load_more_while_loading_sends_one_request() {
    let (source, feed) = scripted();
    source.reply(Ok(batch("c", 0..20)));
    feed.select_tab(&customers()).await.expect("select customers");

    let release = source.hold();
    let task_feed = Arc::clone(&feed);
    let pending = tokio::spawn(async move { task_feed.load_more(&customers()).await });
    wait_for_requests(&source, 2).await;

    let trigger = feed
        .scroll_trigger(&customers())
        .expect("customers lane exists");
    for _ in 0..5 {
        assert_eq!(
            feed.load_more(&customers()).await,
            Ok(FetchOutcome::Skipped(SkipReason::AlreadyLoading))
        );
        let fired = trigger.on_scroll(&feed, Viewport::new(900, 100, 1000)).await;
        assert_eq!(fired, Ok(FetchOutcome::Skipped(SkipReason::AlreadyLoading)));
    }
    assert_eq!(source.request_count(), 2);

    release
        .send(Ok(batch("c", 20..40)))
        .expect("append still waiting");
    pending.await.expect("task joins").expect("load more");
    assert_eq!(state(&feed, &customers()).records.len(), 40);
}

#[tokio::test]
async fn record_count_grows_by_batch_sizes() {
    let (source, feed) = scripted();
    source.reply(Ok(batch("c", 0..20)));
    feed.select_tab(&customers()).await.expect("select customers");

    let mut expected = 20;
    for (start, len) in [(20, 20), (40, 20), (60, 13)] {
        source.reply(Ok(batch("c", start..start + len)));
        feed.load_more(&customers()).await.expect("load more");
        expected += len;
        let held = feed.with_lane(&customers(), Lane::len);
        assert_eq!(held, Some(expected));
    }
    let pages: Vec<u32> = source.requests().iter().map(|r| r.page).collect();
    assert_eq!(pages, [1, 2, 3, 4]);
    assert!(!state(&feed, &customers()).cursor.has_more);
}

#[tokio::test]
async fn loading_flag_never_overlaps() {
    let (source, feed) = scripted();
    let seen: Arc<Mutex<Vec<bool>>> = Arc::new(Mutex::new(Vec::new()));
    let weak = Arc::downgrade(&feed);
    let log = Arc::clone(&seen);
    feed.subscribe(move |event| {
        if let (FeedEvent::LaneChanged(lane), Some(feed)) = (event, weak.upgrade())
            && let Some(loading) = feed.with_lane(lane, Lane::is_loading)
        {
            log.lock().push(loading);
        }
    });

    source.reply(Ok(batch("c", 0..20)));
    feed.select_tab(&customers()).await.expect("select customers");
    source.reply(Ok(batch("c", 20..40)));
    feed.load_more(&customers()).await.expect("load more");
    source.reply(Err(SourceError::Transport("timeout".into())));
    feed.load_more(&customers()).await.expect("load more");

    assert_eq!(*seen.lock(), [true, false, true, false, true, false]);
}

#[tokio::test]
async fn filter_applied_mid_append_discards_old_page() {
    let (source, feed) = scripted();
    source.reply(Ok(batch("c", 0..20)));
    feed.select_tab(&customers()).await.expect("select customers");

    let release = source.hold();
    let task_feed = Arc::clone(&feed);
    let pending = tokio::spawn(async move { task_feed.load_more(&customers()).await });
    wait_for_requests(&source, 2).await;

    feed.update_filter_draft(&customers(), &FilterPatch::search("acme"))
        .expect("customers lane exists");
    assert_eq!(feed.apply_filter(&customers()).await, Ok(FetchOutcome::Queued));
    assert_eq!(source.request_count(), 2);

    source.reply(Ok(batch("acme", 0..2)));
    release
        .send(Ok(batch("c", 20..40)))
        .expect("append still waiting");
    let outcome = pending.await.expect("task joins").expect("load more");
    assert!(matches!(
        outcome,
        FetchOutcome::Merged {
            mode: FetchMode::Replace,
            received: 2,
            ..
        }
    ));

    let requests = source.requests();
    assert_eq!(requests.len(), 3);
    assert_eq!(requests[2].page, 1);
    assert_eq!(requests[2].filter.search, "acme");
    let lane = state(&feed, &customers());
    assert_eq!(lane.records, records("acme", 0..2));
    assert!(!lane.is_loading);
}

#[tokio::test]
async fn dropped_request_releases_the_lane() {
    let (source, feed) = scripted();
    let _never_answered = source.hold();

    let abandoned =
        tokio::time::timeout(Duration::from_millis(20), feed.select_tab(&customers())).await;
    assert!(abandoned.is_err());
    assert_eq!(source.request_count(), 1);

    let lane = state(&feed, &customers());
    assert!(!lane.is_loading);
    assert_eq!(lane.phase, LanePhase::Empty);
    assert!(lane.error.is_none());
    assert_eq!(feed.activation(&customers()), Some(Activation::NotLoaded));

    source.reply(Ok(batch("c", 0..20)));
    let outcome = feed.select_tab(&customers()).await.expect("select customers");
    assert!(matches!(
        outcome,
        FetchOutcome::Merged {
            mode: FetchMode::Replace,
            received: 20,
            ..
        }
    ));
    assert_eq!(state(&feed, &customers()).records.len(), 20);
    assert_eq!(feed.activation(&customers()), Some(Activation::Loaded));

    source.reply(Ok(batch("c", 20..40)));
    let more = feed.load_more(&customers()).await.expect("load more");
    assert!(matches!(more, FetchOutcome::Merged { received: 20, .. }));
}

#[tokio::test]
async fn aborted_append_with_queued_filter_starts_the_lane_over() {
    let (source, feed) = scripted();
    source.reply(Ok(batch("c", 0..20)));
    feed.select_tab(&customers()).await.expect("select customers");

    let _never_answered = source.hold();
    let task_feed = Arc::clone(&feed);
    let pending = tokio::spawn(async move { task_feed.load_more(&customers()).await });
    wait_for_requests(&source, 2).await;

    feed.update_filter_draft(&customers(), &FilterPatch::search("acme"))
        .expect("customers lane exists");
    assert_eq!(feed.apply_filter(&customers()).await, Ok(FetchOutcome::Queued));

    pending.abort();
    let joined = pending.await;
    assert!(joined.is_err_and(|e| e.is_cancelled()));

    // The old-filter records are gone and the tab loads again when shown.
    let lane = state(&feed, &customers());
    assert!(!lane.is_loading);
    assert!(lane.records.is_empty());
    assert_eq!(lane.filter.search, "acme");
    assert_eq!(feed.activation(&customers()), Some(Activation::NotLoaded));

    source.reply(Ok(batch("acme", 0..2)));
    let outcome = feed.select_tab(&customers()).await.expect("select customers");
    assert!(matches!(outcome, FetchOutcome::Merged { received: 2, .. }));
    let last = source.requests().pop().expect("a request was sent");
    assert_eq!(last.page, 1);
    assert_eq!(last.filter.search, "acme");
}

#[tokio::test]
async fn retry_reissues_the_failed_mode() {
    let (source, feed) = scripted();
    source.reply(Ok(batch("c", 0..20)));
    feed.select_tab(&customers()).await.expect("select customers");

    assert_eq!(
        feed.retry(&customers()).await,
        Ok(FetchOutcome::Skipped(SkipReason::NothingToRetry))
    );

    source.reply(Err(SourceError::malformed("missing records")));
    feed.load_more(&customers()).await.expect("load more");
    assert_eq!(state(&feed, &customers()).records.len(), 20);

    source.reply(Ok(batch("c", 20..40)));
    let outcome = feed.retry(&customers()).await.expect("retry");
    assert!(matches!(
        outcome,
        FetchOutcome::Merged {
            mode: FetchMode::Append,
            ..
        }
    ));
    let pages: Vec<u32> = source.requests().iter().map(|r| r.page).collect();
    assert_eq!(pages, [1, 2, 2]);
    assert!(state(&feed, &customers()).error.is_none());
}

#[tokio::test]
async fn dismissed_error_is_not_retried() {
    let (source, feed) = scripted();
    source.reply(Err(SourceError::Transport("offline".into())));
    feed.select_tab(&customers()).await.expect("select customers");

    assert_eq!(feed.dismiss_error(&customers()), Ok(true));
    assert_eq!(feed.dismiss_error(&customers()), Ok(false));
    assert_eq!(
        feed.retry(&customers()).await,
        Ok(FetchOutcome::Skipped(SkipReason::NothingToRetry))
    );
}

#[tokio::test]
async fn removed_lane_drops_late_result() {
    let (source, feed) = scripted();
    let release = source.hold();
    let task_feed = Arc::clone(&feed);
    let pending = tokio::spawn(async move { task_feed.select_tab(&customers()).await });
    wait_for_requests(&source, 1).await;

    assert!(feed.remove_lane(&customers()));
    release
        .send(Ok(batch("c", 0..20)))
        .expect("first load still waiting");
    let outcome = pending.await.expect("task joins");
    assert_eq!(
        outcome,
        Ok(FetchOutcome::Discarded(DiscardReason::LaneGone))
    );

    // A fresh lane under the same name starts empty.
    assert!(feed.add_lane(customers()));
    assert!(state(&feed, &customers()).records.is_empty());
}

#[tokio::test]
async fn scroll_trigger_fires_only_near_the_end() {
    let (source, feed) = scripted();
    source.reply(Ok(batch("c", 0..20)));
    feed.select_tab(&customers()).await.expect("select customers");
    let trigger = feed
        .scroll_trigger(&customers())
        .expect("customers lane exists");

    let far = trigger.on_scroll(&feed, Viewport::new(0, 300, 1000)).await;
    assert_eq!(far, Ok(FetchOutcome::Skipped(SkipReason::NotNearEnd)));
    assert_eq!(source.request_count(), 1);

    source.reply(Ok(batch("c", 20..40)));
    let near = trigger.on_scroll(&feed, Viewport::new(660, 300, 1000)).await;
    assert!(matches!(near, Ok(FetchOutcome::Merged { received: 20, .. })));

    trigger.detach();
    let detached = trigger.on_scroll(&feed, Viewport::new(700, 300, 1000)).await;
    assert_eq!(detached, Ok(FetchOutcome::Skipped(SkipReason::NotNearEnd)));
    assert_eq!(source.request_count(), 2);
}

#[tokio::test]
async fn tab_and_lane_events_are_published() {
    let (source, feed) = scripted();
    let events: Arc<Mutex<Vec<FeedEvent>>> = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&events);
    let sub = feed.subscribe(move |e| log.lock().push(e.clone()));

    source.reply(Ok(batch("c", 0..1)));
    feed.select_tab(&customers()).await.expect("select customers");
    assert_eq!(
        *events.lock(),
        [
            FeedEvent::TabSelected(customers()),
            FeedEvent::LaneChanged(customers()),
            FeedEvent::LaneChanged(customers()),
        ]
    );

    assert!(feed.unsubscribe(sub));
    source.reply(Ok(batch("v", 0..1)));
    feed.select_tab(&vendors()).await.expect("select vendors");
    assert_eq!(events.lock().len(), 3);
}

fn ledger(n: usize) -> Vec<Value> {
    (0..n)
        .map(|i| {
            let name = if i % 3 == 0 { "Acme Corp" } else { "Globex" };
            json!({ "id": i, "name": format!("{name} #{i}"), "date": "2024-05-10" })
        })
        .collect()
}

fn ledger_feed(customers: usize) -> FeedController<MemorySource<Value>> {
    let source = MemorySource::new()
        .with_lane("customers", ledger(customers))
        .with_lane("vendors", ledger(0))
        .with_lane("transactions", ledger(0));
    FeedController::new(source, FeedConfig::default()).expect("default config is valid")
}

#[tokio::test]
async fn clearing_search_restores_unfiltered_records() {
    let feed = ledger_feed(50);
    feed.start().await.expect("start");
    let unfiltered = state(&feed, &customers()).records;

    feed.update_filter_draft(&customers(), &FilterPatch::search("acme"))
        .expect("customers lane exists");
    feed.apply_filter(&customers()).await.expect("apply filter");
    let filtered = state(&feed, &customers());
    assert_eq!(filtered.records.len(), 17);
    assert_eq!(filtered.total_count, 17);

    feed.clear_search(&customers()).await.expect("clear search");
    let restored = state(&feed, &customers());
    assert_eq!(restored.records, unfiltered);
    assert_eq!(restored.filter, FilterCriteria::default());
}

#[tokio::test]
async fn clearing_dates_restores_unfiltered_records() {
    let feed = ledger_feed(10);
    feed.start().await.expect("start");

    let june = chrono::NaiveDate::from_ymd_opt(2024, 6, 1);
    feed.update_filter_draft(&customers(), &FilterPatch::start_date(june))
        .expect("customers lane exists");
    feed.apply_filter(&customers()).await.expect("apply filter");
    assert!(state(&feed, &customers()).records.is_empty());

    feed.clear_date_range(&customers()).await.expect("clear dates");
    let lane = state(&feed, &customers());
    assert_eq!(lane.records.len(), 10);
    assert!(lane.filter.start_date.is_none());
    assert_eq!(
        feed.filter_draft(&customers()),
        Some(FilterCriteria::default())
    );
}
