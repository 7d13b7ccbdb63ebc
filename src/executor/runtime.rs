use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, trace, warn};

use crate::error::{FetchError, NotifyError};
use crate::executor::notifier::Notifier;
use crate::executor::render;
use crate::sources::{ActivitySource, EventKind, FeedItem, Payload};
use crate::state::{PollState, StateStore};

/// Pause between two sends of the same batch.
pub const DEFAULT_SEND_DELAY: Duration = Duration::from_millis(500);

/// How a cycle dispatches the new items it found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleMode {
    /// No id was ever recorded: only the newest matching item is sent.
    FirstRun,
    /// Everything newer than the recorded id is sent, oldest first.
    Replay,
}

/// What one cycle did, for logging and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// The fetch was suppressed or throttled; nothing else happened.
    pub suppressed: bool,
    pub fetched: usize,
    /// Items picked for dispatch (new and allow-listed).
    pub selected: usize,
    pub sent: usize,
    /// Selected items the renderer declined.
    pub skipped: usize,
    pub failed: usize,
    /// Id persisted at the end of the cycle, if any.
    pub advanced_to: Option<String>,
}

/// Runtime is responsible for one poll cycle:
/// - fetching the feed through the activity source
/// - diffing it against the last seen id
/// - rendering and sending new items, paced and oldest first
/// - recording the newest id
///
/// The cycle state lives outside in a [`PollState`] so a cycle can be driven
/// in isolation.
pub struct Runtime {
    source: Arc<dyn ActivitySource>,
    notifier: Arc<dyn Notifier>,
    store: Arc<dyn StateStore>,
    identity: String,
    allowed: BTreeSet<EventKind>,
    send_delay: Duration,
}

impl Runtime {
    /// Create a runtime relaying every known event kind of `identity`.
    pub fn new(
        source: Arc<dyn ActivitySource>,
        notifier: Arc<dyn Notifier>,
        store: Arc<dyn StateStore>,
        identity: impl Into<String>,
    ) -> Self {
        Self {
            source,
            notifier,
            store,
            identity: identity.into(),
            allowed: EventKind::ALL.into_iter().collect(),
            send_delay: DEFAULT_SEND_DELAY,
        }
    }

    /// Restrict dispatch to `kinds`.
    pub fn with_allowed(mut self, kinds: impl IntoIterator<Item = EventKind>) -> Self {
        self.allowed = kinds.into_iter().collect();
        self
    }

    pub fn with_send_delay(mut self, delay: Duration) -> Self {
        self.send_delay = delay;
        self
    }

    pub fn notifier(&self) -> &Arc<dyn Notifier> {
        &self.notifier
    }

    /// Load the persisted state. A failed load is logged and yields a cold
    /// start.
    pub fn load_state(&self) -> PollState {
        match self.store.load() {
            Ok(last_seen_id) => {
                info!(target: "hubcast::runtime", last_seen_id = ?last_seen_id, "Loaded poll state");
                PollState::new(last_seen_id)
            }
            Err(e) => {
                warn!(
                    target: "hubcast::runtime",
                    error = %e,
                    "Failed to load poll state; starting cold"
                );
                PollState::default()
            }
        }
    }

    /// Run one cycle against `state`.
    ///
    /// Only a hard fetch failure is returned as an error; render, send and
    /// persistence problems are logged and counted in the report.
    pub async fn run_cycle(&self, state: &mut PollState) -> Result<CycleReport, FetchError> {
        let mut report = CycleReport::default();

        let Some(items) = self.source.fetch_activity(&self.identity).await? else {
            debug!(target: "hubcast::runtime", "Fetch suppressed; cycle ends without changes");
            report.suppressed = true;
            return Ok(report);
        };
        report.fetched = items.len();

        let mode = if state.is_cold() {
            CycleMode::FirstRun
        } else {
            CycleMode::Replay
        };
        let batch = select_batch(&items, state.last_seen_id.as_deref(), &self.allowed, mode);
        report.selected = batch.len();
        debug!(
            target: "hubcast::runtime",
            ?mode, fetched = report.fetched, selected = report.selected,
            "Diffed feed against last seen id"
        );

        for (idx, item) in batch.iter().enumerate() {
            if idx > 0 && !self.send_delay.is_zero() {
                tokio::time::sleep(self.send_delay).await;
            }
            match self.dispatch(item).await {
                Ok(true) => report.sent += 1,
                Ok(false) => report.skipped += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        target: "hubcast::runtime",
                        id = %item.id, kind = %item.kind, error = %e,
                        "Failed to deliver item; continuing with the batch"
                    );
                }
            }
        }

        if let Some(newest) = items.first() {
            state.last_seen_id = Some(newest.id.clone());
            report.advanced_to = Some(newest.id.clone());
            if let Err(e) = self.store.save(&newest.id) {
                warn!(
                    target: "hubcast::runtime",
                    id = %newest.id, error = %e,
                    "Failed to persist last seen id"
                );
            }
        }

        info!(
            target: "hubcast::runtime",
            sent = report.sent, skipped = report.skipped, failed = report.failed,
            last_seen_id = ?state.last_seen_id,
            "Cycle completed"
        );
        Ok(report)
    }

    /// Render and send one item. `Ok(false)` when the renderer skipped it.
    async fn dispatch(&self, item: &FeedItem) -> Result<bool, NotifyError> {
        let backfill = self.backfill(item).await;
        let Some(message) = render::render(item, &backfill) else {
            debug!(target: "hubcast::runtime", id = %item.id, kind = %item.kind, "Renderer skipped item");
            return Ok(false);
        };
        trace!(target: "hubcast::runtime", id = %item.id, title = %message.title, "Sending");
        self.notifier.send(&message).await?;
        Ok(true)
    }

    /// Fetch missing push commits. Failures degrade to an empty list, which
    /// makes the renderer fall back to a head-sha link.
    async fn backfill(&self, item: &FeedItem) -> Vec<crate::sources::CommitSummary> {
        let Payload::Push(push) = &item.payload else {
            return Vec::new();
        };
        let Some((before, head)) = push.backfill_range() else {
            return Vec::new();
        };
        match self
            .source
            .fetch_detail(&item.subject.repo_name, before, head)
            .await
        {
            Ok(commits) => commits,
            Err(e) => {
                warn!(
                    target: "hubcast::runtime",
                    id = %item.id, repo = %item.subject.repo_name, error = %e,
                    "Commit backfill failed; rendering without commit list"
                );
                Vec::new()
            }
        }
    }
}

/// Pick the items to dispatch, in send order.
///
/// Walks `items` (newest first) until `last_seen_id`, keeping allow-listed
/// kinds. A first run keeps only the newest match; a replay returns the
/// matches oldest first.
pub fn select_batch<'a>(
    items: &'a [FeedItem],
    last_seen_id: Option<&str>,
    allowed: &BTreeSet<EventKind>,
    mode: CycleMode,
) -> Vec<&'a FeedItem> {
    let mut fresh: Vec<&FeedItem> = items
        .iter()
        .take_while(|item| Some(item.id.as_str()) != last_seen_id)
        .filter(|item| item.event_kind().is_some_and(|k| allowed.contains(&k)))
        .collect();

    match mode {
        CycleMode::FirstRun => {
            fresh.truncate(1);
            fresh
        }
        CycleMode::Replay => {
            fresh.reverse();
            fresh
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::render::RenderedMessage;
    use crate::sources::CommitSummary;
    use crate::sources::feed_item::PushPayload;
    use crate::sources::feed_item::tests::make_item;
    use crate::state::MemoryStore;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Serves a fixed feed; `None` simulates suppression.
    struct FakeSource {
        feed: Mutex<Option<Vec<FeedItem>>>,
        detail: Vec<CommitSummary>,
        detail_calls: Mutex<usize>,
        fail: bool,
    }

    impl FakeSource {
        fn new(feed: Option<Vec<FeedItem>>) -> Self {
            Self {
                feed: Mutex::new(feed),
                detail: Vec::new(),
                detail_calls: Mutex::new(0),
                fail: false,
            }
        }
    }

    #[async_trait]
    impl ActivitySource for FakeSource {
        async fn fetch_activity(&self, _: &str) -> Result<Option<Vec<FeedItem>>, FetchError> {
            if self.fail {
                return Err(FetchError::Status {
                    status: 500,
                    url: "fake".into(),
                });
            }
            Ok(self.feed.lock().unwrap().clone())
        }

        async fn fetch_detail(
            &self,
            _: &str,
            _: &str,
            _: &str,
        ) -> Result<Vec<CommitSummary>, FetchError> {
            *self.detail_calls.lock().unwrap() += 1;
            Ok(self.detail.clone())
        }
    }

    /// Records sent titles and send instants; fails for titles listed in
    /// `reject`.
    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<RenderedMessage>>,
        sent_at: Mutex<Vec<tokio::time::Instant>>,
        reject: Vec<String>,
    }

    impl RecordingNotifier {
        fn titles(&self) -> Vec<String> {
            self.sent.lock().unwrap().iter().map(|m| m.title.clone()).collect()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, message: &RenderedMessage) -> Result<(), NotifyError> {
            if self.reject.contains(&message.title) {
                return Err(NotifyError::Rejected {
                    status: 400,
                    body: "bad embed".into(),
                });
            }
            self.sent.lock().unwrap().push(message.clone());
            self.sent_at.lock().unwrap().push(tokio::time::Instant::now());
            Ok(())
        }
    }

    /// A star on a repo named after the id, so titles identify items.
    fn star(id: &str) -> FeedItem {
        let mut item = make_item(id, Payload::Watch);
        item.subject.repo_name = format!("repo{id}");
        item
    }

    fn runtime(
        source: FakeSource,
        notifier: Arc<RecordingNotifier>,
        store: Arc<MemoryStore>,
    ) -> Runtime {
        Runtime::new(Arc::new(source), notifier, store, "octocat").with_send_delay(Duration::ZERO)
    }

    #[tokio::test]
    async fn first_run_sends_only_newest() {
        let feed = vec![star("5"), star("4"), star("3")];
        let notifier = Arc::new(RecordingNotifier::default());
        let store = Arc::new(MemoryStore::default());
        let rt = runtime(FakeSource::new(Some(feed)), notifier.clone(), store.clone());

        let mut state = PollState::default();
        let report = rt.run_cycle(&mut state).await.unwrap();

        assert_eq!(notifier.titles(), ["Starred repo5"]);
        assert_eq!(report.sent, 1);
        assert_eq!(state.last_seen_id.as_deref(), Some("5"));
        assert_eq!(store.load().unwrap().as_deref(), Some("5"));
    }

    #[tokio::test]
    async fn first_run_skips_newest_excluded_kind_but_advances_to_it() {
        let mut fork = make_item("6", Payload::Fork(Default::default()));
        fork.subject.repo_name = "repo6".into();
        let feed = vec![fork, star("5"), star("4")];
        let notifier = Arc::new(RecordingNotifier::default());
        let store = Arc::new(MemoryStore::default());
        let rt = runtime(FakeSource::new(Some(feed)), notifier.clone(), store.clone())
            .with_allowed([EventKind::Watch]);

        let mut state = PollState::default();
        rt.run_cycle(&mut state).await.unwrap();

        assert_eq!(notifier.titles(), ["Starred repo5"]);
        assert_eq!(state.last_seen_id.as_deref(), Some("6"));
        assert_eq!(store.load().unwrap().as_deref(), Some("6"));
    }

    #[tokio::test]
    async fn malformed_last_seen_entry_still_stops_replay() {
        use crate::sources::feed_item::parse_feed;
        use crate::sources::feed_item::tests::raw_event;
        use serde_json::json;

        let mut broken = raw_event("4", "WatchEvent", json!({}));
        broken["created_at"] = json!("not-a-date");
        let feed = parse_feed(json!([
            raw_event("5", "WatchEvent", json!({})),
            broken,
            raw_event("3", "WatchEvent", json!({})),
        ]))
        .unwrap();
        let notifier = Arc::new(RecordingNotifier::default());
        let rt = runtime(
            FakeSource::new(Some(feed)),
            notifier.clone(),
            Arc::new(MemoryStore::default()),
        );

        let mut state = PollState::new(Some("4".into()));
        rt.run_cycle(&mut state).await.unwrap();

        assert_eq!(notifier.titles(), ["Starred octocat/hello"]);
        assert_eq!(notifier.sent.lock().unwrap().len(), 1);
        assert_eq!(state.last_seen_id.as_deref(), Some("5"));
    }

    #[tokio::test(start_paused = true)]
    async fn replay_paces_sends() {
        let feed = vec![star("4"), star("3"), star("2"), star("1")];
        let notifier = Arc::new(RecordingNotifier::default());
        let rt = Runtime::new(
            Arc::new(FakeSource::new(Some(feed))),
            notifier.clone(),
            Arc::new(MemoryStore::default()),
            "octocat",
        );

        let started = tokio::time::Instant::now();
        let mut state = PollState::new(Some("1".into()));
        rt.run_cycle(&mut state).await.unwrap();

        let sent_at = notifier.sent_at.lock().unwrap().clone();
        assert_eq!(sent_at.len(), 3);
        assert_eq!(sent_at[0], started);
        for pair in sent_at.windows(2) {
            let gap = pair[1] - pair[0];
            assert!(gap >= DEFAULT_SEND_DELAY, "gap {gap:?} shorter than send delay");
            assert!(gap < DEFAULT_SEND_DELAY + Duration::from_millis(10), "gap {gap:?}");
        }
    }

    #[tokio::test]
    async fn replay_sends_chronologically() {
        let feed = vec![star("5"), star("4"), star("3")];
        let notifier = Arc::new(RecordingNotifier::default());
        let store = Arc::new(MemoryStore::default());
        let rt = runtime(FakeSource::new(Some(feed)), notifier.clone(), store);

        let mut state = PollState::new(Some("3".into()));
        rt.run_cycle(&mut state).await.unwrap();

        assert_eq!(notifier.titles(), ["Starred repo4", "Starred repo5"]);
        assert_eq!(state.last_seen_id.as_deref(), Some("5"));
    }

    #[tokio::test]
    async fn second_cycle_on_unchanged_feed_sends_nothing() {
        let feed = vec![star("5"), star("4"), star("3")];
        let notifier = Arc::new(RecordingNotifier::default());
        let store = Arc::new(MemoryStore::default());
        let rt = runtime(FakeSource::new(Some(feed)), notifier.clone(), store);

        let mut state = PollState::new(Some("3".into()));
        rt.run_cycle(&mut state).await.unwrap();
        let report = rt.run_cycle(&mut state).await.unwrap();

        assert_eq!(report.selected, 0);
        assert_eq!(report.sent, 0);
        assert_eq!(notifier.titles().len(), 2);
        assert_eq!(state.last_seen_id.as_deref(), Some("5"));
    }

    #[tokio::test]
    async fn excluded_kind_is_skipped_but_advances_id() {
        let mut fork = make_item("6", Payload::Fork(Default::default()));
        fork.subject.repo_name = "repo6".into();
        let feed = vec![fork, star("5"), star("4")];
        let notifier = Arc::new(RecordingNotifier::default());
        let store = Arc::new(MemoryStore::default());
        let rt = runtime(FakeSource::new(Some(feed)), notifier.clone(), store.clone())
            .with_allowed([EventKind::Watch]);

        let mut state = PollState::new(Some("4".into()));
        rt.run_cycle(&mut state).await.unwrap();

        assert_eq!(notifier.titles(), ["Starred repo5"]);
        assert_eq!(state.last_seen_id.as_deref(), Some("6"));
        assert_eq!(store.load().unwrap().as_deref(), Some("6"));
    }

    #[tokio::test]
    async fn unknown_kind_is_not_sent_but_advances_id() {
        let feed = vec![make_item("9", Payload::Unrecognized), star("8")];
        let notifier = Arc::new(RecordingNotifier::default());
        let store = Arc::new(MemoryStore::default());
        let rt = runtime(FakeSource::new(Some(feed)), notifier.clone(), store);

        let mut state = PollState::new(Some("8".into()));
        let report = rt.run_cycle(&mut state).await.unwrap();

        assert!(notifier.titles().is_empty());
        assert_eq!(report.selected, 0);
        assert_eq!(state.last_seen_id.as_deref(), Some("9"));
    }

    #[tokio::test]
    async fn suppressed_fetch_changes_nothing() {
        let notifier = Arc::new(RecordingNotifier::default());
        let store = Arc::new(MemoryStore::default());
        let rt = runtime(FakeSource::new(None), notifier.clone(), store.clone());

        let mut state = PollState::new(Some("1".into()));
        let report = rt.run_cycle(&mut state).await.unwrap();

        assert!(report.suppressed);
        assert_eq!(state.last_seen_id.as_deref(), Some("1"));
        assert_eq!(store.load().unwrap(), None);
    }

    #[tokio::test]
    async fn empty_feed_keeps_state() {
        let notifier = Arc::new(RecordingNotifier::default());
        let store = Arc::new(MemoryStore::default());
        let rt = runtime(FakeSource::new(Some(vec![])), notifier, store.clone());

        let mut state = PollState::default();
        let report = rt.run_cycle(&mut state).await.unwrap();

        assert_eq!(report.advanced_to, None);
        assert!(state.is_cold());
        assert_eq!(store.load().unwrap(), None);
    }

    #[tokio::test]
    async fn fetch_failure_propagates_without_state_change() {
        let mut source = FakeSource::new(Some(vec![star("2")]));
        source.fail = true;
        let notifier = Arc::new(RecordingNotifier::default());
        let rt = runtime(source, notifier, Arc::new(MemoryStore::default()));

        let mut state = PollState::new(Some("1".into()));
        assert!(rt.run_cycle(&mut state).await.is_err());
        assert_eq!(state.last_seen_id.as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn send_failure_does_not_abort_batch() {
        let feed = vec![star("4"), star("3"), star("2")];
        let notifier = Arc::new(RecordingNotifier {
            reject: vec!["Starred repo3".into()],
            ..Default::default()
        });
        let store = Arc::new(MemoryStore::default());
        let rt = runtime(FakeSource::new(Some(feed)), notifier.clone(), store.clone());

        let mut state = PollState::new(Some("2".into()));
        let report = rt.run_cycle(&mut state).await.unwrap();

        assert_eq!(notifier.titles(), ["Starred repo4"]);
        assert_eq!(report.failed, 1);
        assert_eq!(store.load().unwrap().as_deref(), Some("4"));
    }

    #[tokio::test]
    async fn unseen_last_id_replays_whole_page() {
        let feed = vec![star("7"), star("6")];
        let notifier = Arc::new(RecordingNotifier::default());
        let rt = runtime(
            FakeSource::new(Some(feed)),
            notifier.clone(),
            Arc::new(MemoryStore::default()),
        );

        let mut state = PollState::new(Some("1".into()));
        rt.run_cycle(&mut state).await.unwrap();

        assert_eq!(notifier.titles(), ["Starred repo6", "Starred repo7"]);
    }

    #[tokio::test]
    async fn push_without_commits_is_backfilled() {
        let push = make_item(
            "2",
            Payload::Push(PushPayload {
                git_ref: Some("refs/heads/main".into()),
                before: Some("aaaaaaaa".into()),
                head: Some("bbbbbbbb".into()),
                ..Default::default()
            }),
        );
        let mut source = FakeSource::new(Some(vec![push]));
        source.detail = vec![
            CommitSummary {
                sha: "c1c1c1c1".into(),
                message: "one".into(),
            },
            CommitSummary {
                sha: "c2c2c2c2".into(),
                message: "two".into(),
            },
        ];
        let source = Arc::new(source);
        let notifier = Arc::new(RecordingNotifier::default());
        let rt = Runtime::new(
            source.clone(),
            notifier.clone(),
            Arc::new(MemoryStore::default()),
            "octocat",
        )
        .with_send_delay(Duration::ZERO);

        let mut state = PollState::new(Some("1".into()));
        rt.run_cycle(&mut state).await.unwrap();

        assert_eq!(*source.detail_calls.lock().unwrap(), 1);
        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent[0].title, "Pushed 2 commits to octocat/hello/main");
        assert_eq!(sent[0].description.as_deref().unwrap().lines().count(), 2);
    }

    #[test]
    fn select_batch_stops_at_last_seen() {
        let items = vec![star("5"), star("4"), star("3"), star("2")];
        let all: BTreeSet<_> = EventKind::ALL.into_iter().collect();

        let ids = |batch: Vec<&FeedItem>| -> Vec<String> {
            batch.into_iter().map(|i| i.id.clone()).collect()
        };
        assert_eq!(
            ids(select_batch(&items, Some("3"), &all, CycleMode::Replay)),
            ["4", "5"]
        );
        assert_eq!(
            ids(select_batch(&items, None, &all, CycleMode::FirstRun)),
            ["5"]
        );
        assert!(select_batch(&items, Some("5"), &all, CycleMode::Replay).is_empty());
    }
}
