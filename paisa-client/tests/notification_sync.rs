//! Notification synchronizer behavior against the in-memory gateway:
//! once-per-id desktop notifications, suppression, and bulk actions.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use async_trait::async_trait;
use paisa_client::{
    api::WalletApi,
    ports::{AlertKind, AlertSink, ConfirmationPort, DesktopNotification, DesktopNotifier,
        Navigator},
    store::ClientStore,
    sync::NotificationSync,
};
use paisa_core::NotificationCategory;
use paisa_gateway::AppState;
use tokio::{net::TcpListener, sync::watch};

#[derive(Clone, Default)]
struct RecordingAlerts {
    messages: Arc<Mutex<Vec<(AlertKind, String)>>>,
}

impl AlertSink for RecordingAlerts {
    fn alert(&self, kind: AlertKind, message: &str) {
        self.messages.lock().unwrap().push((kind, message.to_owned()));
    }
}

struct ScriptedConfirm(bool);

#[async_trait]
impl ConfirmationPort for ScriptedConfirm {
    async fn confirm(&self, _prompt: &str) -> bool {
        self.0
    }
}

#[derive(Clone, Default)]
struct RecordingNotifier {
    raised: Arc<Mutex<Vec<DesktopNotification>>>,
}

impl RecordingNotifier {
    fn count(&self) -> usize {
        self.raised.lock().unwrap().len()
    }
}

impl DesktopNotifier for RecordingNotifier {
    fn notify(&self, notification: DesktopNotification) {
        self.raised.lock().unwrap().push(notification);
    }
}

#[derive(Clone, Default)]
struct FakeNavigator {
    logouts: Arc<AtomicUsize>,
}

impl Navigator for FakeNavigator {
    fn current_route(&self) -> String {
        "/notifications".to_owned()
    }

    fn force_logout(&self) {
        self.logouts.fetch_add(1, Ordering::SeqCst);
    }

    fn open_or_focus(&self, _route: &str) {}
}

async fn spawn_gateway(state: AppState) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = paisa_gateway::serve(listener, state).await;
    });
    format!("http://{addr}")
}

fn sync_with(
    base: &str,
    store: ClientStore,
    confirm: bool,
    notifier: RecordingNotifier,
) -> (
    NotificationSync<ScriptedConfirm, RecordingNotifier, FakeNavigator, RecordingAlerts>,
    watch::Receiver<u64>,
) {
    NotificationSync::new(
        WalletApi::new(base).expect("client"),
        store,
        ScriptedConfirm(confirm),
        notifier,
        FakeNavigator::default(),
        RecordingAlerts::default(),
    )
}

#[tokio::test]
async fn each_notification_is_raised_exactly_once() {
    let state = AppState::new();
    let base = spawn_gateway(state.clone()).await;
    let dir = tempfile::tempdir().expect("tempdir");
    let store = ClientStore::open(dir.path().join("state.json"));

    let notifier = RecordingNotifier::default();
    let (mut sync, mut badge) = sync_with(&base, store, true, notifier.clone());

    state
        .push_notification("Money Received", "₹100.00 from Meera", NotificationCategory::Success)
        .await;
    sync.poll_once().await.expect("poll");
    assert_eq!(notifier.count(), 1);
    assert_eq!(*badge.borrow_and_update(), 1);

    // The same notification is still unread on the next poll.
    sync.poll_once().await.expect("poll again");
    assert_eq!(notifier.count(), 1);
}

#[tokio::test]
async fn dedup_mark_survives_restart() {
    let state = AppState::new();
    let base = spawn_gateway(state.clone()).await;
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("state.json");

    state
        .push_notification("Login Alert", "new device", NotificationCategory::Warning)
        .await;

    let notifier = RecordingNotifier::default();
    let (mut sync, _badge) = sync_with(
        &base,
        ClientStore::open(&path),
        true,
        notifier.clone(),
    );
    sync.poll_once().await.expect("poll");
    assert_eq!(notifier.count(), 1);
    drop(sync);

    // Fresh synchronizer over the same persisted state.
    let (mut sync, _badge) = sync_with(
        &base,
        ClientStore::open(&path),
        true,
        notifier.clone(),
    );
    sync.poll_once().await.expect("poll after restart");
    assert_eq!(notifier.count(), 1);
}

#[tokio::test]
async fn an_older_unread_never_reraises_after_a_newer_one() {
    let state = AppState::new();
    let base = spawn_gateway(state.clone()).await;
    let dir = tempfile::tempdir().expect("tempdir");
    let store = ClientStore::open(dir.path().join("state.json"));

    state
        .push_notification("First", "older", NotificationCategory::Info)
        .await;
    let newer = state
        .push_notification("Second", "newer", NotificationCategory::Info)
        .await;

    let notifier = RecordingNotifier::default();
    let (mut sync, _badge) = sync_with(&base, store, true, notifier.clone());
    sync.poll_once().await.expect("poll");
    assert_eq!(notifier.count(), 1);
    assert_eq!(notifier.raised.lock().unwrap()[0].title, "Second");

    // Reading the newer one makes the older one the newest unread again;
    // the mark only moves forward, so nothing is raised.
    sync.mark_read_one(newer).await.expect("mark read");
    sync.poll_once().await.expect("poll older");
    assert_eq!(notifier.count(), 1);
}

#[tokio::test]
async fn viewing_the_list_suppresses_but_still_advances_the_mark() {
    let state = AppState::new();
    let base = spawn_gateway(state.clone()).await;
    let dir = tempfile::tempdir().expect("tempdir");
    let store = ClientStore::open(dir.path().join("state.json"));

    let notifier = RecordingNotifier::default();
    let (mut sync, _badge) = sync_with(&base, store, true, notifier.clone());

    state
        .push_notification("Money Received", "₹50.00", NotificationCategory::Success)
        .await;
    sync.set_viewing_list(true);
    sync.poll_once().await.expect("poll");
    assert_eq!(notifier.count(), 0);

    // Leaving the list does not resurrect the suppressed notification.
    sync.set_viewing_list(false);
    sync.poll_once().await.expect("poll after leaving");
    assert_eq!(notifier.count(), 0);
}

#[tokio::test]
async fn a_rejected_session_alerts_and_requests_logout() {
    let state = AppState::with_session_token("secret");
    let base = spawn_gateway(state).await;
    let dir = tempfile::tempdir().expect("tempdir");
    let store = ClientStore::open(dir.path().join("state.json"));

    let navigator = FakeNavigator::default();
    let alerts = RecordingAlerts::default();
    let (mut sync, _badge) = NotificationSync::new(
        WalletApi::new(&base).expect("client"),
        store,
        ScriptedConfirm(true),
        RecordingNotifier::default(),
        navigator.clone(),
        alerts.clone(),
    );

    let (_vis_tx, vis_rx) = watch::channel(false);
    // The startup poll gets the 401 and the loop ends on its own.
    sync.run(Duration::from_secs(300), vis_rx).await;

    let messages = alerts.messages.lock().unwrap();
    assert!(!messages.is_empty());
    assert_eq!(messages[0].1, "Session expired. Please login again.");
    assert_eq!(messages[0].0, AlertKind::Error);

    drop(messages);
    wait_until(|| {
        let navigator = navigator.clone();
        async move { navigator.logouts.load(Ordering::SeqCst) == 1 }
    })
    .await;
}

#[tokio::test]
async fn bulk_delete_joins_all_requests_then_reconciles_once() {
    let state = AppState::new();
    let base = spawn_gateway(state.clone()).await;
    let dir = tempfile::tempdir().expect("tempdir");
    let store = ClientStore::open(dir.path().join("state.json"));

    // One slow delete among fast ones: reconciliation must still wait for
    // the straggler.
    let slow_delay = Duration::from_millis(150);
    let mut ids = Vec::new();
    for i in 0..3 {
        let id = state
            .push_notification(&format!("Item {i}"), "body", NotificationCategory::Info)
            .await;
        ids.push(id);
    }
    state
        .set_latency(&format!("DELETE /api/notifications/{}", ids[0]), slow_delay)
        .await;

    let notifier = RecordingNotifier::default();
    let (mut sync, mut badge) = sync_with(&base, store, true, notifier);
    for &id in &ids {
        sync.select(id);
    }

    let started = Instant::now();
    let outcome = sync
        .bulk_delete()
        .await
        .expect("bulk delete")
        .expect("confirmed");
    let elapsed = started.elapsed();

    assert_eq!(outcome.attempted, 3);
    assert_eq!(outcome.failed, 0);
    assert!(sync.selection().is_empty());
    assert_eq!(*badge.borrow_and_update(), 0);
    assert!(state.notifications().await.is_empty());

    // The join waited for the slow delete; the fast ones ran alongside it.
    assert!(elapsed >= slow_delay, "elapsed {elapsed:?}");
    assert!(elapsed < slow_delay * 3, "elapsed {elapsed:?}");

    // Every delete was issued before the single badge reconciliation.
    let log = state.request_log().await;
    let count_pos = log
        .iter()
        .position(|op| op == "GET /api/notifications/count")
        .expect("badge refresh");
    let delete_ops = log
        .iter()
        .take(count_pos)
        .filter(|op| op.starts_with("DELETE /api/notifications/"))
        .count();
    assert_eq!(delete_ops, 3);
    assert_eq!(log.iter().filter(|op| *op == "GET /api/notifications/count").count(), 1);
}

#[tokio::test]
async fn regaining_visibility_polls_without_waiting_for_the_interval() {
    let state = AppState::new();
    let base = spawn_gateway(state.clone()).await;
    let dir = tempfile::tempdir().expect("tempdir");
    let store = ClientStore::open(dir.path().join("state.json"));

    let notifier = RecordingNotifier::default();
    let (mut sync, _badge) = sync_with(&base, store, true, notifier.clone());

    let (vis_tx, vis_rx) = watch::channel(false);
    let handle = tokio::spawn(async move {
        // Interval far beyond the test horizon; only the visibility edge can
        // trigger the second poll.
        sync.run(Duration::from_secs(300), vis_rx).await;
    });

    // Let the startup poll land before creating anything new.
    wait_until(|| {
        let state = state.clone();
        async move { !state.request_log().await.is_empty() }
    })
    .await;

    state
        .push_notification("Money Received", "₹75.00", NotificationCategory::Success)
        .await;
    vis_tx.send(true).expect("visibility");

    wait_until(|| {
        let notifier = notifier.clone();
        async move { notifier.count() == 1 }
    })
    .await;

    drop(vis_tx);
    handle.await.expect("run loop");
}

async fn wait_until<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..500 {
        if condition().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}

#[tokio::test]
async fn declined_bulk_delete_touches_nothing() {
    let state = AppState::new();
    let base = spawn_gateway(state.clone()).await;
    let dir = tempfile::tempdir().expect("tempdir");
    let store = ClientStore::open(dir.path().join("state.json"));

    let id = state
        .push_notification("Keep me", "body", NotificationCategory::Info)
        .await;

    let notifier = RecordingNotifier::default();
    let (mut sync, _badge) = sync_with(&base, store, false, notifier);
    sync.select(id);

    let outcome = sync.bulk_delete().await.expect("bulk delete");
    assert!(outcome.is_none());
    assert_eq!(state.notifications().await.len(), 1);
    assert!(state.request_log().await.is_empty());
}

#[tokio::test]
async fn bulk_mark_read_reports_partial_failures() {
    let state = AppState::new();
    let base = spawn_gateway(state.clone()).await;
    let dir = tempfile::tempdir().expect("tempdir");
    let store = ClientStore::open(dir.path().join("state.json"));

    let real = state
        .push_notification("Real", "body", NotificationCategory::Info)
        .await;

    let notifier = RecordingNotifier::default();
    let (mut sync, _badge) = sync_with(&base, store, true, notifier);
    sync.select(real);
    sync.select(9_999); // Never existed on the server.

    let outcome = sync.bulk_mark_read().await.expect("bulk mark read");
    assert_eq!(outcome.attempted, 2);
    assert_eq!(outcome.failed, 1);
    assert!(sync.selection().is_empty());
    assert!(state.notifications().await[0].is_read);
}
