//! Notification synchronizer: polls the server for fresh notifications,
//! raises at most one desktop notification per server id across restarts, and
//! runs the list-management actions (single and bulk) against the server.

use std::collections::HashSet;
use std::time::Duration;

use futures::future::join_all;
use paisa_core::{NotificationId, NotificationRecord};
use serde_json::json;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::{
    api::{ApiError, WalletApi},
    ports::{AlertKind, AlertSink, ConfirmationPort, DesktopNotification, DesktopNotifier,
        Navigator, NotificationAction},
    session::{LOGOUT_REDIRECT_DELAY, schedule_forced_logout},
    store::ClientStore,
};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);
pub const NOTIFICATION_TAG: &str = "paisa-notification";

/// Result of a bulk action: how many ids were attempted and how many the
/// server rejected. Partial failure is reported, not rolled back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkOutcome {
    pub attempted: usize,
    pub failed: usize,
}

pub struct NotificationSync<C, D, N, A> {
    api: WalletApi,
    store: ClientStore,
    confirm: C,
    notifier: D,
    navigator: N,
    alerts: A,
    selection: HashSet<NotificationId>,
    viewing_list: bool,
    badge_tx: watch::Sender<u64>,
}

impl<C, D, N, A> NotificationSync<C, D, N, A>
where
    C: ConfirmationPort,
    D: DesktopNotifier,
    N: Navigator + Clone + 'static,
    A: AlertSink,
{
    /// Build the synchronizer plus the badge receiver the host renders from.
    pub fn new(
        api: WalletApi,
        store: ClientStore,
        confirm: C,
        notifier: D,
        navigator: N,
        alerts: A,
    ) -> (Self, watch::Receiver<u64>) {
        let (badge_tx, badge_rx) = watch::channel(0);
        (
            Self {
                api,
                store,
                confirm,
                notifier,
                navigator,
                alerts,
                selection: HashSet::new(),
                viewing_list: false,
                badge_tx,
            },
            badge_rx,
        )
    }

    /// While the user is on the notification list itself, desktop
    /// notifications are suppressed (the dedup mark still advances).
    pub fn set_viewing_list(&mut self, viewing: bool) {
        self.viewing_list = viewing;
    }

    /// One poll cycle: fetch the newest unread notification, raise it if it
    /// has not been shown before, then refresh the badge.
    pub async fn poll_once(&mut self) -> Result<(), ApiError> {
        let newest = self.api.notifications(true, Some(1)).await?;
        if let Some(record) = newest.first() {
            if self.store.advance_last_shown(record.id) {
                if self.viewing_list {
                    debug!(id = record.id, "notification suppressed while list is open");
                } else {
                    self.notifier.notify(desktop_notification(record));
                }
            }
        }
        self.refresh_badge().await;
        Ok(())
    }

    /// Long-running poll loop. Polls on the interval and immediately whenever
    /// the app regains visibility; ends when the session is rejected or the
    /// visibility channel closes.
    pub async fn run(&mut self, poll_interval: Duration, mut visibility: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = visibility.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    if !*visibility.borrow() {
                        continue;
                    }
                    debug!("visibility regained, polling immediately");
                }
            }

            match self.poll_once().await {
                Ok(()) => {}
                Err(ApiError::Unauthorized) => {
                    info!("notification polling stopped, session rejected");
                    self.alerts
                        .alert(AlertKind::Error, "Session expired. Please login again.");
                    schedule_forced_logout(&self.navigator, LOGOUT_REDIRECT_DELAY);
                    break;
                }
                Err(err) => {
                    // Transient failures wait for the next tick.
                    warn!("notification poll failed: {err}");
                }
            }
        }
    }

    pub fn select(&mut self, id: NotificationId) {
        self.selection.insert(id);
    }

    pub fn deselect(&mut self, id: NotificationId) {
        self.selection.remove(&id);
    }

    pub fn select_all(&mut self, records: &[NotificationRecord]) {
        self.selection.extend(records.iter().map(|r| r.id));
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    pub fn selection(&self) -> &HashSet<NotificationId> {
        &self.selection
    }

    /// Mark one notification read and refresh the badge from the server's
    /// answer immediately.
    pub async fn mark_read_one(&mut self, id: NotificationId) -> Result<(), ApiError> {
        let unread = self.api.mark_read(id).await?;
        let _ = self.badge_tx.send(unread);
        Ok(())
    }

    /// Delete one notification, behind a confirmation.
    pub async fn delete_one(&mut self, id: NotificationId) -> Result<bool, ApiError> {
        if !self
            .confirm
            .confirm("Delete this notification?")
            .await
        {
            return Ok(false);
        }
        let unread = self.api.delete_notification(id).await?;
        self.selection.remove(&id);
        let _ = self.badge_tx.send(unread);
        Ok(true)
    }

    pub async fn mark_all_read(&mut self) -> Result<bool, ApiError> {
        if !self
            .confirm
            .confirm("Mark all notifications as read?")
            .await
        {
            return Ok(false);
        }
        let unread = self.api.mark_all_read().await?;
        let _ = self.badge_tx.send(unread);
        Ok(true)
    }

    pub async fn delete_read(&mut self) -> Result<bool, ApiError> {
        if !self
            .confirm
            .confirm("Delete all read notifications?")
            .await
        {
            return Ok(false);
        }
        let unread = self.api.delete_read().await?;
        let _ = self.badge_tx.send(unread);
        Ok(true)
    }

    /// Mark every selected notification read. All requests are issued
    /// together and the outcome is reconciled once they have all settled.
    pub async fn bulk_mark_read(&mut self) -> Result<BulkOutcome, ApiError> {
        let ids: Vec<NotificationId> = self.selection.iter().copied().collect();
        let outcome = self
            .settle_bulk(ids, |api, id| async move { api.mark_read(id).await.map(|_| ()) })
            .await;
        self.selection.clear();
        self.refresh_badge().await;
        Ok(outcome)
    }

    /// Delete every selected notification, behind a confirmation. `None`
    /// means the user backed out.
    pub async fn bulk_delete(&mut self) -> Result<Option<BulkOutcome>, ApiError> {
        let count = self.selection.len();
        if count == 0 {
            return Ok(Some(BulkOutcome {
                attempted: 0,
                failed: 0,
            }));
        }
        let prompt =
            format!("Delete {count} selected notifications? This cannot be undone.");
        if !self.confirm.confirm(&prompt).await {
            return Ok(None);
        }

        let ids: Vec<NotificationId> = self.selection.iter().copied().collect();
        let outcome = self
            .settle_bulk(ids, |api, id| async move {
                api.delete_notification(id).await.map(|_| ())
            })
            .await;
        self.selection.clear();
        self.refresh_badge().await;
        Ok(Some(outcome))
    }

    async fn settle_bulk<F, Fut>(&self, ids: Vec<NotificationId>, op: F) -> BulkOutcome
    where
        F: Fn(WalletApi, NotificationId) -> Fut,
        Fut: std::future::Future<Output = Result<(), ApiError>>,
    {
        let attempted = ids.len();
        let results = join_all(ids.iter().map(|&id| op(self.api.clone(), id))).await;

        let mut failed = 0;
        for (id, result) in ids.iter().zip(results) {
            if let Err(err) = result {
                failed += 1;
                warn!(id, "bulk notification action failed: {err}");
            }
        }
        if failed > 0 {
            self.alerts.alert(
                AlertKind::Warning,
                &format!("{failed} of {attempted} notifications could not be updated"),
            );
        }
        BulkOutcome { attempted, failed }
    }

    async fn refresh_badge(&self) {
        match self.api.notification_count().await {
            Ok(count) => {
                let _ = self.badge_tx.send(count);
            }
            Err(err) => {
                warn!("badge refresh failed: {err}");
            }
        }
    }
}

fn desktop_notification(record: &NotificationRecord) -> DesktopNotification {
    DesktopNotification {
        title: record.title.clone(),
        body: record.message.clone(),
        tag: NOTIFICATION_TAG.to_owned(),
        data: json!({ "id": record.id }),
        actions: vec![NotificationAction::View, NotificationAction::Dismiss],
    }
}
