//! Inactivity guard. After a quiet period the user gets one warning; if the
//! grace window also passes without activity, the session is force-ended.
//! Screens reachable before authentication are never logged out from.

use std::time::Duration;

use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
    time::sleep,
};
use tracing::{debug, info};

use crate::ports::{AlertKind, AlertSink, Navigator};

pub const IDLE_WARNING_AFTER: Duration = Duration::from_secs(14 * 60);
pub const LOGOUT_GRACE: Duration = Duration::from_secs(60);

/// Delay between surfacing an authorization failure and the forced
/// navigation, so the message is on screen before the page changes.
pub const LOGOUT_REDIRECT_DELAY: Duration = Duration::from_secs(2);

/// Routes reachable without an authenticated session.
pub const PRE_AUTH_ROUTES: &[&str] = &["/", "/pin-entry", "/pin-setup"];

/// Schedule a forced logout after `delay`. The caller alerts first; the
/// navigation happens off-task so control returns to the user immediately.
pub fn schedule_forced_logout<N>(navigator: &N, delay: Duration)
where
    N: Navigator + Clone + 'static,
{
    let navigator = navigator.clone();
    tokio::spawn(async move {
        sleep(delay).await;
        navigator.force_logout();
    });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardPhase {
    Active,
    WarningIssued,
    Expired,
}

/// Cheap handle for reporting user activity into the guard loop.
#[derive(Debug, Clone)]
pub struct ActivityHandle {
    tx: mpsc::UnboundedSender<()>,
}

impl ActivityHandle {
    pub fn record_activity(&self) {
        let _ = self.tx.send(());
    }
}

pub struct SessionGuard<N, A> {
    navigator: N,
    alerts: A,
    warn_after: Duration,
    grace: Duration,
}

impl<N, A> SessionGuard<N, A>
where
    N: Navigator + 'static,
    A: AlertSink + 'static,
{
    pub fn new(navigator: N, alerts: A) -> Self {
        Self::with_timing(navigator, alerts, IDLE_WARNING_AFTER, LOGOUT_GRACE)
    }

    /// Timing knob for hosts that want different windows.
    pub fn with_timing(navigator: N, alerts: A, warn_after: Duration, grace: Duration) -> Self {
        Self {
            navigator,
            alerts,
            warn_after,
            grace,
        }
    }

    /// Start the guard loop. The watch channel publishes phase changes; the
    /// loop ends when every [`ActivityHandle`] is dropped or the session
    /// expires.
    pub fn spawn(self) -> (ActivityHandle, watch::Receiver<GuardPhase>, JoinHandle<()>) {
        let (activity_tx, mut activity_rx) = mpsc::unbounded_channel::<()>();
        let (phase_tx, phase_rx) = watch::channel(GuardPhase::Active);

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    activity = activity_rx.recv() => {
                        if activity.is_none() {
                            break;
                        }
                        // Quiet timer restarts on the next loop iteration.
                    }
                    () = sleep(self.warn_after) => {
                        self.alerts.alert(
                            AlertKind::Warning,
                            "Session will expire in 1 minute due to inactivity",
                        );
                        let _ = phase_tx.send(GuardPhase::WarningIssued);

                        tokio::select! {
                            activity = activity_rx.recv() => {
                                if activity.is_none() {
                                    break;
                                }
                                let _ = phase_tx.send(GuardPhase::Active);
                            }
                            () = sleep(self.grace) => {
                                let route = self.navigator.current_route();
                                if PRE_AUTH_ROUTES.contains(&route.as_str()) {
                                    // Nothing to end here. Hold until the user
                                    // comes back rather than warn in a loop.
                                    debug!(%route, "idle timeout on pre-auth route, holding");
                                    let _ = phase_tx.send(GuardPhase::Active);
                                    if activity_rx.recv().await.is_none() {
                                        break;
                                    }
                                    continue;
                                }

                                info!(%route, "idle session expired");
                                self.alerts.alert(
                                    AlertKind::Error,
                                    "Session expired. Please login again.",
                                );
                                self.navigator.force_logout();
                                let _ = phase_tx.send(GuardPhase::Expired);
                                break;
                            }
                        }
                    }
                }
            }
        });

        (ActivityHandle { tx: activity_tx }, phase_rx, handle)
    }
}
