//! Background-worker counterpart: versioned asset cache with cache-first
//! reads, push payload handling, and notification action routing.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
    api::{ApiError, WalletApi},
    ports::{DesktopNotification, DesktopNotifier, Navigator, NotificationAction},
};

pub const CACHE_VERSION: &str = "paisa-static-v1";

/// Assets fetched ahead of time so the shell renders offline.
pub const STATIC_ASSETS: &[&str] = &[
    "/",
    "/static/css/app.css",
    "/static/js/app.js",
    "/static/js/notifications.js",
    "/static/icons/icon-192.png",
    "/static/icons/icon-512.png",
    "/static/manifest.json",
];

/// Versioned asset store. Reads are cache-first; a network fallback serves
/// the response but never populates the cache, so cached content only ever
/// comes from an explicit precache.
pub struct AssetCache {
    api: WalletApi,
    version: String,
    caches: HashMap<String, HashMap<String, Vec<u8>>>,
}

impl AssetCache {
    pub fn new(api: WalletApi) -> Self {
        Self {
            api,
            version: CACHE_VERSION.to_owned(),
            caches: HashMap::new(),
        }
    }

    /// Fetch every static asset into the current version's cache. A single
    /// failed asset fails the whole precache, matching install semantics.
    pub async fn precache(&mut self) -> Result<(), ApiError> {
        let mut entries = HashMap::new();
        for path in STATIC_ASSETS {
            let bytes = self.api.fetch_asset(path).await?;
            entries.insert((*path).to_owned(), bytes);
        }
        info!(version = %self.version, assets = entries.len(), "static assets cached");
        self.caches.insert(self.version.clone(), entries);
        Ok(())
    }

    /// Serve `path` from the current cache, falling back to the network on a
    /// miss.
    pub async fn fetch(&self, path: &str) -> Result<Vec<u8>, ApiError> {
        if let Some(bytes) = self
            .caches
            .get(&self.version)
            .and_then(|entries| entries.get(path))
        {
            debug!(%path, "asset served from cache");
            return Ok(bytes.clone());
        }
        self.api.fetch_asset(path).await
    }

    /// Drop every cache belonging to another version.
    pub fn activate(&mut self) {
        let current = self.version.clone();
        self.caches.retain(|version, _| {
            if *version == current {
                true
            } else {
                info!(%version, "stale asset cache dropped");
                false
            }
        });
    }

    pub fn cached_versions(&self) -> Vec<String> {
        self.caches.keys().cloned().collect()
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PushPayload {
    #[serde(default = "default_push_title")]
    pub title: String,
    #[serde(default)]
    pub body: String,
    #[serde(default = "default_push_tag")]
    pub tag: String,
    #[serde(default)]
    pub data: Value,
}

fn default_push_title() -> String {
    "Paisa".to_owned()
}

fn default_push_tag() -> String {
    "paisa-notification".to_owned()
}

/// Decode a push message. Non-JSON payloads become the notification body
/// under the default title rather than being dropped.
pub fn parse_push_payload(bytes: &[u8]) -> PushPayload {
    match serde_json::from_slice(bytes) {
        Ok(payload) => payload,
        Err(err) => {
            debug!("push payload is not JSON, using text body: {err}");
            PushPayload {
                title: default_push_title(),
                body: String::from_utf8_lossy(bytes).into_owned(),
                tag: default_push_tag(),
                data: Value::Null,
            }
        }
    }
}

/// Raise a desktop notification for an incoming push message.
pub fn handle_push(notifier: &dyn DesktopNotifier, bytes: &[u8]) {
    let payload = parse_push_payload(bytes);
    notifier.notify(DesktopNotification {
        title: payload.title,
        body: payload.body,
        tag: payload.tag,
        data: payload.data,
        actions: vec![NotificationAction::View, NotificationAction::Dismiss],
    });
}

/// Route a click on a notification action. View opens (or focuses) the app;
/// Dismiss needs nothing beyond closing the notification.
pub fn handle_notification_action(navigator: &dyn Navigator, action: NotificationAction) {
    match action {
        NotificationAction::View => navigator.open_or_focus("/"),
        NotificationAction::Dismiss => {}
    }
}

/// Extension point for replaying queued work once connectivity returns.
/// Nothing is queued today.
pub async fn sync_notifications() {
    warn!("notification replay requested but no work is queued");
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use serde_json::json;

    #[derive(Clone, Default)]
    struct RecordingNotifier {
        raised: Arc<Mutex<Vec<DesktopNotification>>>,
    }

    impl DesktopNotifier for RecordingNotifier {
        fn notify(&self, notification: DesktopNotification) {
            self.raised.lock().unwrap().push(notification);
        }
    }

    #[test]
    fn push_payload_parses_json() {
        let bytes = serde_json::to_vec(&json!({
            "title": "Money Received",
            "body": "₹500.00 from Meera",
            "tag": "payment",
            "data": { "id": 12 }
        }))
        .unwrap();
        let payload = parse_push_payload(&bytes);
        assert_eq!(payload.title, "Money Received");
        assert_eq!(payload.tag, "payment");
        assert_eq!(payload.data["id"], 12);
    }

    #[test]
    fn push_payload_falls_back_to_text() {
        let payload = parse_push_payload(b"server maintenance at midnight");
        assert_eq!(payload.title, "Paisa");
        assert_eq!(payload.body, "server maintenance at midnight");
        assert_eq!(payload.tag, "paisa-notification");
    }

    #[test]
    fn push_payload_fills_missing_fields() {
        let payload = parse_push_payload(br#"{"body":"hello"}"#);
        assert_eq!(payload.title, "Paisa");
        assert_eq!(payload.body, "hello");
    }

    #[test]
    fn push_raises_notification_with_both_actions() {
        let notifier = RecordingNotifier::default();
        handle_push(&notifier, br#"{"title":"Hi","body":"there"}"#);

        let raised = notifier.raised.lock().unwrap();
        assert_eq!(raised.len(), 1);
        assert_eq!(
            raised[0].actions,
            vec![NotificationAction::View, NotificationAction::Dismiss]
        );
    }
}
