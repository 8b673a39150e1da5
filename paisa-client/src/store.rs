//! Durable client-side state: the last-shown notification id, the install
//! banner dismissal timestamp, and per-form draft fields. One small JSON file,
//! written atomically.

use std::{
    collections::HashMap,
    fs, io,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
    time::Duration,
};

use paisa_core::NotificationId;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Defensive bound: `client_state.json` is expected to be tiny.
///
/// This prevents pathological reads if the file is corrupted or replaced.
pub const MAX_STATE_BYTES: u64 = 64 * 1024;

/// Install-banner dismissals are honored for seven days.
pub const INSTALL_DISMISS_WINDOW_MS: u64 = 7 * 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct SavedClientState {
    #[serde(default)]
    pub last_shown_notification_id: Option<NotificationId>,
    #[serde(default)]
    pub install_dismissed_at_ms: Option<u64>,
    /// Auto-saved field values keyed by form context, e.g. `"send_money"`.
    #[serde(default)]
    pub form_drafts: HashMap<String, HashMap<String, String>>,
}

#[derive(Debug)]
pub enum StateLoadError {
    Metadata(io::Error),
    TooLarge { size: u64, max: u64 },
    Read(io::Error),
    Parse(serde_json::Error),
}

impl std::fmt::Display for StateLoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StateLoadError::Metadata(e) => write!(f, "metadata read failed: {e}"),
            StateLoadError::TooLarge { size, max } => {
                write!(f, "file too large: {size} bytes (max {max})")
            }
            StateLoadError::Read(e) => write!(f, "read failed: {e}"),
            StateLoadError::Parse(e) => write!(f, "parse failed: {e}"),
        }
    }
}

impl std::error::Error for StateLoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StateLoadError::Metadata(e) => Some(e),
            StateLoadError::Read(e) => Some(e),
            StateLoadError::Parse(e) => Some(e),
            StateLoadError::TooLarge { .. } => None,
        }
    }
}

#[derive(Debug)]
pub enum StateSaveError {
    Serialize(serde_json::Error),
    WriteTmp(io::Error),
    Rename(io::Error),
}

impl std::fmt::Display for StateSaveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StateSaveError::Serialize(e) => write!(f, "serialize failed: {e}"),
            StateSaveError::WriteTmp(e) => write!(f, "tmp write failed: {e}"),
            StateSaveError::Rename(e) => write!(f, "rename failed: {e}"),
        }
    }
}

impl std::error::Error for StateSaveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StateSaveError::Serialize(e) => Some(e),
            StateSaveError::WriteTmp(e) => Some(e),
            StateSaveError::Rename(e) => Some(e),
        }
    }
}

pub fn client_state_path() -> PathBuf {
    let base = std::env::var_os("PAISA_STATE_DIR")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".paisa")))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = fs::create_dir_all(&base);
    base.join("client_state.json")
}

pub fn load_state_from_path(path: &Path) -> Result<SavedClientState, StateLoadError> {
    let meta = fs::metadata(path).map_err(StateLoadError::Metadata)?;
    if meta.len() > MAX_STATE_BYTES {
        return Err(StateLoadError::TooLarge {
            size: meta.len(),
            max: MAX_STATE_BYTES,
        });
    }

    let data = fs::read_to_string(path).map_err(StateLoadError::Read)?;
    serde_json::from_str(&data).map_err(StateLoadError::Parse)
}

pub fn save_state_to_path(path: &Path, state: &SavedClientState) -> Result<(), StateSaveError> {
    let tmp = path.with_extension("json.tmp");
    let payload = serde_json::to_string_pretty(state).map_err(StateSaveError::Serialize)?;
    fs::write(&tmp, payload.as_bytes()).map_err(StateSaveError::WriteTmp)?;

    if path.exists() {
        let _ = fs::remove_file(path);
    }

    fs::rename(&tmp, path).map_err(StateSaveError::Rename)?;
    Ok(())
}

fn save_state_with_retry(path: &Path, state: &SavedClientState) -> Result<(), StateSaveError> {
    const MAX_ATTEMPTS: u32 = 3;
    const BACKOFF_BASE_MS: u64 = 50;

    let mut last_err: Option<StateSaveError> = None;
    for attempt in 1..=MAX_ATTEMPTS {
        match save_state_to_path(path, state) {
            Ok(()) => return Ok(()),
            Err(err) => {
                last_err = Some(err);
                if attempt >= MAX_ATTEMPTS {
                    break;
                }
                let backoff_ms = BACKOFF_BASE_MS.saturating_mul(1_u64 << (attempt - 1));
                std::thread::sleep(Duration::from_millis(backoff_ms));
            }
        }
    }

    Err(last_err.expect("retry loop sets last_err"))
}

#[derive(Debug)]
struct StoreInner {
    path: PathBuf,
    state: SavedClientState,
}

/// Shared handle over the persisted state. Each engine only touches its own
/// keys; persistence failures are logged rather than bubbled because losing
/// a draft or a dedup mark must never break a user flow.
#[derive(Debug, Clone)]
pub struct ClientStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl ClientStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = load_state_from_path(&path).unwrap_or_default();
        Self {
            inner: Arc::new(Mutex::new(StoreInner { path, state })),
        }
    }

    pub fn open_default() -> Self {
        Self::open(client_state_path())
    }

    pub fn last_shown_notification_id(&self) -> Option<NotificationId> {
        self.lock().state.last_shown_notification_id
    }

    /// Advance the last-shown mark to `id` and persist. The mark only moves
    /// forward; a stale id leaves it untouched and returns `false`.
    pub fn advance_last_shown(&self, id: NotificationId) -> bool {
        let mut inner = self.lock();
        match inner.state.last_shown_notification_id {
            Some(current) if id <= current => false,
            _ => {
                inner.state.last_shown_notification_id = Some(id);
                persist(&inner);
                true
            }
        }
    }

    pub fn install_dismissed_recently(&self, now_unix_ms: u64) -> bool {
        let mut inner = self.lock();
        match inner.state.install_dismissed_at_ms {
            Some(at) if now_unix_ms.saturating_sub(at) < INSTALL_DISMISS_WINDOW_MS => true,
            Some(_) => {
                // Window elapsed; forget the dismissal.
                inner.state.install_dismissed_at_ms = None;
                persist(&inner);
                false
            }
            None => false,
        }
    }

    pub fn record_install_dismissed(&self, now_unix_ms: u64) {
        let mut inner = self.lock();
        inner.state.install_dismissed_at_ms = Some(now_unix_ms);
        persist(&inner);
    }

    pub fn save_draft(&self, form: &str, fields: HashMap<String, String>) {
        let mut inner = self.lock();
        inner.state.form_drafts.insert(form.to_owned(), fields);
        persist(&inner);
    }

    pub fn draft(&self, form: &str) -> Option<HashMap<String, String>> {
        self.lock().state.form_drafts.get(form).cloned()
    }

    pub fn clear_draft(&self, form: &str) {
        let mut inner = self.lock();
        if inner.state.form_drafts.remove(form).is_some() {
            persist(&inner);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreInner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn persist(inner: &StoreInner) {
    if let Err(err) = save_state_with_retry(&inner.path, &inner.state) {
        warn!("failed to persist client state: {err}");
    }
}
