//! Capability ports the engine is constructed with. The surrounding
//! application (or a test harness) supplies the implementations; the state
//! machines never probe their environment directly.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    Success,
    Info,
    Warning,
    Error,
}

/// Toast-style user messages. Fire and forget; rendering is out of scope.
pub trait AlertSink: Send + Sync {
    fn alert(&self, kind: AlertKind, message: &str);
}

/// A blocking yes/no decision put to the user.
#[async_trait]
pub trait ConfirmationPort: Send + Sync {
    async fn confirm(&self, prompt: &str) -> bool;
}

/// Solicits the transaction PIN. Returns `None` when the user cancels.
#[async_trait]
pub trait PinSource: Send + Sync {
    async fn pin(&self, prompt: &str) -> Option<String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationAction {
    View,
    Dismiss,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DesktopNotification {
    pub title: String,
    pub body: String,
    pub tag: String,
    pub data: Value,
    pub actions: Vec<NotificationAction>,
}

/// Raises platform desktop notifications.
pub trait DesktopNotifier: Send + Sync {
    fn notify(&self, notification: DesktopNotification);
}

/// Route awareness and forced navigation, owned by the host application.
pub trait Navigator: Send + Sync {
    fn current_route(&self) -> String;
    fn force_logout(&self);
    fn open_or_focus(&self, route: &str);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraDevice {
    pub id: String,
    pub label: String,
}

#[derive(Debug, Clone)]
pub struct CameraFrame {
    pub bytes: Vec<u8>,
}

#[derive(Debug, thiserror::Error)]
pub enum CameraError {
    #[error("no camera devices available")]
    NoDevices,
    #[error("failed to open camera {device}: {reason}")]
    OpenFailed { device: String, reason: String },
}

/// Platform camera access. Dropping the frame receiver releases the device.
#[async_trait]
pub trait CameraBackend: Send + Sync {
    fn devices(&self) -> Vec<CameraDevice>;
    async fn open(&self, device_id: &str) -> Result<mpsc::Receiver<CameraFrame>, CameraError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("decoder initialization failed: {0}")]
    Setup(String),
    #[error("image could not be decoded: {0}")]
    BadImage(String),
}

/// External QR decoding engine. A frame with no code in it is `Ok(None)`,
/// not an error; errors are reserved for engine failures.
pub trait QrDecoder: Send + Sync {
    fn decode_frame(&self, frame: &CameraFrame) -> Result<Option<String>, DecodeError>;
    fn decode_image(&self, bytes: &[u8]) -> Result<Option<String>, DecodeError>;
}
