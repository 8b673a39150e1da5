//! The three identity sources. Each produces at most one raw payload (camera,
//! file) or a ready candidate (manual entry); the payee validator turns raw
//! payloads into candidates.

use paisa_core::{CoreError, PayeeCandidate, build_pay_payload, check_scan_image,
    validate_identifier};
use thiserror::Error;
use tokio::{
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::{
    api::ApiError,
    ports::{AlertKind, AlertSink, CameraBackend, CameraError, ConfirmationPort, DecodeError,
        QrDecoder},
    validator::PayeeValidator,
};

#[derive(Debug, Error)]
pub enum ScanError {
    #[error(transparent)]
    Camera(#[from] CameraError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Precondition(#[from] CoreError),
    #[error("no QR code found in image")]
    NothingDecoded,
}

struct Pipeline {
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Camera capture driving frames through the external decoder. At most one
/// pipeline exists at a time; switching devices stops the old pipeline and
/// waits for it before opening the next.
pub struct CameraScanner<B, D, A> {
    backend: B,
    decoder: D,
    alerts: A,
    current_device: usize,
    pipeline: Option<Pipeline>,
    payload_tx: mpsc::Sender<String>,
    payload_rx: mpsc::Receiver<String>,
}

impl<B, D, A> CameraScanner<B, D, A>
where
    B: CameraBackend,
    D: QrDecoder + Clone + Send + 'static,
    A: AlertSink + Clone + 'static,
{
    pub fn new(backend: B, decoder: D, alerts: A) -> Self {
        let (payload_tx, payload_rx) = mpsc::channel(1);
        Self {
            backend,
            decoder,
            alerts,
            current_device: 0,
            pipeline: None,
            payload_tx,
            payload_rx,
        }
    }

    /// Open the current device and start decoding. Any running pipeline is
    /// fully stopped first so two streams never race to produce a payload.
    pub async fn start(&mut self) -> Result<(), ScanError> {
        self.stop().await;

        let devices = self.backend.devices();
        if devices.is_empty() {
            self.alerts
                .alert(AlertKind::Error, "Camera not supported or permission denied");
            return Err(ScanError::Camera(CameraError::NoDevices));
        }
        self.current_device %= devices.len();
        let device = &devices[self.current_device];

        let mut frames = match self.backend.open(&device.id).await {
            Ok(frames) => frames,
            Err(err) => {
                self.alerts.alert(
                    AlertKind::Error,
                    "Failed to initialize camera. Please check permissions.",
                );
                return Err(err.into());
            }
        };

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let decoder = self.decoder.clone();
        let payload_tx = self.payload_tx.clone();
        let alerts = self.alerts.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                    frame = frames.recv() => {
                        let Some(frame) = frame else { break };
                        match decoder.decode_frame(&frame) {
                            Ok(Some(payload)) => {
                                // First hit wins; capture stops here.
                                let _ = payload_tx.send(payload).await;
                                break;
                            }
                            // Frames without a code are the normal case.
                            Ok(None) => {}
                            Err(err @ DecodeError::Setup(_)) => {
                                // A broken engine will never scan anything;
                                // keeping the camera open just hides that.
                                warn!("decode engine failed: {err}");
                                alerts.alert(
                                    AlertKind::Error,
                                    "Failed to start the QR scanner",
                                );
                                break;
                            }
                            Err(err) => {
                                debug!("frame decode miss: {err}");
                            }
                        }
                    }
                }
            }
        });

        info!(device = %device.label, "camera pipeline started");
        self.pipeline = Some(Pipeline { stop_tx, handle });
        Ok(())
    }

    /// Stop the active pipeline and wait for it to wind down.
    pub async fn stop(&mut self) {
        if let Some(pipeline) = self.pipeline.take() {
            let _ = pipeline.stop_tx.send(true);
            if let Err(err) = pipeline.handle.await {
                warn!("camera pipeline task failed: {err}");
            }
        }
    }

    /// Cycle to the next enumerated device and restart capture.
    pub async fn switch_camera(&mut self) -> Result<(), ScanError> {
        let devices = self.backend.devices();
        if devices.is_empty() {
            return Ok(());
        }
        self.stop().await;
        self.current_device = (self.current_device + 1) % devices.len();
        self.start().await?;
        let label = &devices[self.current_device].label;
        self.alerts
            .alert(AlertKind::Info, &format!("Switched to {label}"));
        Ok(())
    }

    /// The first successfully decoded payload, once the pipeline produces
    /// one. `None` means every pipeline has ended without a decode.
    pub async fn next_payload(&mut self) -> Option<String> {
        self.payload_rx.recv().await
    }
}

/// Single-image scan: preconditions first, then the same decoder and payload
/// hand-off the camera uses.
pub struct FileScanner<D, A> {
    decoder: D,
    alerts: A,
}

impl<D, A> FileScanner<D, A>
where
    D: QrDecoder,
    A: AlertSink,
{
    pub fn new(decoder: D, alerts: A) -> Self {
        Self { decoder, alerts }
    }

    pub fn scan(&self, mime: &str, bytes: &[u8]) -> Result<String, ScanError> {
        if let Err(err) = check_scan_image(mime, bytes.len() as u64) {
            let message = match err {
                CoreError::ImageTooLarge(_) => "File size must be less than 5MB".to_owned(),
                _ => "Please select a valid image file (PNG, JPG, GIF, BMP)".to_owned(),
            };
            self.alerts.alert(AlertKind::Error, &message);
            return Err(err.into());
        }

        match self.decoder.decode_image(bytes) {
            Ok(Some(payload)) => Ok(payload),
            Ok(None) => {
                self.alerts
                    .alert(AlertKind::Error, "No QR code found in image");
                Err(ScanError::NothingDecoded)
            }
            Err(err) => {
                self.alerts.alert(AlertKind::Error, "Failed to scan QR code");
                Err(err.into())
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum ManualEntryError {
    #[error(transparent)]
    Format(#[from] CoreError),
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Typed-identifier entry. The structural check runs offline; only a
/// well-formed identifier ever reaches the network.
pub struct ManualEntry<C, A> {
    validator: PayeeValidator,
    confirm: C,
    alerts: A,
}

impl<C, A> ManualEntry<C, A>
where
    C: ConfirmationPort,
    A: AlertSink,
{
    pub fn new(validator: PayeeValidator, confirm: C, alerts: A) -> Self {
        Self {
            validator,
            confirm,
            alerts,
        }
    }

    /// Resolve a typed identifier to a candidate. `Ok(None)` means the user
    /// backed out at one of the confirmation branches.
    pub async fn resolve(
        &self,
        identifier: &str,
        expected_name: Option<&str>,
    ) -> Result<Option<PayeeCandidate>, ManualEntryError> {
        let identifier = identifier.trim();
        if let Err(err) = validate_identifier(identifier) {
            self.alerts.alert(AlertKind::Error, "Invalid UPI ID format");
            return Err(err.into());
        }

        let fallback_name = expected_name.unwrap_or("Unknown User");
        let payload = build_pay_payload(identifier, fallback_name)
            .map_err(ManualEntryError::Format)?;

        let candidate = match self.validator.validate(&payload).await {
            Ok(candidate) => candidate,
            Err(ApiError::Rejected(reason)) => {
                self.alerts.alert(AlertKind::Error, &reason);
                return Err(ManualEntryError::Api(ApiError::Rejected(reason)));
            }
            Err(err) => {
                self.alerts
                    .alert(AlertKind::Error, "Failed to validate UPI ID");
                return Err(err.into());
            }
        };

        if candidate.is_registered {
            if let Some(expected) = expected_name {
                if !expected.trim().is_empty()
                    && !expected.eq_ignore_ascii_case(&candidate.display_name)
                {
                    let prompt = format!(
                        "Name doesn't match. Found: {}. Continue anyway?",
                        candidate.display_name
                    );
                    if !self.confirm.confirm(&prompt).await {
                        return Ok(None);
                    }
                }
            }
            return Ok(Some(candidate));
        }

        // Structurally valid but unknown to the service: proceeding as an
        // external payee needs an explicit decision.
        let prompt = "UPI ID not registered with Paisa. Continue with external transfer?";
        if !self.confirm.confirm(prompt).await {
            return Ok(None);
        }
        Ok(Some(PayeeCandidate {
            display_name: fallback_name.to_owned(),
            ..candidate
        }))
    }
}
