//! Client-side wallet engine: payment intake, payee validation, identity
//! sources, the inactivity guard, and the notification synchronizer. The
//! host application supplies the capability ports and drives the machines.

pub mod api;
pub mod identity;
pub mod intake;
pub mod ports;
pub mod session;
pub mod store;
pub mod sync;
pub mod validator;
pub mod worker;

pub use api::{ApiError, PaymentReceipt, WalletApi};
pub use identity::{CameraScanner, FileScanner, ManualEntry, ScanError};
pub use intake::{IntakeError, PaymentIntake};
pub use ports::{
    AlertKind, AlertSink, CameraBackend, ConfirmationPort, DesktopNotifier, Navigator,
    PinSource, QrDecoder,
};
pub use session::{ActivityHandle, GuardPhase, SessionGuard};
pub use store::ClientStore;
pub use sync::{BulkOutcome, NotificationSync};
pub use validator::PayeeValidator;
