//! Payment intake state machine. One active intent at a time, driven through
//! Draft -> Validating -> Confirmed -> Submitting and into a terminal
//! Succeeded or a recoverable Failed.

use paisa_core::{Amount, IntentStatus, PaymentIntent, PayeeCandidate, validate_pin};
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    api::{ApiError, PaymentReceipt, WalletApi},
    ports::{AlertKind, AlertSink, ConfirmationPort, Navigator, PinSource},
    session::{LOGOUT_REDIRECT_DELAY, schedule_forced_logout},
    store::ClientStore,
};

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error("no active payment intent")]
    NoCandidate,
    #[error("{0}")]
    InvalidAmount(String),
    #[error("operation not allowed in the current state")]
    WrongState,
    #[error("recipient not confirmed")]
    ConfirmationDeclined,
    #[error("PIN entry cancelled")]
    PinMissing,
    #[error("PIN must be exactly 6 digits")]
    PinInvalid,
    #[error("insufficient balance")]
    InsufficientBalance,
    #[error("session expired")]
    Unauthorized,
    #[error("payment failed: {0}")]
    Submission(String),
}

/// Drives a single payment from candidate to settled outcome. The machine
/// owns the intent; callers observe it through [`PaymentIntake::intent`].
pub struct PaymentIntake<C, P, N, A> {
    api: WalletApi,
    store: ClientStore,
    draft_key: String,
    confirm: C,
    pin: P,
    navigator: N,
    alerts: A,
    intent: Option<PaymentIntent>,
}

impl<C, P, N, A> PaymentIntake<C, P, N, A>
where
    C: ConfirmationPort,
    P: PinSource,
    N: Navigator + Clone + 'static,
    A: AlertSink,
{
    pub fn new(
        api: WalletApi,
        store: ClientStore,
        draft_key: impl Into<String>,
        confirm: C,
        pin: P,
        navigator: N,
        alerts: A,
    ) -> Self {
        Self {
            api,
            store,
            draft_key: draft_key.into(),
            confirm,
            pin,
            navigator,
            alerts,
            intent: None,
        }
    }

    pub fn intent(&self) -> Option<&PaymentIntent> {
        self.intent.as_ref()
    }

    pub fn status(&self) -> Option<IntentStatus> {
        self.intent.as_ref().map(|intent| intent.status)
    }

    /// Install a freshly validated candidate as the active intent. Whatever
    /// was there before is discarded: an unconfirmed intent silently, a
    /// settled one because success is terminal and a new scan starts over.
    pub fn accept_candidate(&mut self, candidate: PayeeCandidate) {
        if let Some(previous) = &self.intent {
            info!(
                superseded = %previous.candidate.identifier,
                by = %candidate.identifier,
                "active candidate replaced"
            );
        }
        self.intent = Some(PaymentIntent::new(candidate));
    }

    /// Remove and return a settled intent so a new payment can begin.
    pub fn take_receipt_intent(&mut self) -> Option<PaymentIntent> {
        if self.status() == Some(IntentStatus::Succeeded) {
            self.intent.take()
        } else {
            None
        }
    }

    /// Apply the user's amount input. An invalid amount keeps the intent in
    /// Draft with no amount set and surfaces the specific bound violated; a
    /// valid one moves the intent to Validating.
    pub fn set_amount(&mut self, input: &str) -> Result<Amount, IntakeError> {
        let intent = self.intent.as_mut().ok_or(IntakeError::NoCandidate)?;
        if !matches!(
            intent.status,
            IntentStatus::Draft | IntentStatus::Validating
        ) {
            return Err(IntakeError::WrongState);
        }

        let checked = Amount::parse(input).and_then(|amount| {
            amount.check_transaction_limits()?;
            Ok(amount)
        });
        match checked {
            Ok(amount) => {
                intent.amount = Some(amount);
                intent.status = IntentStatus::Validating;
                Ok(amount)
            }
            Err(err) => {
                intent.amount = None;
                intent.status = IntentStatus::Draft;
                let message = err.to_string();
                self.alerts.alert(AlertKind::Error, &message);
                Err(IntakeError::InvalidAmount(message))
            }
        }
    }

    /// Put the recipient and amount to the user. Confirmation moves the
    /// intent to Confirmed; declining drops it back to Draft with the amount
    /// intact so it can be re-edited.
    pub async fn confirm(&mut self) -> Result<(), IntakeError> {
        let intent = self.intent.as_mut().ok_or(IntakeError::NoCandidate)?;
        if intent.status != IntentStatus::Validating {
            return Err(IntakeError::WrongState);
        }
        let amount = intent.amount.ok_or(IntakeError::WrongState)?;

        let prompt = format!("Send {amount} to {}?", intent.candidate.display_name);
        if self.confirm.confirm(&prompt).await {
            intent.status = IntentStatus::Confirmed;
            Ok(())
        } else {
            intent.status = IntentStatus::Draft;
            Err(IntakeError::ConfirmationDeclined)
        }
    }

    /// Submit a confirmed intent: advisory balance check, PIN collection,
    /// then the network call. Every pre-network rejection leaves the intent
    /// Confirmed so submission can simply be retried; only a rejected network
    /// call marks it Failed.
    pub async fn submit(&mut self) -> Result<PaymentReceipt, IntakeError> {
        let (amount, candidate) = {
            let intent = self.intent.as_ref().ok_or(IntakeError::NoCandidate)?;
            if intent.status != IntentStatus::Confirmed {
                return Err(IntakeError::WrongState);
            }
            let amount = intent.amount.ok_or(IntakeError::WrongState)?;
            (amount, intent.candidate.clone())
        };

        // Advisory: a definite shortfall stops early with a clear message,
        // but an unreachable balance endpoint must not block the payment.
        match self.api.balance().await {
            Ok(balance) if balance < amount => {
                self.alerts.alert(AlertKind::Error, "Insufficient balance");
                return Err(IntakeError::InsufficientBalance);
            }
            Ok(_) => {}
            Err(err) => {
                warn!("balance check skipped: {err}");
            }
        }

        let prompt = format!("Enter your 6-digit PIN to send {amount}");
        let Some(pin) = self.pin.pin(&prompt).await else {
            self.alerts.alert(AlertKind::Info, "Payment cancelled");
            return Err(IntakeError::PinMissing);
        };
        if validate_pin(&pin).is_err() {
            self.alerts
                .alert(AlertKind::Error, "PIN must be exactly 6 digits");
            return Err(IntakeError::PinInvalid);
        }

        self.set_status(IntentStatus::Submitting);
        match self.api.submit_payment(&candidate, amount, &pin).await {
            Ok(receipt) => {
                self.set_status(IntentStatus::Succeeded);
                self.store.clear_draft(&self.draft_key);
                self.alerts.alert(
                    AlertKind::Success,
                    &format!("{amount} sent to {}", candidate.display_name),
                );
                info!(payee = %candidate.identifier, %amount, "payment settled");
                Ok(receipt)
            }
            Err(ApiError::Unauthorized) => {
                self.set_status(IntentStatus::Failed);
                self.alerts
                    .alert(AlertKind::Error, "Session expired. Please login again.");
                schedule_forced_logout(&self.navigator, LOGOUT_REDIRECT_DELAY);
                Err(IntakeError::Unauthorized)
            }
            Err(err) => {
                self.set_status(IntentStatus::Failed);
                let message = err.to_string();
                self.alerts.alert(AlertKind::Error, &message);
                Err(IntakeError::Submission(message))
            }
        }
    }

    /// User acknowledgement of a failed attempt. The intent returns to Draft
    /// with candidate and amount intact; there is no automatic retry.
    pub fn acknowledge_failure(&mut self) -> Result<(), IntakeError> {
        let intent = self.intent.as_mut().ok_or(IntakeError::NoCandidate)?;
        if intent.status != IntentStatus::Failed {
            return Err(IntakeError::WrongState);
        }
        intent.status = IntentStatus::Draft;
        Ok(())
    }

    fn set_status(&mut self, next: IntentStatus) {
        if let Some(intent) = self.intent.as_mut() {
            if intent.status.can_transition(next) {
                intent.status = next;
            } else {
                warn!(from = ?intent.status, to = ?next, "illegal status transition ignored");
            }
        }
    }
}
