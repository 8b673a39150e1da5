use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

pub const MAX_TRANSACTION_PAISE: u64 = 50_000 * 100;
pub const PIN_LENGTH: usize = 6;
pub const MAX_SCAN_IMAGE_BYTES: u64 = 5 * 1024 * 1024;
pub const ALLOWED_SCAN_IMAGE_TYPES: &[&str] = &[
    "image/png",
    "image/jpeg",
    "image/jpg",
    "image/gif",
    "image/bmp",
];
pub const PAY_SCHEME: &str = "upi";

pub type NotificationId = u64;

/// A prospective transfer recipient, resolved from a scan or manual entry.
///
/// Immutable once produced; a newer scan supersedes the old candidate, it is
/// never edited in place.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PayeeCandidate {
    pub identifier: String,
    pub display_name: String,
    pub is_registered: bool,
    pub qr_payload: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum IntentStatus {
    Draft,
    Validating,
    Confirmed,
    Submitting,
    Succeeded,
    Failed,
}

impl IntentStatus {
    /// Legal forward transitions. `Failed -> Draft` re-entry is allowed;
    /// `Succeeded` is terminal for the intent.
    #[must_use]
    pub fn can_transition(self, next: IntentStatus) -> bool {
        use IntentStatus::*;
        matches!(
            (self, next),
            (Draft, Validating)
                | (Validating, Confirmed)
                | (Validating, Draft)
                | (Confirmed, Submitting)
                | (Confirmed, Draft)
                | (Submitting, Succeeded)
                | (Submitting, Failed)
                | (Failed, Draft)
        )
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, IntentStatus::Succeeded)
    }
}

/// One in-progress attempt to send a specific amount to a validated candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentIntent {
    pub candidate: PayeeCandidate,
    pub amount: Option<Amount>,
    pub status: IntentStatus,
}

impl PaymentIntent {
    #[must_use]
    pub fn new(candidate: PayeeCandidate) -> Self {
        Self {
            candidate,
            amount: None,
            status: IntentStatus::Draft,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NotificationCategory {
    Success,
    Info,
    Warning,
    Danger,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NotificationRecord {
    pub id: NotificationId,
    pub title: String,
    pub message: String,
    pub is_read: bool,
    pub category: NotificationCategory,
    pub timestamp_unix_ms: u64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("please enter a valid amount")]
    AmountNotPositive,
    #[error("maximum transaction limit is ₹50,000")]
    AmountOverLimit,
    #[error("amount is not a valid decimal value")]
    AmountMalformed,
    #[error("invalid payment identifier format")]
    InvalidIdentifier,
    #[error("PIN must be exactly 6 digits")]
    InvalidPin,
    #[error("unsupported image type {0}")]
    UnsupportedImageType(String),
    #[error("image exceeds 5 MB limit ({0} bytes)")]
    ImageTooLarge(u64),
    #[error("payload is not a recognized payment QR")]
    UnrecognizedPayload,
    #[error("payload is missing the payee identifier")]
    PayloadMissingIdentifier,
}

/// Money in minor units (paise). Stored unsigned; the sign check happens at
/// parse time because the wire format is decimal rupee text.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct Amount {
    paise: u64,
}

impl Amount {
    #[must_use]
    pub fn from_paise(paise: u64) -> Self {
        Self { paise }
    }

    #[must_use]
    pub fn from_rupees(rupees: u64) -> Self {
        Self {
            paise: rupees * 100,
        }
    }

    #[must_use]
    pub fn paise(self) -> u64 {
        self.paise
    }

    /// Decimal rupee text for form bodies, e.g. `"150.00"`.
    #[must_use]
    pub fn to_decimal_string(self) -> String {
        format!("{}.{:02}", self.paise / 100, self.paise % 100)
    }

    /// Parse decimal rupee text (`"150"`, `"150.5"`, `"150.50"`). At most two
    /// fractional digits; anything else is malformed. A leading minus is
    /// reported as a not-positive amount, not a parse failure.
    pub fn parse(input: &str) -> Result<Self, CoreError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(CoreError::AmountMalformed);
        }
        if let Some(rest) = trimmed.strip_prefix('-') {
            if rest.chars().all(|c| c.is_ascii_digit() || c == '.') && !rest.is_empty() {
                return Err(CoreError::AmountNotPositive);
            }
            return Err(CoreError::AmountMalformed);
        }

        let (whole, fraction) = match trimmed.split_once('.') {
            Some((w, f)) => (w, f),
            None => (trimmed, ""),
        };
        if whole.is_empty() && fraction.is_empty() {
            return Err(CoreError::AmountMalformed);
        }
        if !whole.chars().all(|c| c.is_ascii_digit())
            || !fraction.chars().all(|c| c.is_ascii_digit())
            || fraction.len() > 2
        {
            return Err(CoreError::AmountMalformed);
        }

        let rupees: u64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| CoreError::AmountMalformed)?
        };
        let paise_fraction: u64 = match fraction.len() {
            0 => 0,
            1 => fraction.parse::<u64>().map_err(|_| CoreError::AmountMalformed)? * 10,
            _ => fraction.parse().map_err(|_| CoreError::AmountMalformed)?,
        };

        let paise = rupees
            .checked_mul(100)
            .and_then(|p| p.checked_add(paise_fraction))
            .ok_or(CoreError::AmountMalformed)?;
        Ok(Self { paise })
    }

    /// The bound an intent must satisfy before it may leave Draft:
    /// `0 < amount <= ₹50,000`. The violated bound determines the error.
    pub fn check_transaction_limits(self) -> Result<(), CoreError> {
        if self.paise == 0 {
            return Err(CoreError::AmountNotPositive);
        }
        if self.paise > MAX_TRANSACTION_PAISE {
            return Err(CoreError::AmountOverLimit);
        }
        Ok(())
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "₹{}", format_grouped(self.paise))
    }
}

fn format_grouped(paise: u64) -> String {
    let whole = (paise / 100).to_string();
    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, c) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    format!("{grouped}.{:02}", paise % 100)
}

/// Structural check for a payment identifier: exactly one `@` with non-empty
/// local and domain parts, restricted charset. Offline; runs before any
/// network lookup.
pub fn validate_identifier(identifier: &str) -> Result<(), CoreError> {
    let trimmed = identifier.trim();
    let mut parts = trimmed.splitn(3, '@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(CoreError::InvalidIdentifier);
    };
    if local.is_empty() || domain.is_empty() {
        return Err(CoreError::InvalidIdentifier);
    }

    let local_ok = local
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '%' | '+' | '-'));
    let domain_ok = domain
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-'));
    if !local_ok || !domain_ok {
        return Err(CoreError::InvalidIdentifier);
    }
    Ok(())
}

pub fn validate_pin(pin: &str) -> Result<(), CoreError> {
    if pin.len() != PIN_LENGTH || !pin.chars().all(|c| c.is_ascii_digit()) {
        return Err(CoreError::InvalidPin);
    }
    Ok(())
}

/// Preconditions for scanning an uploaded image, checked before any decode or
/// upload work happens.
pub fn check_scan_image(mime: &str, size_bytes: u64) -> Result<(), CoreError> {
    let mime = mime.trim().to_ascii_lowercase();
    if !ALLOWED_SCAN_IMAGE_TYPES.contains(&mime.as_str()) {
        return Err(CoreError::UnsupportedImageType(mime));
    }
    if size_bytes > MAX_SCAN_IMAGE_BYTES {
        return Err(CoreError::ImageTooLarge(size_bytes));
    }
    Ok(())
}

/// Fields carried by a `upi://pay` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayPayload {
    pub identifier: String,
    pub display_name: Option<String>,
    pub amount: Option<String>,
    pub currency: Option<String>,
}

pub fn parse_pay_payload(raw: &str) -> Result<PayPayload, CoreError> {
    let url = Url::parse(raw.trim()).map_err(|_| CoreError::UnrecognizedPayload)?;
    if url.scheme() != PAY_SCHEME {
        return Err(CoreError::UnrecognizedPayload);
    }

    let mut identifier = None;
    let mut display_name = None;
    let mut amount = None;
    let mut currency = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "pa" => identifier = Some(value.into_owned()),
            "pn" => display_name = Some(value.into_owned()),
            "am" => amount = Some(value.into_owned()),
            "cu" => currency = Some(value.into_owned()),
            _ => {}
        }
    }

    let identifier = identifier
        .filter(|id| !id.trim().is_empty())
        .ok_or(CoreError::PayloadMissingIdentifier)?;
    validate_identifier(&identifier)?;

    Ok(PayPayload {
        identifier,
        display_name,
        amount,
        currency,
    })
}

/// Synthesize a payload for a manually entered payee so every identity source
/// hands the same shape to the validator.
pub fn build_pay_payload(identifier: &str, display_name: &str) -> Result<String, CoreError> {
    validate_identifier(identifier)?;
    let mut url =
        Url::parse("upi://pay").map_err(|_| CoreError::UnrecognizedPayload)?;
    url.query_pairs_mut()
        .append_pair("pa", identifier.trim())
        .append_pair("pn", display_name.trim());
    Ok(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amount_parse_accepts_decimal_forms() {
        assert_eq!(Amount::parse("150").unwrap().paise(), 15_000);
        assert_eq!(Amount::parse("150.5").unwrap().paise(), 15_050);
        assert_eq!(Amount::parse("150.50").unwrap().paise(), 15_050);
        assert_eq!(Amount::parse(" 0.01 ").unwrap().paise(), 1);
    }

    #[test]
    fn amount_parse_rejects_garbage() {
        assert_eq!(Amount::parse(""), Err(CoreError::AmountMalformed));
        assert_eq!(Amount::parse("abc"), Err(CoreError::AmountMalformed));
        assert_eq!(Amount::parse("1.234"), Err(CoreError::AmountMalformed));
        assert_eq!(Amount::parse("1..2"), Err(CoreError::AmountMalformed));
        assert_eq!(Amount::parse("-5"), Err(CoreError::AmountNotPositive));
    }

    #[test]
    fn transaction_limits_name_the_violated_bound() {
        assert_eq!(
            Amount::from_paise(0).check_transaction_limits(),
            Err(CoreError::AmountNotPositive)
        );
        assert_eq!(
            Amount::from_rupees(50_001).check_transaction_limits(),
            Err(CoreError::AmountOverLimit)
        );
        assert!(Amount::from_rupees(50_000).check_transaction_limits().is_ok());
        assert!(Amount::from_paise(1).check_transaction_limits().is_ok());
    }

    #[test]
    fn amount_display_groups_thousands() {
        assert_eq!(Amount::from_rupees(50_000).to_string(), "₹50,000.00");
        assert_eq!(Amount::from_paise(123_456_789).to_string(), "₹1,234,567.89");
        assert_eq!(Amount::from_paise(99).to_string(), "₹0.99");
    }

    #[test]
    fn identifier_format_requires_single_at() {
        assert!(validate_identifier("foo@bar").is_ok());
        assert!(validate_identifier("ravi.kumar%09@okbank").is_ok());
        assert_eq!(validate_identifier("foo"), Err(CoreError::InvalidIdentifier));
        assert_eq!(
            validate_identifier("a@b@c"),
            Err(CoreError::InvalidIdentifier)
        );
        assert_eq!(validate_identifier("@bank"), Err(CoreError::InvalidIdentifier));
        assert_eq!(validate_identifier("user@"), Err(CoreError::InvalidIdentifier));
        assert_eq!(
            validate_identifier("us er@bank"),
            Err(CoreError::InvalidIdentifier)
        );
    }

    #[test]
    fn pin_must_be_six_digits() {
        assert!(validate_pin("123456").is_ok());
        assert_eq!(validate_pin("12345"), Err(CoreError::InvalidPin));
        assert_eq!(validate_pin("1234567"), Err(CoreError::InvalidPin));
        assert_eq!(validate_pin("12345a"), Err(CoreError::InvalidPin));
    }

    #[test]
    fn scan_image_preconditions() {
        assert!(check_scan_image("image/png", 1024).is_ok());
        assert!(check_scan_image("IMAGE/JPEG", 1024).is_ok());
        assert_eq!(
            check_scan_image("image/webp", 1024),
            Err(CoreError::UnsupportedImageType("image/webp".to_owned()))
        );
        assert_eq!(
            check_scan_image("image/png", MAX_SCAN_IMAGE_BYTES + 1),
            Err(CoreError::ImageTooLarge(MAX_SCAN_IMAGE_BYTES + 1))
        );
    }

    #[test]
    fn pay_payload_roundtrip() {
        let raw = build_pay_payload("ravi@okbank", "Ravi Kumar").unwrap();
        let parsed = parse_pay_payload(&raw).unwrap();
        assert_eq!(parsed.identifier, "ravi@okbank");
        assert_eq!(parsed.display_name.as_deref(), Some("Ravi Kumar"));
        assert_eq!(parsed.amount, None);
    }

    #[test]
    fn pay_payload_rejects_foreign_schemes() {
        assert_eq!(
            parse_pay_payload("https://example.com/pay?pa=x@y"),
            Err(CoreError::UnrecognizedPayload)
        );
        assert_eq!(
            parse_pay_payload("upi://pay?pn=NoId"),
            Err(CoreError::PayloadMissingIdentifier)
        );
        assert_eq!(parse_pay_payload("not a url"), Err(CoreError::UnrecognizedPayload));
    }

    #[test]
    fn status_transitions_follow_the_flow() {
        use IntentStatus::*;
        assert!(Draft.can_transition(Validating));
        assert!(Validating.can_transition(Confirmed));
        assert!(Confirmed.can_transition(Submitting));
        assert!(Submitting.can_transition(Succeeded));
        assert!(Submitting.can_transition(Failed));
        assert!(Failed.can_transition(Draft));

        assert!(!Draft.can_transition(Confirmed));
        assert!(!Draft.can_transition(Submitting));
        assert!(!Succeeded.can_transition(Draft));
        assert!(Succeeded.is_terminal());
    }
}
