//! Normalizes identity-source output into a single candidate shape via one
//! round trip to the validation endpoint.

use paisa_core::PayeeCandidate;
use tracing::info;

use crate::api::{ApiError, WalletApi};

#[derive(Debug, Clone)]
pub struct PayeeValidator {
    api: WalletApi,
}

impl PayeeValidator {
    #[must_use]
    pub fn new(api: WalletApi) -> Self {
        Self { api }
    }

    /// Validate a raw scanned or synthesized payload. A successful result is
    /// the new active candidate; the caller hands it to the intake machine,
    /// which discards whatever candidate was active before.
    pub async fn validate(&self, raw_payload: &str) -> Result<PayeeCandidate, ApiError> {
        let candidate = self.api.validate_payee(raw_payload).await?;
        info!(
            identifier = %candidate.identifier,
            registered = candidate.is_registered,
            "payee validated"
        );
        Ok(candidate)
    }
}
