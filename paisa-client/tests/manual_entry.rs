//! Manual payee entry against the in-memory gateway: offline format
//! rejection, the external-transfer decision, and the name-mismatch check.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use paisa_client::{
    api::WalletApi,
    identity::ManualEntry,
    ports::{AlertKind, AlertSink, ConfirmationPort},
    validator::PayeeValidator,
};
use paisa_gateway::AppState;
use tokio::net::TcpListener;

#[derive(Clone, Default)]
struct RecordingAlerts {
    messages: Arc<Mutex<Vec<(AlertKind, String)>>>,
}

impl AlertSink for RecordingAlerts {
    fn alert(&self, kind: AlertKind, message: &str) {
        self.messages.lock().unwrap().push((kind, message.to_owned()));
    }
}

struct ScriptedConfirm {
    answer: bool,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl ScriptedConfirm {
    fn answering(answer: bool) -> Self {
        Self {
            answer,
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl ConfirmationPort for ScriptedConfirm {
    async fn confirm(&self, prompt: &str) -> bool {
        self.prompts.lock().unwrap().push(prompt.to_owned());
        self.answer
    }
}

async fn spawn_gateway(state: AppState) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        let _ = paisa_gateway::serve(listener, state).await;
    });
    format!("http://{addr}")
}

fn entry(
    base: &str,
    confirm: ScriptedConfirm,
    alerts: RecordingAlerts,
) -> ManualEntry<ScriptedConfirm, RecordingAlerts> {
    ManualEntry::new(
        PayeeValidator::new(WalletApi::new(base).expect("client")),
        confirm,
        alerts,
    )
}

#[tokio::test]
async fn malformed_identifier_is_rejected_offline() {
    let state = AppState::new();
    let base = spawn_gateway(state.clone()).await;
    let alerts = RecordingAlerts::default();
    let entry = entry(&base, ScriptedConfirm::answering(true), alerts.clone());

    assert!(entry.resolve("not-an-id", None).await.is_err());
    assert!(entry.resolve("two@at@signs", None).await.is_err());

    assert!(state.request_log().await.is_empty());
    let messages = alerts.messages.lock().unwrap();
    assert!(messages.iter().all(|(_, m)| m == "Invalid UPI ID format"));
}

#[tokio::test]
async fn registered_payee_resolves_without_prompts() {
    let state = AppState::new();
    state.register_payee("ravi@okbank", "Ravi Kumar").await;
    let base = spawn_gateway(state).await;

    let confirm = ScriptedConfirm::answering(false);
    let prompts = Arc::clone(&confirm.prompts);
    let entry = entry(&base, confirm, RecordingAlerts::default());

    let candidate = entry
        .resolve("ravi@okbank", Some("Ravi Kumar"))
        .await
        .expect("resolve")
        .expect("candidate");
    assert!(candidate.is_registered);
    assert_eq!(candidate.display_name, "Ravi Kumar");
    assert!(prompts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn name_mismatch_needs_explicit_approval() {
    let state = AppState::new();
    state.register_payee("ravi@okbank", "Ravi Kumar").await;
    let base = spawn_gateway(state.clone()).await;

    let declined = entry(
        &base,
        ScriptedConfirm::answering(false),
        RecordingAlerts::default(),
    );
    let result = declined
        .resolve("ravi@okbank", Some("Someone Else"))
        .await
        .expect("resolve");
    assert!(result.is_none());

    let approved = entry(
        &base,
        ScriptedConfirm::answering(true),
        RecordingAlerts::default(),
    );
    let candidate = approved
        .resolve("ravi@okbank", Some("Someone Else"))
        .await
        .expect("resolve")
        .expect("candidate");
    assert_eq!(candidate.display_name, "Ravi Kumar");
}

#[tokio::test]
async fn unregistered_payee_requires_the_external_transfer_decision() {
    let state = AppState::new();
    let base = spawn_gateway(state).await;

    let confirm = ScriptedConfirm::answering(true);
    let prompts = Arc::clone(&confirm.prompts);
    let entry = entry(&base, confirm, RecordingAlerts::default());

    let candidate = entry
        .resolve("someone@elsewhere", Some("Someone"))
        .await
        .expect("resolve")
        .expect("candidate");
    assert!(!candidate.is_registered);
    assert_eq!(candidate.display_name, "Someone");

    let prompts = prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("external transfer"));
}
