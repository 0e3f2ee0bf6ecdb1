use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;

use crate::enrollment::lookup::{
    AddressCandidate, AddressSearch, AssistantChat, DebouncedLookup, LookupError, LookupOutcome,
};

struct FakeAddressBackend {
    release: Option<Arc<Notify>>,
}

impl FakeAddressBackend {
    fn instant() -> Self {
        Self { release: None }
    }

    fn gated(release: Arc<Notify>) -> Self {
        Self {
            release: Some(release),
        }
    }

    fn candidate(street: &str) -> AddressCandidate {
        AddressCandidate {
            street_address: street.to_string(),
            city: "Des Moines".to_string(),
            state: "IA".to_string(),
            zip_code: "50309".to_string(),
        }
    }
}

impl AddressSearch for FakeAddressBackend {
    async fn search(&self, partial: &str) -> Result<Vec<AddressCandidate>, LookupError> {
        if let Some(release) = &self.release {
            release.notified().await;
        }
        Ok(vec![Self::candidate(partial)])
    }
}

struct EchoAssistant;

impl AssistantChat for EchoAssistant {
    async fn ask(&self, session_id: &str, message: &str) -> Result<String, LookupError> {
        Ok(format!("[{session_id}] {message}"))
    }
}

#[tokio::test]
async fn assistant_answers_pass_through_with_the_session_id() {
    let lookup = DebouncedLookup::new(EchoAssistant, Duration::from_secs(5));
    let answer = lookup
        .ask_assistant("session-000001", "What counts as income?")
        .await
        .expect("answer");
    assert_eq!(answer, "[session-000001] What counts as income?");
}

#[tokio::test]
async fn short_queries_resolve_empty_without_hitting_the_backend() {
    let lookup = DebouncedLookup::new(FakeAddressBackend::instant(), Duration::from_secs(5));
    let outcome = lookup.search_addresses("61").await.expect("lookup");
    assert_eq!(outcome, LookupOutcome::Fresh(Vec::new()));
}

#[tokio::test]
async fn fresh_results_come_back_for_real_queries() {
    let lookup = DebouncedLookup::new(FakeAddressBackend::instant(), Duration::from_secs(5));
    match lookup.search_addresses("612 Maple").await.expect("lookup") {
        LookupOutcome::Fresh(candidates) => {
            assert_eq!(candidates.len(), 1);
            assert_eq!(candidates[0].street_address, "612 Maple");
        }
        LookupOutcome::Superseded => panic!("nothing superseded this request"),
    }
}

#[tokio::test]
async fn slow_backends_time_out_recoverably() {
    // The gate is never released, so the call can only end by timeout.
    let lookup = Arc::new(DebouncedLookup::new(
        FakeAddressBackend::gated(Arc::new(Notify::new())),
        Duration::from_millis(20),
    ));
    match lookup.search_addresses("612 Maple").await {
        Err(LookupError::TimedOut(timeout)) => {
            assert_eq!(timeout, Duration::from_millis(20));
        }
        other => panic!("expected timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn newer_requests_supersede_in_flight_ones() {
    let release = Arc::new(Notify::new());
    let lookup = Arc::new(DebouncedLookup::new(
        FakeAddressBackend::gated(Arc::clone(&release)),
        Duration::from_secs(5),
    ));

    let first = tokio::spawn({
        let lookup = Arc::clone(&lookup);
        async move { lookup.search_addresses("612 Ma").await }
    });
    // Let the first request reach its await on the gate.
    tokio::time::sleep(Duration::from_millis(10)).await;

    let second = tokio::spawn({
        let lookup = Arc::clone(&lookup);
        async move { lookup.search_addresses("612 Maple Court").await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;

    // Release both backend calls; only the newest request may apply.
    release.notify_waiters();
    tokio::time::sleep(Duration::from_millis(5)).await;
    release.notify_waiters();

    let first = first.await.expect("join").expect("lookup");
    assert_eq!(first, LookupOutcome::Superseded);

    match second.await.expect("join").expect("lookup") {
        LookupOutcome::Fresh(candidates) => {
            assert_eq!(candidates[0].street_address, "612 Maple Court");
        }
        LookupOutcome::Superseded => panic!("the newest request must win"),
    }
}
