//! Submission lifecycle.
//!
//! `Idle -> Submitting -> {Confirmed, Failed}`. A replacement reported by the
//! provider moves the state to `Replaced`, which still waits on the original
//! id and holds until the next replacement or the terminal state. Every stage
//! is persisted, then broadcast, then rendered locally.
//!
//! `is_submitting` covers only the provider round-trip that yields a hash.
//! The confirmation wait keeps running after it clears.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use alloy_primitives::TxHash;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::db::{offload, DurableStore};
use crate::model::{replaced_id, BroadcastEnvelope, NotificationRecord, TransferSummary, FALLBACK_ID};
use crate::presenter::Presenter;
use crate::provider::{ProviderError, Replacement, TransactionProvider, TransferRequest};
use crate::realtime::Broadcaster;

/// How failures without a transaction hash are keyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FallbackIds {
    /// `tx_error_<uuid>`: every failed submission gets its own toast.
    #[default]
    Unique,
    /// The literal `tx_error`: later failures overwrite earlier ones.
    Shared,
}

impl FallbackIds {
    pub fn next(&self) -> String {
        match self {
            FallbackIds::Unique => format!("{FALLBACK_ID}_{}", Uuid::new_v4().simple()),
            FallbackIds::Shared => FALLBACK_ID.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionState {
    Idle,
    Submitting { id: String },
    Replaced { id: String, replacement: TxHash },
    Confirmed { id: String },
    Failed { id: String, message: String },
}

impl SubmissionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SubmissionState::Confirmed { .. } | SubmissionState::Failed { .. })
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("a submission is already in progress")]
    Busy,
}

#[derive(Debug)]
pub enum SubmitOutcome {
    /// A hash was obtained; confirmation continues in the background.
    Pending(PendingSubmission),
    /// Nothing was sent. An error toast was emitted under `id`.
    Failed { id: String, message: String },
}

#[derive(Debug)]
pub struct PendingSubmission {
    id: String,
    state: watch::Receiver<SubmissionState>,
    task: JoinHandle<SubmissionState>,
}

impl PendingSubmission {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SubmissionState {
        self.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<SubmissionState> {
        self.state.clone()
    }

    /// Waits for the terminal state.
    pub async fn settled(self) -> SubmissionState {
        match self.task.await {
            Ok(state) => state,
            Err(e) => SubmissionState::Failed { id: self.id, message: e.to_string() },
        }
    }
}

/// Persist, broadcast, render: the path every record takes out of a tab.
#[derive(Clone)]
pub struct NotificationSink {
    store: Arc<dyn DurableStore>,
    channel: Arc<dyn Broadcaster>,
    presenter: Arc<dyn Presenter>,
}

impl NotificationSink {
    pub fn new(store: Arc<dyn DurableStore>, channel: Arc<dyn Broadcaster>, presenter: Arc<dyn Presenter>) -> Self {
        Self { store, channel, presenter }
    }

    pub async fn emit(&self, record: NotificationRecord) {
        let stored = record.clone();
        if let Err(e) = offload(&self.store, move |store| store.put(&stored)).await {
            tracing::warn!(error = %e, id = %record.id, "failed to persist notification");
        }
        self.channel.publish(&BroadcastEnvelope::Notification(record.clone()));
        self.presenter.show(&record);
    }
}

struct SubmittingGuard(Arc<AtomicBool>);

impl SubmittingGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag.clone()))
    }
}

impl Drop for SubmittingGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct SubmissionController {
    provider: Arc<dyn TransactionProvider>,
    sink: NotificationSink,
    fallback: FallbackIds,
    submitting: Arc<AtomicBool>,
}

impl SubmissionController {
    pub fn new(provider: Arc<dyn TransactionProvider>, sink: NotificationSink) -> Self {
        Self { provider, sink, fallback: FallbackIds::default(), submitting: Arc::new(AtomicBool::new(false)) }
    }

    pub fn with_fallback_ids(mut self, fallback: FallbackIds) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting.load(Ordering::Acquire)
    }

    pub async fn submit(&self, request: &TransferRequest) -> Result<SubmitOutcome, SubmitError> {
        let _guard = SubmittingGuard::acquire(&self.submitting).ok_or(SubmitError::Busy)?;
        let summary = TransferSummary::new(&request.amount, &request.token.symbol, &request.recipient.to_string());

        let hash = match self.send(request).await {
            Ok(hash) => hash,
            Err(e) => {
                let id = self.fallback.next();
                let message = failure_message(&e, &summary);
                tracing::warn!(error = %e, id = %id, "transfer was not submitted");
                self.sink.emit(NotificationRecord::error(&id, &message)).await;
                return Ok(SubmitOutcome::Failed { id, message });
            }
        };

        let id = hash.to_string();
        tracing::info!(id = %id, token = %request.token.symbol, "transfer submitted");
        self.sink.emit(NotificationRecord::pending(&id, summary.sending())).await;

        let (state_tx, state_rx) = watch::channel(SubmissionState::Submitting { id: id.clone() });
        let task = tokio::spawn(watch_confirmation(
            self.provider.clone(),
            self.sink.clone(),
            hash,
            id.clone(),
            summary,
            state_tx,
        ));
        Ok(SubmitOutcome::Pending(PendingSubmission { id, state: state_rx, task }))
    }

    async fn send(&self, request: &TransferRequest) -> Result<TxHash, ProviderError> {
        let value = request.value()?;
        if request.token.is_native() {
            self.provider.submit_native(request.recipient, value).await
        } else {
            self.provider.submit_token_transfer(request.token.address, request.recipient, value).await
        }
    }
}

fn failure_message(error: &ProviderError, summary: &TransferSummary) -> String {
    error.short_message().map(str::to_string).unwrap_or_else(|| summary.failed())
}

async fn watch_confirmation(
    provider: Arc<dyn TransactionProvider>,
    sink: NotificationSink,
    hash: TxHash,
    id: String,
    summary: TransferSummary,
    state: watch::Sender<SubmissionState>,
) -> SubmissionState {
    let (replaced_tx, mut replaced_rx) = mpsc::unbounded_channel();
    let wait = provider.await_confirmation(hash, replaced_tx);
    tokio::pin!(wait);

    let outcome = loop {
        tokio::select! {
            outcome = &mut wait => break outcome,
            Some(replacement) = replaced_rx.recv() => on_replaced(&sink, &state, &id, &summary, replacement).await,
        }
    };
    // Replacements reported right before the wait resolved.
    while let Ok(replacement) = replaced_rx.try_recv() {
        on_replaced(&sink, &state, &id, &summary, replacement).await;
    }

    let terminal = match outcome {
        Ok(confirmation) => {
            tracing::info!(id = %id, block = ?confirmation.block_number, "transfer confirmed");
            sink.emit(NotificationRecord::success(&id, summary.sent())).await;
            SubmissionState::Confirmed { id }
        }
        Err(e) => {
            let message = failure_message(&e, &summary);
            tracing::warn!(error = %e, id = %id, "transfer failed");
            sink.emit(NotificationRecord::error(&id, &message)).await;
            SubmissionState::Failed { id, message }
        }
    };
    state.send_replace(terminal.clone());
    terminal
}

async fn on_replaced(
    sink: &NotificationSink,
    state: &watch::Sender<SubmissionState>,
    id: &str,
    summary: &TransferSummary,
    replacement: Replacement,
) {
    tracing::info!(id, replacement = %replacement.hash, reason = ?replacement.reason, "transaction replaced");
    sink.emit(NotificationRecord::success(replaced_id(id), summary.replaced())).await;
    state.send_replace(SubmissionState::Replaced { id: id.to_string(), replacement: replacement.hash });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{memory_store, MemoryBlob};
    use crate::model::NotificationKind;
    use crate::presenter::{ToastBoard, ToastStyle};
    use crate::provider::{ProviderCall, ReplacementReason, ScriptedProvider, TokenDescriptor};
    use crate::realtime::Unsupported;
    use alloy_primitives::{Address, U256};

    struct Fixture {
        provider: Arc<ScriptedProvider>,
        board: Arc<ToastBoard>,
        store: Arc<dyn DurableStore>,
        controller: SubmissionController,
    }

    fn fixture() -> Fixture {
        let provider = Arc::new(ScriptedProvider::new());
        let (board, _reports) = ToastBoard::new();
        let board = Arc::new(board);
        let store = memory_store(&MemoryBlob::new());
        let sink = NotificationSink::new(store.clone(), Arc::new(Unsupported::new("test")), board.clone());
        let controller = SubmissionController::new(provider.clone(), sink);
        Fixture { provider, board, store, controller }
    }

    fn recipient() -> Address {
        Address::repeat_byte(0x22)
    }

    fn eth_transfer(amount: &str) -> TransferRequest {
        TransferRequest::new(amount, recipient(), TokenDescriptor::native("ETH", "Ether"))
    }

    #[tokio::test]
    async fn native_transfer_goes_pending_then_confirmed() {
        let f = fixture();
        let hash = TxHash::repeat_byte(0xab);
        let handle = f.provider.accept(hash);

        let outcome = f.controller.submit(&eth_transfer("1.5")).await.unwrap();
        let SubmitOutcome::Pending(pending) = outcome else { panic!("expected pending") };
        assert_eq!(pending.id(), hash.to_string());
        assert!(!f.controller.is_submitting());

        let toast = f.board.get(pending.id()).unwrap();
        assert!(toast.loading);
        assert_eq!(toast.message, "Sending 1.5 ETH to 0x22...2222");
        assert_eq!(f.store.list().unwrap()[pending.id()].kind, NotificationKind::Pending);

        handle.confirm(hash, 1);
        let state = pending.settled().await;
        assert_eq!(state, SubmissionState::Confirmed { id: hash.to_string() });

        let toast = f.board.get(&hash.to_string()).unwrap();
        assert_eq!(toast.style, ToastStyle::Success);
        assert_eq!(toast.message, "Sent 1.5 ETH to 0x22...2222");
        assert_eq!(f.board.len(), 1);

        assert_eq!(
            f.provider.calls()[0],
            ProviderCall::Native { to: recipient(), value: U256::from(1_500_000_000_000_000_000u128) }
        );
    }

    #[tokio::test]
    async fn token_transfer_uses_contract_address() {
        let f = fixture();
        let dai = TokenDescriptor {
            address: Address::repeat_byte(0x6b),
            symbol: "DAI".into(),
            name: "Dai".into(),
            decimals: 18,
            tags: vec!["tokens".into()],
        };
        let handle = f.provider.accept(TxHash::repeat_byte(0x01));
        let outcome = f.controller.submit(&TransferRequest::new("3", recipient(), dai)).await.unwrap();
        assert!(matches!(outcome, SubmitOutcome::Pending(_)));
        assert!(matches!(f.provider.calls()[0], ProviderCall::Token { token, .. } if token == Address::repeat_byte(0x6b)));
        drop(handle);
    }

    #[tokio::test]
    async fn rejection_uses_short_message_under_fallback_id() {
        let f = fixture();
        f.provider.reject(ProviderError::rejected("User rejected the request."));

        let outcome = f.controller.submit(&eth_transfer("1")).await.unwrap();
        let SubmitOutcome::Failed { id, message } = outcome else { panic!("expected failure") };
        assert!(id.starts_with("tx_error_"));
        assert_eq!(message, "User rejected the request.");
        assert_eq!(f.board.get(&id).unwrap().style, ToastStyle::Error);
        assert!(!f.controller.is_submitting());
    }

    #[tokio::test]
    async fn rejection_without_short_message_uses_template() {
        let f = fixture();
        f.provider.reject(ProviderError::Rejected { short_message: None });
        let outcome = f.controller.submit(&eth_transfer("2")).await.unwrap();
        let SubmitOutcome::Failed { message, .. } = outcome else { panic!("expected failure") };
        assert_eq!(message, "Failed to send 2 ETH to 0x22...2222");
    }

    #[tokio::test]
    async fn unparsable_amount_fails_like_a_rejection() {
        let f = fixture();
        let outcome = f.controller.submit(&eth_transfer("one")).await.unwrap();
        assert!(matches!(outcome, SubmitOutcome::Failed { ref message, .. } if message == "Failed to send one ETH to 0x22...2222"));
        assert!(f.provider.calls().is_empty());
    }

    #[tokio::test]
    async fn shared_fallback_ids_collide() {
        let f = fixture();
        let controller = f.controller.with_fallback_ids(FallbackIds::Shared);
        f.provider.reject(ProviderError::rejected("first"));
        f.provider.reject(ProviderError::rejected("second"));
        controller.submit(&eth_transfer("1")).await.unwrap();
        controller.submit(&eth_transfer("1")).await.unwrap();

        assert_eq!(f.board.len(), 1);
        assert_eq!(f.board.get("tx_error").unwrap().message, "second");
    }

    #[tokio::test]
    async fn revert_after_pending_becomes_error_on_same_id() {
        let f = fixture();
        let hash = TxHash::repeat_byte(0x0c);
        let handle = f.provider.accept(hash);
        let SubmitOutcome::Pending(pending) = f.controller.submit(&eth_transfer("1")).await.unwrap() else {
            panic!("expected pending")
        };

        handle.fail(ProviderError::Reverted { hash, short_message: Some("execution reverted".into()) });
        let state = pending.settled().await;
        assert_eq!(state, SubmissionState::Failed { id: hash.to_string(), message: "execution reverted".into() });
        assert_eq!(f.board.len(), 1);
        assert_eq!(f.store.list().unwrap()[&hash.to_string()].kind, NotificationKind::Error);
    }

    #[tokio::test]
    async fn replacement_adds_notice_without_touching_pending() {
        let f = fixture();
        let hash = TxHash::repeat_byte(0x0d);
        let handle = f.provider.accept(hash);
        let SubmitOutcome::Pending(pending) = f.controller.submit(&eth_transfer("1")).await.unwrap() else {
            panic!("expected pending")
        };

        let mut states = pending.watch();
        let replacement = Replacement { reason: ReplacementReason::Repriced, hash: TxHash::repeat_byte(0x0e) };
        let handle = handle.replace(replacement);
        let replaced = replaced_id(&hash.to_string());
        states.wait_for(|s| matches!(s, SubmissionState::Replaced { .. })).await.unwrap();
        assert_eq!(
            pending.state(),
            SubmissionState::Replaced { id: hash.to_string(), replacement: TxHash::repeat_byte(0x0e) }
        );

        let notice = f.board.get(&replaced).expect("replacement notice");
        assert_eq!(notice.style, ToastStyle::Success);
        assert_eq!(notice.message, "TX replaced, sending 1 ETH to 0x22...2222");
        assert!(f.board.get(&hash.to_string()).unwrap().loading);
        assert!(!pending.state().is_terminal());

        handle.confirm(TxHash::repeat_byte(0x0e), 2);
        assert!(pending.settled().await.is_terminal());
        assert_eq!(f.board.get(&hash.to_string()).unwrap().style, ToastStyle::Success);
        assert_eq!(f.board.len(), 2);
    }

    #[tokio::test]
    async fn busy_while_a_submit_is_in_flight() {
        let f = fixture();
        let _held = SubmittingGuard::acquire(&f.controller.submitting).unwrap();
        assert!(f.controller.is_submitting());
        assert_eq!(f.controller.submit(&eth_transfer("1")).await.unwrap_err(), SubmitError::Busy);
    }

    #[test]
    fn unique_fallback_ids_differ() {
        assert_ne!(FallbackIds::Unique.next(), FallbackIds::Unique.next());
        assert_eq!(FallbackIds::Shared.next(), "tx_error");
    }
}
