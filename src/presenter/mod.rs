use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::model::{DismissalEvent, NotificationKind, NotificationRecord};

pub trait Presenter: Send + Sync {
    /// Create or update the toast for `record.id`. Idempotent.
    fn show(&self, record: &NotificationRecord);
    /// Remove without reporting a dismissal (the removal came from elsewhere).
    fn remove(&self, id: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastStyle {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub id: String,
    pub message: String,
    pub style: ToastStyle,
    pub loading: bool,
    pub closable: bool,
    /// How many times the content changed after creation.
    pub updates: u32,
}

impl Toast {
    fn apply(&mut self, record: &NotificationRecord) -> bool {
        let (style, loading) = appearance(record.kind);
        if self.message == record.message && self.style == style && self.loading == loading {
            return false;
        }
        self.message = record.message.clone();
        self.style = style;
        self.loading = loading;
        self.updates += 1;
        true
    }
}

fn appearance(kind: NotificationKind) -> (ToastStyle, bool) {
    match kind {
        NotificationKind::Pending => (ToastStyle::Info, true),
        NotificationKind::Success => (ToastStyle::Success, false),
        NotificationKind::Error => (ToastStyle::Error, false),
        NotificationKind::Info => (ToastStyle::Info, false),
    }
}

pub type DismissalReports = mpsc::UnboundedReceiver<DismissalEvent>;

#[derive(Default)]
struct Board {
    toasts: HashMap<String, (u64, Toast)>,
    next_seq: u64,
}

/// One toast per id; showing a known id rewrites it in place.
pub struct ToastBoard {
    board: Mutex<Board>,
    dismissals: mpsc::UnboundedSender<DismissalEvent>,
}

impl ToastBoard {
    /// The receiver gets one event per user dismissal.
    pub fn new() -> (Self, DismissalReports) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { board: Mutex::new(Board::default()), dismissals: tx }, rx)
    }

    /// The user's close action. Returns false if nothing was showing.
    pub fn dismiss(&self, id: &str) -> bool {
        if self.board.lock().toasts.remove(id).is_none() {
            return false;
        }
        tracing::debug!(id, "toast dismissed");
        if self.dismissals.send(DismissalEvent::new(id)).is_err() {
            tracing::warn!(id, "no one is listening for dismissals");
        }
        true
    }

    pub fn get(&self, id: &str) -> Option<Toast> {
        self.board.lock().toasts.get(id).map(|(_, t)| t.clone())
    }

    /// Toasts in the order they first appeared.
    pub fn visible(&self) -> Vec<Toast> {
        let board = self.board.lock();
        let mut entries: Vec<_> = board.toasts.values().collect();
        entries.sort_by_key(|(seq, _)| *seq);
        entries.into_iter().map(|(_, t)| t.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.board.lock().toasts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Presenter for ToastBoard {
    fn show(&self, record: &NotificationRecord) {
        let mut board = self.board.lock();
        if let Some((_, toast)) = board.toasts.get_mut(&record.id) {
            if toast.apply(record) {
                tracing::debug!(id = %record.id, kind = ?record.kind, "toast updated");
            }
            return;
        }
        let (style, loading) = appearance(record.kind);
        let seq = board.next_seq;
        board.next_seq += 1;
        board.toasts.insert(
            record.id.clone(),
            (
                seq,
                Toast {
                    id: record.id.clone(),
                    message: record.message.clone(),
                    style,
                    loading,
                    closable: true,
                    updates: 0,
                },
            ),
        );
        tracing::debug!(id = %record.id, kind = ?record.kind, "toast created");
    }

    fn remove(&self, id: &str) {
        if self.board.lock().toasts.remove(id).is_some() {
            tracing::debug!(id, "toast removed");
        }
    }
}
