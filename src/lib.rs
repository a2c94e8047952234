//! Transfer notifications that stay in sync across every open tab.
//!
//! A submission moves through pending / success / error stages. Each stage is
//! written to a [`db::DurableStore`], published on a [`realtime::Broadcaster`]
//! and shown on a [`presenter::Presenter`]. Every tab runs a
//! [`worker::spawn_tab_worker`] that replays the store at startup, applies
//! broadcasts from other tabs, and propagates dismissals.

pub mod config;
pub mod controller;
pub mod db;
pub mod errors;
pub mod model;
pub mod presenter;
pub mod provider;
pub mod realtime;
pub mod routes;
pub mod worker;

pub use controller::{FallbackIds, NotificationSink, PendingSubmission, SubmissionController, SubmissionState, SubmitError, SubmitOutcome};
pub use model::{BroadcastEnvelope, DismissalEvent, NotificationKind, NotificationRecord};
pub use presenter::{Presenter, Toast, ToastBoard, ToastStyle};
pub use worker::{spawn_tab_worker, TabWorker};
