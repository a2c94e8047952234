//! Transaction provider seam.
//!
//! The provider signs, submits and watches transfers. This crate only needs
//! the three calls below. Everything chain-specific lives behind them.

use alloy_primitives::{
    utils::{ParseUnits, Unit},
    Address, TxHash, U256,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Placeholder address token lists use for the chain's native asset.
pub const NATIVE_TOKEN: Address = Address::repeat_byte(0xee);

const NATIVE_TAG: &str = "native";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenDescriptor {
    pub address: Address,
    pub symbol: String,
    pub name: String,
    pub decimals: u8,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl TokenDescriptor {
    pub fn native(symbol: &str, name: &str) -> Self {
        Self {
            address: NATIVE_TOKEN,
            symbol: symbol.to_string(),
            name: name.to_string(),
            decimals: 18,
            tags: vec![NATIVE_TAG.to_string()],
        }
    }

    pub fn is_native(&self) -> bool {
        self.tags.iter().any(|t| t == NATIVE_TAG)
    }
}

/// A form submission that already passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    /// As typed by the user; also used verbatim in messages.
    pub amount: String,
    pub recipient: Address,
    pub token: TokenDescriptor,
}

impl TransferRequest {
    pub fn new(amount: impl Into<String>, recipient: Address, token: TokenDescriptor) -> Self {
        Self { amount: amount.into(), recipient, token }
    }

    /// Amount in the token's base units.
    pub fn value(&self) -> Result<U256, ProviderError> {
        let unit = Unit::new(self.token.decimals).ok_or_else(|| ProviderError::InvalidAmount {
            amount: self.amount.clone(),
            reason: format!("unsupported decimals {}", self.token.decimals),
        })?;
        match ParseUnits::parse_units(&self.amount, unit) {
            Ok(ParseUnits::U256(value)) => Ok(value),
            Ok(ParseUnits::I256(_)) => Err(ProviderError::InvalidAmount {
                amount: self.amount.clone(),
                reason: "negative amount".into(),
            }),
            Err(e) => Err(ProviderError::InvalidAmount { amount: self.amount.clone(), reason: e.to_string() }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub hash: TxHash,
    pub block_number: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplacementReason {
    Replaced,
    Repriced,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replacement {
    pub reason: ReplacementReason,
    pub hash: TxHash,
}

pub type ReplacementSender = mpsc::UnboundedSender<Replacement>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("{}", .short_message.as_deref().unwrap_or("request rejected"))]
    Rejected { short_message: Option<String> },
    #[error("transaction {hash} reverted")]
    Reverted { hash: TxHash, short_message: Option<String> },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("invalid amount {amount:?}: {reason}")]
    InvalidAmount { amount: String, reason: String },
}

impl ProviderError {
    pub fn rejected(short_message: impl Into<String>) -> Self {
        ProviderError::Rejected { short_message: Some(short_message.into()) }
    }

    /// Human-readable text the wallet supplied, if any.
    pub fn short_message(&self) -> Option<&str> {
        match self {
            ProviderError::Rejected { short_message } | ProviderError::Reverted { short_message, .. } => {
                short_message.as_deref()
            }
            ProviderError::Transport(_) | ProviderError::InvalidAmount { .. } => None,
        }
    }
}

#[async_trait]
pub trait TransactionProvider: Send + Sync {
    async fn submit_native(&self, to: Address, value: U256) -> Result<TxHash, ProviderError>;

    async fn submit_token_transfer(&self, token: Address, to: Address, value: U256) -> Result<TxHash, ProviderError>;

    /// Resolves once `hash` (or whatever replaced it) is mined. Replacements
    /// seen along the way are reported on `replaced`.
    async fn await_confirmation(&self, hash: TxHash, replaced: ReplacementSender) -> Result<Confirmation, ProviderError>;
}

/// Calls the provider has received, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCall {
    Native { to: Address, value: U256 },
    Token { token: Address, to: Address, value: U256 },
    Await { hash: TxHash },
}

/// Deterministic provider for demos and tests.
///
/// Submit results are consumed in order; the confirmation for a submission
/// resolves when the paired [`ConfirmationHandle`] is released.
#[derive(Default)]
pub struct ScriptedProvider {
    submits: Mutex<Vec<Result<TxHash, ProviderError>>>,
    confirmations: Mutex<Vec<oneshot::Receiver<Scripted>>>,
    calls: Mutex<Vec<ProviderCall>>,
}

enum Scripted {
    Replace(Replacement, oneshot::Receiver<Scripted>),
    Settle(Result<Confirmation, ProviderError>),
}

pub struct ConfirmationHandle {
    tx: oneshot::Sender<Scripted>,
}

impl ConfirmationHandle {
    /// Report a replacement; the wait continues on the returned handle.
    pub fn replace(self, replacement: Replacement) -> ConfirmationHandle {
        let (tx, rx) = oneshot::channel();
        let _ = self.tx.send(Scripted::Replace(replacement, rx));
        ConfirmationHandle { tx }
    }

    pub fn confirm(self, hash: TxHash, block_number: u64) {
        let _ = self.tx.send(Scripted::Settle(Ok(Confirmation { hash, block_number: Some(block_number) })));
    }

    pub fn fail(self, error: ProviderError) {
        let _ = self.tx.send(Scripted::Settle(Err(error)));
    }
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next submit succeeds with `hash`; its confirmation is driven by the
    /// returned handle.
    pub fn accept(&self, hash: TxHash) -> ConfirmationHandle {
        let (tx, rx) = oneshot::channel();
        self.submits.lock().push(Ok(hash));
        self.confirmations.lock().push(rx);
        ConfirmationHandle { tx }
    }

    pub fn reject(&self, error: ProviderError) {
        self.submits.lock().push(Err(error));
    }

    pub fn calls(&self) -> Vec<ProviderCall> {
        self.calls.lock().clone()
    }

    fn next_submit(&self) -> Result<TxHash, ProviderError> {
        let mut submits = self.submits.lock();
        if submits.is_empty() {
            return Err(ProviderError::Transport("no scripted submission left".into()));
        }
        submits.remove(0)
    }
}

#[async_trait]
impl TransactionProvider for ScriptedProvider {
    async fn submit_native(&self, to: Address, value: U256) -> Result<TxHash, ProviderError> {
        self.calls.lock().push(ProviderCall::Native { to, value });
        self.next_submit()
    }

    async fn submit_token_transfer(&self, token: Address, to: Address, value: U256) -> Result<TxHash, ProviderError> {
        self.calls.lock().push(ProviderCall::Token { token, to, value });
        self.next_submit()
    }

    async fn await_confirmation(&self, hash: TxHash, replaced: ReplacementSender) -> Result<Confirmation, ProviderError> {
        self.calls.lock().push(ProviderCall::Await { hash });
        let mut pending = {
            let mut confirmations = self.confirmations.lock();
            if confirmations.is_empty() {
                return Err(ProviderError::Transport("no scripted confirmation left".into()));
            }
            confirmations.remove(0)
        };
        loop {
            match pending.await {
                Ok(Scripted::Replace(replacement, next)) => {
                    let _ = replaced.send(replacement);
                    pending = next;
                }
                Ok(Scripted::Settle(outcome)) => return outcome,
                Err(_) => return Err(ProviderError::Transport("confirmation handle dropped".into())),
            }
        }
    }
}
