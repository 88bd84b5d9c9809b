//! Core shared types for the lngate Lightning node gateway.
//!
//! This crate defines all fundamental types used across the workspace.
//! No other crate should define shared types — everything lives here.

pub mod config;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// AccountId
// ---------------------------------------------------------------------------

/// Opaque identifier of an off-chain balance account.
///
/// Generated from a cryptographically secure random source when the
/// account is created and never reused afterwards.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct AccountId([u8; 32]);

impl AccountId {
    /// The fixed byte length of an account identifier.
    pub const LEN: usize = 32;

    /// Creates a new `AccountId` from raw bytes.
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Returns the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<[u8; 32]> for AccountId {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for AccountId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for AccountId {
    type Err = GateError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|_| GateError::Config {
            reason: "invalid hex encoding for account id".into(),
        })?;
        if bytes.len() != Self::LEN {
            return Err(GateError::Config {
                reason: format!("expected 32 bytes for account id, got {}", bytes.len()),
            });
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

// ---------------------------------------------------------------------------
// PaymentHash
// ---------------------------------------------------------------------------

/// Payment hash identifying a Lightning invoice or outgoing payment.
///
/// The same hash may appear both in an account's invoice set and in its
/// payment map (a node paying itself); the two are independent ledger
/// entries.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct PaymentHash([u8; 32]);

impl PaymentHash {
    /// The fixed byte length of a payment hash.
    pub const LEN: usize = 32;

    /// Creates a new `PaymentHash` from raw bytes.
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Returns the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<[u8; 32]> for PaymentHash {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for PaymentHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for PaymentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for PaymentHash {
    type Err = GateError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|_| GateError::Config {
            reason: "invalid hex encoding for payment hash".into(),
        })?;
        if bytes.len() != Self::LEN {
            return Err(GateError::Config {
                reason: format!("expected 32 bytes for payment hash, got {}", bytes.len()),
            });
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

// ---------------------------------------------------------------------------
// SessionId
// ---------------------------------------------------------------------------

/// Identifier of an interception session, extracted from the storage id
/// embedded in the caller's macaroon.
///
/// The privacy map is partitioned by session id: pseudonyms are stable
/// and bijective within one session and meaningless across sessions.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct SessionId([u8; 32]);

impl SessionId {
    /// The fixed byte length of a session identifier.
    pub const LEN: usize = 32;

    /// Creates a new `SessionId` from raw bytes.
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Returns the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<[u8; 32]> for SessionId {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for SessionId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

// ---------------------------------------------------------------------------
// AccountType
// ---------------------------------------------------------------------------

/// Classifies how an account was funded.
///
/// Only initial-balance accounts exist today; the enum is kept open for
/// future funding schemes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum AccountType {
    /// Account funded once with a fixed opening balance.
    InitialBalance,
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InitialBalance => write!(f, "initial_balance"),
        }
    }
}

// ---------------------------------------------------------------------------
// PaymentState
// ---------------------------------------------------------------------------

/// Lifecycle state of an outgoing payment tracked against an account.
///
/// Transitions flow `Unknown → InFlight → {Succeeded, Failed}` or jump
/// directly to a terminal state. Terminal states are permanent.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum PaymentState {
    /// Registered but no status update observed yet.
    Unknown,
    /// The node reported the payment as in flight.
    InFlight,
    /// Terminal: the payment settled; the actual amount was debited.
    Succeeded,
    /// Terminal: the payment failed; the reservation was released.
    Failed,
}

impl PaymentState {
    /// Returns `true` for the permanent states.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for PaymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::InFlight => write!(f, "in_flight"),
            Self::Succeeded => write!(f, "succeeded"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

// ---------------------------------------------------------------------------
// PaymentEntry
// ---------------------------------------------------------------------------

/// Per-payment ledger entry held inside an [`Account`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PaymentEntry {
    /// Current state of the payment.
    pub status: PaymentState,
    /// Reserved debit in milli-satoshi, including routing fees.
    ///
    /// Reservations are conservative: on success the *actual* amount
    /// (value + fee) is debited instead.
    pub full_amount: i64,
}

// ---------------------------------------------------------------------------
// Account
// ---------------------------------------------------------------------------

/// An off-chain balance account.
///
/// The balance is a pure authorization construct: it bounds what the
/// owning client may spend through the node, it does not custody funds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Unique account identifier.
    pub id: AccountId,
    /// Funding scheme of this account.
    pub account_type: AccountType,
    /// Current balance in milli-satoshi.
    ///
    /// Signed so that arithmetic faults are observable rather than
    /// wrapping; the service never persists a negative balance while no
    /// operation is pending.
    pub current_balance: i64,
    /// Wall-clock expiry. The Unix epoch (timestamp 0) means the
    /// account never expires.
    pub expiration: DateTime<Utc>,
    /// Payment hashes whose settlement credits this account.
    pub invoices: HashSet<PaymentHash>,
    /// Outgoing payments tracked against this account.
    pub payments: HashMap<PaymentHash, PaymentEntry>,
}

impl Account {
    /// Returns the balance available for new spends: the current
    /// balance minus all non-terminal reservations.
    pub fn available_balance(&self) -> i64 {
        let reserved: i64 = self
            .payments
            .values()
            .filter(|e| !e.status.is_terminal())
            .map(|e| e.full_amount)
            .sum();
        self.current_balance - reserved
    }

    /// Returns `true` if the account has an expiry set and it has
    /// passed at `now`.
    pub fn has_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiration.timestamp() != 0 && self.expiration <= now
    }
}

// ---------------------------------------------------------------------------
// GateError
// ---------------------------------------------------------------------------

/// Central error type for the lngate system.
///
/// All crates in the workspace convert their internal errors into
/// variants of this enum, ensuring a unified error handling surface.
/// The unit variants are signalling conditions that callers routinely
/// branch on; the struct variants describe operational failures.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum GateError {
    /// A privacy map lookup found no entry for the given key.
    ///
    /// This is a signalling condition, not a fault: hide operations use
    /// it to decide when to allocate a fresh pseudonym.
    #[error("no such key found")]
    NoSuchKeyFound,

    /// The referenced account does not exist.
    #[error("account not found")]
    AccountNotFound,

    /// The referenced account has expired.
    #[error("account has expired")]
    AccountExpired,

    /// The account balance cannot cover the requested amount plus all
    /// outstanding reservations.
    #[error("account balance insufficient")]
    BalanceInsufficient,

    /// A database or serialization operation failed.
    #[error("storage error: {reason}")]
    Storage {
        /// Human-readable description of the storage failure.
        reason: String,
    },

    /// A node subscription stream reported a failure. Fatal for the
    /// owning watcher task.
    #[error("subscription error: {reason}")]
    Subscription {
        /// Human-readable description of the stream failure.
        reason: String,
    },

    /// An intercepted message could not be rewritten. The message is
    /// not forwarded.
    #[error("interception error: {reason}")]
    Intercept {
        /// Human-readable description of the rewrite failure.
        reason: String,
    },

    /// No session identity could be derived for an interception.
    #[error("invalid session: {reason}")]
    InvalidSession {
        /// Human-readable description of why no session id exists.
        reason: String,
    },

    /// A configuration or input value is invalid.
    #[error("config error: {reason}")]
    Config {
        /// Human-readable description of the configuration problem.
        reason: String,
    },
}

impl GateError {
    /// Shorthand for a [`GateError::Storage`] with a formatted reason.
    pub fn storage(reason: impl Into<String>) -> Self {
        Self::Storage {
            reason: reason.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Result alias
// ---------------------------------------------------------------------------

/// Convenience result type using [`GateError`].
pub type Result<T> = std::result::Result<T, GateError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
