//! Off-chain balance accounting in front of a Lightning node.
//!
//! The [`AccountService`](service::AccountService) keeps per-account
//! balances honest while payments are in flight: settled invoices
//! credit an account, terminal payments debit it, and non-terminal
//! payments reserve their full amount so `check_balance` reflects both
//! committed and pending state.
//!
//! The node is consumed through the [`NodeClient`](client::NodeClient)
//! interface — one long-lived invoice subscription resumed from the
//! persisted index cursor, plus one payment status subscription per
//! in-flight payment hash.
//!
//! # Modules
//!
//! - [`client`] — node client interface and event stream types.
//! - [`service`] — the account service itself.

pub mod client;
pub mod service;

// Re-exports for consumers.
pub use client::{EventStream, Invoice, InvoiceState, NodeClient, PaymentStatus};
pub use service::AccountService;
