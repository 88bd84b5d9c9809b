//! Persistent storage for the lngate gateway.
//!
//! One sled database holds both subsystems' state:
//!
//! - `accounts` / `indexes` — off-chain balance accounts and the
//!   process-wide invoice index cursor ([`AccountStore`]).
//! - `privacy-real-to-pseudo` / `privacy-pseudo-to-real` — the
//!   session-partitioned bidirectional pseudonym map
//!   ([`PrivacyMapDb`]).
//!
//! # Modules
//!
//! - [`engine`] — database lifecycle and tree access.
//! - [`accounts`] — account records and the index cursor.
//! - [`privacy_map`] — transactional real↔pseudo map plus the
//!   map-backed hide/reveal primitives.
//! - [`pseudo`] — random pseudonym generators and value codecs.

pub mod accounts;
pub mod engine;
pub mod privacy_map;
pub mod pseudo;

// Re-exports for consumers.
pub use accounts::AccountStore;
pub use engine::GateDb;
pub use privacy_map::{PrivacyMapDb, PrivacyMapTx};
