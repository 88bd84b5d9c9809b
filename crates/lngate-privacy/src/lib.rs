//! RPC interception and privacy mapping.
//!
//! The [`PrivacyMapper`](mapper::PrivacyMapper) rewrites request and
//! response messages flowing between a client and the node: real
//! identifiers (public keys, channel ids, channel points) are replaced
//! with stable per-session pseudonyms from the
//! [`lngate_db::PrivacyMapDb`], and numeric fields (amounts,
//! timestamps) are fuzzed within bounded intervals so observers cannot
//! reconstruct exact routing data.
//!
//! Request-side rewrites *reveal* (pseudo → real) so the node sees
//! real data; response-side rewrites *hide* (real → pseudo).
//!
//! # Modules
//!
//! - [`fuzz`] — injectable randomness and the bounded-noise fields.
//! - [`intercept`] — host-framework message types and session routing.
//! - [`lnrpc`] — hand-maintained subset of the node's RPC messages.
//! - [`mapper`] — the per-URI, per-direction rewrite table.

pub mod fuzz;
pub mod intercept;
pub mod lnrpc;
pub mod mapper;

// Re-exports for consumers.
pub use fuzz::{crypto_rand_intn, RandIntn};
pub use intercept::{InterceptFeedback, InterceptType, InterceptionRequest, Macaroon};
pub use mapper::PrivacyMapper;
