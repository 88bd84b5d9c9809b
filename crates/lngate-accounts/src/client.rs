//! Node client interface consumed by the account service.
//!
//! The actual RPC plumbing lives outside this crate; the service only
//! needs the two subscription calls below. Both hand back channel
//! pairs: updates on one, a fatal stream error on the other. Dropping
//! a subscription's receivers releases it.

use lngate_types::{GateError, PaymentHash, PaymentState};
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Invoice events
// ---------------------------------------------------------------------------

/// Settlement state of an invoice.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InvoiceState {
    /// Created, not yet paid.
    Open,
    /// Paid; the settled amount is final.
    Settled,
    /// Cancelled before settlement.
    Cancelled,
    /// HTLCs accepted, settlement pending.
    Accepted,
}

/// One update from the invoice subscription.
#[derive(Clone, Debug)]
pub struct Invoice {
    /// Monotonic index assigned when the invoice was added.
    pub add_index: u64,
    /// Monotonic index assigned when the invoice settled; zero until
    /// then.
    pub settle_index: u64,
    /// Payment hash of the invoice.
    pub hash: PaymentHash,
    /// Amount actually paid, in milli-satoshi.
    pub amount_paid_msat: i64,
    /// Settlement state carried by this update.
    pub state: InvoiceState,
}

// ---------------------------------------------------------------------------
// Payment events
// ---------------------------------------------------------------------------

/// One update from a per-payment status subscription.
///
/// `fee_msat` and `value_msat` are meaningful only on terminal
/// updates.
#[derive(Clone, Copy, Debug)]
pub struct PaymentStatus {
    /// Lifecycle state of the payment.
    pub state: PaymentState,
    /// Routing fee paid, in milli-satoshi.
    pub fee_msat: i64,
    /// Amount delivered to the destination, in milli-satoshi.
    pub value_msat: i64,
}

// ---------------------------------------------------------------------------
// EventStream / NodeClient
// ---------------------------------------------------------------------------

/// A node subscription: updates on one channel, a fatal stream error
/// on the other.
pub struct EventStream<T> {
    /// Subscription updates, in arrival order.
    pub updates: mpsc::Receiver<T>,
    /// Stream failure. At most one error is ever delivered; the
    /// subscription is dead afterwards.
    pub errors: mpsc::Receiver<GateError>,
}

/// The node operations the account service consumes.
pub trait NodeClient: Send + Sync {
    /// Subscribes to invoice updates, resuming after the given add and
    /// settle indexes.
    fn subscribe_invoices(&self, add_index: u64, settle_index: u64)
        -> Result<EventStream<Invoice>, GateError>;

    /// Subscribes to status updates of one outgoing payment.
    fn track_payment(&self, hash: PaymentHash) -> Result<EventStream<PaymentStatus>, GateError>;
}
