//! The account service: startup reconciliation, event watchers,
//! balance checks and shutdown.
//!
//! # Task model
//!
//! The service runs one long-lived watcher task per subscription: one
//! for the invoice stream and one per in-flight payment hash. Every
//! watcher multiplexes its update channel, its error channel and the
//! shared shutdown signal with `tokio::select!`. A stream error is
//! fatal for the watcher: it is forwarded to the caller-supplied main
//! error channel and the task exits.
//!
//! A single process-wide mutex guards the in-memory indexes and
//! serializes every account mutation together with its persistence, so
//! `check_balance` always observes a snapshot consistent with the most
//! recently committed event. The lock is never held across an await
//! point.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use lngate_db::{AccountStore, GateDb};
use lngate_types::{
    Account, AccountId, GateError, PaymentEntry, PaymentHash, PaymentState, Result,
};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::client::{EventStream, Invoice, InvoiceState, NodeClient, PaymentStatus};

// ---------------------------------------------------------------------------
// ServiceState
// ---------------------------------------------------------------------------

/// In-memory indexes guarded by the service mutex.
struct ServiceState {
    /// Payment hash → account whose invoice set contains it.
    invoice_to_account: HashMap<PaymentHash, AccountId>,
    /// Hashes of payments whose terminal state has not been observed.
    pending_payments: HashSet<PaymentHash>,
    /// Hashes already credited, so repeated settle events for the same
    /// invoice are ignored. Restarted subscriptions resume strictly
    /// past the persisted settle index, so this set need not be
    /// durable.
    settled_invoices: HashSet<PaymentHash>,
}

// ---------------------------------------------------------------------------
// AccountService
// ---------------------------------------------------------------------------

/// Off-chain balance accounting engine.
///
/// Construct with [`new`](Self::new), wire to a node with
/// [`start`](Self::start), and tear down with [`stop`](Self::stop).
/// All methods take `&self`; the service is shared behind an `Arc` by
/// the interception layer.
pub struct AccountService {
    store: AccountStore,
    state: Arc<Mutex<ServiceState>>,

    /// Fatal watcher errors are forwarded here. The caller must size
    /// the buffer to at least the number of subscriptions (pending
    /// payments plus one) so producers never block.
    main_err_tx: mpsc::Sender<GateError>,

    /// Signals all watcher tasks to exit.
    shutdown_tx: watch::Sender<bool>,
    /// Template receiver cloned into every watcher task.
    shutdown_rx: watch::Receiver<bool>,

    /// Handles of all spawned watcher tasks, awaited on stop.
    tasks: Mutex<Vec<JoinHandle<()>>>,

    /// The node client, set by `start`.
    client: Mutex<Option<Arc<dyn NodeClient>>>,

    started: AtomicBool,
}

impl AccountService {
    /// Creates the service over the given database.
    ///
    /// `main_err_tx` receives fatal subscription errors; the host
    /// application consumes them to decide on termination or restart.
    pub fn new(db: &GateDb, main_err_tx: mpsc::Sender<GateError>) -> Result<Self> {
        let store = db.accounts()?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            store,
            state: Arc::new(Mutex::new(ServiceState {
                invoice_to_account: HashMap::new(),
                pending_payments: HashSet::new(),
                settled_invoices: HashSet::new(),
            })),
            main_err_tx,
            shutdown_tx,
            shutdown_rx,
            tasks: Mutex::new(Vec::new()),
            client: Mutex::new(None),
            started: AtomicBool::new(false),
        })
    }

    /// Starts the service against a node.
    ///
    /// Loads all accounts, rebuilds the in-memory indexes, opens one
    /// payment subscription per pending (non-terminal) payment and
    /// finally the invoice subscription at the persisted index cursor.
    /// Payments already terminal are not re-subscribed: their balance
    /// effects were applied when they transitioned.
    ///
    /// # Errors
    ///
    /// A synchronously failing subscription call aborts startup with
    /// that error; nothing is posted on the main error channel. Must
    /// be called from within a tokio runtime.
    pub fn start(&self, client: Arc<dyn NodeClient>) -> Result<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(GateError::Config {
                reason: "account service already started".into(),
            });
        }

        let accounts = self.store.accounts()?;

        // Rebuild the in-memory indexes.
        let mut trackers = Vec::new();
        {
            let mut state = lock_state(&self.state)?;
            for account in &accounts {
                for hash in &account.invoices {
                    state.invoice_to_account.insert(*hash, account.id);
                }
                for (hash, entry) in &account.payments {
                    if !entry.status.is_terminal() {
                        state.pending_payments.insert(*hash);
                        trackers.push((account.id, *hash));
                    }
                }
            }
        }

        tracing::info!(
            accounts = accounts.len(),
            pending_payments = trackers.len(),
            "starting account service"
        );

        // Track pending payments before opening the invoice stream so
        // a failure here leaves no subscription behind.
        for (account_id, hash) in trackers {
            self.spawn_payment_watcher(client.as_ref(), account_id, hash)?;
        }

        let (add_index, settle_index) = self.store.last_indexes()?;
        let stream = client.subscribe_invoices(add_index, settle_index)?;
        self.spawn_invoice_watcher(stream)?;

        *lock(&self.client)? = Some(client);
        Ok(())
    }

    /// Stops the service: signals all watcher tasks and waits for them
    /// to exit. Idempotent.
    pub async fn stop(&self) -> Result<()> {
        let _ = self.shutdown_tx.send(true);

        let handles: Vec<_> = lock(&self.tasks)?.drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }

        tracing::info!("account service stopped");
        Ok(())
    }

    // -- Balance and account operations -----------------------------------

    /// Checks whether the account can spend `amount_msat` on top of
    /// all outstanding reservations.
    ///
    /// # Errors
    ///
    /// - [`GateError::AccountNotFound`] for an unknown id.
    /// - [`GateError::AccountExpired`] for an expired account.
    /// - [`GateError::BalanceInsufficient`] if the available balance
    ///   cannot cover the amount.
    pub fn check_balance(&self, id: &AccountId, amount_msat: i64) -> Result<()> {
        // Serializes with event application for a consistent snapshot.
        let _state = lock_state(&self.state)?;

        let account = self.store.account(id)?;
        if account.has_expired(Utc::now()) {
            return Err(GateError::AccountExpired);
        }

        if amount_msat > account.available_balance() {
            return Err(GateError::BalanceInsufficient);
        }

        Ok(())
    }

    /// Creates a new account with the given opening balance.
    pub fn new_account(
        &self,
        balance_msat: i64,
        expiration: DateTime<Utc>,
    ) -> Result<Account> {
        if expiration.timestamp() != 0 && expiration <= Utc::now() {
            return Err(GateError::Config {
                reason: "account expiration lies in the past".into(),
            });
        }
        self.store.new_account(balance_msat, expiration)
    }

    /// Fetches one account.
    pub fn account(&self, id: &AccountId) -> Result<Account> {
        self.store.account(id)
    }

    /// Returns all accounts.
    pub fn accounts(&self) -> Result<Vec<Account>> {
        self.store.accounts()
    }

    /// Removes an account and purges it from the in-memory indexes.
    ///
    /// Watchers of its in-flight payments observe the removal on their
    /// next event and drop it.
    pub fn remove_account(&self, id: &AccountId) -> Result<()> {
        let mut state = lock_state(&self.state)?;

        let account = self.store.account(id)?;
        self.store.remove_account(id)?;

        for hash in &account.invoices {
            state.invoice_to_account.remove(hash);
        }
        for (hash, entry) in &account.payments {
            if !entry.status.is_terminal() {
                state.pending_payments.remove(hash);
            }
        }

        tracing::info!(account = %id, "account removed");
        Ok(())
    }

    /// Registers a payment hash whose settlement credits the account.
    pub fn associate_invoice(&self, id: &AccountId, hash: PaymentHash) -> Result<()> {
        let mut state = lock_state(&self.state)?;

        let mut account = self.store.account(id)?;
        account.invoices.insert(hash);
        self.store.update_account(&account)?;

        state.invoice_to_account.insert(hash, *id);
        tracing::debug!(account = %id, %hash, "invoice associated");
        Ok(())
    }

    /// Registers an outgoing payment against the account, reserving
    /// `full_amount_msat` (amount plus routing fees), and opens its
    /// status subscription.
    ///
    /// # Errors
    ///
    /// Rejects hashes that already reached a terminal state for this
    /// account, and fails if the service has not been started.
    pub fn track_payment(
        &self,
        id: &AccountId,
        hash: PaymentHash,
        full_amount_msat: i64,
    ) -> Result<()> {
        let client = lock(&self.client)?
            .clone()
            .ok_or_else(|| GateError::Config {
                reason: "account service not started".into(),
            })?;

        {
            let mut state = lock_state(&self.state)?;

            let mut account = self.store.account(id)?;
            if let Some(entry) = account.payments.get(&hash) {
                if entry.status.is_terminal() {
                    return Err(GateError::Config {
                        reason: format!("payment {hash} already {}", entry.status),
                    });
                }
            }

            account.payments.insert(
                hash,
                PaymentEntry {
                    status: PaymentState::Unknown,
                    full_amount: full_amount_msat,
                },
            );
            self.store.update_account(&account)?;
            state.pending_payments.insert(hash);
        }

        if let Err(e) = self.spawn_payment_watcher(client.as_ref(), *id, hash) {
            // The reservation stays persisted and is re-tracked on the
            // next startup; only the in-memory pending mark is undone.
            lock_state(&self.state)?.pending_payments.remove(&hash);
            return Err(e);
        }

        tracing::debug!(account = %id, %hash, full_amount_msat, "payment tracked");
        Ok(())
    }

    /// Returns the account credited by the given invoice hash, if any.
    pub fn invoice_account(&self, hash: &PaymentHash) -> Result<Option<AccountId>> {
        Ok(lock_state(&self.state)?.invoice_to_account.get(hash).copied())
    }

    /// Returns whether a payment hash still awaits its terminal state.
    pub fn is_payment_pending(&self, hash: &PaymentHash) -> Result<bool> {
        Ok(lock_state(&self.state)?.pending_payments.contains(hash))
    }

    /// Returns the underlying account store.
    pub fn store(&self) -> &AccountStore {
        &self.store
    }

    // -- Watcher plumbing --------------------------------------------------

    fn spawn_payment_watcher(
        &self,
        client: &dyn NodeClient,
        account_id: AccountId,
        hash: PaymentHash,
    ) -> Result<()> {
        let stream = client.track_payment(hash)?;

        let store = self.store.clone();
        let state = Arc::clone(&self.state);
        let main_err = self.main_err_tx.clone();
        let shutdown = self.shutdown_rx.clone();

        let handle = tokio::spawn(async move {
            payment_watcher(stream, store, state, account_id, hash, main_err, shutdown).await;
        });
        lock(&self.tasks)?.push(handle);
        Ok(())
    }

    fn spawn_invoice_watcher(&self, stream: EventStream<Invoice>) -> Result<()> {
        let store = self.store.clone();
        let state = Arc::clone(&self.state);
        let main_err = self.main_err_tx.clone();
        let shutdown = self.shutdown_rx.clone();

        let handle = tokio::spawn(async move {
            invoice_watcher(stream, store, state, main_err, shutdown).await;
        });
        lock(&self.tasks)?.push(handle);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Watcher tasks
// ---------------------------------------------------------------------------

/// Drives one per-payment status subscription until a terminal state,
/// a stream failure or shutdown.
async fn payment_watcher(
    mut stream: EventStream<PaymentStatus>,
    store: AccountStore,
    state: Arc<Mutex<ServiceState>>,
    account_id: AccountId,
    hash: PaymentHash,
    main_err: mpsc::Sender<GateError>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut errors_open = true;

    loop {
        tokio::select! {
            update = stream.updates.recv() => {
                let Some(status) = update else {
                    tracing::debug!(%hash, "payment stream closed");
                    return;
                };

                match apply_payment_update(&store, &state, account_id, hash, &status) {
                    Ok(true) => return,
                    Ok(false) => {}
                    Err(e) => {
                        let _ = main_err.send(e).await;
                        return;
                    }
                }
            }

            err = stream.errors.recv(), if errors_open => {
                match err {
                    Some(e) => {
                        tracing::error!(%hash, %e, "payment subscription failed");
                        let _ = main_err.send(e).await;
                        return;
                    }
                    None => errors_open = false,
                }
            }

            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    return;
                }
            }
        }
    }
}

/// Applies one payment status update. Returns `true` when the watcher
/// is done (terminal state observed).
fn apply_payment_update(
    store: &AccountStore,
    state: &Arc<Mutex<ServiceState>>,
    account_id: AccountId,
    hash: PaymentHash,
    status: &PaymentStatus,
) -> Result<bool> {
    let mut state = lock_state(state)?;

    let mut account = match store.account(&account_id) {
        Ok(account) => account,
        Err(GateError::AccountNotFound) => {
            // Only a removal racing the stream can get here; the event
            // has nowhere to go.
            tracing::warn!(
                account = %account_id,
                %hash,
                "payment update for removed account dropped"
            );
            state.pending_payments.remove(&hash);
            return Ok(status.state.is_terminal());
        }
        Err(e) => return Err(e),
    };

    if !status.state.is_terminal() {
        // The only non-terminal transition is Unknown → InFlight; the
        // reservation was made when the payment was registered.
        match account.payments.get_mut(&hash) {
            Some(entry) if entry.status == PaymentState::Unknown => {
                entry.status = PaymentState::InFlight;
                store.update_account(&account)?;
            }
            Some(_) => {}
            None => {
                tracing::warn!(
                    account = %account_id,
                    %hash,
                    "status update for unregistered payment dropped"
                );
            }
        }
        return Ok(false);
    }

    match account.payments.get(&hash).map(|entry| entry.status) {
        Some(existing) if existing.is_terminal() => {
            // Terminal states are permanent; nothing to re-apply.
        }
        Some(_) => {
            if status.state == PaymentState::Succeeded {
                // Debit the actual cost, not the conservative
                // reservation.
                account.current_balance -= status.value_msat + status.fee_msat;
            }
            if let Some(entry) = account.payments.get_mut(&hash) {
                entry.status = status.state;
            }
            store.update_account(&account)?;

            tracing::info!(
                account = %account_id,
                %hash,
                state = %status.state,
                "payment settled"
            );
        }
        None => {
            tracing::warn!(
                account = %account_id,
                %hash,
                "terminal update for unregistered payment dropped"
            );
        }
    }

    state.pending_payments.remove(&hash);
    Ok(true)
}

/// Drives the invoice subscription until a stream failure or shutdown.
async fn invoice_watcher(
    mut stream: EventStream<Invoice>,
    store: AccountStore,
    state: Arc<Mutex<ServiceState>>,
    main_err: mpsc::Sender<GateError>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut errors_open = true;

    loop {
        tokio::select! {
            update = stream.updates.recv() => {
                let Some(invoice) = update else {
                    tracing::debug!("invoice stream closed");
                    return;
                };

                if let Err(e) = apply_invoice_update(&store, &state, &invoice) {
                    let _ = main_err.send(e).await;
                    return;
                }
            }

            err = stream.errors.recv(), if errors_open => {
                match err {
                    Some(e) => {
                        tracing::error!(%e, "invoice subscription failed");
                        let _ = main_err.send(e).await;
                        return;
                    }
                    None => errors_open = false,
                }
            }

            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    return;
                }
            }
        }
    }
}

/// Applies one invoice update: credits the owning account on first
/// settlement, then advances the persisted index cursor.
fn apply_invoice_update(
    store: &AccountStore,
    state: &Arc<Mutex<ServiceState>>,
    invoice: &Invoice,
) -> Result<()> {
    let mut state = lock_state(state)?;

    if invoice.state == InvoiceState::Settled && !state.settled_invoices.contains(&invoice.hash) {
        // Settle events for hashes no account tracks are ignored; only
        // the cursor advances.
        if let Some(account_id) = state.invoice_to_account.get(&invoice.hash).copied() {
            match store.account(&account_id) {
                Ok(mut account) => {
                    account.current_balance += invoice.amount_paid_msat;
                    store.update_account(&account)?;
                    state.settled_invoices.insert(invoice.hash);

                    tracing::info!(
                        account = %account_id,
                        hash = %invoice.hash,
                        amount_msat = invoice.amount_paid_msat,
                        "invoice settled, account credited"
                    );
                }
                Err(GateError::AccountNotFound) => {
                    tracing::warn!(
                        account = %account_id,
                        hash = %invoice.hash,
                        "settled invoice for removed account dropped"
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    // Each axis advances only when a strictly larger value is
    // observed.
    let (add_index, settle_index) = store.last_indexes()?;
    let new_add = add_index.max(invoice.add_index);
    let new_settle = settle_index.max(invoice.settle_index);
    if (new_add, new_settle) != (add_index, settle_index) {
        store.store_last_indexes(new_add, new_settle)?;
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Lock helpers
// ---------------------------------------------------------------------------

fn lock_state(state: &Arc<Mutex<ServiceState>>) -> Result<MutexGuard<'_, ServiceState>> {
    state.lock().map_err(|_| GateError::Storage {
        reason: "service state lock poisoned".into(),
    })
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex.lock().map_err(|_| GateError::Storage {
        reason: "service lock poisoned".into(),
    })
}
