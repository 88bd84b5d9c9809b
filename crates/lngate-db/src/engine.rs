//! Core storage engine: database lifecycle and tree access.
//!
//! The [`GateDb`] owns the sled database. On [`open`](GateDb::open) it
//! opens the database and creates all required trees. Store handles
//! returned by the accessors hold cheap clones of the underlying trees
//! and stay valid for the lifetime of the process.

use std::path::Path;
use std::sync::{Arc, Mutex};

use lngate_types::{GateError, Result, SessionId};

use crate::accounts::AccountStore;
use crate::privacy_map::PrivacyMapDb;

// ---------------------------------------------------------------------------
// Tree names
// ---------------------------------------------------------------------------

/// Account id → serialized account record.
pub(crate) const TREE_ACCOUNTS: &str = "accounts";

/// Singleton invoice index cursor.
pub(crate) const TREE_INDEXES: &str = "indexes";

/// `session_id || real` → pseudo.
pub(crate) const TREE_REAL_TO_PSEUDO: &str = "privacy-real-to-pseudo";

/// `session_id || pseudo` → real.
pub(crate) const TREE_PSEUDO_TO_REAL: &str = "privacy-pseudo-to-real";

/// All trees pre-created on open.
const ALL_TREES: [&str; 4] = [
    TREE_ACCOUNTS,
    TREE_INDEXES,
    TREE_REAL_TO_PSEUDO,
    TREE_PSEUDO_TO_REAL,
];

// ---------------------------------------------------------------------------
// GateDb
// ---------------------------------------------------------------------------

/// Storage engine backed by sled.
///
/// Cloning is cheap: all clones share the same underlying database and
/// writer lock.
#[derive(Clone)]
pub struct GateDb {
    db: sled::Db,
    /// Serializes privacy map write transactions. sled transactions are
    /// optimistic; taking this lock up front gives the map the
    /// single-writer semantics its callers rely on.
    writer_lock: Arc<Mutex<()>>,
}

impl GateDb {
    /// Opens (or creates) the database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::Storage`] if the database or any tree
    /// cannot be opened.
    pub fn open(path: &Path) -> Result<Self> {
        let db = sled::open(path).map_err(|e| GateError::Storage {
            reason: format!("failed to open database: {e}"),
        })?;

        // Pre-create all trees so they exist for later access.
        for name in &ALL_TREES {
            db.open_tree(name).map_err(|e| GateError::Storage {
                reason: format!("failed to open tree '{name}': {e}"),
            })?;
        }

        Ok(Self {
            db,
            writer_lock: Arc::new(Mutex::new(())),
        })
    }

    /// Flushes all pending writes to disk.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::Storage`] if the flush fails.
    pub fn flush(&self) -> Result<()> {
        self.db.flush().map_err(|e| GateError::Storage {
            reason: format!("failed to flush database: {e}"),
        })?;
        Ok(())
    }

    /// Opens a named sled tree.
    pub(crate) fn open_tree(&self, name: &str) -> Result<sled::Tree> {
        self.db.open_tree(name).map_err(|e| GateError::Storage {
            reason: format!("failed to open tree '{name}': {e}"),
        })
    }

    /// Returns the [`AccountStore`] for this database.
    pub fn accounts(&self) -> Result<AccountStore> {
        AccountStore::new(self)
    }

    /// Returns the [`PrivacyMapDb`] scoped to `session_id`.
    pub fn privacy_map(&self, session_id: SessionId) -> Result<PrivacyMapDb> {
        PrivacyMapDb::new(self, session_id)
    }

    /// Returns the shared privacy map writer lock.
    pub(crate) fn writer_lock(&self) -> Arc<Mutex<()>> {
        Arc::clone(&self.writer_lock)
    }
}
