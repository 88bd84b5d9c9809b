//! Account store: balance accounts and the invoice index cursor.
//!
//! Every mutation is a single-key write followed by a flush, so an
//! account record is durable once the call returns and never partially
//! visible.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use lngate_types::{Account, AccountId, AccountType, GateError, Result};
use rand::RngCore;

use crate::engine::{GateDb, TREE_ACCOUNTS, TREE_INDEXES};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Key of the singleton cursor entry in the `indexes` tree. The value
/// is 16 bytes: the add index and the settle index, both big-endian.
const LAST_INDEXES_KEY: &[u8] = b"last-indexes";

/// Attempts at generating an unused random account id before giving up.
/// With 32 random bytes a collision is not expected within the lifetime
/// of the universe; the bound exists to turn a broken entropy source
/// into an error instead of a spin.
const MAX_ID_ATTEMPTS: usize = 10;

// ---------------------------------------------------------------------------
// AccountStore
// ---------------------------------------------------------------------------

/// Durable mapping from account id to [`Account`], plus the global
/// invoice index cursor.
#[derive(Clone)]
pub struct AccountStore {
    db: GateDb,
    accounts: sled::Tree,
    indexes: sled::Tree,
}

impl AccountStore {
    /// Creates a new `AccountStore` over the engine's trees.
    pub(crate) fn new(db: &GateDb) -> Result<Self> {
        let accounts = db.open_tree(TREE_ACCOUNTS)?;
        let indexes = db.open_tree(TREE_INDEXES)?;
        Ok(Self {
            db: db.clone(),
            accounts,
            indexes,
        })
    }

    /// Creates and persists a new account with the given opening
    /// balance (milli-satoshi) and expiry.
    ///
    /// The id is drawn from the OS random source and checked for
    /// uniqueness against the existing records.
    pub fn new_account(
        &self,
        balance_msat: i64,
        expiration: DateTime<Utc>,
    ) -> Result<Account> {
        if balance_msat < 0 {
            return Err(GateError::Config {
                reason: format!("opening balance must not be negative, got {balance_msat}"),
            });
        }

        let id = self.unused_id()?;
        let account = Account {
            id,
            account_type: AccountType::InitialBalance,
            current_balance: balance_msat,
            expiration,
            invoices: HashSet::new(),
            payments: HashMap::new(),
        };

        self.update_account(&account)?;
        Ok(account)
    }

    /// Persists `account`, overwriting any previous record with the
    /// same id, and flushes to disk.
    pub fn update_account(&self, account: &Account) -> Result<()> {
        let value = bincode::serialize(account).map_err(|e| GateError::Storage {
            reason: format!("failed to serialize account: {e}"),
        })?;

        self.accounts
            .insert(account.id.as_bytes(), value)
            .map_err(|e| GateError::Storage {
                reason: format!("failed to store account: {e}"),
            })?;

        self.db.flush()
    }

    /// Fetches the account with the given id.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::AccountNotFound`] if no such record exists.
    pub fn account(&self, id: &AccountId) -> Result<Account> {
        let raw = self
            .accounts
            .get(id.as_bytes())
            .map_err(|e| GateError::Storage {
                reason: format!("failed to read account: {e}"),
            })?
            .ok_or(GateError::AccountNotFound)?;

        decode_account(&raw)
    }

    /// Returns all stored accounts.
    pub fn accounts(&self) -> Result<Vec<Account>> {
        let mut result = Vec::new();
        for item in self.accounts.iter() {
            let (_, raw) = item.map_err(|e| GateError::Storage {
                reason: format!("failed to iterate accounts: {e}"),
            })?;
            result.push(decode_account(&raw)?);
        }
        Ok(result)
    }

    /// Removes the account with the given id.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::AccountNotFound`] if no such record exists.
    pub fn remove_account(&self, id: &AccountId) -> Result<()> {
        let prev = self
            .accounts
            .remove(id.as_bytes())
            .map_err(|e| GateError::Storage {
                reason: format!("failed to remove account: {e}"),
            })?;

        if prev.is_none() {
            return Err(GateError::AccountNotFound);
        }

        self.db.flush()
    }

    /// Persists the invoice subscription cursor.
    pub fn store_last_indexes(&self, add_index: u64, settle_index: u64) -> Result<()> {
        let mut value = [0u8; 16];
        value[..8].copy_from_slice(&add_index.to_be_bytes());
        value[8..].copy_from_slice(&settle_index.to_be_bytes());

        self.indexes
            .insert(LAST_INDEXES_KEY, &value)
            .map_err(|e| GateError::Storage {
                reason: format!("failed to store last indexes: {e}"),
            })?;

        self.db.flush()
    }

    /// Returns the persisted invoice subscription cursor as
    /// `(add_index, settle_index)`, defaulting to `(0, 0)` when the
    /// cursor was never stored.
    pub fn last_indexes(&self) -> Result<(u64, u64)> {
        let raw = self
            .indexes
            .get(LAST_INDEXES_KEY)
            .map_err(|e| GateError::Storage {
                reason: format!("failed to read last indexes: {e}"),
            })?;

        let Some(raw) = raw else {
            return Ok((0, 0));
        };

        if raw.len() != 16 {
            return Err(GateError::Storage {
                reason: format!("index cursor must be 16 bytes, got {}", raw.len()),
            });
        }

        let mut add = [0u8; 8];
        let mut settle = [0u8; 8];
        add.copy_from_slice(&raw[..8]);
        settle.copy_from_slice(&raw[8..]);

        Ok((u64::from_be_bytes(add), u64::from_be_bytes(settle)))
    }

    // -- Internal ---------------------------------------------------------

    /// Draws random ids until one is unused.
    fn unused_id(&self) -> Result<AccountId> {
        for _ in 0..MAX_ID_ATTEMPTS {
            let mut bytes = [0u8; 32];
            rand::rngs::OsRng.fill_bytes(&mut bytes);
            let id = AccountId::new(bytes);

            let exists = self
                .accounts
                .contains_key(id.as_bytes())
                .map_err(|e| GateError::Storage {
                    reason: format!("failed to probe account id: {e}"),
                })?;
            if !exists {
                return Ok(id);
            }
        }

        Err(GateError::Storage {
            reason: "could not generate an unused account id".into(),
        })
    }
}

/// Decodes a stored account record.
fn decode_account(raw: &[u8]) -> Result<Account> {
    bincode::deserialize(raw).map_err(|e| GateError::Storage {
        reason: format!("failed to deserialize account: {e}"),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::GateDb;
    use lngate_types::{PaymentEntry, PaymentState};

    /// RAII guard that removes a temporary database directory on drop.
    struct TempDb(std::path::PathBuf);

    impl TempDb {
        fn new(name: &str) -> Self {
            let path = std::env::temp_dir().join(format!(
                "lngate_accounts_test_{name}_{}",
                std::process::id()
            ));
            let _ = std::fs::remove_dir_all(&path);
            Self(path)
        }

        fn open(&self) -> GateDb {
            GateDb::open(&self.0).expect("open test db")
        }
    }

    impl Drop for TempDb {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.0);
        }
    }

    fn epoch() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(0, 0).unwrap()
    }

    #[test]
    fn new_account_roundtrip() -> Result<()> {
        let tmp = TempDb::new("roundtrip");
        let store = tmp.open().accounts()?;

        let created = store.new_account(1_234, epoch())?;
        assert_eq!(created.account_type, AccountType::InitialBalance);
        assert_eq!(created.current_balance, 1_234);

        let fetched = store.account(&created.id)?;
        assert_eq!(created, fetched);
        Ok(())
    }

    #[test]
    fn new_account_rejects_negative_balance() -> Result<()> {
        let tmp = TempDb::new("negative");
        let store = tmp.open().accounts()?;
        assert!(store.new_account(-1, epoch()).is_err());
        Ok(())
    }

    #[test]
    fn missing_account_not_found() -> Result<()> {
        let tmp = TempDb::new("missing");
        let store = tmp.open().accounts()?;

        let id = AccountId::new([7; 32]);
        assert_eq!(store.account(&id), Err(GateError::AccountNotFound));
        assert_eq!(store.remove_account(&id), Err(GateError::AccountNotFound));
        Ok(())
    }

    #[test]
    fn update_and_remove_account() -> Result<()> {
        let tmp = TempDb::new("update_remove");
        let store = tmp.open().accounts()?;

        let mut acct = store.new_account(5_000, epoch())?;
        acct.payments.insert(
            lngate_types::PaymentHash::new([1; 32]),
            PaymentEntry {
                status: PaymentState::InFlight,
                full_amount: 2_000,
            },
        );
        store.update_account(&acct)?;

        let fetched = store.account(&acct.id)?;
        assert_eq!(fetched.payments.len(), 1);

        store.remove_account(&acct.id)?;
        assert_eq!(store.account(&acct.id), Err(GateError::AccountNotFound));
        Ok(())
    }

    #[test]
    fn accounts_lists_all() -> Result<()> {
        let tmp = TempDb::new("list");
        let store = tmp.open().accounts()?;

        store.new_account(1, epoch())?;
        store.new_account(2, epoch())?;
        store.new_account(3, epoch())?;

        let all = store.accounts()?;
        assert_eq!(all.len(), 3);
        Ok(())
    }

    #[test]
    fn last_indexes_default_and_roundtrip() -> Result<()> {
        let tmp = TempDb::new("indexes");
        let store = tmp.open().accounts()?;

        assert_eq!(store.last_indexes()?, (0, 0));

        store.store_last_indexes(987_654, 555_555)?;
        assert_eq!(store.last_indexes()?, (987_654, 555_555));
        Ok(())
    }

    #[test]
    fn accounts_survive_reopen() -> Result<()> {
        let tmp = TempDb::new("reopen");
        let id = {
            let store = tmp.open().accounts()?;
            store.store_last_indexes(42, 43)?;
            store.new_account(777, epoch())?.id
        };

        let store = tmp.open().accounts()?;
        assert_eq!(store.account(&id)?.current_balance, 777);
        assert_eq!(store.last_indexes()?, (42, 43));
        Ok(())
    }
}
