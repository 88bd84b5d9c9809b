//! Session-scoped bidirectional pseudonym map.
//!
//! For every interception session the map holds `real → pseudo` and
//! `pseudo → real` entries across two sled trees, keyed by
//! `session_id || value`. Pairs are inserted together, never mutated
//! and never deleted while the session lives, so both directions stay
//! total inverses of each other.
//!
//! All access is transactional: [`PrivacyMapDb::update`] commits on
//! success and rolls back on any error, [`PrivacyMapDb::view`] is
//! read-only. A lookup miss surfaces as
//! [`GateError::NoSuchKeyFound`] — a signalling condition the hide
//! primitives use to decide when to allocate a fresh pseudonym.

use sled::transaction::{
    ConflictableTransactionError, TransactionError, TransactionalTree,
    UnabortableTransactionError,
};
use sled::Transactional;

use lngate_types::{GateError, Result, SessionId};

use crate::engine::{GateDb, TREE_PSEUDO_TO_REAL, TREE_REAL_TO_PSEUDO};
use crate::pseudo;

// ---------------------------------------------------------------------------
// PrivacyMapDb
// ---------------------------------------------------------------------------

/// Handle to the pseudonym map of one session.
#[derive(Clone)]
pub struct PrivacyMapDb {
    db: GateDb,
    r2p: sled::Tree,
    p2r: sled::Tree,
    session_id: SessionId,
    writer_lock: std::sync::Arc<std::sync::Mutex<()>>,
}

impl PrivacyMapDb {
    /// Creates a map handle scoped to `session_id`.
    pub(crate) fn new(db: &GateDb, session_id: SessionId) -> Result<Self> {
        let r2p = db.open_tree(TREE_REAL_TO_PSEUDO)?;
        let p2r = db.open_tree(TREE_PSEUDO_TO_REAL)?;
        Ok(Self {
            db: db.clone(),
            r2p,
            p2r,
            session_id,
            writer_lock: db.writer_lock(),
        })
    }

    /// Runs `f` inside a read-write transaction.
    ///
    /// The transaction is committed if `f` returns `Ok` and rolled
    /// back if it returns an error, in which case that error is
    /// returned unchanged. Writes made through the transaction are
    /// visible to later reads within the same `f` invocation.
    pub fn update<T>(&self, f: impl Fn(&PrivacyMapTx<'_>) -> Result<T>) -> Result<T> {
        let _guard = self.writer_lock.lock().map_err(|_| GateError::Storage {
            reason: "privacy map writer lock poisoned".into(),
        })?;

        let value = self.transact(true, f)?;
        self.db.flush()?;
        Ok(value)
    }

    /// Runs `f` inside a read-only transaction. Nothing `f` does can
    /// modify the map: the transaction handle refuses writes.
    pub fn view<T>(&self, f: impl Fn(&PrivacyMapTx<'_>) -> Result<T>) -> Result<T> {
        // Readers serialize with writers as well; the map never sees
        // an optimistic conflict and lookups stay retry-free.
        let _guard = self.writer_lock.lock().map_err(|_| GateError::Storage {
            reason: "privacy map writer lock poisoned".into(),
        })?;

        self.transact(false, f)
    }

    // -- Internal ---------------------------------------------------------

    fn transact<T>(
        &self,
        writable: bool,
        f: impl Fn(&PrivacyMapTx<'_>) -> Result<T>,
    ) -> Result<T> {
        (&self.r2p, &self.p2r)
            .transaction(|(r2p, p2r)| {
                let tx = PrivacyMapTx {
                    r2p,
                    p2r,
                    session_id: self.session_id,
                    writable,
                };
                f(&tx).map_err(ConflictableTransactionError::Abort)
            })
            .map_err(|e| match e {
                TransactionError::Abort(e) => e,
                TransactionError::Storage(e) => GateError::Storage {
                    reason: format!("privacy map transaction failed: {e}"),
                },
            })
    }
}

// ---------------------------------------------------------------------------
// PrivacyMapTx
// ---------------------------------------------------------------------------

/// An open transaction on one session's pseudonym map.
pub struct PrivacyMapTx<'a> {
    r2p: &'a TransactionalTree,
    p2r: &'a TransactionalTree,
    session_id: SessionId,
    writable: bool,
}

impl PrivacyMapTx<'_> {
    /// Persists a new real-pseudo pair in both directions.
    pub fn new_pair(&self, real: &str, pseudo: &str) -> Result<()> {
        if !self.writable {
            return Err(GateError::Storage {
                reason: "cannot insert a pair in a read-only transaction".into(),
            });
        }

        self.r2p
            .insert(self.scoped_key(real), pseudo.as_bytes())
            .map_err(tx_error)?;
        self.p2r
            .insert(self.scoped_key(pseudo), real.as_bytes())
            .map_err(tx_error)?;

        Ok(())
    }

    /// Returns the pseudo value paired with `real`.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::NoSuchKeyFound`] if no pair exists.
    pub fn real_to_pseudo(&self, real: &str) -> Result<String> {
        self.lookup(self.r2p, real)
    }

    /// Returns the real value paired with `pseudo`.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::NoSuchKeyFound`] if no pair exists.
    pub fn pseudo_to_real(&self, pseudo: &str) -> Result<String> {
        self.lookup(self.p2r, pseudo)
    }

    // -- Internal ---------------------------------------------------------

    fn lookup(&self, tree: &TransactionalTree, key: &str) -> Result<String> {
        let raw = tree.get(self.scoped_key(key)).map_err(tx_error)?;

        match raw {
            Some(v) if !v.is_empty() => {
                String::from_utf8(v.to_vec()).map_err(|_| GateError::Storage {
                    reason: "privacy map entry is not valid utf-8".into(),
                })
            }
            _ => Err(GateError::NoSuchKeyFound),
        }
    }

    fn scoped_key(&self, key: &str) -> Vec<u8> {
        let mut scoped = Vec::with_capacity(SessionId::LEN + key.len());
        scoped.extend_from_slice(self.session_id.as_bytes());
        scoped.extend_from_slice(key.as_bytes());
        scoped
    }
}

/// Maps a low-level transaction error. Conflicts cannot occur in
/// practice: all writers hold the engine's writer lock.
fn tx_error(e: UnabortableTransactionError) -> GateError {
    GateError::Storage {
        reason: format!("privacy map operation failed: {e}"),
    }
}

// ---------------------------------------------------------------------------
// Map-backed hide/reveal primitives
// ---------------------------------------------------------------------------

/// Returns the stable pseudonym for `real`, allocating a fresh
/// same-length hex string and inserting the pair on first sight.
pub fn hide_string(tx: &PrivacyMapTx<'_>, real: &str) -> Result<String> {
    match tx.real_to_pseudo(real) {
        Ok(pseudo) => return Ok(pseudo),
        Err(GateError::NoSuchKeyFound) => {}
        Err(e) => return Err(e),
    }

    let pseudo = pseudo::new_pseudo_str(real.len());
    tx.new_pair(real, &pseudo)?;
    Ok(pseudo)
}

/// Resolves a pseudonym back to its real string. The empty string
/// passes through unchanged.
pub fn reveal_string(tx: &PrivacyMapTx<'_>, pseudo: &str) -> Result<String> {
    if pseudo.is_empty() {
        return Ok(String::new());
    }
    tx.pseudo_to_real(pseudo)
}

/// Hides a byte slice by hex-encoding it, hiding the hex string and
/// decoding the pseudonym again. The pseudonym has the same byte
/// length as the original.
pub fn hide_bytes(tx: &PrivacyMapTx<'_>, real: &[u8]) -> Result<Vec<u8>> {
    let pseudo = hide_string(tx, &hex::encode(real))?;
    decode_hex(&pseudo)
}

/// Resolves pseudonym bytes back to the real bytes. Empty input passes
/// through unchanged.
pub fn reveal_bytes(tx: &PrivacyMapTx<'_>, pseudo: &[u8]) -> Result<Vec<u8>> {
    if pseudo.is_empty() {
        return Ok(Vec::new());
    }
    let real = reveal_string(tx, &hex::encode(pseudo))?;
    decode_hex(&real)
}

/// Returns the stable pseudonym for a `u64`, allocating a fresh random
/// value on first sight. Values are keyed by their canonical 16-char
/// big-endian hex form.
pub fn hide_u64(tx: &PrivacyMapTx<'_>, real: u64) -> Result<u64> {
    let key = pseudo::u64_to_str(real);

    match tx.real_to_pseudo(&key) {
        Ok(pseudo) => return pseudo::str_to_u64(&pseudo),
        Err(GateError::NoSuchKeyFound) => {}
        Err(e) => return Err(e),
    }

    let (value, value_str) = pseudo::new_pseudo_u64();
    tx.new_pair(&key, &value_str)?;
    Ok(value)
}

/// Resolves a pseudonym `u64` back to the real value. Zero passes
/// through unchanged.
pub fn reveal_u64(tx: &PrivacyMapTx<'_>, pseudo: u64) -> Result<u64> {
    if pseudo == 0 {
        return Ok(0);
    }
    let real = tx.pseudo_to_real(&pseudo::u64_to_str(pseudo))?;
    pseudo::str_to_u64(&real)
}

/// Returns the stable pseudonym for a channel point, allocating a
/// fresh syntactic channel point on first sight.
pub fn hide_chan_point(tx: &PrivacyMapTx<'_>, txid: &str, index: u32) -> Result<(String, u32)> {
    let cp = pseudo::encode_chan_point(txid, index);

    match tx.real_to_pseudo(&cp) {
        Ok(pseudo) => return pseudo::decode_chan_point(&pseudo),
        Err(GateError::NoSuchKeyFound) => {}
        Err(e) => return Err(e),
    }

    let new_cp = pseudo::new_pseudo_chan_point();
    tx.new_pair(&cp, &new_cp)?;
    pseudo::decode_chan_point(&new_cp)
}

/// Resolves a pseudonym channel point back to the real one.
///
/// Unlike the scalar primitives there is no pass-through: a channel
/// point that was never hidden cannot be resolved and the caller must
/// treat that as a failed rewrite.
pub fn reveal_chan_point(tx: &PrivacyMapTx<'_>, txid: &str, index: u32) -> Result<(String, u32)> {
    let cp = pseudo::encode_chan_point(txid, index);
    let real = tx.pseudo_to_real(&cp)?;
    pseudo::decode_chan_point(&real)
}

/// [`hide_chan_point`] over the combined `<txid>:<index>` notation.
pub fn hide_chan_point_str(tx: &PrivacyMapTx<'_>, cp: &str) -> Result<String> {
    let (txid, index) = pseudo::decode_chan_point(cp)?;
    let (new_txid, new_index) = hide_chan_point(tx, &txid, index)?;
    Ok(pseudo::encode_chan_point(&new_txid, new_index))
}

fn decode_hex(s: &str) -> Result<Vec<u8>> {
    hex::decode(s).map_err(|e| GateError::Storage {
        reason: format!("invalid pseudonym encoding: {e}"),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::GateDb;

    /// RAII guard that removes a temporary database directory on drop.
    struct TempDb(std::path::PathBuf);

    impl TempDb {
        fn new(name: &str) -> Self {
            let path = std::env::temp_dir().join(format!(
                "lngate_privacy_test_{name}_{}",
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

    fn session_a() -> SessionId {
        SessionId::new([0xAA; 32])
    }

    fn session_b() -> SessionId {
        SessionId::new([0xBB; 32])
    }

    #[test]
    fn new_pair_visible_in_both_directions() -> Result<()> {
        let tmp = TempDb::new("both_directions");
        let map = tmp.open().privacy_map(session_a())?;

        map.update(|tx| tx.new_pair("real", "pseudo"))?;

        map.view(|tx| {
            assert_eq!(tx.real_to_pseudo("real")?, "pseudo");
            assert_eq!(tx.pseudo_to_real("pseudo")?, "real");
            Ok(())
        })
    }

    #[test]
    fn lookup_miss_signals_no_such_key() -> Result<()> {
        let tmp = TempDb::new("miss");
        let map = tmp.open().privacy_map(session_a())?;

        map.view(|tx| {
            assert_eq!(
                tx.real_to_pseudo("unknown"),
                Err(GateError::NoSuchKeyFound),
            );
            assert_eq!(
                tx.pseudo_to_real("unknown"),
                Err(GateError::NoSuchKeyFound),
            );
            Ok(())
        })
    }

    #[test]
    fn failed_update_rolls_back() -> Result<()> {
        let tmp = TempDb::new("rollback");
        let map = tmp.open().privacy_map(session_a())?;

        let result: Result<()> = map.update(|tx| {
            tx.new_pair("real", "pseudo")?;
            Err(GateError::Config {
                reason: "forced failure".into(),
            })
        });
        assert!(result.is_err());

        map.view(|tx| {
            assert_eq!(tx.real_to_pseudo("real"), Err(GateError::NoSuchKeyFound));
            Ok(())
        })
    }

    #[test]
    fn update_has_read_your_writes() -> Result<()> {
        let tmp = TempDb::new("read_your_writes");
        let map = tmp.open().privacy_map(session_a())?;

        map.update(|tx| {
            tx.new_pair("real", "pseudo")?;
            assert_eq!(tx.real_to_pseudo("real")?, "pseudo");
            Ok(())
        })
    }

    #[test]
    fn view_refuses_writes() -> Result<()> {
        let tmp = TempDb::new("view_readonly");
        let map = tmp.open().privacy_map(session_a())?;

        let result = map.view(|tx| tx.new_pair("real", "pseudo"));
        assert!(matches!(result, Err(GateError::Storage { .. })));
        Ok(())
    }

    #[test]
    fn sessions_are_isolated() -> Result<()> {
        let tmp = TempDb::new("isolation");
        let db = tmp.open();
        let map_a = db.privacy_map(session_a())?;
        let map_b = db.privacy_map(session_b())?;

        map_a.update(|tx| tx.new_pair("real", "pseudo-a"))?;
        map_b.update(|tx| tx.new_pair("real", "pseudo-b"))?;

        map_a.view(|tx| {
            assert_eq!(tx.real_to_pseudo("real")?, "pseudo-a");
            Ok(())
        })?;
        map_b.view(|tx| {
            assert_eq!(tx.real_to_pseudo("real")?, "pseudo-b");
            Ok(())
        })
    }

    #[test]
    fn hide_string_is_stable_and_shape_preserving() -> Result<()> {
        let tmp = TempDb::new("hide_string");
        let map = tmp.open().privacy_map(session_a())?;

        let (first, second) = map.update(|tx| {
            let first = hide_string(tx, "a node alias")?;
            let second = hide_string(tx, "a node alias")?;
            Ok((first, second))
        })?;

        assert_eq!(first, second);
        assert_eq!(first.len(), "a node alias".len());

        // And it survives the commit: reveal round-trips.
        map.view(|tx| {
            assert_eq!(reveal_string(tx, &first)?, "a node alias");
            Ok(())
        })
    }

    #[test]
    fn reveal_string_passes_empty_through() -> Result<()> {
        let tmp = TempDb::new("reveal_empty");
        let map = tmp.open().privacy_map(session_a())?;
        map.view(|tx| {
            assert_eq!(reveal_string(tx, "")?, "");
            Ok(())
        })
    }

    #[test]
    fn hide_bytes_preserves_length() -> Result<()> {
        let tmp = TempDb::new("hide_bytes");
        let map = tmp.open().privacy_map(session_a())?;

        let real = vec![200u8, 19, 68, 149];
        let pseudo = map.update(|tx| hide_bytes(tx, &real))?;
        assert_eq!(pseudo.len(), real.len());

        map.view(|tx| {
            assert_eq!(reveal_bytes(tx, &pseudo)?, real);
            assert_eq!(reveal_bytes(tx, &[])?, Vec::<u8>::new());
            Ok(())
        })
    }

    #[test]
    fn hide_u64_is_stable_and_reversible() -> Result<()> {
        let tmp = TempDb::new("hide_u64");
        let map = tmp.open().privacy_map(session_a())?;

        let (first, second) = map.update(|tx| Ok((hide_u64(tx, 123)?, hide_u64(tx, 123)?)))?;
        assert_eq!(first, second);

        map.view(|tx| {
            assert_eq!(reveal_u64(tx, first)?, 123);
            assert_eq!(reveal_u64(tx, 0)?, 0);
            Ok(())
        })
    }

    #[test]
    fn hide_chan_point_roundtrip() -> Result<()> {
        let tmp = TempDb::new("chan_point");
        let map = tmp.open().privacy_map(session_a())?;

        let txid = "ab".repeat(32);
        let (p_txid, p_index) = map.update(|tx| hide_chan_point(tx, &txid, 7))?;
        assert_eq!(p_txid.len(), 64);

        map.view(|tx| {
            let (r_txid, r_index) = reveal_chan_point(tx, &p_txid, p_index)?;
            assert_eq!(r_txid, txid);
            assert_eq!(r_index, 7);
            Ok(())
        })?;

        // The combined form resolves to the same pseudonym.
        let combined = map.update(|tx| {
            hide_chan_point_str(tx, &pseudo::encode_chan_point(&txid, 7))
        })?;
        assert_eq!(combined, pseudo::encode_chan_point(&p_txid, p_index));
        Ok(())
    }

    #[test]
    fn reveal_chan_point_fails_for_unknown() -> Result<()> {
        let tmp = TempDb::new("chan_point_unknown");
        let map = tmp.open().privacy_map(session_a())?;
        map.view(|tx| {
            assert_eq!(
                reveal_chan_point(tx, &"cd".repeat(32), 1),
                Err(GateError::NoSuchKeyFound),
            );
            Ok(())
        })
    }

    #[test]
    fn pairs_survive_reopen() -> Result<()> {
        let tmp = TempDb::new("reopen");
        {
            let map = tmp.open().privacy_map(session_a())?;
            map.update(|tx| tx.new_pair("real", "pseudo"))?;
        }

        let map = tmp.open().privacy_map(session_a())?;
        map.view(|tx| {
            assert_eq!(tx.real_to_pseudo("real")?, "pseudo");
            Ok(())
        })
    }
}
