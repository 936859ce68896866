use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

use rocksdb::{Options, WriteBatch, DB};
use serde::{de::DeserializeOwned, Serialize};

use crate::codec;
use crate::error::Error;
use crate::keys::{self, ALL_COLUMN_FAMILIES, CF_BLOCK_UNDO};

/// One recorded mutation, captured before it is staged, so a block's
/// effects can be undone exactly on disconnect. `old_value: None` means
/// the key did not exist before this write and must be erased on undo;
/// `Some(bytes)` means it must be restored verbatim.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct UndoEntry {
    cf: String,
    key: Vec<u8>,
    old_value: Option<Vec<u8>>,
}

/// A single block's worth of staged writes. Every write made through a
/// `KvBatch` is captured into an in-memory undo log as well as the
/// underlying `rocksdb::WriteBatch`; both are committed together so the
/// undo journal can never disagree with what was actually applied.
///
/// `pending` mirrors the batch's net effect per key (`Some(bytes)` staged,
/// `None` staged-deleted) so reads made against this same batch — by a
/// later transaction in the same block — observe earlier transactions'
/// writes before they are ever committed to the underlying `DB`. Per
/// spec §5/§4.11, a block has exactly one open batch, and every read a
/// component store performs while that batch is open must go through it.
pub struct KvBatch<'a> {
    db: &'a DB,
    batch: WriteBatch,
    undo: Vec<UndoEntry>,
    pending: HashMap<(String, Vec<u8>), Option<Vec<u8>>>,
}

impl<'a> KvBatch<'a> {
    fn cf<'b>(&'b self, name: &str) -> Result<rocksdb::ColumnFamilyRef<'b>, Error> {
        self.db
            .cf_handle(name)
            .ok_or(Error::Backend(format!("missing column family {name}")))
    }

    /// The value this batch would currently produce for `(cf_name, key)` if
    /// written so far, or `None` if nothing in this batch has touched it
    /// yet — in which case the caller must fall back to the committed `DB`.
    fn pending_value(&self, cf_name: &str, key: &[u8]) -> Option<Option<Vec<u8>>> {
        self.pending.get(&(cf_name.to_string(), key.to_vec())).cloned()
    }

    /// Stages a raw `put`, recording the prior value (if any) for undo.
    /// The prior value is whatever this same batch last staged for the
    /// key, falling back to the committed `DB` only the first time the key
    /// is touched this block.
    pub fn put_raw(&mut self, cf_name: &str, key: &[u8], value: &[u8]) -> Result<(), Error> {
        let cf = self.cf(cf_name)?;
        let map_key = (cf_name.to_string(), key.to_vec());
        let old = match self.pending_value(cf_name, key) {
            Some(staged) => staged,
            None => self
                .db
                .get_cf(&cf, key)
                .map_err(|e| Error::Backend(e.to_string()))?,
        };
        self.undo.push(UndoEntry {
            cf: cf_name.to_string(),
            key: key.to_vec(),
            old_value: old,
        });
        self.batch.put_cf(&cf, key, value);
        self.pending.insert(map_key, Some(value.to_vec()));
        Ok(())
    }

    /// Stages a raw `delete`, recording the prior value for undo.
    pub fn delete_raw(&mut self, cf_name: &str, key: &[u8]) -> Result<(), Error> {
        let cf = self.cf(cf_name)?;
        let map_key = (cf_name.to_string(), key.to_vec());
        let old = match self.pending_value(cf_name, key) {
            Some(staged) => staged,
            None => self
                .db
                .get_cf(&cf, key)
                .map_err(|e| Error::Backend(e.to_string()))?,
        };
        if let Some(old_value) = old {
            self.undo.push(UndoEntry {
                cf: cf_name.to_string(),
                key: key.to_vec(),
                old_value: Some(old_value),
            });
            self.batch.delete_cf(&cf, key);
            self.pending.insert(map_key, None);
        }
        Ok(())
    }

    /// Typed convenience over [`Self::put_raw`].
    pub fn put<V: Serialize>(&mut self, cf_name: &str, key: &[u8], value: &V) -> Result<(), Error> {
        let bytes = codec::encode(value)?;
        self.put_raw(cf_name, key, &bytes)
    }

    /// Reads `(cf_name, key)` as it stands right now within this batch:
    /// whatever this batch has staged for it, or the committed `DB` value
    /// if nothing has touched it this block.
    pub fn get_raw(&self, cf_name: &str, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        if let Some(staged) = self.pending_value(cf_name, key) {
            return Ok(staged);
        }
        let cf = self.cf(cf_name)?;
        self.db
            .get_cf(&cf, key)
            .map_err(|e| Error::Backend(e.to_string()))
    }

    /// Typed convenience over [`Self::get_raw`].
    pub fn get<V: DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<V>, Error> {
        match self.get_raw(cf_name, key)? {
            None => Ok(None),
            Some(bytes) => match codec::decode::<V>(&bytes) {
                Ok(v) => Ok(Some(v)),
                Err(Error::Corruption) => Ok(None),
                Err(e) => Err(e),
            },
        }
    }

    pub fn exists(&self, cf_name: &str, key: &[u8]) -> Result<bool, Error> {
        Ok(self.get_raw(cf_name, key)?.is_some())
    }

    /// Byte-ordered scan of every entry whose key starts with `prefix`,
    /// merging the committed `DB` state with whatever this batch has
    /// staged so far this block (staged puts override, staged deletes
    /// suppress).
    pub fn iter_prefix_raw(&self, cf_name: &str, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, Error> {
        let cf = self.cf(cf_name)?;
        let mode = rocksdb::IteratorMode::From(prefix, rocksdb::Direction::Forward);
        let mut merged: BTreeMap<Vec<u8>, Vec<u8>> = BTreeMap::new();
        for item in self.db.iterator_cf(&cf, mode) {
            let (key, value) = item.map_err(|e| Error::Backend(e.to_string()))?;
            if !key.starts_with(prefix) {
                break;
            }
            merged.insert(key.to_vec(), value.to_vec());
        }
        for ((pending_cf, pending_key), pending_val) in &self.pending {
            if pending_cf != cf_name || !pending_key.starts_with(prefix) {
                continue;
            }
            match pending_val {
                Some(bytes) => {
                    merged.insert(pending_key.clone(), bytes.clone());
                }
                None => {
                    merged.remove(pending_key);
                }
            }
        }
        Ok(merged.into_iter().collect())
    }

    /// Typed convenience over [`Self::iter_prefix_raw`].
    pub fn iter_prefix<V: DeserializeOwned>(
        &self,
        cf_name: &str,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, V)>, Error> {
        let raw = self.iter_prefix_raw(cf_name, prefix)?;
        let mut out = Vec::with_capacity(raw.len());
        for (key, bytes) in raw {
            match codec::decode::<V>(&bytes) {
                Ok(v) => out.push((key, v)),
                Err(Error::Corruption) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }
}

/// Typed, thin facade over a byte-keyed RocksDB handle. Readers and the single block-processing writer coordinate purely
/// through RocksDB's own MVCC snapshots: queries never observe a
/// partially-applied block.
#[derive(Clone)]
pub struct KvStore {
    db: Arc<DB>,
}

impl KvStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let db = DB::open_cf(&opts, path, ALL_COLUMN_FAMILIES.iter().copied())
            .map_err(|e| Error::Backend(e.to_string()))?;

        Ok(Self { db: Arc::new(db) })
    }

    fn cf(&self, name: &str) -> Result<rocksdb::ColumnFamilyRef<'_>, Error> {
        self.db
            .cf_handle(name)
            .ok_or(Error::Backend(format!("missing column family {name}")))
    }

    pub fn exists(&self, cf_name: &str, key: &[u8]) -> Result<bool, Error> {
        let cf = self.cf(cf_name)?;
        self.db
            .get_cf(&cf, key)
            .map(|v| v.is_some())
            .map_err(|e| Error::Backend(e.to_string()))
    }

    pub fn get_raw(&self, cf_name: &str, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        let cf = self.cf(cf_name)?;
        self.db
            .get_cf(&cf, key)
            .map_err(|e| Error::Backend(e.to_string()))
    }

    /// Reads and decodes a value. A deserialize failure is logged and
    /// reported as absent rather
    /// than propagated.
    pub fn get<V: DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<V>, Error> {
        match self.get_raw(cf_name, key)? {
            None => Ok(None),
            Some(bytes) => match codec::decode::<V>(&bytes) {
                Ok(v) => Ok(Some(v)),
                Err(Error::Corruption) => Ok(None),
                Err(e) => Err(e),
            },
        }
    }

    /// Byte-ordered scan of every entry whose key starts with `prefix`.
    pub fn iter_prefix_raw(
        &self,
        cf_name: &str,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, Error> {
        let cf = self.cf(cf_name)?;
        let mode = rocksdb::IteratorMode::From(prefix, rocksdb::Direction::Forward);
        let mut out = Vec::new();
        for item in self.db.iterator_cf(&cf, mode) {
            let (key, value) = item.map_err(|e| Error::Backend(e.to_string()))?;
            if !key.starts_with(prefix) {
                break;
            }
            out.push((key.to_vec(), value.to_vec()));
        }
        Ok(out)
    }

    /// Typed convenience over [`Self::iter_prefix_raw`]; entries that fail
    /// to deserialize are skipped (logged as corruption) rather than
    /// aborting the whole scan.
    pub fn iter_prefix<V: DeserializeOwned>(
        &self,
        cf_name: &str,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, V)>, Error> {
        let raw = self.iter_prefix_raw(cf_name, prefix)?;
        let mut out = Vec::with_capacity(raw.len());
        for (key, bytes) in raw {
            match codec::decode::<V>(&bytes) {
                Ok(v) => out.push((key, v)),
                Err(Error::Corruption) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }

    /// Opens a batch for block `height`. Every write made against the
    /// returned `KvBatch` is staged only; nothing is visible to readers
    /// until [`Self::commit_block`].
    pub fn begin_block(&self, _height: u32) -> KvBatch<'_> {
        KvBatch {
            db: &self.db,
            batch: WriteBatch::default(),
            undo: Vec::new(),
            pending: HashMap::new(),
        }
    }

    /// Commits a block's batch atomically, writing the undo journal entry
    /// for `height` as part of the same RocksDB write so the journal can
    /// never disagree with the applied state.
    pub fn commit_block(&self, height: u32, mut batch: KvBatch<'_>) -> Result<(), Error> {
        let undo_cf = self.cf(CF_BLOCK_UNDO)?;
        let undo_bytes = codec::encode(&batch.undo)?;
        batch
            .batch
            .put_cf(&undo_cf, keys::block_undo_key(height), undo_bytes);

        self.db
            .write(batch.batch)
            .map_err(|e| Error::Backend(e.to_string()))
    }

    /// Reverses every write staged for `height`, in reverse order, and
    /// removes that height's undo journal entry. Idempotent: disconnecting
    /// a height with no journal entry (nothing was ever applied there) is
    /// a no-op, never an error.
    pub fn disconnect_block(&self, height: u32) -> Result<(), Error> {
        let undo_cf = self.cf(CF_BLOCK_UNDO)?;
        let key = keys::block_undo_key(height);

        let Some(bytes) = self
            .db
            .get_cf(&undo_cf, &key)
            .map_err(|e| Error::Backend(e.to_string()))?
        else {
            return Ok(());
        };

        let entries: Vec<UndoEntry> = codec::decode(&bytes)?;

        let mut undo_batch = WriteBatch::default();
        for entry in entries.into_iter().rev() {
            let cf = self
                .db
                .cf_handle(&entry.cf)
                .ok_or(Error::Backend(format!("missing column family {}", entry.cf)))?;
            match entry.old_value {
                Some(old) => undo_batch.put_cf(&cf, &entry.key, &old),
                None => undo_batch.delete_cf(&cf, &entry.key),
            }
        }
        undo_batch.delete_cf(&undo_cf, &key);

        self.db
            .write(undo_batch)
            .map_err(|e| Error::Backend(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crvm_primitives::AddrId;

    fn open_tmp() -> (KvStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = KvStore::open(dir.path()).unwrap();
        (store, dir)
    }

    #[test]
    fn write_then_read_round_trips() {
        let (store, _dir) = open_tmp();
        let addr = AddrId::zero();
        let mut batch = store.begin_block(1);
        batch
            .put(crate::keys::CF_CONTRACT, &crate::keys::contract_key(&addr), &42u64)
            .unwrap();
        store.commit_block(1, batch).unwrap();

        let got: Option<u64> = store
            .get(crate::keys::CF_CONTRACT, &crate::keys::contract_key(&addr))
            .unwrap();
        assert_eq!(got, Some(42));
    }

    #[test]
    fn batch_read_sees_its_own_uncommitted_write() {
        let (store, _dir) = open_tmp();
        let addr = AddrId::zero();
        let key = crate::keys::contract_key(&addr);

        let mut batch = store.begin_block(1);
        batch.put(crate::keys::CF_CONTRACT, &key, &42u64).unwrap();

        let seen: Option<u64> = batch.get(crate::keys::CF_CONTRACT, &key).unwrap();
        assert_eq!(seen, Some(42));

        // Nothing has been committed to the DB itself yet.
        let via_store: Option<u64> = store.get(crate::keys::CF_CONTRACT, &key).unwrap();
        assert_eq!(via_store, None);
    }

    #[test]
    fn batch_read_sees_an_overwrite_staged_earlier_in_the_same_batch() {
        let (store, _dir) = open_tmp();
        let addr = AddrId::zero();
        let key = crate::keys::contract_key(&addr);

        let mut batch = store.begin_block(1);
        batch.put(crate::keys::CF_CONTRACT, &key, &1u64).unwrap();
        batch.put(crate::keys::CF_CONTRACT, &key, &2u64).unwrap();

        let seen: Option<u64> = batch.get(crate::keys::CF_CONTRACT, &key).unwrap();
        assert_eq!(seen, Some(2));
        store.commit_block(1, batch).unwrap();

        store.disconnect_block(1).unwrap();
        let after: Option<u64> = store.get(crate::keys::CF_CONTRACT, &key).unwrap();
        assert_eq!(after, None);
    }

    #[test]
    fn batch_prefix_scan_merges_staged_writes_over_committed_state() {
        let (store, _dir) = open_tmp();
        let a = crate::keys::contract_key(&AddrId::new([1u8; 20]));
        let b = crate::keys::contract_key(&AddrId::new([2u8; 20]));

        let mut setup = store.begin_block(1);
        setup.put(crate::keys::CF_CONTRACT, &a, &1u64).unwrap();
        store.commit_block(1, setup).unwrap();

        let mut batch = store.begin_block(2);
        batch.put(crate::keys::CF_CONTRACT, &b, &2u64).unwrap();
        batch.delete_raw(crate::keys::CF_CONTRACT, &a).unwrap();

        let rows: Vec<(Vec<u8>, u64)> = batch.iter_prefix(crate::keys::CF_CONTRACT, &[]).unwrap();
        assert_eq!(rows, vec![(b.clone(), 2u64)]);
    }

    #[test]
    fn disconnect_restores_prior_state() {
        let (store, _dir) = open_tmp();
        let addr = AddrId::zero();
        let key = crate::keys::contract_key(&addr);

        let mut b1 = store.begin_block(1);
        b1.put(crate::keys::CF_CONTRACT, &key, &1u64).unwrap();
        store.commit_block(1, b1).unwrap();

        let mut b2 = store.begin_block(2);
        b2.put(crate::keys::CF_CONTRACT, &key, &2u64).unwrap();
        store.commit_block(2, b2).unwrap();

        let before: Option<u64> = store.get(crate::keys::CF_CONTRACT, &key).unwrap();
        assert_eq!(before, Some(2));

        store.disconnect_block(2).unwrap();

        let after: Option<u64> = store.get(crate::keys::CF_CONTRACT, &key).unwrap();
        assert_eq!(after, Some(1));
    }

    #[test]
    fn disconnect_of_fresh_key_erases_it() {
        let (store, _dir) = open_tmp();
        let addr = AddrId::zero();
        let key = crate::keys::contract_key(&addr);

        let mut batch = store.begin_block(5);
        batch.put(crate::keys::CF_CONTRACT, &key, &7u64).unwrap();
        store.commit_block(5, batch).unwrap();

        store.disconnect_block(5).unwrap();

        let after: Option<u64> = store.get(crate::keys::CF_CONTRACT, &key).unwrap();
        assert_eq!(after, None);
    }

    #[test]
    fn disconnect_twice_is_a_no_op() {
        let (store, _dir) = open_tmp();
        store.disconnect_block(99).unwrap();
        store.disconnect_block(99).unwrap();
    }

    #[test]
    fn reconnect_after_disconnect_reproduces_identical_state() {
        let (store, _dir) = open_tmp();
        let addr = AddrId::zero();
        let key = crate::keys::contract_key(&addr);

        let mut first = store.begin_block(10);
        first.put(crate::keys::CF_CONTRACT, &key, &11u64).unwrap();
        store.commit_block(10, first).unwrap();
        let snapshot_a: Option<u64> = store.get(crate::keys::CF_CONTRACT, &key).unwrap();

        store.disconnect_block(10).unwrap();

        let mut second = store.begin_block(10);
        second.put(crate::keys::CF_CONTRACT, &key, &11u64).unwrap();
        store.commit_block(10, second).unwrap();
        let snapshot_b: Option<u64> = store.get(crate::keys::CF_CONTRACT, &key).unwrap();

        assert_eq!(snapshot_a, snapshot_b);
    }
}
