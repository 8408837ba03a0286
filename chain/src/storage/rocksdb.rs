//! RocksDB-backed block store.
//!
//! This implementation persists blocks in a RocksDB instance with a
//! dedicated `"blocks"` column family. Keys are the creator's 32-byte
//! public key followed by the big-endian sequence number, so one chain
//! occupies one contiguous key range.

use std::path::Path;
use std::sync::Arc;

use rocksdb::{BoundColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options};

use super::BlockStore;
use crate::types::{Block, PUBLIC_KEY_LEN, PublicKey};

/// Configuration for [`RocksDbBlockStore`].
#[derive(Clone, Debug)]
pub struct RocksDbConfig {
    /// Filesystem path to the RocksDB database directory.
    pub path: String,
    /// Whether to create the database and missing column families if they
    /// do not yet exist.
    pub create_if_missing: bool,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            path: "data/agent-db".to_string(),
            create_if_missing: true,
        }
    }
}

/// Storage-level error type.
#[derive(Debug)]
pub enum StorageError {
    /// Underlying RocksDB error.
    RocksDb(rocksdb::Error),
    /// Required column family was not found.
    MissingColumnFamily(&'static str),
}

impl From<rocksdb::Error> for StorageError {
    fn from(e: rocksdb::Error) -> Self {
        StorageError::RocksDb(e)
    }
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::RocksDb(e) => write!(f, "rocksdb error: {e}"),
            StorageError::MissingColumnFamily(cf) => {
                write!(f, "missing column family '{cf}'")
            }
        }
    }
}

impl std::error::Error for StorageError {}

/// RocksDB-backed implementation of [`BlockStore`].
pub struct RocksDbBlockStore {
    db: DB,
}

impl RocksDbBlockStore {
    /// Opens (or creates) a RocksDB-backed block store at the given path.
    ///
    /// This sets up the `"blocks"` column family. The `"default"` column
    /// family is also created to keep RocksDB happy, but it is not used.
    pub fn open(cfg: &RocksDbConfig) -> Result<Self, StorageError> {
        let path = Path::new(&cfg.path);

        let mut opts = Options::default();
        opts.create_if_missing(cfg.create_if_missing);
        opts.create_missing_column_families(cfg.create_if_missing);

        let cfs = vec![
            ColumnFamilyDescriptor::new("default", Options::default()),
            ColumnFamilyDescriptor::new("blocks", Options::default()),
        ];

        let db = DB::open_cf_descriptors(&opts, path, cfs)?;

        Ok(Self { db })
    }

    fn cf_blocks(&self) -> Result<Arc<BoundColumnFamily<'_>>, StorageError> {
        self.db
            .cf_handle("blocks")
            .ok_or(StorageError::MissingColumnFamily("blocks"))
    }

    /// Internal helper: builds the storage key `public_key ∥ seq_be`.
    fn block_key(public_key: &PublicKey, sequence_number: u32) -> [u8; PUBLIC_KEY_LEN + 4] {
        let mut key = [0u8; PUBLIC_KEY_LEN + 4];
        key[..PUBLIC_KEY_LEN].copy_from_slice(public_key.as_bytes());
        key[PUBLIC_KEY_LEN..].copy_from_slice(&sequence_number.to_be_bytes());
        key
    }

    /// Internal helper: encodes a block into canonical bytes (bincode 2).
    fn encode_block(block: &Block) -> Vec<u8> {
        block.canonical_bytes()
    }

    /// Internal helper: decodes a block from canonical bytes.
    fn decode_block(bytes: &[u8]) -> Option<Block> {
        let cfg = bincode::config::standard();
        let (block, _): (Block, usize) = bincode::serde::decode_from_slice(bytes, cfg).ok()?;
        Some(block)
    }
}

impl BlockStore for RocksDbBlockStore {
    fn add(&mut self, block: Block) {
        let key = Self::block_key(&block.public_key, block.sequence_number);

        let cf = match self.cf_blocks() {
            Ok(cf) => cf,
            Err(e) => {
                tracing::error!("RocksDbBlockStore::add: {e}");
                return;
            }
        };

        // First insertion wins; a conflicting later write is dropped.
        match self.db.get_cf(&cf, key) {
            Ok(Some(_)) => return,
            Ok(None) => {}
            Err(e) => {
                tracing::error!("RocksDbBlockStore::add lookup failed: {e}");
                return;
            }
        }

        let bytes = Self::encode_block(&block);
        if let Err(e) = self.db.put_cf(&cf, key, bytes) {
            tracing::error!("RocksDbBlockStore::add write failed: {e}");
        }
    }

    fn get(&self, public_key: &PublicKey, sequence_number: u32) -> Option<Block> {
        let cf = self.cf_blocks().ok()?;
        let key = Self::block_key(public_key, sequence_number);
        match self.db.get_cf(&cf, key) {
            Ok(Some(bytes)) => Self::decode_block(&bytes),
            Ok(None) => None,
            Err(_) => None,
        }
    }

    fn get_all_blocks(&self) -> Vec<Block> {
        let cf = match self.cf_blocks() {
            Ok(cf) => cf,
            Err(e) => {
                tracing::error!("RocksDbBlockStore::get_all_blocks: {e}");
                return Vec::new();
            }
        };

        self.db
            .iterator_cf(&cf, IteratorMode::Start)
            .filter_map(|item| item.ok())
            .filter_map(|(_key, bytes)| Self::decode_block(&bytes))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::block::GENESIS_HASH;
    use crate::types::{Signature, Transaction, UNKNOWN_SEQ};
    use tempfile::TempDir;

    fn dummy_key(byte: u8) -> PublicKey {
        PublicKey([byte; PUBLIC_KEY_LEN])
    }

    fn dummy_block(creator: u8, seq: u32) -> Block {
        Block {
            public_key: dummy_key(creator),
            sequence_number: seq,
            link_public_key: dummy_key(creator.wrapping_add(1)),
            link_sequence_number: UNKNOWN_SEQ,
            previous_hash: GENESIS_HASH,
            signature: Signature::empty(),
            payload: Transaction::Empty.to_bytes(),
        }
    }

    fn open_store(tmp: &TempDir) -> RocksDbBlockStore {
        let cfg = RocksDbConfig {
            path: tmp.path().to_string_lossy().to_string(),
            create_if_missing: true,
        };
        RocksDbBlockStore::open(&cfg).expect("open RocksDB")
    }

    #[test]
    fn rocksdb_store_roundtrip() {
        let tmp = TempDir::new().expect("create temp dir");
        let mut store = open_store(&tmp);

        store.add(dummy_block(1, 1));
        store.add(dummy_block(1, 2));

        let fetched = store.get(&dummy_key(1), 2).expect("block should exist");
        assert_eq!(fetched.sequence_number, 2);

        let chain = store.get_chain(&dummy_key(1));
        assert_eq!(chain.len(), 2);
        assert_eq!(store.get_all_blocks().len(), 2);
    }

    #[test]
    fn rocksdb_add_keeps_the_first_insertion() {
        let tmp = TempDir::new().expect("create temp dir");
        let mut store = open_store(&tmp);

        let first = dummy_block(1, 1);
        let mut second = dummy_block(1, 1);
        second.payload = vec![9, 9, 9];

        store.add(first.clone());
        store.add(second);

        let fetched = store.get(&dummy_key(1), 1).unwrap();
        assert_eq!(fetched.payload, first.payload);
    }
}
