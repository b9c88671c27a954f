//! The redb-backed store.
//!
//! Every bucket, index and sequence lives in one flat redb table keyed by raw
//! bytes; [`keyspace`] describes how the key-space is carved up.

pub mod keyspace;
pub mod sequence;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use log::{debug, info, trace};
use redb::{Durability, ReadableDatabase, TableDefinition};

use crate::config::DatabaseConfig;
use crate::errors::{DbError, DbResult};
use crate::traits::TransactionManager;
use crate::transaction::{NestedManager, Transaction};
use sequence::Sequence;

/// The single table holding every entry.
pub(crate) const DATA_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("bucketdb");

pub struct Store {
    /// `None` once the store has been closed.
    db: RwLock<Option<redb::Database>>,
    config: DatabaseConfig,
    serial: AtomicU64,
    sequences: Mutex<HashMap<String, Arc<Sequence>>>,
}

impl Store {
    pub fn open(config: DatabaseConfig) -> DbResult<Self> {
        let mut builder = redb::Builder::new();
        builder.set_cache_size(config.cache_size_bytes());

        let db = match &config.path {
            Some(path) => {
                if !config.create_if_missing && !path.exists() {
                    return Err(DbError::Io(std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        format!("database file {} does not exist", path.display()),
                    )));
                }
                builder.create(path)?
            }
            None => builder.create_with_backend(redb::backends::InMemoryBackend::new())?,
        };

        // Create the data table up front so read transactions can always open it
        let txn = db.begin_write()?;
        txn.open_table(DATA_TABLE)?;
        txn.commit()?;

        match &config.path {
            Some(path) => info!("Opened store at {}", path.display()),
            None => info!("Opened in-memory store"),
        }

        Ok(Self {
            db: RwLock::new(Some(db)),
            config,
            serial: AtomicU64::new(0),
            sequences: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    fn next_serial(&self) -> u64 {
        self.serial.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn with_engine<R>(&self, f: impl FnOnce(&redb::Database) -> DbResult<R>) -> DbResult<R> {
        let engine = self.db.read().unwrap_or_else(PoisonError::into_inner);
        match engine.as_ref() {
            Some(db) => f(db),
            None => Err(DbError::DatabaseClosed),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.db
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Start a read-only transaction over a consistent snapshot.
    pub fn begin_read(&self) -> DbResult<Transaction> {
        let txn = self.with_engine(|db| Ok(db.begin_read()?))?;
        let serial = self.next_serial();
        trace!("Begin read transaction #{}", serial);
        Ok(Transaction::read(txn, serial))
    }

    /// Start a read/write transaction. redb allows a single writer at a time,
    /// so this blocks until any other write transaction has finished.
    pub fn begin_write(&self) -> DbResult<Transaction> {
        let mut txn = self.with_engine(|db| Ok(db.begin_write()?))?;
        if !self.config.sync_writes {
            txn.set_durability(Durability::None)?;
        }
        let serial = self.next_serial();
        trace!("Begin write transaction #{}", serial);
        Ok(Transaction::write(txn, serial))
    }

    /// The id sequence named `name`, created on first use.
    pub fn sequence(&self, name: &str) -> Arc<Sequence> {
        let mut sequences = self
            .sequences
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        sequences
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!("Created sequence {:?}", name);
                Arc::new(Sequence::new(name, self.config.sequence_bandwidth))
            })
            .clone()
    }

    /// Write every sequence's unused lease back so no ids are skipped on reopen.
    pub fn release_sequences(&self) -> DbResult<()> {
        let sequences: Vec<Arc<Sequence>> = self
            .sequences
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        if sequences.is_empty() {
            return Ok(());
        }
        self.update(|txn| {
            for sequence in &sequences {
                sequence.release(txn)?;
            }
            Ok(())
        })
    }
}

impl Store {
    /// Release the sequences and shut the engine down. Every handle still
    /// pointing at this store fails with `DatabaseClosed` from then on, and the
    /// file can be opened again. Closing twice is a no-op.
    pub fn close(&self) -> DbResult<()> {
        if self.is_closed() {
            return Ok(());
        }
        self.release_sequences()?;
        let engine = self
            .db
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(engine);
        match &self.config.path {
            Some(path) => info!("Closed store at {}", path.display()),
            None => info!("Closed in-memory store"),
        }
        Ok(())
    }
}

impl TransactionManager for Store {
    fn view<R, F>(&self, f: F) -> DbResult<R>
    where
        F: FnOnce(&Transaction) -> DbResult<R>,
    {
        let mut txn = self.begin_read()?;
        let result = f(&txn);
        txn.discard();
        result
    }

    fn update<R, F>(&self, f: F) -> DbResult<R>
    where
        F: FnOnce(&Transaction) -> DbResult<R>,
    {
        let mut txn = self.begin_write()?;
        match f(&txn) {
            Ok(value) => {
                txn.commit()?;
                Ok(value)
            }
            Err(err) => {
                txn.discard();
                Err(err)
            }
        }
    }

    fn view_with_nested<R, F>(&self, f: F) -> DbResult<R>
    where
        F: FnOnce(&NestedManager<'_>) -> DbResult<R>,
    {
        self.view(|txn| f(&NestedManager::new(txn)))
    }

    fn update_with_nested<R, F>(&self, f: F) -> DbResult<R>
    where
        F: FnOnce(&NestedManager<'_>) -> DbResult<R>,
    {
        self.update(|txn| f(&NestedManager::new(txn)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::Codec;

    fn store() -> Store {
        Store::open(DatabaseConfig::builder().sequence_bandwidth(3).build()).unwrap()
    }

    #[test]
    fn test_update_commits_and_view_sees_it() {
        let store = store();
        store.update(|txn| txn.set(b"k", b"v")).unwrap();
        let value = store.view(|txn| txn.get(b"k")).unwrap();
        assert_eq!(value, Some(b"v".to_vec()));
    }

    #[test]
    fn test_failed_update_is_rolled_back() {
        let store = store();
        let result: DbResult<()> = store.update(|txn| {
            txn.set(b"k", b"v")?;
            Err(DbError::EmptyBucket("x".to_string()))
        });
        assert!(result.is_err());
        assert_eq!(store.view(|txn| txn.get(b"k")).unwrap(), None);
    }

    #[test]
    fn test_sequence_ids_increase_across_leases() {
        let store = store();
        let seq = store.sequence("books");
        let ids: Vec<u64> = (0..7)
            .map(|_| store.update(|txn| seq.next(txn)).unwrap())
            .collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn test_sequence_survives_rolled_back_lease() {
        let store = store();
        let seq = store.sequence("books");
        let _: DbResult<()> = store.update(|txn| {
            seq.next(txn)?;
            Err(DbError::NotWritable)
        });
        let id = store.update(|txn| seq.next(txn)).unwrap();
        assert_eq!(id, 2);
        let stored = store.view(|txn| txn.get(&keyspace::sequence_key("books"))).unwrap();
        assert!(stored.is_some());
    }

    #[test]
    fn test_sequence_needs_write_transaction() {
        let store = store();
        let seq = store.sequence("books");
        assert!(matches!(store.view(|txn| seq.next(txn)), Err(DbError::NotWritable)));
    }

    #[test]
    fn test_closed_store_refuses_transactions() {
        let store = store();
        store.update(|txn| txn.set(b"k", b"v")).unwrap();
        store.close().unwrap();
        store.close().unwrap();
        assert!(store.is_closed());
        assert!(matches!(store.begin_read(), Err(DbError::DatabaseClosed)));
        assert!(matches!(
            store.update(|txn| txn.set(b"k", b"w")),
            Err(DbError::DatabaseClosed)
        ));
    }

    #[test]
    fn test_release_persists_next_id() {
        let store = store();
        let seq = store.sequence("books");
        store.update(|txn| seq.next(txn)).unwrap();
        store.release_sequences().unwrap();
        let stored = store
            .view(|txn| txn.get(&keyspace::sequence_key("books")))
            .unwrap()
            .unwrap();
        assert_eq!(u64::decode(&stored).unwrap(), 2);
    }
}
