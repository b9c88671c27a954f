//! The root object: one store plus the bucket and table registries.

use std::any::{Any, type_name};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, info};

use crate::bucket::{Bucket, BucketOptions};
use crate::config::DatabaseConfig;
use crate::databases::redb::Store;
use crate::errors::{DbError, DbResult};
use crate::table::Table;
use crate::traits::{Codec, Record, TransactionManager};
use crate::transaction::{NestedManager, Transaction};

/// A registered bucket or table, remembered with the type it was created for.
struct Entry {
    type_name: &'static str,
    handle: Arc<dyn Any + Send + Sync>,
}

#[derive(Default)]
struct Registry {
    entries: Mutex<HashMap<String, Entry>>,
}

impl Registry {
    /// Look `name` up as a `H`, creating it with `create` if it is not there yet.
    fn get_or_insert<H, F>(&self, name: &str, create: F) -> DbResult<H>
    where
        H: Clone + Send + Sync + 'static,
        F: FnOnce() -> DbResult<H>,
    {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = entries.get(name) {
            return Self::downcast(entry);
        }
        let handle = create()?;
        entries.insert(
            name.to_string(),
            Entry {
                type_name: type_name::<H>(),
                handle: Arc::new(handle.clone()),
            },
        );
        Ok(handle)
    }

    fn get<H>(&self, name: &str) -> Option<DbResult<H>>
    where
        H: Clone + Send + Sync + 'static,
    {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.get(name).map(Self::downcast)
    }

    fn downcast<H: Clone + 'static>(entry: &Entry) -> DbResult<H> {
        entry
            .handle
            .downcast_ref::<H>()
            .cloned()
            .ok_or_else(|| DbError::SchemaMismatch {
                expected: entry.type_name.to_string(),
                found: type_name::<H>().to_string(),
            })
    }

    fn names(&self) -> Vec<String> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = entries.keys().cloned().collect();
        names.sort();
        names
    }
}

/// An open database.
///
/// ```
/// use bucketdb::prelude::*;
///
/// let db = Database::open_in_memory()?;
/// let books = db.add_bucket::<RecordId, String>("books", BucketOptions::default())?;
/// let id = books.add(&mut "Dune".to_string())?;
/// assert_eq!(books.get(&id)?, "Dune");
/// db.close()?;
/// # Ok::<(), bucketdb::errors::DbError>(())
/// ```
pub struct Database {
    store: Arc<Store>,
    buckets: Registry,
    tables: Registry,
}

impl Database {
    pub fn open(config: DatabaseConfig) -> DbResult<Self> {
        let store = Store::open(config)?;
        Ok(Self {
            store: Arc::new(store),
            buckets: Registry::default(),
            tables: Registry::default(),
        })
    }

    pub fn open_path<P: Into<PathBuf>>(path: P) -> DbResult<Self> {
        Self::open(DatabaseConfig::new(path))
    }

    pub fn open_in_memory() -> DbResult<Self> {
        Self::open(DatabaseConfig::in_memory())
    }

    pub fn config(&self) -> &DatabaseConfig {
        self.store.config()
    }

    pub fn path(&self) -> Option<&Path> {
        self.store.config().path.as_deref()
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Register a bucket, or return the one already registered under `name`.
    /// Options only apply when the bucket is created.
    pub fn add_bucket<K, V>(&self, name: &str, options: BucketOptions<V>) -> DbResult<Bucket<K, V>>
    where
        K: Codec + 'static,
        V: Codec + 'static,
    {
        self.buckets.get_or_insert(name, || {
            debug!("Registering bucket {:?}", name);
            Bucket::new(self.store.clone(), name, options)
        })
    }

    pub fn bucket<K, V>(&self, name: &str) -> DbResult<Bucket<K, V>>
    where
        K: Codec + 'static,
        V: Codec + 'static,
    {
        self.buckets
            .get(name)
            .unwrap_or_else(|| Err(DbError::NoSuchBucket(name.to_string())))
    }

    pub fn bucket_names(&self) -> Vec<String> {
        self.buckets.names()
    }

    /// Register a table for `T`, or return the one already registered under `name`.
    pub fn add_table<T: Record>(&self, name: &str) -> DbResult<Table<T>> {
        self.tables.get_or_insert(name, || {
            debug!("Registering table {:?}", name);
            Table::new(self.store.clone(), name)
        })
    }

    pub fn table<T: Record>(&self, name: &str) -> DbResult<Table<T>> {
        self.tables
            .get(name)
            .unwrap_or_else(|| Err(DbError::NoSuchTable(name.to_string())))
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.names()
    }

    /// Start a read-only transaction the caller finalises.
    pub fn begin_read(&self) -> DbResult<Transaction> {
        self.store.begin_read()
    }

    /// Start a read/write transaction the caller commits or discards.
    pub fn begin_write(&self) -> DbResult<Transaction> {
        self.store.begin_write()
    }

    /// Give unused sequence leases back and shut the store down. Bucket and
    /// table handles that outlive the database fail with `DatabaseClosed`.
    pub fn close(self) -> DbResult<()> {
        self.store.close()
    }

    /// Close the database and delete its file.
    pub fn destroy(self) -> DbResult<()> {
        let path = self.path().map(Path::to_path_buf);
        self.close()?;
        if let Some(path) = path {
            std::fs::remove_file(&path)?;
            info!("Removed database file {}", path.display());
        }
        Ok(())
    }
}

impl TransactionManager for Database {
    fn view<R, F>(&self, f: F) -> DbResult<R>
    where
        F: FnOnce(&Transaction) -> DbResult<R>,
    {
        self.store.view(f)
    }

    fn update<R, F>(&self, f: F) -> DbResult<R>
    where
        F: FnOnce(&Transaction) -> DbResult<R>,
    {
        self.store.update(f)
    }

    fn view_with_nested<R, F>(&self, f: F) -> DbResult<R>
    where
        F: FnOnce(&NestedManager<'_>) -> DbResult<R>,
    {
        self.store.view_with_nested(f)
    }

    fn update_with_nested<R, F>(&self, f: F) -> DbResult<R>
    where
        F: FnOnce(&NestedManager<'_>) -> DbResult<R>,
    {
        self.store.update_with_nested(f)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.path())
            .field("buckets", &self.bucket_names())
            .field("tables", &self.table_names())
            .finish()
    }
}
