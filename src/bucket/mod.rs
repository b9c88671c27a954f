//! Named, typed partitions of the shared key-space.
//!
//! A [`Bucket`] stores `K -> V` under its own key prefix and owns an id
//! sequence for [`Bucket::add`]. Every operation has a simple form that runs in
//! its own transaction and an `*_in` form that runs through any
//! [`TransactionManager`], so several bucket calls can share one transaction.

pub mod iterator;

use std::marker::PhantomData;
use std::sync::Arc;

use log::{debug, warn};

use crate::databases::redb::Store;
use crate::databases::redb::keyspace::{ScanRange, bucket_prefix};
use crate::databases::redb::sequence::Sequence;
use crate::errors::{DbError, DbResult};
use crate::traits::{Codec, TransactionManager};
use crate::transaction::{Transaction, TxnRef};

pub use iterator::{BucketIterOptions, BucketIterator};

/// Identifier handed out by a bucket sequence.
pub type RecordId = u64;

/// Called by [`Bucket::add`] with the reserved id before the value is written.
pub type PreAddHook<V> = Arc<dyn Fn(RecordId, &mut V) -> DbResult<()> + Send + Sync>;

const COUNT_PAGE: usize = 256;

pub struct BucketOptions<V> {
    /// Hook that may stamp the reserved id into the value
    pub pre_add: Option<PreAddHook<V>>,
}

impl<V> BucketOptions<V> {
    /// Options with a pre-add hook built from a plain closure.
    pub fn with_pre_add<F>(hook: F) -> Self
    where
        F: Fn(RecordId, &mut V) -> DbResult<()> + Send + Sync + 'static,
    {
        Self {
            pre_add: Some(Arc::new(hook)),
        }
    }
}

impl<V> Default for BucketOptions<V> {
    fn default() -> Self {
        Self { pre_add: None }
    }
}

impl<V> Clone for BucketOptions<V> {
    fn clone(&self) -> Self {
        Self {
            pre_add: self.pre_add.clone(),
        }
    }
}

impl<V> std::fmt::Debug for BucketOptions<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BucketOptions")
            .field("pre_add", &self.pre_add.is_some())
            .finish()
    }
}

pub struct Bucket<K, V> {
    name: String,
    prefix: Vec<u8>,
    sequence: Arc<Sequence>,
    options: BucketOptions<V>,
    store: Arc<Store>,
    _marker: PhantomData<fn() -> K>,
}

impl<K, V> Clone for Bucket<K, V> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            prefix: self.prefix.clone(),
            sequence: self.sequence.clone(),
            options: self.options.clone(),
            store: self.store.clone(),
            _marker: PhantomData,
        }
    }
}

impl<K, V> std::fmt::Debug for Bucket<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bucket")
            .field("name", &self.name)
            .field("options", &self.options)
            .finish()
    }
}

impl<K: Codec, V: Codec> Bucket<K, V> {
    pub(crate) fn new(store: Arc<Store>, name: &str, options: BucketOptions<V>) -> DbResult<Self> {
        let prefix = bucket_prefix(name)?;
        let sequence = store.sequence(name);
        debug!("Set up bucket {:?}", name);
        Ok(Self {
            name: name.to_string(),
            prefix,
            sequence,
            options,
            store,
            _marker: PhantomData,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &BucketOptions<V> {
        &self.options
    }

    /// The root manager every simple-form operation runs through.
    pub fn store(&self) -> &Store {
        &self.store
    }

    fn entry_key(&self, key: &K) -> DbResult<Vec<u8>> {
        let mut full = self.prefix.clone();
        full.extend_from_slice(&key.encode()?);
        Ok(full)
    }

    fn decode_entry(&self, key: &[u8], value: Option<&[u8]>) -> DbResult<(K, V)> {
        let value = value.ok_or_else(|| self.not_found())?;
        Ok((K::decode(&key[self.prefix.len()..])?, V::decode(value)?))
    }

    fn not_found(&self) -> DbError {
        DbError::NotFound {
            bucket: self.name.clone(),
        }
    }

    fn range(&self) -> ScanRange {
        ScanRange::with_prefix(&self.prefix)
    }

    /// Write `value` under `key`, replacing what was there.
    pub fn set(&self, key: &K, value: &V) -> DbResult<()> {
        self.set_in(&*self.store, key, value)
    }

    pub fn set_in<M: TransactionManager>(&self, mgr: &M, key: &K, value: &V) -> DbResult<()> {
        let full = self.entry_key(key)?;
        let bytes = value.encode()?;
        mgr.update(|txn| txn.set(&full, &bytes))
    }

    pub fn get(&self, key: &K) -> DbResult<V> {
        self.get_in(&*self.store, key)
    }

    pub fn get_in<M: TransactionManager>(&self, mgr: &M, key: &K) -> DbResult<V> {
        let full = self.entry_key(key)?;
        mgr.view(|txn| match txn.get(&full)? {
            Some(bytes) => Ok(V::decode(&bytes)?),
            None => Err(self.not_found()),
        })
    }

    pub fn contains(&self, key: &K) -> DbResult<bool> {
        self.contains_in(&*self.store, key)
    }

    pub fn contains_in<M: TransactionManager>(&self, mgr: &M, key: &K) -> DbResult<bool> {
        let full = self.entry_key(key)?;
        mgr.view(|txn| txn.contains(&full))
    }

    /// Remove `key`. Deleting an absent key succeeds.
    pub fn delete(&self, key: &K) -> DbResult<()> {
        self.delete_in(&*self.store, key)
    }

    pub fn delete_in<M: TransactionManager>(&self, mgr: &M, key: &K) -> DbResult<()> {
        let full = self.entry_key(key)?;
        mgr.update(|txn| txn.delete(&full))
    }

    fn edge(&self, txn: &Transaction, from_end: bool) -> DbResult<Option<(Vec<u8>, (K, V))>> {
        match txn.scan(&self.range(), from_end, 1, true)?.pop() {
            Some(entry) => {
                let decoded = self.decode_entry(&entry.key, entry.value.as_deref())?;
                Ok(Some((entry.key, decoded)))
            }
            None => Ok(None),
        }
    }

    /// Remove and return the first entry, or the last one when `from_end` is set.
    pub fn pop(&self, from_end: bool) -> DbResult<(K, V)> {
        self.pop_in(&*self.store, from_end)
    }

    pub fn pop_in<M: TransactionManager>(&self, mgr: &M, from_end: bool) -> DbResult<(K, V)> {
        mgr.update(|txn| match self.edge(txn, from_end)? {
            Some((raw_key, entry)) => {
                txn.delete(&raw_key)?;
                Ok(entry)
            }
            None => Err(DbError::EmptyBucket(self.name.clone())),
        })
    }

    pub fn first(&self) -> DbResult<(K, V)> {
        self.first_in(&*self.store)
    }

    pub fn first_in<M: TransactionManager>(&self, mgr: &M) -> DbResult<(K, V)> {
        mgr.view(|txn| self.edge(txn, false))?
            .map(|(_, entry)| entry)
            .ok_or_else(|| DbError::EmptyBucket(self.name.clone()))
    }

    pub fn last(&self) -> DbResult<(K, V)> {
        self.last_in(&*self.store)
    }

    pub fn last_in<M: TransactionManager>(&self, mgr: &M) -> DbResult<(K, V)> {
        mgr.view(|txn| self.edge(txn, true))?
            .map(|(_, entry)| entry)
            .ok_or_else(|| DbError::EmptyBucket(self.name.clone()))
    }

    /// Number of entries. Only keys are read.
    pub fn count(&self) -> DbResult<usize> {
        self.count_in(&*self.store)
    }

    pub fn count_in<M: TransactionManager>(&self, mgr: &M) -> DbResult<usize> {
        mgr.view(|txn| {
            let mut range = self.range();
            let mut total = 0;
            loop {
                let keys = txn.scan(&range, false, COUNT_PAGE, false)?;
                let full_page = keys.len() == COUNT_PAGE;
                total += keys.len();
                match keys.into_iter().last() {
                    Some(last) if full_page => {
                        range.lower = std::ops::Bound::Excluded(last.key);
                    }
                    _ => return Ok(total),
                }
            }
        })
    }

    pub fn is_empty(&self) -> DbResult<bool> {
        self.is_empty_in(&*self.store)
    }

    pub fn is_empty_in<M: TransactionManager>(&self, mgr: &M) -> DbResult<bool> {
        mgr.view(|txn| Ok(txn.scan(&self.range(), false, 1, false)?.is_empty()))
    }

    /// Cursor owning its own read-only transaction.
    pub fn iter(&self, options: BucketIterOptions) -> DbResult<BucketIterator<'static, K, V>> {
        let txn = self.store.begin_read()?;
        self.open_iter(TxnRef::Owned(txn), options)
    }

    /// Cursor reading through a transaction owned by the caller.
    pub fn iter_in<'t>(
        &self,
        txn: &'t Transaction,
        options: BucketIterOptions,
    ) -> DbResult<BucketIterator<'t, K, V>> {
        self.open_iter(TxnRef::Borrowed(txn), options)
    }

    fn open_iter<'t>(
        &self,
        txn: TxnRef<'t>,
        options: BucketIterOptions,
    ) -> DbResult<BucketIterator<'t, K, V>> {
        self.open_iter_as(txn, options)
    }

    /// Cursor over this bucket's entries decoded as other types, e.g. raw bytes.
    pub(crate) fn open_iter_as<'t, K2: Codec, V2: Codec>(
        &self,
        txn: TxnRef<'t>,
        options: BucketIterOptions,
    ) -> DbResult<BucketIterator<'t, K2, V2>> {
        BucketIterator::new(
            txn,
            &self.name,
            &self.prefix,
            options,
            self.store.config().prefetch_size,
        )
    }

    /// Call `f` for every entry in key order.
    pub fn iterate<F>(&self, f: F) -> DbResult<()>
    where
        F: FnMut(&K, &V) -> DbResult<()>,
    {
        self.iterate_in(&*self.store, f)
    }

    pub fn iterate_in<M, F>(&self, mgr: &M, mut f: F) -> DbResult<()>
    where
        M: TransactionManager,
        F: FnMut(&K, &V) -> DbResult<()>,
    {
        mgr.view(|txn| {
            let mut iter = self.iter_in(txn, BucketIterOptions::default())?;
            while iter.valid() {
                let (key, value) = iter.get()?;
                f(&key, &value)?;
                iter.next()?;
            }
            Ok(())
        })
    }

    /// Call `on_match` for every entry equal to `target` and return the key of
    /// the last one.
    pub fn search<F>(&self, target: &V, on_match: F) -> DbResult<Option<K>>
    where
        V: PartialEq,
        F: FnMut(&K, &V) -> DbResult<()>,
    {
        self.search_in(&*self.store, target, on_match)
    }

    pub fn search_in<M, F>(&self, mgr: &M, target: &V, mut on_match: F) -> DbResult<Option<K>>
    where
        M: TransactionManager,
        V: PartialEq,
        F: FnMut(&K, &V) -> DbResult<()>,
    {
        mgr.view(|txn| {
            let mut iter = self.iter_in(txn, BucketIterOptions::default())?;
            let mut found = None;
            while iter.valid() {
                let (key, value) = iter.get()?;
                if value == *target {
                    on_match(&key, &value)?;
                    found = Some(key);
                }
                iter.next()?;
            }
            Ok(found)
        })
    }

    /// First entry equal to `target` in scan order.
    pub fn search_one(&self, target: &V, reverse: bool) -> DbResult<Option<(K, V)>>
    where
        V: PartialEq,
    {
        self.search_one_in(&*self.store, target, reverse)
    }

    pub fn search_one_in<M>(&self, mgr: &M, target: &V, reverse: bool) -> DbResult<Option<(K, V)>>
    where
        M: TransactionManager,
        V: PartialEq,
    {
        self.search_one_by_in(mgr, |_, value| Ok(value == target), reverse)
    }

    pub fn search_one_by<P>(&self, predicate: P, reverse: bool) -> DbResult<Option<(K, V)>>
    where
        P: FnMut(&K, &V) -> DbResult<bool>,
    {
        self.search_one_by_in(&*self.store, predicate, reverse)
    }

    pub fn search_one_by_in<M, P>(
        &self,
        mgr: &M,
        mut predicate: P,
        reverse: bool,
    ) -> DbResult<Option<(K, V)>>
    where
        M: TransactionManager,
        P: FnMut(&K, &V) -> DbResult<bool>,
    {
        mgr.view(|txn| {
            let options = BucketIterOptions::builder().reverse(reverse).build();
            let mut iter = self.iter_in(txn, options)?;
            while iter.valid() {
                let (key, value) = iter.get()?;
                if self.check(&mut predicate, &key, &value)? {
                    return Ok(Some((key, value)));
                }
                iter.next()?;
            }
            Ok(None)
        })
    }

    /// Every entry equal to `target`, in scan order.
    pub fn search_all(&self, target: &V, reverse: bool) -> DbResult<Vec<(K, V)>>
    where
        V: PartialEq,
    {
        self.search_all_in(&*self.store, target, reverse)
    }

    pub fn search_all_in<M>(&self, mgr: &M, target: &V, reverse: bool) -> DbResult<Vec<(K, V)>>
    where
        M: TransactionManager,
        V: PartialEq,
    {
        self.search_all_by_in(mgr, |_, value| Ok(value == target), reverse)
    }

    pub fn search_all_by<P>(&self, predicate: P, reverse: bool) -> DbResult<Vec<(K, V)>>
    where
        P: FnMut(&K, &V) -> DbResult<bool>,
    {
        self.search_all_by_in(&*self.store, predicate, reverse)
    }

    pub fn search_all_by_in<M, P>(
        &self,
        mgr: &M,
        mut predicate: P,
        reverse: bool,
    ) -> DbResult<Vec<(K, V)>>
    where
        M: TransactionManager,
        P: FnMut(&K, &V) -> DbResult<bool>,
    {
        mgr.view(|txn| {
            let options = BucketIterOptions::builder().reverse(reverse).build();
            let mut iter = self.iter_in(txn, options)?;
            let mut matches = Vec::new();
            while iter.valid() {
                let (key, value) = iter.get()?;
                if self.check(&mut predicate, &key, &value)? {
                    matches.push((key, value));
                }
                iter.next()?;
            }
            Ok(matches)
        })
    }

    fn check<P>(&self, predicate: &mut P, key: &K, value: &V) -> DbResult<bool>
    where
        P: FnMut(&K, &V) -> DbResult<bool>,
    {
        predicate(key, value).inspect_err(|err| {
            warn!("Search predicate failed in bucket {:?}: {}", self.name, err);
        })
    }
}

impl<V: Codec> Bucket<RecordId, V> {
    /// Store `value` under the next id of the bucket sequence. The pre-add hook,
    /// if any, sees the id and may modify the value before it is written.
    pub fn add(&self, value: &mut V) -> DbResult<RecordId> {
        self.add_in(&*self.store, value)
    }

    pub fn add_in<M: TransactionManager>(&self, mgr: &M, value: &mut V) -> DbResult<RecordId> {
        mgr.update(|txn| {
            let id = self.sequence.next(txn)?;
            if let Some(hook) = &self.options.pre_add {
                hook(id, value)?;
            }
            txn.set(&self.entry_key(&id)?, &value.encode()?)?;
            Ok(id)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::transaction::NestedManager;

    fn bucket<K: Codec, V: Codec>(name: &str) -> Bucket<K, V> {
        let store = Arc::new(Store::open(DatabaseConfig::in_memory()).unwrap());
        Bucket::new(store, name, BucketOptions::default()).unwrap()
    }

    #[test]
    fn test_get_missing_is_not_found() {
        let b: Bucket<u64, String> = bucket("books");
        assert!(b.get(&1).unwrap_err().is_not_found());
        assert!(!b.contains(&1).unwrap());
    }

    #[test]
    fn test_delete_is_idempotent() {
        let b: Bucket<u64, String> = bucket("books");
        b.set(&1, &"A".to_string()).unwrap();
        b.delete(&1).unwrap();
        b.delete(&1).unwrap();
        assert!(b.is_empty().unwrap());
    }

    #[test]
    fn test_first_last_and_pop_on_empty() {
        let b: Bucket<u64, String> = bucket("books");
        assert!(matches!(b.first(), Err(DbError::EmptyBucket(_))));
        assert!(matches!(b.last(), Err(DbError::EmptyBucket(_))));
        assert!(matches!(b.pop(true), Err(DbError::EmptyBucket(_))));
    }

    #[test]
    fn test_count_spans_several_pages() {
        let b: Bucket<u64, ()> = bucket("marks");
        let store = b.store.clone();
        store
            .update_with_nested(|nested| {
                for i in 0..(COUNT_PAGE as u64 * 2 + 3) {
                    b.set_in(nested, &i, &())?;
                }
                Ok(())
            })
            .unwrap();
        assert_eq!(b.count().unwrap(), COUNT_PAGE * 2 + 3);
    }

    #[test]
    fn test_count_exact_page_multiple() {
        let b: Bucket<u64, ()> = bucket("marks");
        for i in 0..COUNT_PAGE as u64 {
            b.set(&i, &()).unwrap();
        }
        assert_eq!(b.count().unwrap(), COUNT_PAGE);
    }

    #[test]
    fn test_search_returns_last_match() {
        let b: Bucket<u64, String> = bucket("books");
        for (k, v) in [(1, "A"), (2, "B"), (3, "A")] {
            b.set(&k, &v.to_string()).unwrap();
        }
        let mut seen = Vec::new();
        let found = b
            .search(&"A".to_string(), |k, _| {
                seen.push(*k);
                Ok(())
            })
            .unwrap();
        assert_eq!(found, Some(3));
        assert_eq!(seen, vec![1, 3]);
        assert_eq!(b.search(&"Z".to_string(), |_, _| Ok(())).unwrap(), None);
    }

    #[test]
    fn test_search_one_honours_direction() {
        let b: Bucket<u64, String> = bucket("books");
        for (k, v) in [(1, "A"), (2, "B"), (3, "A")] {
            b.set(&k, &v.to_string()).unwrap();
        }
        let target = "A".to_string();
        assert_eq!(b.search_one(&target, false).unwrap().unwrap().0, 1);
        assert_eq!(b.search_one(&target, true).unwrap().unwrap().0, 3);
        let all: Vec<u64> = b
            .search_all(&target, true)
            .unwrap()
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(all, vec![3, 1]);
    }

    #[test]
    fn test_predicate_error_propagates() {
        let b: Bucket<u64, String> = bucket("books");
        b.set(&1, &"A".to_string()).unwrap();
        let result = b.search_one_by(|_, _| Err(DbError::NoSuchIndex("x".into())), false);
        assert!(matches!(result, Err(DbError::NoSuchIndex(_))));
    }

    #[test]
    fn test_add_inside_read_only_nested_fails() {
        let b: Bucket<RecordId, String> = bucket("books");
        let txn = b.store().begin_read().unwrap();
        let nested = NestedManager::new(&txn);
        assert!(matches!(
            b.add_in(&nested, &mut "A".to_string()),
            Err(DbError::NotWritable)
        ));
    }
}
