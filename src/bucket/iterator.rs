//! Cursor over the entries of one bucket.
//!
//! The cursor never holds a redb range open between steps. It pulls a page of
//! `prefetch_size` entries inside its transaction, hands them out one at a time,
//! and when the page runs dry fetches the next one strictly after the last key
//! it handed out. That keeps the transaction free for other reads and writes
//! while the cursor is alive.

use std::collections::VecDeque;
use std::marker::PhantomData;
use std::ops::Bound;

use log::debug;
use typed_builder::TypedBuilder;

use crate::databases::redb::keyspace::{ScanRange, prefix_successor};
use crate::errors::{DbError, DbResult};
use crate::traits::Codec;
use crate::transaction::{RawEntry, Transaction, TxnRef};

/// Where a [`BucketIterator`] starts and which entries it visits.
///
/// ```
/// use bucketdb::bucket::BucketIterOptions;
///
/// // Every entry whose encoded key starts with "2024-", newest first
/// let options = BucketIterOptions::builder()
///     .prefix(b"2024-".to_vec())
///     .reverse(true)
///     .build();
/// assert!(options.start.is_none());
/// ```
#[derive(Debug, Clone, Default, TypedBuilder)]
#[builder(doc)]
pub struct BucketIterOptions {
    /// Only entries whose encoded key starts with these bytes are visited
    #[builder(default, setter(into))]
    pub prefix: Vec<u8>,

    /// Encoded key to seek to before the first step
    #[builder(default, setter(into, strip_option))]
    pub start: Option<Vec<u8>>,

    /// Walk from the largest key down
    #[builder(default)]
    pub reverse: bool,
}

impl BucketIterOptions {
    pub fn reversed() -> Self {
        Self::builder().reverse(true).build()
    }
}

pub struct BucketIterator<'t, K, V> {
    txn: TxnRef<'t>,
    bucket: String,
    bucket_prefix_len: usize,
    member_prefix_len: usize,
    initial: ScanRange,
    reverse: bool,
    page_size: usize,
    page: VecDeque<RawEntry>,
    last_key: Option<Vec<u8>>,
    closed: bool,
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<'t, K: Codec, V: Codec> BucketIterator<'t, K, V> {
    pub(crate) fn new(
        txn: TxnRef<'t>,
        bucket: &str,
        bucket_prefix: &[u8],
        options: BucketIterOptions,
        page_size: usize,
    ) -> DbResult<Self> {
        let mut member_prefix = bucket_prefix.to_vec();
        member_prefix.extend_from_slice(&options.prefix);
        let mut initial = ScanRange::with_prefix(&member_prefix);

        if let Some(start) = &options.start {
            let mut seek = bucket_prefix.to_vec();
            seek.extend_from_slice(start);
            if options.reverse {
                if let Some(end) = prefix_successor(&seek) {
                    initial.upper = match initial.upper {
                        Bound::Excluded(upper) if upper <= end => Bound::Excluded(upper),
                        _ => Bound::Excluded(end),
                    };
                }
            } else if seek > member_prefix {
                initial.lower = Bound::Included(seek);
            }
        }

        debug!(
            "Opened iterator on bucket {:?} (reverse: {}, sub-prefix: {} bytes)",
            bucket,
            options.reverse,
            options.prefix.len()
        );

        let mut iter = Self {
            txn,
            bucket: bucket.to_string(),
            bucket_prefix_len: bucket_prefix.len(),
            member_prefix_len: member_prefix.len(),
            initial,
            reverse: options.reverse,
            page_size: page_size.max(1),
            page: VecDeque::new(),
            last_key: None,
            closed: false,
            _marker: PhantomData,
        };
        iter.rewind()?;
        Ok(iter)
    }

    /// The transaction the iterator reads through.
    pub fn transaction(&self) -> &Transaction {
        &self.txn
    }

    /// Go back to the first entry of the range.
    pub fn rewind(&mut self) -> DbResult<()> {
        self.page.clear();
        self.last_key = None;
        self.closed = false;
        self.fill()
    }

    fn fill(&mut self) -> DbResult<()> {
        if !self.page.is_empty() || self.closed {
            return Ok(());
        }
        let mut range = self.initial.clone();
        if let Some(last) = &self.last_key {
            if self.reverse {
                range.upper = Bound::Excluded(last.clone());
            } else {
                range.lower = Bound::Excluded(last.clone());
            }
        }
        let entries = self.txn.scan(&range, self.reverse, self.page_size, true)?;
        self.page.extend(entries);
        Ok(())
    }

    /// True while the cursor sits on an entry of the range.
    pub fn valid(&self) -> bool {
        !self.page.is_empty()
    }

    pub fn eof(&self) -> bool {
        !self.valid()
    }

    /// Step to the following entry.
    pub fn next(&mut self) -> DbResult<()> {
        if let Some(entry) = self.page.pop_front() {
            self.last_key = Some(entry.key);
        }
        self.fill()
    }

    fn current(&self) -> DbResult<&RawEntry> {
        self.page.front().ok_or_else(|| DbError::NotFound {
            bucket: self.bucket.clone(),
        })
    }

    fn current_value(&self) -> DbResult<&[u8]> {
        let entry = self.current()?;
        entry.value.as_deref().ok_or_else(|| DbError::NotFound {
            bucket: self.bucket.clone(),
        })
    }

    /// Key of the current entry with the bucket prefix and the sub-prefix removed.
    pub fn key(&self) -> DbResult<K> {
        let entry = self.current()?;
        Ok(K::decode(&entry.key[self.member_prefix_len..])?)
    }

    pub fn value(&self) -> DbResult<V> {
        Ok(V::decode(self.current_value()?)?)
    }

    pub fn get(&self) -> DbResult<(K, V)> {
        Ok((self.key()?, self.value()?))
    }

    /// Raw key of the current entry with only the bucket prefix removed.
    pub fn bucket_key(&self) -> Option<&[u8]> {
        self.page
            .front()
            .map(|entry| &entry.key[self.bucket_prefix_len..])
    }

    /// Advance until an entry holding `target` is found. Starts at the current
    /// position and never wraps around; the cursor is left on the match.
    pub fn find(&mut self, target: &V) -> DbResult<Option<K>>
    where
        V: PartialEq,
    {
        self.find_by(|_, value| Ok(value == target))
    }

    pub fn find_by<P>(&mut self, mut predicate: P) -> DbResult<Option<K>>
    where
        P: FnMut(&K, &V) -> DbResult<bool>,
    {
        while self.valid() {
            let (key, value) = self.get()?;
            if predicate(&key, &value)? {
                return Ok(Some(key));
            }
            self.next()?;
        }
        Ok(None)
    }

    /// Stop iterating and release an owned transaction. A borrowed transaction
    /// stays open for its owner.
    pub fn close(&mut self) {
        self.page.clear();
        self.closed = true;
        self.txn.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::databases::redb::Store;
    use crate::databases::redb::keyspace::bucket_prefix;

    fn seeded() -> (Store, Vec<u8>) {
        let store = Store::open(DatabaseConfig::in_memory()).unwrap();
        let prefix = bucket_prefix("words").unwrap();
        let mut txn = store.begin_write().unwrap();
        for word in ["apple", "apricot", "banana", "blueberry", "cherry"] {
            let mut key = prefix.clone();
            key.extend_from_slice(word.as_bytes());
            txn.set(&key, &(word.len() as u32).encode().unwrap()).unwrap();
        }
        // A neighbouring bucket must never leak into the range
        let mut other = bucket_prefix("wordz").unwrap();
        other.extend_from_slice(b"apple");
        txn.set(&other, &0u32.encode().unwrap()).unwrap();
        txn.commit().unwrap();
        (store, prefix)
    }

    fn collect(iter: &mut BucketIterator<'_, String, u32>) -> Vec<String> {
        let mut out = Vec::new();
        while iter.valid() {
            out.push(iter.key().unwrap());
            iter.next().unwrap();
        }
        out
    }

    fn open<'t>(
        txn: &'t Transaction,
        prefix: &[u8],
        options: BucketIterOptions,
    ) -> BucketIterator<'t, String, u32> {
        BucketIterator::new(TxnRef::Borrowed(txn), "words", prefix, options, 2).unwrap()
    }

    #[test]
    fn test_forward_and_reverse_across_pages() {
        let (store, prefix) = seeded();
        let txn = store.begin_read().unwrap();

        let mut iter = open(&txn, &prefix, BucketIterOptions::default());
        assert_eq!(
            collect(&mut iter),
            vec!["apple", "apricot", "banana", "blueberry", "cherry"]
        );

        let mut iter = open(&txn, &prefix, BucketIterOptions::reversed());
        assert_eq!(
            collect(&mut iter),
            vec!["cherry", "blueberry", "banana", "apricot", "apple"]
        );
    }

    #[test]
    fn test_sub_prefix_strips_from_key() {
        let (store, prefix) = seeded();
        let txn = store.begin_read().unwrap();
        let options = BucketIterOptions::builder().prefix(b"b".to_vec()).build();
        let mut iter = open(&txn, &prefix, options);
        assert_eq!(iter.bucket_key(), Some(&b"banana"[..]));
        assert_eq!(collect(&mut iter), vec!["anana", "lueberry"]);
    }

    #[test]
    fn test_reverse_start_includes_keys_under_start() {
        let (store, prefix) = seeded();
        let txn = store.begin_read().unwrap();
        let options = BucketIterOptions::builder()
            .start(b"b".to_vec())
            .reverse(true)
            .build();
        let mut iter = open(&txn, &prefix, options);
        assert_eq!(
            collect(&mut iter),
            vec!["blueberry", "banana", "apricot", "apple"]
        );
    }

    #[test]
    fn test_find_does_not_wrap() {
        let (store, prefix) = seeded();
        let txn = store.begin_read().unwrap();
        let mut iter = open(&txn, &prefix, BucketIterOptions::default());
        assert_eq!(iter.find(&6).unwrap(), Some("banana".to_string()));
        iter.next().unwrap();
        assert_eq!(iter.find(&5).unwrap(), None);
        assert!(iter.eof());
        iter.rewind().unwrap();
        assert_eq!(iter.find(&5).unwrap(), Some("apple".to_string()));
    }

    #[test]
    fn test_close_releases_owned_transaction() {
        let (store, prefix) = seeded();
        let txn = store.begin_read().unwrap();
        let mut iter: BucketIterator<'_, String, u32> = BucketIterator::new(
            TxnRef::Owned(txn),
            "words",
            &prefix,
            BucketIterOptions::default(),
            10,
        )
        .unwrap();
        iter.close();
        assert!(!iter.valid());
        assert!(matches!(
            iter.transaction().get(b"x"),
            Err(DbError::TransactionClosed)
        ));
    }
}
