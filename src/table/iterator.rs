//! Range queries over one index of a table.

use log::debug;

use crate::bucket::{Bucket, BucketIterOptions, BucketIterator, RecordId};
use crate::errors::{DbError, DbResult};
use crate::table::schema::{FieldType, IndexKind};
use crate::traits::{Codec, Record};
use crate::transaction::{NestedManager, TxnRef};

const ID_WIDTH: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Limit {
    key: Vec<u8>,
    inclusive: bool,
}

/// Bounds and direction of a [`TableIterator`].
///
/// Bounds are given as field values of the iterated index and compose, so
/// `TableIterOptions::new().gt(1600i64).lt(1700i64)` visits every value strictly
/// between the two. Every bound must have the type of the indexed field. A
/// value that fails to encode, or bounds of mixed types, are reported when the
/// iterator is opened.
#[derive(Debug, Default)]
pub struct TableIterOptions {
    lower: Option<Limit>,
    upper: Option<Limit>,
    exact: Option<Vec<u8>>,
    reverse: bool,
    field_type: Option<FieldType>,
    error: Option<DbError>,
}

impl TableIterOptions {
    pub fn new() -> Self {
        Self::default()
    }

    fn encoded<Q: Codec + 'static>(&mut self, value: &Q) -> Option<Vec<u8>> {
        let given = FieldType::of::<Q>();
        let checked = match self.field_type {
            Some(expected) => expected.check(given),
            None => Ok(()),
        };
        self.field_type.get_or_insert(given);
        match checked.and_then(|()| Ok(value.encode()?)) {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                self.error.get_or_insert(err);
                None
            }
        }
    }

    fn with_lower<Q: Codec + 'static>(mut self, value: Q, inclusive: bool) -> Self {
        if let Some(key) = self.encoded(&value) {
            self.lower = Some(Limit { key, inclusive });
        }
        self
    }

    fn with_upper<Q: Codec + 'static>(mut self, value: Q, inclusive: bool) -> Self {
        if let Some(key) = self.encoded(&value) {
            self.upper = Some(Limit { key, inclusive });
        }
        self
    }

    pub fn gt<Q: Codec + 'static>(self, value: Q) -> Self {
        self.with_lower(value, false)
    }

    pub fn ge<Q: Codec + 'static>(self, value: Q) -> Self {
        self.with_lower(value, true)
    }

    pub fn lt<Q: Codec + 'static>(self, value: Q) -> Self {
        self.with_upper(value, false)
    }

    pub fn le<Q: Codec + 'static>(self, value: Q) -> Self {
        self.with_upper(value, true)
    }

    /// Only entries whose value equals `value`.
    pub fn eq<Q: Codec + 'static>(mut self, value: Q) -> Self {
        if let Some(key) = self.encoded(&value) {
            self.lower = Some(Limit {
                key: key.clone(),
                inclusive: true,
            });
            self.exact = Some(key.clone());
            self.upper = Some(Limit {
                key,
                inclusive: true,
            });
        }
        self
    }

    /// `low <= value <= high`
    pub fn between<Q: Codec + 'static>(self, low: Q, high: Q) -> Self {
        self.ge(low).le(high)
    }

    /// `low < value < high`
    pub fn between_exclusive<Q: Codec + 'static>(self, low: Q, high: Q) -> Self {
        self.gt(low).lt(high)
    }

    pub fn reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }

    pub fn is_reverse(&self) -> bool {
        self.reverse
    }

    /// Where the underlying cursor starts and which sub-prefix it stays in.
    fn cursor_options(&self) -> BucketIterOptions {
        let start = if self.reverse {
            self.upper.as_ref()
        } else {
            self.lower.as_ref()
        };
        BucketIterOptions {
            prefix: self.exact.clone().unwrap_or_default(),
            start: start.map(|limit| limit.key.clone()),
            reverse: self.reverse,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Yield,
    Skip,
    Stop,
}

fn below(field: &[u8], limit: &Limit) -> bool {
    if limit.inclusive {
        field < limit.key.as_slice()
    } else {
        field <= limit.key.as_slice()
    }
}

fn above(field: &[u8], limit: &Limit) -> bool {
    if limit.inclusive {
        field > limit.key.as_slice()
    } else {
        field >= limit.key.as_slice()
    }
}

/// Cursor over one index that yields `(id, record)` pairs.
///
/// Entries outside the bounds on the near side of the scan are skipped; the
/// first entry past the far bound ends the scan. For secondary indexes every
/// id is looked up in the primary bucket through the iterator's transaction.
pub struct TableIterator<'t, T> {
    cursor: BucketIterator<'t, Vec<u8>, Vec<u8>>,
    index: String,
    kind: IndexKind,
    primary: Bucket<RecordId, T>,
    lower: Option<Limit>,
    upper: Option<Limit>,
    reverse: bool,
    stopped: bool,
}

impl<'t, T: Record> TableIterator<'t, T> {
    pub(crate) fn open<K: Codec, V: Codec>(
        index_bucket: &Bucket<K, V>,
        kind: IndexKind,
        field_type: FieldType,
        primary: Bucket<RecordId, T>,
        txn: TxnRef<'t>,
        mut options: TableIterOptions,
    ) -> DbResult<Self> {
        if let Some(err) = options.error.take() {
            return Err(err);
        }
        if let Some(given) = options.field_type {
            field_type.check(given)?;
        }
        debug!(
            "Opened table iterator on {:?} ({} index, reverse: {})",
            index_bucket.name(),
            kind,
            options.reverse
        );
        let cursor = index_bucket.open_iter_as(txn, options.cursor_options())?;
        let mut iter = Self {
            cursor,
            index: index_bucket.name().to_string(),
            kind,
            primary,
            lower: options.lower,
            upper: options.upper,
            reverse: options.reverse,
            stopped: false,
        };
        iter.settle()?;
        Ok(iter)
    }

    fn raw_key(&self) -> DbResult<&[u8]> {
        self.cursor.bucket_key().ok_or_else(|| DbError::NotFound {
            bucket: self.index.clone(),
        })
    }

    /// Encoded field value of the current entry.
    fn field(&self) -> Option<&[u8]> {
        let key = self.cursor.bucket_key()?;
        match self.kind {
            IndexKind::Multi => Some(&key[..key.len().saturating_sub(ID_WIDTH)]),
            IndexKind::Primary | IndexKind::Unique => Some(key),
        }
    }

    fn classify(&self) -> Step {
        let Some(field) = self.field() else {
            return Step::Stop;
        };
        let under = self.lower.as_ref().is_some_and(|limit| below(field, limit));
        let over = self.upper.as_ref().is_some_and(|limit| above(field, limit));
        match (under, over, self.reverse) {
            (false, false, _) => Step::Yield,
            (true, _, false) | (_, true, true) => Step::Skip,
            _ => Step::Stop,
        }
    }

    fn settle(&mut self) -> DbResult<()> {
        while !self.stopped && self.cursor.valid() {
            match self.classify() {
                Step::Yield => return Ok(()),
                Step::Skip => self.cursor.next()?,
                Step::Stop => self.stopped = true,
            }
        }
        Ok(())
    }

    pub fn rewind(&mut self) -> DbResult<()> {
        self.stopped = false;
        self.cursor.rewind()?;
        self.settle()
    }

    pub fn valid(&self) -> bool {
        !self.stopped && self.cursor.valid()
    }

    pub fn next(&mut self) -> DbResult<()> {
        self.cursor.next()?;
        self.settle()
    }

    /// Id of the record at the current position.
    pub fn id(&self) -> DbResult<RecordId> {
        match self.kind {
            IndexKind::Primary => Ok(RecordId::decode(self.raw_key()?)?),
            IndexKind::Unique | IndexKind::Multi => {
                Ok(RecordId::decode(&self.cursor.value()?)?)
            }
        }
    }

    /// Indexed field value at the current position.
    pub fn key<Q: Codec>(&self) -> DbResult<Q> {
        let field = self.field().ok_or_else(|| DbError::NotFound {
            bucket: self.index.clone(),
        })?;
        Ok(Q::decode(field)?)
    }

    pub fn get(&self) -> DbResult<(RecordId, T)> {
        let id = self.id()?;
        let record = match self.kind {
            IndexKind::Primary => T::decode(&self.cursor.value()?)?,
            IndexKind::Unique | IndexKind::Multi => {
                let nested = NestedManager::new(self.cursor.transaction());
                self.primary.get_in(&nested, &id)?
            }
        };
        Ok((id, record))
    }

    /// Call `f` for each remaining entry until it returns `false`.
    pub fn iterate<F>(&mut self, mut f: F) -> DbResult<()>
    where
        F: FnMut(RecordId, &T) -> DbResult<bool>,
    {
        while self.valid() {
            let (id, record) = self.get()?;
            if !f(id, &record)? {
                break;
            }
            self.next()?;
        }
        Ok(())
    }

    /// First remaining entry accepted by `predicate`; the cursor stays on it.
    pub fn find<P>(&mut self, mut predicate: P) -> DbResult<Option<(RecordId, T)>>
    where
        P: FnMut(RecordId, &T) -> DbResult<bool>,
    {
        while self.valid() {
            let (id, record) = self.get()?;
            if predicate(id, &record)? {
                return Ok(Some((id, record)));
            }
            self.next()?;
        }
        Ok(None)
    }

    /// Drain the remaining entries into a vector.
    pub fn collect_all(&mut self) -> DbResult<Vec<(RecordId, T)>> {
        let mut out = Vec::new();
        while self.valid() {
            out.push(self.get()?);
            self.next()?;
        }
        Ok(out)
    }

    pub fn close(&mut self) {
        self.stopped = true;
        self.cursor.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limit(key: &[u8], inclusive: bool) -> Limit {
        Limit {
            key: key.to_vec(),
            inclusive,
        }
    }

    #[test]
    fn test_bound_comparisons() {
        assert!(below(b"a", &limit(b"b", true)));
        assert!(!below(b"b", &limit(b"b", true)));
        assert!(below(b"b", &limit(b"b", false)));
        assert!(above(b"c", &limit(b"b", true)));
        assert!(above(b"b", &limit(b"b", false)));
        assert!(!above(b"b", &limit(b"b", true)));
    }

    #[test]
    fn test_cursor_seeks_from_the_near_bound() {
        let forward = TableIterOptions::new().gt(5u32).le(9u32);
        let options = forward.cursor_options();
        assert_eq!(options.start, Some(5u32.encode().unwrap()));
        assert!(options.prefix.is_empty());

        let reverse = TableIterOptions::new().gt(5u32).le(9u32).reverse(true);
        let options = reverse.cursor_options();
        assert_eq!(options.start, Some(9u32.encode().unwrap()));
        assert!(options.reverse);
    }

    #[test]
    fn test_mixed_bound_types_are_rejected() {
        let options = TableIterOptions::new().gt(5u32).lt(9i64);
        assert!(matches!(options.error, Some(DbError::SchemaMismatch { .. })));
        assert_eq!(options.field_type, Some(FieldType::of::<u32>()));
    }

    #[test]
    fn test_eq_narrows_membership() {
        let options = TableIterOptions::new().eq("rust".to_string()).cursor_options();
        assert_eq!(options.prefix, b"rust".to_vec());
        assert_eq!(options.start, Some(b"rust".to_vec()));
    }
}
