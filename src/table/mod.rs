//! Schema-aware collections of records.
//!
//! A [`Table`] stores records of one [`Record`] type in its primary bucket and
//! keeps one bucket per declared index in step with it. Every write touching
//! several buckets runs through `update_with_nested`, so either all of them
//! change or none do.

pub mod iterator;
pub mod schema;

use std::sync::Arc;

use log::debug;

use crate::bucket::{Bucket, RecordId};
use crate::databases::redb::Store;
use crate::errors::{DbError, DbResult};
use crate::traits::{Codec, Record, TransactionManager};
use crate::transaction::{NestedManager, Transaction, TxnRef};

pub use iterator::{TableIterOptions, TableIterator};
pub use schema::{FieldType, IndexInfo, IndexKind, Schema, SchemaBuilder, StructInfo};

use schema::IndexRef;

pub struct Table<T> {
    name: String,
    info: Arc<StructInfo<T>>,
    store: Arc<Store>,
}

impl<T> Clone for Table<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            info: self.info.clone(),
            store: self.store.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Table<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.name)
            .field("primary", &self.info.primary_name)
            .field(
                "indexes",
                &self.info.indexes().iter().map(|i| &i.name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl<T: Record> Table<T> {
    pub(crate) fn new(store: Arc<Store>, name: &str) -> DbResult<Self> {
        let info = StructInfo::resolve(&store, name, T::schema()?)?;
        debug!(
            "Set up table {:?} with primary {:?} and {} index(es)",
            name,
            info.primary_name,
            info.indexes().len()
        );
        Ok(Self {
            name: name.to_string(),
            info: Arc::new(info),
            store,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn info(&self) -> &StructInfo<T> {
        &self.info
    }

    /// The bucket holding the records, keyed by id.
    pub fn primary(&self) -> &Bucket<RecordId, T> {
        &self.info.primary
    }

    /// Encoded field value of every secondary index for `record`.
    fn field_keys(&self, record: &T) -> DbResult<Vec<Vec<u8>>> {
        self.info
            .indexes()
            .iter()
            .map(|index| Ok(index.field_key(record)?))
            .collect()
    }

    /// Fail with `DuplicateKey` if a unique value of `record` is already taken
    /// by a record other than `owner`.
    fn check_unique(
        &self,
        nested: &NestedManager<'_>,
        fields: &[Vec<u8>],
        owner: Option<RecordId>,
    ) -> DbResult<()> {
        for (index, field) in self.info.indexes().iter().zip(fields) {
            if !index.is_unique() {
                continue;
            }
            match index.bucket.get_in(nested, field) {
                Ok(existing) if Some(existing) == owner => {}
                Ok(_) => {
                    return Err(DbError::DuplicateKey {
                        index: index.name.clone(),
                        value: field.clone(),
                    });
                }
                Err(err) if err.is_not_found() => {}
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    fn write_indexes(
        &self,
        nested: &NestedManager<'_>,
        fields: &[Vec<u8>],
        id: RecordId,
    ) -> DbResult<()> {
        for (index, field) in self.info.indexes().iter().zip(fields) {
            index
                .bucket
                .set_in(nested, &index.entry_key(field, id)?, &id)?;
        }
        Ok(())
    }

    fn remove_indexes(
        &self,
        nested: &NestedManager<'_>,
        fields: &[Vec<u8>],
        id: RecordId,
    ) -> DbResult<()> {
        for (index, field) in self.info.indexes().iter().zip(fields) {
            index.bucket.delete_in(nested, &index.entry_key(field, id)?)?;
        }
        Ok(())
    }

    /// Insert `record` under a fresh id, stamp the id into it and index it.
    /// Fails with `DuplicateKey`, writing nothing, if a unique index value is
    /// already taken.
    pub fn save(&self, record: &mut T) -> DbResult<RecordId> {
        self.save_in(&*self.store, record)
    }

    pub fn save_in<M: TransactionManager>(&self, mgr: &M, record: &mut T) -> DbResult<RecordId> {
        mgr.update_with_nested(|nested| {
            let fields = self.field_keys(record)?;
            self.check_unique(nested, &fields, None)?;
            let id = self.info.primary.add_in(nested, record)?;
            self.write_indexes(nested, &fields, id)?;
            Ok(id)
        })
    }

    pub fn get(&self, id: RecordId) -> DbResult<T> {
        self.get_in(&*self.store, id)
    }

    pub fn get_in<M: TransactionManager>(&self, mgr: &M, id: RecordId) -> DbResult<T> {
        self.info.primary.get_in(mgr, &id)
    }

    /// Look a record up through a unique index. `value` must have the type of
    /// the indexed field (`RecordId` for the primary), otherwise the lookup
    /// fails with `SchemaMismatch`.
    pub fn get_by<Q: Codec + 'static>(&self, index: &str, value: &Q) -> DbResult<T> {
        self.get_by_in(&*self.store, index, value)
    }

    pub fn get_by_in<M, Q>(&self, mgr: &M, index: &str, value: &Q) -> DbResult<T>
    where
        M: TransactionManager,
        Q: Codec + 'static,
    {
        let resolved = self.info.lookup(index)?;
        resolved.field_type().check(FieldType::of::<Q>())?;
        let field = value.encode()?;
        mgr.view_with_nested(|nested| {
            let id = match resolved {
                IndexRef::Primary => RecordId::decode(&field)?,
                IndexRef::Secondary(info) if info.is_unique() => {
                    info.bucket.get_in(nested, &field)?
                }
                IndexRef::Secondary(info) => {
                    return Err(DbError::IndexNotUnique(info.name.clone()));
                }
            };
            self.info.primary.get_in(nested, &id)
        })
    }

    /// Replace the stored record with the same id as `record` and move its
    /// index entries.
    pub fn update(&self, record: &T) -> DbResult<()> {
        self.update_in(&*self.store, record)
    }

    pub fn update_in<M: TransactionManager>(&self, mgr: &M, record: &T) -> DbResult<()> {
        let id = self.info.id_of(record);
        mgr.update_with_nested(|nested| {
            let previous = self.info.primary.get_in(nested, &id)?;
            let old_fields = self.field_keys(&previous)?;
            let new_fields = self.field_keys(record)?;
            self.check_unique(nested, &new_fields, Some(id))?;
            self.remove_indexes(nested, &old_fields, id)?;
            self.info.primary.set_in(nested, &id, record)?;
            self.write_indexes(nested, &new_fields, id)
        })
    }

    /// Remove a record and its index entries. Removing a missing id succeeds.
    pub fn delete(&self, id: RecordId) -> DbResult<()> {
        self.delete_in(&*self.store, id)
    }

    pub fn delete_in<M: TransactionManager>(&self, mgr: &M, id: RecordId) -> DbResult<()> {
        mgr.update_with_nested(|nested| {
            let previous = match self.info.primary.get_in(nested, &id) {
                Ok(record) => record,
                Err(err) if err.is_not_found() => return Ok(()),
                Err(err) => return Err(err),
            };
            let fields = self.field_keys(&previous)?;
            self.remove_indexes(nested, &fields, id)?;
            self.info.primary.delete_in(nested, &id)
        })
    }

    pub fn count(&self) -> DbResult<usize> {
        self.count_in(&*self.store)
    }

    pub fn count_in<M: TransactionManager>(&self, mgr: &M) -> DbResult<usize> {
        self.info.primary.count_in(mgr)
    }

    /// Range query over `index` in its own read-only transaction.
    pub fn iter(
        &self,
        index: &str,
        options: TableIterOptions,
    ) -> DbResult<TableIterator<'static, T>> {
        let txn = self.store.begin_read()?;
        self.open_iter(TxnRef::Owned(txn), index, options)
    }

    /// Range query over `index` inside a transaction owned by the caller.
    pub fn iter_in<'t>(
        &self,
        txn: &'t Transaction,
        index: &str,
        options: TableIterOptions,
    ) -> DbResult<TableIterator<'t, T>> {
        self.open_iter(TxnRef::Borrowed(txn), index, options)
    }

    fn open_iter<'t>(
        &self,
        txn: TxnRef<'t>,
        index: &str,
        options: TableIterOptions,
    ) -> DbResult<TableIterator<'t, T>> {
        let primary = self.info.primary.clone();
        let resolved = self.info.lookup(index)?;
        let field_type = resolved.field_type();
        match resolved {
            IndexRef::Primary => TableIterator::open(
                &primary,
                IndexKind::Primary,
                field_type,
                primary.clone(),
                txn,
                options,
            ),
            IndexRef::Secondary(info) => {
                TableIterator::open(&info.bucket, info.kind, field_type, primary, txn, options)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;

    #[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Tag {
        id: u64,
        label: String,
        group: u32,
    }

    crate::serde_codec!(Tag);

    impl Record for Tag {
        fn schema() -> DbResult<Schema<Self>> {
            Schema::builder()
                .primary("id", |t: &Tag| t.id, |t: &mut Tag, id| t.id = id)
                .unique_index("label", |t: &Tag| t.label.clone())
                .index("group", |t: &Tag| t.group)
                .build()
        }
    }

    fn table() -> Table<Tag> {
        let store = Arc::new(Store::open(DatabaseConfig::in_memory()).unwrap());
        Table::new(store, "tags").unwrap()
    }

    fn tag(label: &str, group: u32) -> Tag {
        Tag {
            id: 0,
            label: label.to_string(),
            group,
        }
    }

    #[test]
    fn test_save_stamps_id() {
        let tags = table();
        let mut t = tag("red", 1);
        let id = tags.save(&mut t).unwrap();
        assert_eq!(t.id, id);
        assert_eq!(tags.get(id).unwrap(), t);
    }

    #[test]
    fn test_update_moves_unique_entry() {
        let tags = table();
        let mut t = tag("red", 1);
        tags.save(&mut t).unwrap();
        t.label = "crimson".to_string();
        tags.update(&t).unwrap();

        assert_eq!(tags.get_by("label", &"crimson".to_string()).unwrap(), t);
        assert!(tags.get_by("label", &"red".to_string()).unwrap_err().is_not_found());

        // Saving under the freed label works again
        tags.save(&mut tag("red", 2)).unwrap();
    }

    #[test]
    fn test_update_rejects_taken_label() {
        let tags = table();
        let mut a = tag("red", 1);
        let mut b = tag("blue", 1);
        tags.save(&mut a).unwrap();
        tags.save(&mut b).unwrap();
        b.label = "red".to_string();
        assert!(tags.update(&b).unwrap_err().is_duplicate_key());
        assert_eq!(tags.get(b.id).unwrap().label, "blue");
    }

    #[test]
    fn test_delete_clears_indexes() {
        let tags = table();
        let mut t = tag("red", 1);
        let id = tags.save(&mut t).unwrap();
        tags.delete(id).unwrap();
        tags.delete(id).unwrap();
        assert_eq!(tags.count().unwrap(), 0);
        for index in tags.info().indexes() {
            assert!(index.bucket.is_empty().unwrap());
        }
    }

    #[test]
    fn test_multi_index_keeps_every_record() {
        let tags = table();
        for label in ["a", "b", "c"] {
            tags.save(&mut tag(label, 7)).unwrap();
        }
        let mut iter = tags.iter("group", TableIterOptions::new().eq(7u32)).unwrap();
        assert_eq!(iter.collect_all().unwrap().len(), 3);
        assert!(matches!(
            tags.get_by("group", &7u32),
            Err(DbError::IndexNotUnique(_))
        ));
    }
}
