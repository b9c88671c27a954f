//! Declarative description of a record type's primary id and indexes.
//!
//! A [`Schema`] lists accessors instead of relying on field reflection. It is
//! resolved once into a [`StructInfo`] when the table is registered, which binds
//! every index to its backing bucket `table.field`.

use std::any::{TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use strum::Display;

use crate::bucket::{Bucket, BucketOptions, RecordId};
use crate::databases::redb::Store;
use crate::errors::{DbError, DbResult};
use crate::traits::{Codec, CodecResult, Record};

type IdGetter<T> = Arc<dyn Fn(&T) -> RecordId + Send + Sync>;
type IdSetter<T> = Arc<dyn Fn(&mut T, RecordId) + Send + Sync>;
type Extractor<T> = Arc<dyn Fn(&T) -> CodecResult<Vec<u8>> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum IndexKind {
    /// The record id itself; the backing bucket holds the records.
    Primary,
    /// At most one record per value.
    Unique,
    /// Any number of records per value.
    Multi,
}

/// Rust type of an indexed field. Lookups and range bounds must use the same
/// type, since values of different types can share an encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldType {
    id: TypeId,
    name: &'static str,
}

impl FieldType {
    pub fn of<Q: 'static>() -> Self {
        Self {
            id: TypeId::of::<Q>(),
            name: type_name::<Q>(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Fail with `SchemaMismatch` unless `given` is this type.
    pub fn check(&self, given: FieldType) -> DbResult<()> {
        if self.id == given.id {
            return Ok(());
        }
        Err(DbError::SchemaMismatch {
            expected: self.name.to_string(),
            found: given.name.to_string(),
        })
    }
}

struct IndexDef<T> {
    name: String,
    kind: IndexKind,
    field_type: FieldType,
    extract: Extractor<T>,
}

struct PrimaryDef<T> {
    name: String,
    get_id: IdGetter<T>,
    set_id: IdSetter<T>,
}

pub struct Schema<T> {
    primary: PrimaryDef<T>,
    indexes: Vec<IndexDef<T>>,
}

impl<T> Schema<T> {
    pub fn builder() -> SchemaBuilder<T> {
        SchemaBuilder {
            primary: Vec::new(),
            indexes: Vec::new(),
        }
    }

    pub fn primary_name(&self) -> &str {
        &self.primary.name
    }

    /// Names and kinds of the secondary indexes, in declaration order.
    pub fn index_names(&self) -> impl Iterator<Item = (&str, IndexKind)> {
        self.indexes.iter().map(|def| (def.name.as_str(), def.kind))
    }
}

impl<T> fmt::Debug for Schema<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("primary", &self.primary.name)
            .field("indexes", &self.index_names().collect::<Vec<_>>())
            .finish()
    }
}

pub struct SchemaBuilder<T> {
    primary: Vec<PrimaryDef<T>>,
    indexes: Vec<IndexDef<T>>,
}

impl<T> SchemaBuilder<T> {
    /// The auto-assigned id field: how to read it and how to stamp it.
    pub fn primary<G, S>(mut self, name: &str, get_id: G, set_id: S) -> Self
    where
        G: Fn(&T) -> RecordId + Send + Sync + 'static,
        S: Fn(&mut T, RecordId) + Send + Sync + 'static,
    {
        self.primary.push(PrimaryDef {
            name: name.to_string(),
            get_id: Arc::new(get_id),
            set_id: Arc::new(set_id),
        });
        self
    }

    /// A field several records may share.
    pub fn index<F, Q>(self, name: &str, extract: F) -> Self
    where
        F: Fn(&T) -> Q + Send + Sync + 'static,
        Q: Codec + 'static,
    {
        self.push_index(name, IndexKind::Multi, extract)
    }

    /// A field no two records may share.
    pub fn unique_index<F, Q>(self, name: &str, extract: F) -> Self
    where
        F: Fn(&T) -> Q + Send + Sync + 'static,
        Q: Codec + 'static,
    {
        self.push_index(name, IndexKind::Unique, extract)
    }

    fn push_index<F, Q>(mut self, name: &str, kind: IndexKind, extract: F) -> Self
    where
        F: Fn(&T) -> Q + Send + Sync + 'static,
        Q: Codec + 'static,
    {
        self.indexes.push(IndexDef {
            name: name.to_string(),
            kind,
            field_type: FieldType::of::<Q>(),
            extract: Arc::new(move |record: &T| extract(record).encode()),
        });
        self
    }

    pub fn build(mut self) -> DbResult<Schema<T>> {
        if self.primary.len() != 1 {
            return Err(DbError::InvalidSchema(format!(
                "expected exactly one primary field, found {}",
                self.primary.len()
            )));
        }
        let primary = self.primary.remove(0);

        let mut seen = vec![primary.name.as_str()];
        for def in &self.indexes {
            if def.name.is_empty() || seen.contains(&def.name.as_str()) {
                return Err(DbError::InvalidSchema(format!(
                    "index name {:?} is empty or declared twice",
                    def.name
                )));
            }
            seen.push(&def.name);
        }

        Ok(Schema {
            primary,
            indexes: self.indexes,
        })
    }
}

/// A secondary index bound to its backing bucket.
pub struct IndexInfo<T> {
    pub name: String,
    pub kind: IndexKind,
    pub field_type: FieldType,
    extract: Extractor<T>,
    pub(crate) bucket: Bucket<Vec<u8>, RecordId>,
}

impl<T> IndexInfo<T> {
    pub fn bucket_name(&self) -> &str {
        self.bucket.name()
    }

    pub fn is_unique(&self) -> bool {
        self.kind == IndexKind::Unique
    }

    /// Encoded field value of `record` for this index.
    pub fn field_key(&self, record: &T) -> CodecResult<Vec<u8>> {
        (self.extract)(record)
    }

    /// Key stored in the backing bucket: the field value for a unique index,
    /// the field value followed by the id for a non-unique one.
    pub(crate) fn entry_key(&self, field: &[u8], id: RecordId) -> CodecResult<Vec<u8>> {
        let mut key = field.to_vec();
        if self.kind == IndexKind::Multi {
            key.extend_from_slice(&id.encode()?);
        }
        Ok(key)
    }
}

/// Which bucket an index name resolves to.
pub(crate) enum IndexRef<'a, T> {
    Primary,
    Secondary(&'a IndexInfo<T>),
}

impl<T> IndexRef<'_, T> {
    /// Type of the values stored under this index; the primary is keyed by id.
    pub(crate) fn field_type(&self) -> FieldType {
        match self {
            IndexRef::Primary => FieldType::of::<RecordId>(),
            IndexRef::Secondary(info) => info.field_type,
        }
    }
}

/// A schema resolved against a database: the primary bucket plus one bucket per
/// secondary index.
pub struct StructInfo<T> {
    pub table: String,
    pub primary_name: String,
    get_id: IdGetter<T>,
    pub(crate) primary: Bucket<RecordId, T>,
    pub(crate) indexes: Vec<IndexInfo<T>>,
    index_by_name: HashMap<String, usize>,
}

impl<T: Record> StructInfo<T> {
    pub(crate) fn resolve(store: &Arc<Store>, table: &str, schema: Schema<T>) -> DbResult<Self> {
        let Schema { primary, indexes } = schema;

        let set_id = primary.set_id.clone();
        let primary_options = BucketOptions::with_pre_add(move |id, record: &mut T| {
            set_id(record, id);
            Ok(())
        });
        let primary_bucket = Bucket::new(
            store.clone(),
            &format!("{}.{}", table, primary.name),
            primary_options,
        )?;

        let mut infos = Vec::with_capacity(indexes.len());
        let mut index_by_name = HashMap::new();
        for def in indexes {
            let bucket = Bucket::new(
                store.clone(),
                &format!("{}.{}", table, def.name),
                BucketOptions::default(),
            )?;
            index_by_name.insert(def.name.clone(), infos.len());
            infos.push(IndexInfo {
                name: def.name,
                kind: def.kind,
                field_type: def.field_type,
                extract: def.extract,
                bucket,
            });
        }

        Ok(Self {
            table: table.to_string(),
            primary_name: primary.name,
            get_id: primary.get_id,
            primary: primary_bucket,
            indexes: infos,
            index_by_name,
        })
    }
}

impl<T> StructInfo<T> {
    pub fn id_of(&self, record: &T) -> RecordId {
        (self.get_id)(record)
    }

    pub fn indexes(&self) -> &[IndexInfo<T>] {
        &self.indexes
    }

    pub fn kind_of(&self, name: &str) -> Option<IndexKind> {
        if name == self.primary_name {
            return Some(IndexKind::Primary);
        }
        self.index_by_name
            .get(name)
            .map(|&pos| self.indexes[pos].kind)
    }

    pub(crate) fn lookup(&self, name: &str) -> DbResult<IndexRef<'_, T>> {
        if name == self.primary_name {
            return Ok(IndexRef::Primary);
        }
        self.index_by_name
            .get(name)
            .map(|&pos| IndexRef::Secondary(&self.indexes[pos]))
            .ok_or_else(|| DbError::NoSuchIndex(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;

    #[derive(Debug, Clone, PartialEq, bincode::Encode, bincode::Decode)]
    struct Note {
        id: u64,
        tag: String,
        slug: String,
    }

    crate::bincode_codec!(Note);

    impl Record for Note {
        fn schema() -> DbResult<Schema<Self>> {
            Schema::builder()
                .primary("id", |n: &Note| n.id, |n: &mut Note, id| n.id = id)
                .index("tag", |n: &Note| n.tag.clone())
                .unique_index("slug", |n: &Note| n.slug.clone())
                .build()
        }
    }

    #[test]
    fn test_schema_requires_one_primary() {
        let none = Schema::<Note>::builder().index("tag", |n: &Note| n.tag.clone()).build();
        assert!(matches!(none, Err(DbError::InvalidSchema(_))));

        let two = Schema::<Note>::builder()
            .primary("id", |n: &Note| n.id, |n: &mut Note, id| n.id = id)
            .primary("other", |n: &Note| n.id, |n: &mut Note, id| n.id = id)
            .build();
        assert!(matches!(two, Err(DbError::InvalidSchema(_))));
    }

    #[test]
    fn test_schema_rejects_duplicate_names() {
        let result = Schema::<Note>::builder()
            .primary("id", |n: &Note| n.id, |n: &mut Note, id| n.id = id)
            .index("tag", |n: &Note| n.tag.clone())
            .unique_index("tag", |n: &Note| n.tag.clone())
            .build();
        assert!(matches!(result, Err(DbError::InvalidSchema(_))));
    }

    #[test]
    fn test_resolved_buckets_are_namespaced() {
        let store = Arc::new(Store::open(DatabaseConfig::in_memory()).unwrap());
        let info = StructInfo::resolve(&store, "notes", Note::schema().unwrap()).unwrap();
        assert_eq!(info.primary.name(), "notes.id");
        assert_eq!(info.indexes()[0].bucket_name(), "notes.tag");
        assert_eq!(info.kind_of("id"), Some(IndexKind::Primary));
        assert_eq!(info.kind_of("slug"), Some(IndexKind::Unique));
        assert_eq!(info.kind_of("missing"), None);
        assert!(matches!(info.lookup("missing"), Err(DbError::NoSuchIndex(_))));
    }

    #[test]
    fn test_multi_entry_key_appends_id() {
        let store = Arc::new(Store::open(DatabaseConfig::in_memory()).unwrap());
        let info = StructInfo::resolve(&store, "notes", Note::schema().unwrap()).unwrap();
        let note = Note {
            id: 7,
            tag: "rust".into(),
            slug: "hello".into(),
        };
        let tag = &info.indexes()[0];
        let field = tag.field_key(&note).unwrap();
        assert_eq!(field, b"rust".to_vec());
        assert_eq!(tag.entry_key(&field, 7).unwrap().len(), 4 + 8);

        let slug = &info.indexes()[1];
        assert_eq!(slug.entry_key(b"hello", 7).unwrap(), b"hello".to_vec());
        assert_eq!(info.id_of(&note), 7);
    }

    #[test]
    fn test_field_types_are_recorded() {
        let store = Arc::new(Store::open(DatabaseConfig::in_memory()).unwrap());
        let info = StructInfo::resolve(&store, "notes", Note::schema().unwrap()).unwrap();
        let tag = &info.indexes()[0];
        assert_eq!(tag.field_type, FieldType::of::<String>());
        assert!(tag.field_type.check(FieldType::of::<String>()).is_ok());
        assert!(matches!(
            tag.field_type.check(FieldType::of::<u32>()),
            Err(DbError::SchemaMismatch { .. })
        ));
        let primary = info.lookup("id").unwrap();
        assert_eq!(primary.field_type(), FieldType::of::<RecordId>());
    }
}
