//! Prelude module for convenient imports.
//!
//! ```rust
//! use bucketdb::prelude::*;
//! ```

pub use crate::bucket::{
    Bucket, BucketIterOptions, BucketIterator, BucketOptions, PreAddHook, RecordId,
};
pub use crate::config::DatabaseConfig;
pub use crate::database::Database;
pub use crate::errors::{CodecError, DbError, DbResult};
pub use crate::table::{
    FieldType, IndexInfo, IndexKind, Schema, SchemaBuilder, StructInfo, Table, TableIterOptions,
    TableIterator,
};
pub use crate::traits::{Codec, Record, TransactionManager};
pub use crate::transaction::{NestedManager, Transaction, TxnState};
pub use crate::utils::{DbDateTime, DbDateTimeExt};
