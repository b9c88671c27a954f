use thiserror::Error;

pub type DbResult<T> = Result<T, DbError>;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Key not found in bucket {bucket:?}")]
    NotFound { bucket: String },

    #[error("Bucket {0:?} is empty")]
    EmptyBucket(String),

    #[error("Integrity error - value already present for unique index {index:?} (value {value:?})")]
    DuplicateKey { index: String, value: Vec<u8> },

    #[error("No such index: {0:?}")]
    NoSuchIndex(String),

    #[error("Index {0:?} is not unique")]
    IndexNotUnique(String),

    #[error("Schema mismatch: registered for {expected}, requested as {found}")]
    SchemaMismatch { expected: String, found: String },

    #[error("Not a read/write transaction")]
    NotWritable,

    #[error("Transaction already committed or discarded")]
    TransactionClosed,

    #[error("Database is closed")]
    DatabaseClosed,

    #[error("No such bucket: {0:?}")]
    NoSuchBucket(String),

    #[error("No such table: {0:?}")]
    NoSuchTable(String),

    #[error("Invalid bucket name: {0:?}")]
    InvalidName(String),

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
}

impl DbError {
    /// Unique-index violations are the one failure applications are expected
    /// to recover from, e.g. to turn an insert into an update.
    pub fn is_duplicate_key(&self) -> bool {
        matches!(self, DbError::DuplicateKey { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DbError::NotFound { .. })
    }
}

/// Failures surfaced by the underlying redb engine.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Redb Database Error: {0}")]
    DatabaseError(#[from] redb::DatabaseError),

    #[error("Redb Transaction Error: {0}")]
    TransactionError(#[from] redb::TransactionError),

    #[error("Redb Table Error: {0}")]
    TableError(#[from] redb::TableError),

    #[error("Redb Commit Error: {0}")]
    CommitError(#[from] redb::CommitError),

    #[error("Redb Storage Error: {0}")]
    StorageError(#[from] redb::StorageError),

    #[error("Redb Set Durability Error: {0}")]
    SetDurabilityError(#[from] redb::SetDurabilityError),
}

macro_rules! impl_from_redb {
    ($($err:ty => $variant:ident),*) => {
        $(
            impl From<$err> for DbError {
                fn from(err: $err) -> Self {
                    DbError::Store(StoreError::$variant(err))
                }
            }
        )*
    };
}

impl_from_redb!(
    redb::DatabaseError => DatabaseError,
    redb::TransactionError => TransactionError,
    redb::TableError => TableError,
    redb::CommitError => CommitError,
    redb::StorageError => StorageError,
    redb::SetDurabilityError => SetDurabilityError
);

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Invalid encoded length: expected {expected} bytes, found {found}")]
    InvalidLength { expected: usize, found: usize },

    #[error("Invalid UTF-8 in encoded string: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    #[error("Invalid encoded bool byte: {0:#04x}")]
    InvalidBool(u8),

    #[error("Encoded timestamp out of range")]
    InvalidTimestamp,

    #[error("There was an error encoding type: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("There was an error decoding type: {0}")]
    Decode(#[from] bincode::error::DecodeError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_key_is_recognised() {
        let err = DbError::DuplicateKey {
            index: "year".to_string(),
            value: vec![0, 1],
        };
        assert!(err.is_duplicate_key());
        assert!(!err.is_not_found());
        assert!(err.to_string().contains("\"year\""));
    }

    #[test]
    fn codec_errors_convert() {
        let err: DbError = CodecError::InvalidBool(7).into();
        assert!(matches!(err, DbError::Codec(CodecError::InvalidBool(7))));
        assert!(!err.is_duplicate_key());
    }
}
