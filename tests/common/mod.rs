// Common test utilities and helpers

#![allow(dead_code)]

use std::path::PathBuf;

use bucketdb::prelude::*;
use tempfile::TempDir;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Create a file-backed database in a fresh temporary directory. The directory
/// is removed when the returned guard is dropped.
pub fn create_test_db(name: &str) -> DbResult<(Database, TempDir)> {
    init_logging();
    let dir = tempfile::tempdir()?;
    let db = Database::open(DatabaseConfig::new(db_path(&dir, name)))?;
    Ok((db, dir))
}

pub fn db_path(dir: &TempDir, name: &str) -> PathBuf {
    dir.path().join(format!("{}.redb", name))
}

pub fn create_memory_db() -> DbResult<Database> {
    init_logging();
    Database::open_in_memory()
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Book {
    pub id: RecordId,
    pub title: String,
    pub author: String,
    pub year: i64,
    pub published: DbDateTime,
}

bucketdb::serde_codec!(Book);

impl Book {
    pub fn new(title: &str, author: &str, year: i64) -> Self {
        let published = DbDateTime::parse_rfc3339(&format!("{:04}-01-01T10:00:00Z", year))
            .expect("valid test timestamp");
        Self {
            id: 0,
            title: title.to_string(),
            author: author.to_string(),
            year,
            published,
        }
    }
}

impl Record for Book {
    fn schema() -> DbResult<Schema<Self>> {
        Schema::builder()
            .primary("Id", |b: &Book| b.id, |b: &mut Book, id| b.id = id)
            .unique_index("Year", |b: &Book| b.year)
            .unique_index("Published", |b: &Book| b.published)
            .index("Author", |b: &Book| b.author.clone())
            .build()
    }
}
