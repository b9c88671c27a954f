//! # Bucketdb
//!
//! An embedded, typed database layer on top of [redb](https://docs.rs/redb).
//!
//! ## Features
//!
//! - **Buckets**: named `K -> V` collections sharing one ordered key-space, with
//!   auto-increment ids and order-preserving key encodings
//! - **Tables**: records with a primary id and secondary indexes, kept
//!   consistent with each other in a single transaction
//! - **Composable transactions**: every operation has an `*_in` form taking a
//!   [`TransactionManager`], so several calls can share one transaction
//! - **Range queries**: forward and reverse cursors over buckets and indexes
//!
//! ## Quick Start
//!
//! ```rust
//! use bucketdb::prelude::*;
//!
//! #[derive(Debug, Clone, PartialEq, bincode::Encode, bincode::Decode)]
//! struct Book {
//!     id: u64,
//!     title: String,
//!     year: i64,
//! }
//!
//! bucketdb::bincode_codec!(Book);
//!
//! impl Record for Book {
//!     fn schema() -> DbResult<Schema<Self>> {
//!         Schema::builder()
//!             .primary("id", |b: &Book| b.id, |b: &mut Book, id| b.id = id)
//!             .unique_index("title", |b: &Book| b.title.clone())
//!             .index("year", |b: &Book| b.year)
//!             .build()
//!     }
//! }
//!
//! let db = Database::open_in_memory()?;
//! let books = db.add_table::<Book>("books")?;
//!
//! let mut book = Book { id: 0, title: "Dune".into(), year: 1965 };
//! let id = books.save(&mut book)?;
//! assert_eq!(book.id, id);
//!
//! // Look up through a unique index
//! let found = books.get_by("title", &"Dune".to_string())?;
//! assert_eq!(found, book);
//!
//! // Several writes, one transaction
//! db.update_with_nested(|nested| {
//!     books.save_in(nested, &mut Book { id: 0, title: "Emma".into(), year: 1815 })?;
//!     books.save_in(nested, &mut Book { id: 0, title: "Ulysses".into(), year: 1922 })?;
//!     Ok(())
//! })?;
//!
//! // Everything published before 1950, oldest first
//! let mut iter = books.iter("year", TableIterOptions::new().lt(1950i64))?;
//! let titles: Vec<String> = iter.collect_all()?.into_iter().map(|(_, b)| b.title).collect();
//! assert_eq!(titles, ["Emma", "Ulysses"]);
//! # Ok::<(), DbError>(())
//! ```

pub mod bucket;
pub mod codec;
pub mod config;
pub mod database;
pub mod databases;
pub mod errors;
pub mod prelude;
pub mod table;
pub mod traits;
pub mod transaction;
pub mod utils;

pub use bucket::{Bucket, BucketOptions, RecordId};
pub use config::DatabaseConfig;
pub use database::Database;
pub use errors::{CodecError, DbError, DbResult};
pub use table::{Schema, Table};
pub use traits::{Codec, Record, TransactionManager};
