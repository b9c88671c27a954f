//! Database configuration.
//!
//! Built with `typed-builder`; every field except the location has a default.

use std::path::PathBuf;
use typed_builder::TypedBuilder;

/// Configuration for opening a [`crate::database::Database`].
///
/// # Examples
///
/// ```
/// use bucketdb::config::DatabaseConfig;
///
/// // File-backed with defaults
/// let config = DatabaseConfig::new("library.redb");
///
/// // Customize options
/// let config = DatabaseConfig::builder()
///     .path("/data/library.redb")
///     .cache_size_mb(256)
///     .sequence_bandwidth(1000)
///     .build();
///
/// // Nothing touches the disk
/// let config = DatabaseConfig::in_memory();
/// assert!(config.path.is_none());
/// ```
#[derive(Debug, Clone, TypedBuilder)]
#[builder(doc)]
pub struct DatabaseConfig {
    /// Path to the database file; `None` keeps everything in memory
    #[builder(default, setter(into, strip_option))]
    pub path: Option<PathBuf>,

    /// Page cache size in megabytes
    #[builder(default = 64)]
    pub cache_size_mb: usize,

    /// Whether to create the database file if it doesn't exist
    #[builder(default = true)]
    pub create_if_missing: bool,

    /// Flush every commit to disk before returning
    #[builder(default = true)]
    pub sync_writes: bool,

    /// How many ids a bucket sequence reserves per lease
    #[builder(default = 100)]
    pub sequence_bandwidth: u64,

    /// How many entries an iterator fetches from the store at a time
    #[builder(default = 10)]
    pub prefetch_size: usize,
}

impl DatabaseConfig {
    /// Create a basic configuration with just a path
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self::builder().path(path).build()
    }

    /// Create configuration for a database that lives only in memory
    pub fn in_memory() -> Self {
        Self::builder().build()
    }

    pub(crate) fn cache_size_bytes(&self) -> usize {
        self.cache_size_mb.saturating_mul(1024 * 1024)
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::in_memory()
    }
}
