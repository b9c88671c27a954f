//! Timestamp type used for time-valued fields and index keys.
//!
//! `DbDateTime` is plain `chrono::DateTime<Utc>`. Its [`crate::traits::Codec`]
//! encoding is fixed-width and order preserving, so a time-valued index
//! iterates in chronological order:
//!
//! ```rust,ignore
//! #[derive(serde::Serialize, serde::Deserialize)]
//! struct Book {
//!     published: DbDateTime,
//! }
//! ```

use chrono::{DateTime, Utc};

pub type DbDateTime = DateTime<Utc>;

/// Helper trait for parsing `DbDateTime` values
pub trait DbDateTimeExt: Sized {
    /// Parse an RFC 3339 timestamp (e.g. `"1623-01-01T10:00:00Z"`) into UTC.
    fn parse_rfc3339(s: &str) -> Result<Self, chrono::ParseError>;
}

impl DbDateTimeExt for DateTime<Utc> {
    fn parse_rfc3339(s: &str) -> Result<Self, chrono::ParseError> {
        DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
    }
}

// Re-export chrono for convenience
pub use chrono;
