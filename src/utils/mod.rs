//! Small helpers shared by the rest of the crate.

pub mod datetime;

// Re-export commonly used items
pub use datetime::{DbDateTime, DbDateTimeExt, chrono};
