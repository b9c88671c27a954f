//! Storage engines.
//!
//! Only redb is wired in; everything above this module talks to it through
//! [`crate::transaction::Transaction`].

pub mod redb;
