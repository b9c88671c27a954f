//! The transaction protocol shared by every bucket and table operation.
//!
//! Public operations come in two flavours: a simple one (`get`, `save`, ...)
//! and a transaction-explicit one (`get_in`, `save_in`, ...) that receives a
//! manager. The simple flavour calls the explicit one with the root manager, so
//! each operation is written exactly once.
//!
//! - A root manager ([`crate::databases::redb::Store`] or
//!   [`crate::database::Database`]) creates a fresh [`Transaction`] for every
//!   call and finalises it: commit on `Ok`, discard on `Err` or unwinding.
//! - A [`NestedManager`] borrows a transaction owned by someone else. Its
//!   `view`/`update` run the closure against that same transaction and never
//!   finalise it.
//!
//! `view_with_nested`/`update_with_nested` hand the closure a [`NestedManager`]
//! instead of a bare transaction, so a multi-bucket operation can pass it down to
//! every sub-step and have them all land in one transaction:
//!
//! ```rust,ignore
//! table.save_in(&db, &mut book)?; // owns its transaction
//!
//! db.update_with_nested(|nested| {
//!     let first = table.save_in(nested, &mut a)?; // shares the outer one
//!     let second = table.save_in(nested, &mut b)?;
//!     Ok((first, second))
//! })?;
//! ```

use crate::errors::DbResult;
use crate::transaction::{NestedManager, Transaction};

pub trait TransactionManager {
    /// Run `f` against a read-only (or ambient) transaction.
    fn view<R, F>(&self, f: F) -> DbResult<R>
    where
        F: FnOnce(&Transaction) -> DbResult<R>;

    /// Run `f` against a read/write transaction.
    fn update<R, F>(&self, f: F) -> DbResult<R>
    where
        F: FnOnce(&Transaction) -> DbResult<R>;

    fn view_with_nested<R, F>(&self, f: F) -> DbResult<R>
    where
        F: FnOnce(&NestedManager<'_>) -> DbResult<R>;

    fn update_with_nested<R, F>(&self, f: F) -> DbResult<R>
    where
        F: FnOnce(&NestedManager<'_>) -> DbResult<R>;
}

impl<T: TransactionManager> TransactionManager for &T {
    fn view<R, F>(&self, f: F) -> DbResult<R>
    where
        F: FnOnce(&Transaction) -> DbResult<R>,
    {
        (**self).view(f)
    }

    fn update<R, F>(&self, f: F) -> DbResult<R>
    where
        F: FnOnce(&Transaction) -> DbResult<R>,
    {
        (**self).update(f)
    }

    fn view_with_nested<R, F>(&self, f: F) -> DbResult<R>
    where
        F: FnOnce(&NestedManager<'_>) -> DbResult<R>,
    {
        (**self).view_with_nested(f)
    }

    fn update_with_nested<R, F>(&self, f: F) -> DbResult<R>
    where
        F: FnOnce(&NestedManager<'_>) -> DbResult<R>,
    {
        (**self).update_with_nested(f)
    }
}
