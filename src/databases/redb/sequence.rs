//! Monotonic id generation with batched leases.
//!
//! A sequence keeps its persistent counter at [`sequence_key`]. Instead of
//! touching that record on every id, it leases `bandwidth` ids at a time: the
//! counter is bumped to the end of the lease and ids are then handed out from
//! memory. The lease is written through the caller's own write transaction, so
//! an id is only ever handed out from a lease that commits together with the
//! record that uses it. If that transaction is rolled back the lease record is
//! rolled back too, and the next transaction that asks for an id writes it again.

use std::sync::{Mutex, MutexGuard, PoisonError};

use log::debug;

use super::keyspace::sequence_key;
use crate::errors::{DbError, DbResult};
use crate::traits::Codec;
use crate::transaction::Transaction;

#[derive(Debug, Default)]
struct LeaseState {
    next: u64,
    leased_until: u64,
    /// Serial of the transaction that last wrote `leased_until`.
    written_by: Option<u64>,
}

#[derive(Debug)]
pub struct Sequence {
    name: String,
    key: Vec<u8>,
    bandwidth: u64,
    state: Mutex<LeaseState>,
}

impl Sequence {
    pub(crate) fn new(name: &str, bandwidth: u64) -> Self {
        Self {
            name: name.to_string(),
            key: sequence_key(name),
            bandwidth: bandwidth.max(1),
            state: Mutex::new(LeaseState::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn lock(&self) -> MutexGuard<'_, LeaseState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hand out the next id. Ids start at 1 and strictly increase for the
    /// lifetime of the database file.
    pub fn next(&self, txn: &Transaction) -> DbResult<u64> {
        if !txn.is_writable() {
            return Err(DbError::NotWritable);
        }
        let mut state = self.lock();

        if state.next >= state.leased_until {
            let stored = match txn.get(&self.key)? {
                Some(bytes) => u64::decode(&bytes)?,
                None => 1,
            };
            state.next = state.next.max(stored);
            state.leased_until = state.next + self.bandwidth;
            txn.set(&self.key, &state.leased_until.encode()?)?;
            state.written_by = Some(txn.serial());
            debug!(
                "Sequence {:?} leased ids {}..{}",
                self.name, state.next, state.leased_until
            );
        } else if state.written_by != Some(txn.serial()) {
            txn.set(&self.key, &state.leased_until.encode()?)?;
            state.written_by = Some(txn.serial());
        }

        let id = state.next;
        state.next += 1;
        Ok(id)
    }

    /// Give the unused part of the current lease back, so a reopened database
    /// continues right after the last id handed out.
    pub fn release(&self, txn: &Transaction) -> DbResult<()> {
        let mut state = self.lock();
        if state.leased_until > state.next {
            txn.set(&self.key, &state.next.encode()?)?;
            debug!("Sequence {:?} released at {}", self.name, state.next);
        }
        state.leased_until = state.next;
        state.written_by = None;
        Ok(())
    }
}
