//! Transactions over the flat key-space.
//!
//! A [`Transaction`] wraps either a redb read or write transaction and exposes
//! the raw byte operations every bucket is built on. It is finalised exactly
//! once: the first `commit` or `discard` wins and later calls are no-ops.
//! Dropping an open transaction discards it.

use std::ops::Deref;

use log::{trace, warn};
use redb::{ReadableTable, StorageError};
use strum::Display;

use crate::databases::redb::DATA_TABLE;
use crate::databases::redb::keyspace::ScanRange;
use crate::errors::{DbError, DbResult};
use crate::traits::TransactionManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum TxnState {
    Open,
    Committed,
    Discarded,
}

enum Handle {
    Read(redb::ReadTransaction),
    Write(redb::WriteTransaction),
}

/// One entry returned by [`Transaction::scan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    pub key: Vec<u8>,
    /// `None` when the scan was key-only.
    pub value: Option<Vec<u8>>,
}

pub struct Transaction {
    handle: Option<Handle>,
    writable: bool,
    state: TxnState,
    serial: u64,
    error: Option<String>,
}

impl Transaction {
    pub(crate) fn read(txn: redb::ReadTransaction, serial: u64) -> Self {
        Self {
            handle: Some(Handle::Read(txn)),
            writable: false,
            state: TxnState::Open,
            serial,
            error: None,
        }
    }

    pub(crate) fn write(txn: redb::WriteTransaction, serial: u64) -> Self {
        Self {
            handle: Some(Handle::Write(txn)),
            writable: true,
            state: TxnState::Open,
            serial,
            error: None,
        }
    }

    pub fn is_writable(&self) -> bool {
        self.writable
    }

    pub fn state(&self) -> TxnState {
        self.state
    }

    /// Process-unique number identifying this transaction.
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// Message of the failure that ended the transaction, if any.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    fn handle(&self) -> DbResult<&Handle> {
        match (&self.handle, self.state) {
            (Some(handle), TxnState::Open) => Ok(handle),
            _ => Err(DbError::TransactionClosed),
        }
    }

    fn write_handle(&self) -> DbResult<&redb::WriteTransaction> {
        match self.handle()? {
            Handle::Write(txn) => Ok(txn),
            Handle::Read(_) => Err(DbError::NotWritable),
        }
    }

    pub fn get(&self, key: &[u8]) -> DbResult<Option<Vec<u8>>> {
        let value = match self.handle()? {
            Handle::Read(txn) => txn.open_table(DATA_TABLE)?.get(key)?.map(|v| v.value().to_vec()),
            Handle::Write(txn) => txn.open_table(DATA_TABLE)?.get(key)?.map(|v| v.value().to_vec()),
        };
        Ok(value)
    }

    pub fn contains(&self, key: &[u8]) -> DbResult<bool> {
        Ok(self.get(key)?.is_some())
    }

    pub fn set(&self, key: &[u8], value: &[u8]) -> DbResult<()> {
        let mut table = self.write_handle()?.open_table(DATA_TABLE)?;
        table.insert(key, value)?;
        Ok(())
    }

    /// Remove `key`. Removing an absent key is not an error.
    pub fn delete(&self, key: &[u8]) -> DbResult<()> {
        let mut table = self.write_handle()?.open_table(DATA_TABLE)?;
        table.remove(key)?;
        Ok(())
    }

    /// Up to `limit` entries of `range`, in ascending key order or descending
    /// when `reverse` is set. Values are only copied when `with_values` is set.
    pub(crate) fn scan(
        &self,
        range: &ScanRange,
        reverse: bool,
        limit: usize,
        with_values: bool,
    ) -> DbResult<Vec<RawEntry>> {
        let handle = self.handle()?;
        if range.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        match handle {
            Handle::Read(txn) => {
                let table = txn.open_table(DATA_TABLE)?;
                collect(&table, range, reverse, limit, with_values)
            }
            Handle::Write(txn) => {
                let table = txn.open_table(DATA_TABLE)?;
                collect(&table, range, reverse, limit, with_values)
            }
        }
    }

    /// Make every write durable. Committing a read-only transaction just
    /// releases its snapshot.
    pub fn commit(&mut self) -> DbResult<()> {
        if self.state != TxnState::Open {
            return Ok(());
        }
        match self.handle.take() {
            Some(Handle::Write(txn)) => match txn.commit() {
                Ok(()) => {
                    self.state = TxnState::Committed;
                    trace!("Committed transaction #{}", self.serial);
                    Ok(())
                }
                Err(err) => {
                    warn!("Commit of transaction #{} failed: {}", self.serial, err);
                    self.state = TxnState::Discarded;
                    self.error = Some(err.to_string());
                    Err(err.into())
                }
            },
            Some(Handle::Read(txn)) => {
                drop(txn);
                self.state = TxnState::Discarded;
                trace!("Released read transaction #{}", self.serial);
                Ok(())
            }
            None => {
                self.state = TxnState::Discarded;
                Ok(())
            }
        }
    }

    /// Throw away every write. Safe to call at any time, including after a
    /// commit, in which case it does nothing.
    pub fn discard(&mut self) {
        if self.state != TxnState::Open {
            return;
        }
        self.state = TxnState::Discarded;
        match self.handle.take() {
            Some(Handle::Write(txn)) => {
                if let Err(err) = txn.abort() {
                    warn!("Abort of transaction #{} failed: {}", self.serial, err);
                    self.error = Some(err.to_string());
                }
                trace!("Discarded transaction #{}", self.serial);
            }
            Some(Handle::Read(_)) | None => {
                trace!("Released read transaction #{}", self.serial);
            }
        }
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        self.discard();
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transaction")
            .field("serial", &self.serial)
            .field("writable", &self.writable)
            .field("state", &self.state)
            .finish()
    }
}

fn collect<T>(
    table: &T,
    range: &ScanRange,
    reverse: bool,
    limit: usize,
    with_values: bool,
) -> DbResult<Vec<RawEntry>>
where
    T: ReadableTable<&'static [u8], &'static [u8]>,
{
    let entries = table.range::<&[u8]>(range.as_ref_bounds())?;
    let entries: Box<dyn Iterator<Item = Result<_, StorageError>> + '_> = if reverse {
        Box::new(entries.rev())
    } else {
        Box::new(entries)
    };

    let mut out = Vec::new();
    for entry in entries.take(limit) {
        let (key, value) = entry?;
        out.push(RawEntry {
            key: key.value().to_vec(),
            value: with_values.then(|| value.value().to_vec()),
        });
    }
    Ok(out)
}

/// Manager for an operation running inside someone else's transaction.
///
/// `view` and `update` hand out the borrowed transaction and never finalise
/// it; the owner decides whether everything done through it commits.
#[derive(Debug, Clone, Copy)]
pub struct NestedManager<'t> {
    txn: &'t Transaction,
}

impl<'t> NestedManager<'t> {
    pub fn new(txn: &'t Transaction) -> Self {
        Self { txn }
    }

    pub fn transaction(&self) -> &'t Transaction {
        self.txn
    }
}

impl TransactionManager for NestedManager<'_> {
    fn view<R, F>(&self, f: F) -> DbResult<R>
    where
        F: FnOnce(&Transaction) -> DbResult<R>,
    {
        f(self.txn)
    }

    fn update<R, F>(&self, f: F) -> DbResult<R>
    where
        F: FnOnce(&Transaction) -> DbResult<R>,
    {
        if !self.txn.is_writable() {
            return Err(DbError::NotWritable);
        }
        f(self.txn)
    }

    fn view_with_nested<R, F>(&self, f: F) -> DbResult<R>
    where
        F: FnOnce(&NestedManager<'_>) -> DbResult<R>,
    {
        f(self)
    }

    fn update_with_nested<R, F>(&self, f: F) -> DbResult<R>
    where
        F: FnOnce(&NestedManager<'_>) -> DbResult<R>,
    {
        if !self.txn.is_writable() {
            return Err(DbError::NotWritable);
        }
        f(self)
    }
}

/// A transaction an iterator either owns or borrows.
///
/// Owned transactions are released when the iterator is closed or dropped.
#[derive(Debug)]
pub enum TxnRef<'t> {
    Owned(Transaction),
    Borrowed(&'t Transaction),
}

impl TxnRef<'_> {
    /// Release an owned transaction; a borrowed one is left alone.
    pub fn release(&mut self) {
        if let TxnRef::Owned(txn) = self {
            txn.discard();
        }
    }
}

impl Deref for TxnRef<'_> {
    type Target = Transaction;

    fn deref(&self) -> &Transaction {
        match self {
            TxnRef::Owned(txn) => txn,
            TxnRef::Borrowed(txn) => txn,
        }
    }
}
