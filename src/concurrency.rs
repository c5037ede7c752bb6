//! Per-transaction concurrency manager. Each `Transaction` owns one of
//! these; it tracks which locks *this* transaction already holds so that
//! repeated requests for the same block are no-ops, and releases every
//! held lock on commit/rollback. Actual blocking happens in the shared
//! `LockTable`.

use std::collections::HashMap;
use std::sync::Arc;

use crate::block_id::BlockId;
use crate::error::DbResult;
use crate::lock_table::LockTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LockType {
    Shared,
    Exclusive,
}

pub struct ConcurrencyManager {
    lock_table: Arc<LockTable>,
    locks: HashMap<BlockId, LockType>,
}

impl ConcurrencyManager {
    pub fn new(lock_table: Arc<LockTable>) -> Self {
        ConcurrencyManager {
            lock_table,
            locks: HashMap::new(),
        }
    }

    /// Obtains a shared lock on `block`, unless this transaction already
    /// holds shared or exclusive access to it.
    pub fn slock(&mut self, block: &BlockId) -> DbResult<()> {
        if self.locks.contains_key(block) {
            return Ok(());
        }
        self.lock_table.slock(block)?;
        self.locks.insert(block.clone(), LockType::Shared);
        Ok(())
    }

    /// Obtains an exclusive lock on `block`, upgrading from shared if
    /// necessary. Unless this transaction already holds exclusive access,
    /// first ensures shared access (the lock table only allows upgrading
    /// from a lock it granted).
    pub fn xlock(&mut self, block: &BlockId) -> DbResult<()> {
        if self.has_xlock(block) {
            return Ok(());
        }
        self.slock(block)?;
        self.lock_table.xlock(block)?;
        self.locks.insert(block.clone(), LockType::Exclusive);
        Ok(())
    }

    /// Releases every lock this transaction holds.
    pub fn release(&mut self) {
        for block in self.locks.keys() {
            self.lock_table.unlock(block);
        }
        self.locks.clear();
    }

    fn has_xlock(&self, block: &BlockId) -> bool {
        matches!(self.locks.get(block), Some(LockType::Exclusive))
    }
}
