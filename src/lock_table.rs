//! The process-wide lock table: `BlockId -> i32`, where 0/absent is
//! unlocked, positive counts shared holders, and -1 marks the single
//! exclusive holder. One mutex/condvar guards the whole table; every
//! transaction's `ConcurrencyManager` holds a shared handle to it rather
//! than reaching for a true global singleton.

use std::collections::HashMap;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use log::warn;

use crate::block_id::BlockId;
use crate::error::{DbError, DbResult};

const MAX_WAIT: Duration = Duration::from_secs(10);

struct TableState {
    locks: HashMap<BlockId, i32>,
}

impl TableState {
    fn value(&self, block: &BlockId) -> i32 {
        *self.locks.get(block).unwrap_or(&0)
    }

    fn has_xlock(&self, block: &BlockId) -> bool {
        self.value(block) < 0
    }

    fn has_other_slocks(&self, block: &BlockId) -> bool {
        self.value(block) > 1
    }
}

pub struct LockTable {
    state: Mutex<TableState>,
    cv: Condvar,
    max_wait: Duration,
}

impl Default for LockTable {
    fn default() -> Self {
        Self::new()
    }
}

impl LockTable {
    pub fn new() -> Self {
        Self::with_timeout(MAX_WAIT)
    }

    pub fn with_timeout(max_wait: Duration) -> Self {
        LockTable {
            state: Mutex::new(TableState {
                locks: HashMap::new(),
            }),
            cv: Condvar::new(),
            max_wait,
        }
    }

    /// Waits while an exclusive lock is held, then registers one more
    /// shared holder.
    pub fn slock(&self, block: &BlockId) -> DbResult<()> {
        let mut state = self.state.lock().expect("lock table mutex poisoned");
        let deadline = Instant::now() + self.max_wait;

        while state.has_xlock(block) {
            let now = Instant::now();
            if now >= deadline {
                warn!("slock({block}) timed out");
                return Err(DbError::LockAbort);
            }
            let (guard, _) = self
                .cv
                .wait_timeout(state, deadline - now)
                .expect("lock table mutex poisoned");
            state = guard;
        }

        let val = state.value(block);
        state.locks.insert(block.clone(), val + 1);
        Ok(())
    }

    /// Precondition: the caller already holds S on `block`. Waits while any
    /// other shared holder remains, then takes exclusive ownership.
    pub fn xlock(&self, block: &BlockId) -> DbResult<()> {
        let mut state = self.state.lock().expect("lock table mutex poisoned");
        let deadline = Instant::now() + self.max_wait;

        while state.has_other_slocks(block) {
            let now = Instant::now();
            if now >= deadline {
                warn!("xlock({block}) timed out");
                return Err(DbError::LockAbort);
            }
            let (guard, _) = self
                .cv
                .wait_timeout(state, deadline - now)
                .expect("lock table mutex poisoned");
            state = guard;
        }

        state.locks.insert(block.clone(), -1);
        Ok(())
    }

    /// If this was the last holder, remove the entry and wake every waiter;
    /// otherwise just decrement the shared count.
    pub fn unlock(&self, block: &BlockId) {
        let mut state = self.state.lock().expect("lock table mutex poisoned");
        let val = state.value(block);
        if val > 1 {
            state.locks.insert(block.clone(), val - 1);
        } else {
            state.locks.remove(block);
            self.cv.notify_all();
        }
    }
}
