//! Per-transaction recovery manager: writes the START/COMMIT/ROLLBACK/SETxxx
//! records that back undo-only recovery, and drives both transaction
//! rollback and whole-database crash recovery by scanning the log.

use std::sync::Arc;

use crate::buffer_pool::BufferPool;
use crate::error::DbResult;
use crate::log_mgr::LogMgr;
use crate::log_record::{LogOp, LogRecord};
use crate::transaction::Transaction;

/// Cheap to clone: every field is a shared handle or a plain integer. A
/// transaction clones its own recovery manager before calling
/// `rollback`/`recover`, since those methods need `&mut Transaction` and a
/// transaction already holds its recovery manager by value.
#[derive(Clone)]
pub struct RecoveryManager {
    log_mgr: Arc<LogMgr>,
    buffer_pool: Arc<BufferPool>,
    txnum: i32,
}

impl RecoveryManager {
    /// Writes this transaction's START record immediately.
    pub fn new(log_mgr: Arc<LogMgr>, buffer_pool: Arc<BufferPool>, txnum: i32) -> DbResult<Self> {
        LogRecord::write_start(&log_mgr, txnum)?;
        Ok(RecoveryManager { log_mgr, buffer_pool, txnum })
    }

    /// Flushes every buffer this transaction dirtied, then writes and
    /// flushes a COMMIT record.
    pub fn commit(&self) -> DbResult<()> {
        self.buffer_pool.flush_all(self.txnum)?;
        let lsn = LogRecord::write_commit(&self.log_mgr, self.txnum)?;
        self.log_mgr.flush(lsn)
    }

    /// Undoes every change this transaction made, flushes the resulting
    /// buffers, then writes and flushes a ROLLBACK record.
    pub fn rollback(&self, tx: &mut Transaction) -> DbResult<()> {
        self.do_rollback(tx)?;
        self.buffer_pool.flush_all(self.txnum)?;
        let lsn = LogRecord::write_rollback(&self.log_mgr, self.txnum)?;
        self.log_mgr.flush(lsn)
    }

    /// Undoes every incomplete transaction found in the log, flushes the
    /// resulting buffers, then writes a quiescent CHECKPOINT record.
    /// Called once at startup, before any user transaction begins.
    pub fn recover(&self, tx: &mut Transaction) -> DbResult<()> {
        self.do_recover(tx)?;
        self.buffer_pool.flush_all(self.txnum)?;
        let lsn = LogRecord::write_checkpoint(&self.log_mgr)?;
        self.log_mgr.flush(lsn)
    }

    /// Logs the value the frame at `idx` currently holds at `offset` (the
    /// value about to be overwritten), returning the LSN of that record.
    pub fn set_int(&self, idx: usize, offset: usize) -> DbResult<u64> {
        let old_value = self.buffer_pool.get_int(idx, offset)?;
        let block = self.buffer_pool.block_of(idx).expect("frame must be bound to a block");
        LogRecord::write_set_int(&self.log_mgr, self.txnum, &block, offset, old_value)
    }

    /// Logs the value the frame at `idx` currently holds at `offset`,
    /// returning the LSN of that record.
    pub fn set_string(&self, idx: usize, offset: usize) -> DbResult<u64> {
        let old_value = self.buffer_pool.get_string(idx, offset)?;
        let block = self.buffer_pool.block_of(idx).expect("frame must be bound to a block");
        LogRecord::write_set_string(&self.log_mgr, self.txnum, &block, offset, &old_value)
    }

    /// Scans the log newest-first, undoing every record belonging to this
    /// transaction, stopping at its START record.
    fn do_rollback(&self, tx: &mut Transaction) -> DbResult<()> {
        for raw in self.log_mgr.iter()? {
            let record = LogRecord::parse(&raw?)?;
            if record.tx_number() == self.txnum {
                if record.op() == LogOp::Start {
                    return Ok(());
                }
                record.undo(tx)?;
            }
        }
        Ok(())
    }

    /// Scans the log newest-first, undoing every record for a transaction
    /// that has not yet committed or rolled back, stopping at a CHECKPOINT
    /// record (or the end of the log, if none was ever written).
    fn do_recover(&self, tx: &mut Transaction) -> DbResult<()> {
        let mut finished_txs = Vec::new();
        for raw in self.log_mgr.iter()? {
            let record = LogRecord::parse(&raw?)?;
            match record.op() {
                LogOp::Checkpoint => return Ok(()),
                LogOp::Commit | LogOp::Rollback => finished_txs.push(record.tx_number()),
                _ => {
                    if !finished_txs.contains(&record.tx_number()) {
                        record.undo(tx)?;
                    }
                }
            }
        }
        Ok(())
    }
}
