//! The client-facing transaction handle: composes the lock table,
//! buffer pool, and recovery manager into the ACID operations client code
//! actually calls (pin/unpin, get/set, commit/rollback/recover).

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

use crate::block_id::BlockId;
use crate::buffer::NO_LSN;
use crate::buffer_pool::BufferPool;
use crate::concurrency::ConcurrencyManager;
use crate::error::{DbError, DbResult};
use crate::file_mgr::FileMgr;
use crate::lock_table::LockTable;
use crate::log_mgr::LogMgr;
use crate::recovery::RecoveryManager;

static NEXT_TXNUM: AtomicI32 = AtomicI32::new(0);

/// A transaction is owned by exactly one thread for its lifetime, but
/// record pages and table scans on that thread need to share mutable
/// access to it; `SharedTx` is the handle they pass around.
pub type SharedTx = Rc<RefCell<Transaction>>;

fn next_tx_number() -> i32 {
    NEXT_TXNUM.fetch_add(1, Ordering::SeqCst) + 1
}

/// Tracks the buffer-pool frames this transaction currently has pinned,
/// keyed by block so repeated pins of the same block are cheap and a
/// block is only released from the pool once every pin on it has been
/// dropped.
struct BufferList {
    buffer_pool: Arc<BufferPool>,
    frames: HashMap<BlockId, usize>,
    pins: Vec<BlockId>,
}

impl BufferList {
    fn new(buffer_pool: Arc<BufferPool>) -> Self {
        BufferList {
            buffer_pool,
            frames: HashMap::new(),
            pins: Vec::new(),
        }
    }

    fn frame_idx(&self, block: &BlockId) -> Option<usize> {
        self.frames.get(block).copied()
    }

    fn pin(&mut self, block: &BlockId) -> DbResult<()> {
        let idx = self.buffer_pool.pin(block)?;
        self.frames.insert(block.clone(), idx);
        self.pins.push(block.clone());
        Ok(())
    }

    fn unpin(&mut self, block: &BlockId) {
        if let Some(&idx) = self.frames.get(block) {
            self.buffer_pool.unpin(idx);
            if let Some(pos) = self.pins.iter().position(|b| b == block) {
                self.pins.remove(pos);
            }
            if !self.pins.contains(block) {
                self.frames.remove(block);
            }
        }
    }

    fn unpin_all(&mut self) {
        for block in &self.pins {
            if let Some(&idx) = self.frames.get(block) {
                self.buffer_pool.unpin(idx);
            }
        }
        self.frames.clear();
        self.pins.clear();
    }
}

pub struct Transaction {
    file_mgr: Arc<FileMgr>,
    buffer_pool: Arc<BufferPool>,
    recovery_mgr: RecoveryManager,
    concurrency_mgr: ConcurrencyManager,
    buffers: BufferList,
    txnum: i32,
}

impl Transaction {
    pub fn new(
        file_mgr: Arc<FileMgr>,
        log_mgr: Arc<LogMgr>,
        buffer_pool: Arc<BufferPool>,
        lock_table: Arc<LockTable>,
    ) -> DbResult<Self> {
        let txnum = next_tx_number();
        let recovery_mgr = RecoveryManager::new(log_mgr, Arc::clone(&buffer_pool), txnum)?;
        let concurrency_mgr = ConcurrencyManager::new(lock_table);
        let buffers = BufferList::new(Arc::clone(&buffer_pool));

        Ok(Transaction {
            file_mgr,
            buffer_pool,
            recovery_mgr,
            concurrency_mgr,
            buffers,
            txnum,
        })
    }

    pub fn txnum(&self) -> i32 {
        self.txnum
    }

    /// Flushes every buffer this transaction dirtied, writes and flushes a
    /// COMMIT record, releases every lock, and unpins all buffers.
    pub fn commit(&mut self) -> DbResult<()> {
        self.recovery_mgr.commit()?;
        self.concurrency_mgr.release();
        self.buffers.unpin_all();
        Ok(())
    }

    /// Undoes every change this transaction made, writes and flushes a
    /// ROLLBACK record, releases every lock, and unpins all buffers.
    pub fn rollback(&mut self) -> DbResult<()> {
        let recovery_mgr = self.recovery_mgr.clone();
        recovery_mgr.rollback(self)?;
        self.concurrency_mgr.release();
        self.buffers.unpin_all();
        Ok(())
    }

    /// Runs whole-database recovery: undoes every uncommitted transaction
    /// found in the log and writes a quiescent checkpoint. Called once at
    /// startup before any user transaction begins.
    pub fn recover(&mut self) -> DbResult<()> {
        self.buffer_pool.flush_all(self.txnum)?;
        let recovery_mgr = self.recovery_mgr.clone();
        recovery_mgr.recover(self)?;
        self.concurrency_mgr.release();
        self.buffers.unpin_all();
        Ok(())
    }

    pub fn pin(&mut self, block: &BlockId) -> DbResult<()> {
        self.buffers.pin(block)
    }

    pub fn unpin(&mut self, block: &BlockId) {
        self.buffers.unpin(block);
    }

    fn frame_idx(&self, block: &BlockId) -> DbResult<usize> {
        self.buffers
            .frame_idx(block)
            .ok_or_else(|| DbError::NotPinned(block.clone()))
    }

    /// Obtains an S-lock on `block`, then reads the integer at `offset`.
    pub fn get_int(&mut self, block: &BlockId, offset: usize) -> DbResult<i32> {
        self.concurrency_mgr.slock(block)?;
        let idx = self.frame_idx(block)?;
        self.buffer_pool.get_int(idx, offset)
    }

    /// Obtains an S-lock on `block`, then reads the string at `offset`.
    pub fn get_string(&mut self, block: &BlockId, offset: usize) -> DbResult<String> {
        self.concurrency_mgr.slock(block)?;
        let idx = self.frame_idx(block)?;
        self.buffer_pool.get_string(idx, offset)
    }

    /// Obtains an X-lock on `block`, optionally logs the value being
    /// overwritten, then stores `value` at `offset`.
    pub fn set_int(&mut self, block: &BlockId, offset: usize, value: i32, ok_to_log: bool) -> DbResult<()> {
        self.concurrency_mgr.xlock(block)?;
        let idx = self.frame_idx(block)?;
        let lsn = if ok_to_log {
            self.recovery_mgr.set_int(idx, offset)? as i64
        } else {
            NO_LSN
        };
        self.buffer_pool.set_int(idx, offset, value)?;
        self.buffer_pool.set_modified(idx, self.txnum, lsn);
        Ok(())
    }

    /// Obtains an X-lock on `block`, optionally logs the value being
    /// overwritten, then stores `value` at `offset`.
    pub fn set_string(&mut self, block: &BlockId, offset: usize, value: &str, ok_to_log: bool) -> DbResult<()> {
        self.concurrency_mgr.xlock(block)?;
        let idx = self.frame_idx(block)?;
        let lsn = if ok_to_log {
            self.recovery_mgr.set_string(idx, offset)? as i64
        } else {
            NO_LSN
        };
        self.buffer_pool.set_string(idx, offset, value)?;
        self.buffer_pool.set_modified(idx, self.txnum, lsn);
        Ok(())
    }

    /// Obtains an S-lock on the dummy "end of file" block, then returns the
    /// file's current length in blocks.
    pub fn size(&mut self, filename: &str) -> DbResult<i32> {
        let dummy = BlockId::eof(filename);
        self.concurrency_mgr.slock(&dummy)?;
        self.file_mgr.length(filename)
    }

    /// Obtains an X-lock on the dummy "end of file" block, then appends a
    /// new block.
    pub fn append(&mut self, filename: &str) -> DbResult<BlockId> {
        let dummy = BlockId::eof(filename);
        self.concurrency_mgr.xlock(&dummy)?;
        self.file_mgr.append(filename)
    }

    pub fn block_size(&self) -> usize {
        self.file_mgr.block_size()
    }

    pub fn available_buffers(&self) -> usize {
        self.buffer_pool.available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn new_tx(
        fm: &Arc<FileMgr>,
        lm: &Arc<LogMgr>,
        bp: &Arc<BufferPool>,
        lt: &Arc<LockTable>,
    ) -> Transaction {
        Transaction::new(Arc::clone(fm), Arc::clone(lm), Arc::clone(bp), Arc::clone(lt)).unwrap()
    }

    #[test]
    fn committed_writes_survive_and_uncommitted_writes_roll_back() {
        let dir = tempdir().unwrap();
        let fm = Arc::new(FileMgr::new(dir.path(), 400).unwrap());
        let lm = Arc::new(LogMgr::new(Arc::clone(&fm), "simpledb.log").unwrap());
        let bp = Arc::new(BufferPool::new(Arc::clone(&fm), Arc::clone(&lm), 8));
        let lt = Arc::new(LockTable::new());
        let block = BlockId::new("testfile", 1);

        let mut tx1 = new_tx(&fm, &lm, &bp, &lt);
        tx1.pin(&block).unwrap();
        tx1.set_int(&block, 80, 1, false).unwrap();
        tx1.set_string(&block, 40, "one", false).unwrap();
        tx1.commit().unwrap();

        let mut tx2 = new_tx(&fm, &lm, &bp, &lt);
        tx2.pin(&block).unwrap();
        assert_eq!(tx2.get_int(&block, 80).unwrap(), 1);
        assert_eq!(tx2.get_string(&block, 40).unwrap(), "one");
        tx2.set_int(&block, 80, 2, true).unwrap();
        tx2.commit().unwrap();

        let mut tx3 = new_tx(&fm, &lm, &bp, &lt);
        tx3.pin(&block).unwrap();
        assert_eq!(tx3.get_int(&block, 80).unwrap(), 2);
        tx3.set_int(&block, 80, 9999, true).unwrap();
        tx3.rollback().unwrap();

        let mut tx4 = new_tx(&fm, &lm, &bp, &lt);
        tx4.pin(&block).unwrap();
        assert_eq!(tx4.get_int(&block, 80).unwrap(), 2);
        tx4.commit().unwrap();
    }

    #[test]
    fn append_and_size_agree_on_block_count() {
        let dir = tempdir().unwrap();
        let fm = Arc::new(FileMgr::new(dir.path(), 400).unwrap());
        let lm = Arc::new(LogMgr::new(Arc::clone(&fm), "simpledb.log").unwrap());
        let bp = Arc::new(BufferPool::new(Arc::clone(&fm), Arc::clone(&lm), 8));
        let lt = Arc::new(LockTable::new());

        let mut tx = new_tx(&fm, &lm, &bp, &lt);
        assert_eq!(tx.size("testfile").unwrap(), 0);
        tx.append("testfile").unwrap();
        tx.append("testfile").unwrap();
        assert_eq!(tx.size("testfile").unwrap(), 2);
        tx.commit().unwrap();
    }
}
