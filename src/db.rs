//! Ties the file manager, log manager, and buffer pool together behind one
//! constructor, and runs the startup recovery pass before any caller opens
//! a transaction. Every test in this crate wires these three managers up
//! by hand in this same order; `SimpleDb` exists so production callers
//! don't have to.

use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;

use log::info;

use crate::buffer_pool::BufferPool;
use crate::error::DbResult;
use crate::file_mgr::FileMgr;
use crate::lock_table::LockTable;
use crate::log_mgr::LogMgr;
use crate::transaction::{SharedTx, Transaction};

const DEFAULT_LOG_FILE: &str = "simpledb.log";

/// Constructor-time configuration, fixed for the lifetime of the
/// database: where it lives on disk, how big a block is, and how many
/// buffer frames the pool holds.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub db_directory: PathBuf,
    pub block_size: usize,
    pub num_buffers: usize,
    pub log_file: String,
}

impl DbConfig {
    pub fn new(db_directory: impl Into<PathBuf>, block_size: usize, num_buffers: usize) -> Self {
        DbConfig {
            db_directory: db_directory.into(),
            block_size,
            num_buffers,
            log_file: DEFAULT_LOG_FILE.to_string(),
        }
    }

    pub fn with_log_file(mut self, log_file: impl Into<String>) -> Self {
        self.log_file = log_file.into();
        self
    }
}

pub struct SimpleDb {
    file_mgr: Arc<FileMgr>,
    log_mgr: Arc<LogMgr>,
    buffer_pool: Arc<BufferPool>,
    lock_table: Arc<LockTable>,
}

impl SimpleDb {
    /// Opens (or creates) the database directory, then runs recovery: any
    /// transaction left uncommitted by a prior crash is undone before this
    /// call returns, so every later `new_tx` starts from a consistent
    /// state.
    pub fn new(config: DbConfig) -> DbResult<Self> {
        let file_mgr = Arc::new(FileMgr::new(config.db_directory, config.block_size)?);
        let log_mgr = Arc::new(LogMgr::new(Arc::clone(&file_mgr), config.log_file)?);
        let buffer_pool = Arc::new(BufferPool::new(
            Arc::clone(&file_mgr),
            Arc::clone(&log_mgr),
            config.num_buffers,
        ));
        let lock_table = Arc::new(LockTable::new());

        let db = SimpleDb { file_mgr, log_mgr, buffer_pool, lock_table };

        info!("running startup recovery");
        let recovery_tx = db.new_tx()?;
        recovery_tx.borrow_mut().recover()?;

        Ok(db)
    }

    /// Opens a new transaction against this database's managers.
    pub fn new_tx(&self) -> DbResult<SharedTx> {
        let tx = Transaction::new(
            Arc::clone(&self.file_mgr),
            Arc::clone(&self.log_mgr),
            Arc::clone(&self.buffer_pool),
            Arc::clone(&self.lock_table),
        )?;
        Ok(Rc::new(RefCell::new(tx)))
    }

    pub fn file_mgr(&self) -> &Arc<FileMgr> {
        &self.file_mgr
    }

    pub fn log_mgr(&self) -> &Arc<LogMgr> {
        &self.log_mgr
    }

    pub fn buffer_pool(&self) -> &Arc<BufferPool> {
        &self.buffer_pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn new_tx_shares_the_same_backing_managers() {
        let dir = tempdir().unwrap();
        let db = SimpleDb::new(DbConfig::new(dir.path(), 400, 8)).unwrap();

        let tx1 = db.new_tx().unwrap();
        let block = tx1.borrow_mut().append("testfile").unwrap();
        tx1.borrow_mut().pin(&block).unwrap();
        tx1.borrow_mut().set_int(&block, 0, 42, true).unwrap();
        tx1.borrow_mut().commit().unwrap();

        let tx2 = db.new_tx().unwrap();
        tx2.borrow_mut().pin(&block).unwrap();
        assert_eq!(tx2.borrow_mut().get_int(&block, 0).unwrap(), 42);
    }

    #[test]
    fn recovery_runs_on_open_without_a_prior_crash() {
        let dir = tempdir().unwrap();
        let db = SimpleDb::new(DbConfig::new(dir.path(), 400, 8)).unwrap();
        let tx = db.new_tx().unwrap();
        tx.borrow_mut().commit().unwrap();
    }
}
