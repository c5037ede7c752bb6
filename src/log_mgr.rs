//! The write-ahead log. Records are packed right-to-left in a tail block
//! shared by every transaction; LSNs are dense, assigned at `append`, and
//! `flush` guarantees durability up to a given LSN.

use std::sync::{Arc, Mutex};

use log::debug;

use crate::block_id::BlockId;
use crate::error::DbResult;
use crate::file_mgr::FileMgr;
use crate::page::Page;

const BOUNDARY_SLOT: usize = 0;
const INT_BYTES: usize = 4;

struct LogState {
    log_page: Page,
    current_block: BlockId,
    latest_lsn: u64,
    last_saved_lsn: u64,
}

/// Append-only log of opaque byte records, shared by every `Transaction`.
pub struct LogMgr {
    file_mgr: Arc<FileMgr>,
    log_file: String,
    state: Mutex<LogState>,
}

impl LogMgr {
    /// Opens (or creates) `log_file`. If the file is empty a fresh block is
    /// appended; otherwise the highest-numbered existing block becomes the
    /// current tail.
    pub fn new(file_mgr: Arc<FileMgr>, log_file: impl Into<String>) -> DbResult<Self> {
        let log_file = log_file.into();
        let block_size = file_mgr.block_size();
        let mut log_page = Page::new(block_size);

        let log_size = file_mgr.length(&log_file)?;
        let current_block = if log_size == 0 {
            Self::append_new_block(&file_mgr, &log_file, &mut log_page)?
        } else {
            let block = BlockId::new(&log_file, log_size - 1);
            file_mgr.read(&block, &mut log_page)?;
            block
        };

        Ok(LogMgr {
            file_mgr,
            log_file,
            state: Mutex::new(LogState {
                log_page,
                current_block,
                latest_lsn: 0,
                last_saved_lsn: 0,
            }),
        })
    }

    /// Appends `record` to the log buffer and returns its LSN. Dense,
    /// strictly increasing, never reused.
    pub fn append(&self, record: &[u8]) -> DbResult<u64> {
        let mut state = self.state.lock().expect("log manager mutex poisoned");

        let boundary = state.log_page.get_int(BOUNDARY_SLOT)? as usize;
        let bytes_needed = record.len() + INT_BYTES;

        let boundary = if boundary < bytes_needed + INT_BYTES {
            self.file_mgr.write(&state.current_block, &state.log_page)?;
            state.last_saved_lsn = state.latest_lsn;
            let new_block =
                Self::append_new_block(&self.file_mgr, &self.log_file, &mut state.log_page)?;
            state.current_block = new_block;
            state.log_page.get_int(BOUNDARY_SLOT)? as usize
        } else {
            boundary
        };

        let record_position = boundary - bytes_needed;
        state.log_page.set_bytes(record_position, record)?;
        state.log_page.set_int(BOUNDARY_SLOT, record_position as i32)?;

        state.latest_lsn += 1;
        Ok(state.latest_lsn)
    }

    /// Ensures every record with LSN `<= lsn` is durable.
    pub fn flush(&self, lsn: u64) -> DbResult<()> {
        let mut state = self.state.lock().expect("log manager mutex poisoned");
        if lsn >= state.last_saved_lsn {
            self.file_mgr.write(&state.current_block, &state.log_page)?;
            state.last_saved_lsn = state.latest_lsn;
            debug!("flushed log up to lsn {}", state.last_saved_lsn);
        }
        Ok(())
    }

    /// An iterator over every record, newest-first, forcing the in-memory
    /// tail buffer to disk before the first read. Safe so long as no
    /// concurrent `append` interleaves (recovery and rollback hold the
    /// transaction scope for this reason).
    pub fn iter(&self) -> DbResult<LogIterator<'_>> {
        {
            let state = self.state.lock().expect("log manager mutex poisoned");
            self.file_mgr.write(&state.current_block, &state.log_page)?;
        }
        let state = self.state.lock().expect("log manager mutex poisoned");
        LogIterator::new(&self.file_mgr, state.current_block.clone())
    }

    fn append_new_block(file_mgr: &FileMgr, log_file: &str, log_page: &mut Page) -> DbResult<BlockId> {
        let block = file_mgr.append(log_file)?;
        log_page.set_int(BOUNDARY_SLOT, file_mgr.block_size() as i32)?;
        file_mgr.write(&block, log_page)?;
        Ok(block)
    }
}

/// Yields log records most-recent-first within a block, then steps to the
/// previous block (high-number-first) once a block is exhausted.
pub struct LogIterator<'a> {
    file_mgr: &'a FileMgr,
    block: BlockId,
    page: Page,
    current_position: usize,
    boundary: usize,
}

impl<'a> LogIterator<'a> {
    fn new(file_mgr: &'a FileMgr, block: BlockId) -> DbResult<Self> {
        let mut it = LogIterator {
            file_mgr,
            page: Page::new(file_mgr.block_size()),
            block,
            current_position: 0,
            boundary: 0,
        };
        it.move_to_block(it.block.clone())?;
        Ok(it)
    }

    fn has_next(&self) -> bool {
        self.current_position < self.file_mgr.block_size() || self.block.block_number() > 0
    }

    fn move_to_block(&mut self, block: BlockId) -> DbResult<()> {
        self.file_mgr.read(&block, &mut self.page)?;
        self.boundary = self.page.get_int(BOUNDARY_SLOT)? as usize;
        self.current_position = self.boundary;
        self.block = block;
        Ok(())
    }
}

impl<'a> Iterator for LogIterator<'a> {
    type Item = DbResult<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if !self.has_next() {
            return None;
        }

        if self.current_position == self.file_mgr.block_size() {
            let prev = BlockId::new(self.block.filename(), self.block.block_number() - 1);
            if let Err(e) = self.move_to_block(prev) {
                return Some(Err(e));
            }
        }

        let record = match self.page.get_bytes(self.current_position) {
            Ok(r) => r,
            Err(e) => return Some(Err(e)),
        };
        self.current_position += record.len() + INT_BYTES;
        Some(Ok(record))
    }
}
