//! A single buffer frame: owns one `Page`, and tracks the block it is
//! bound to, its pin count, the transaction currently dirtying it, and the
//! LSN that justifies that dirty state.

use std::sync::Arc;

use crate::block_id::BlockId;
use crate::error::DbResult;
use crate::file_mgr::FileMgr;
use crate::log_mgr::LogMgr;
use crate::page::Page;

/// Sentinel transaction number meaning "this frame is clean".
pub const NO_TXN: i32 = -1;
/// Sentinel LSN meaning "this mutation was not logged" (used only at format time).
pub const NO_LSN: i64 = -1;

pub struct Buffer {
    file_mgr: Arc<FileMgr>,
    log_mgr: Arc<LogMgr>,
    contents: Page,
    block: Option<BlockId>,
    pins: i32,
    modifying_txnum: i32,
    lsn: i64,
}

impl Buffer {
    pub fn new(file_mgr: Arc<FileMgr>, log_mgr: Arc<LogMgr>) -> Self {
        let block_size = file_mgr.block_size();
        Buffer {
            file_mgr,
            log_mgr,
            contents: Page::new(block_size),
            block: None,
            pins: 0,
            modifying_txnum: NO_TXN,
            lsn: NO_LSN,
        }
    }

    pub fn contents(&self) -> &Page {
        &self.contents
    }

    pub fn contents_mut(&mut self) -> &mut Page {
        &mut self.contents
    }

    pub fn block(&self) -> Option<&BlockId> {
        self.block.as_ref()
    }

    pub fn is_pinned(&self) -> bool {
        self.pins > 0
    }

    pub fn modifying_txnum(&self) -> i32 {
        self.modifying_txnum
    }

    /// Records the modifying transaction and, unless `lsn` is the
    /// not-logged sentinel, the LSN that justifies the dirty state. An
    /// `lsn < 0` must never clobber a previously recorded LSN.
    pub fn set_modified(&mut self, txnum: i32, lsn: i64) {
        self.modifying_txnum = txnum;
        if lsn >= 0 {
            self.lsn = lsn;
        }
    }

    pub fn pin(&mut self) {
        self.pins += 1;
    }

    pub fn unpin(&mut self) {
        self.pins -= 1;
    }

    /// Rebinds this (assumed unpinned) frame to `block`, flushing any prior
    /// dirty contents first, then reading `block`'s current disk image.
    pub fn assign_to_block(&mut self, block: BlockId) -> DbResult<()> {
        self.flush()?;
        self.file_mgr.read(&block, &mut self.contents)?;
        self.block = Some(block);
        self.pins = 0;
        Ok(())
    }

    /// WAL invariant: force the log up to this frame's LSN *before* writing
    /// the page to disk, then mark the frame clean.
    pub fn flush(&mut self) -> DbResult<()> {
        if self.modifying_txnum >= 0 {
            if let Some(block) = &self.block {
                self.log_mgr.flush(self.lsn as u64)?;
                self.file_mgr.write(block, &self.contents)?;
            }
            self.modifying_txnum = NO_TXN;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn new_buffer(dir: &std::path::Path) -> Buffer {
        let fm = Arc::new(FileMgr::new(dir, 400).unwrap());
        let lm = Arc::new(LogMgr::new(Arc::clone(&fm), "simpledb.log").unwrap());
        Buffer::new(fm, lm)
    }

    #[test]
    fn fresh_buffer_is_clean_and_unpinned() {
        let dir = tempdir().unwrap();
        let buf = new_buffer(dir.path());
        assert!(!buf.is_pinned());
        assert_eq!(buf.modifying_txnum(), NO_TXN);
    }

    #[test]
    fn set_modified_does_not_clobber_lsn_with_not_logged_sentinel() {
        let dir = tempdir().unwrap();
        let mut buf = new_buffer(dir.path());
        buf.set_modified(1, 5);
        buf.set_modified(1, NO_LSN);
        assert_eq!(buf.lsn, 5);
        assert_eq!(buf.modifying_txnum(), 1);
    }

    #[test]
    fn pin_unpin_tracks_count() {
        let dir = tempdir().unwrap();
        let mut buf = new_buffer(dir.path());
        buf.pin();
        buf.pin();
        assert!(buf.is_pinned());
        buf.unpin();
        assert!(buf.is_pinned());
        buf.unpin();
        assert!(!buf.is_pinned());
    }
}
