//! Typed log records layered on top of the raw byte records the write-ahead
//! log stores. Every record starts with a 4-byte operation tag; only
//! `SetInt` and `SetString` carry undo information, the rest exist purely
//! to mark transaction boundaries during recovery.

use std::fmt;

use crate::block_id::BlockId;
use crate::error::{DbError, DbResult};
use crate::log_mgr::LogMgr;
use crate::page::Page;
use crate::transaction::Transaction;

const INT_BYTES: i32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOp {
    Checkpoint = 0,
    Start = 1,
    Commit = 2,
    Rollback = 3,
    SetInt = 4,
    SetString = 5,
}

impl LogOp {
    fn from_i32(value: i32) -> DbResult<Self> {
        match value {
            0 => Ok(LogOp::Checkpoint),
            1 => Ok(LogOp::Start),
            2 => Ok(LogOp::Commit),
            3 => Ok(LogOp::Rollback),
            4 => Ok(LogOp::SetInt),
            5 => Ok(LogOp::SetString),
            other => Err(DbError::Decoding(format!("unknown log record tag {other}"))),
        }
    }
}

/// A record read back out of the log, ready to be undone during rollback
/// or recovery. Only `SetInt`/`SetString` do anything in `undo`; the rest
/// are markers `do_rollback`/`do_recover` use to bound their scan.
pub enum LogRecord {
    Checkpoint,
    Start { txnum: i32 },
    Commit { txnum: i32 },
    Rollback { txnum: i32 },
    SetInt {
        txnum: i32,
        block: BlockId,
        offset: usize,
        value: i32,
    },
    SetString {
        txnum: i32,
        block: BlockId,
        offset: usize,
        value: String,
    },
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogRecord::Checkpoint => write!(f, "<CHECKPOINT>"),
            LogRecord::Start { txnum } => write!(f, "<START {txnum}>"),
            LogRecord::Commit { txnum } => write!(f, "<COMMIT {txnum}>"),
            LogRecord::Rollback { txnum } => write!(f, "<ROLLBACK {txnum}>"),
            LogRecord::SetInt { txnum, block, offset, value } => {
                write!(f, "<SETINT {txnum} {block} {offset} {value}>")
            }
            LogRecord::SetString { txnum, block, offset, value } => {
                write!(f, "<SETSTRING {txnum} {block} {offset} {value}>")
            }
        }
    }
}

impl LogRecord {
    /// The transaction id this record belongs to, or -1 for `Checkpoint`
    /// which has none.
    pub fn tx_number(&self) -> i32 {
        match self {
            LogRecord::Checkpoint => -1,
            LogRecord::Start { txnum }
            | LogRecord::Commit { txnum }
            | LogRecord::Rollback { txnum }
            | LogRecord::SetInt { txnum, .. }
            | LogRecord::SetString { txnum, .. } => *txnum,
        }
    }

    pub fn op(&self) -> LogOp {
        match self {
            LogRecord::Checkpoint => LogOp::Checkpoint,
            LogRecord::Start { .. } => LogOp::Start,
            LogRecord::Commit { .. } => LogOp::Commit,
            LogRecord::Rollback { .. } => LogOp::Rollback,
            LogRecord::SetInt { .. } => LogOp::SetInt,
            LogRecord::SetString { .. } => LogOp::SetString,
        }
    }

    /// Reverses the mutation this record describes. A no-op for every
    /// variant except `SetInt`/`SetString`, which restore the value that
    /// was overwritten, pinning and unpinning the affected block without
    /// generating a new log record.
    pub fn undo(&self, tx: &mut Transaction) -> DbResult<()> {
        match self {
            LogRecord::SetInt { block, offset, value, .. } => {
                tx.pin(block)?;
                tx.set_int(block, *offset, *value, false)?;
                tx.unpin(block);
                Ok(())
            }
            LogRecord::SetString { block, offset, value, .. } => {
                tx.pin(block)?;
                tx.set_string(block, *offset, value, false)?;
                tx.unpin(block);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Parses a record out of its raw byte representation, as read back
    /// from the log.
    pub fn parse(bytes: &[u8]) -> DbResult<LogRecord> {
        let page = Page::from_bytes(bytes.to_vec());
        let op = LogOp::from_i32(page.get_int(0)?)?;

        let txnum_pos = INT_BYTES as usize;
        match op {
            LogOp::Checkpoint => Ok(LogRecord::Checkpoint),
            LogOp::Start => Ok(LogRecord::Start {
                txnum: page.get_int(txnum_pos)?,
            }),
            LogOp::Commit => Ok(LogRecord::Commit {
                txnum: page.get_int(txnum_pos)?,
            }),
            LogOp::Rollback => Ok(LogRecord::Rollback {
                txnum: page.get_int(txnum_pos)?,
            }),
            LogOp::SetInt => {
                let (txnum, block, offset_pos) = Self::parse_block_header(&page, txnum_pos)?;
                let offset = page.get_int(offset_pos)? as usize;
                let value = page.get_int(offset_pos + INT_BYTES as usize)?;
                Ok(LogRecord::SetInt { txnum, block, offset, value })
            }
            LogOp::SetString => {
                let (txnum, block, offset_pos) = Self::parse_block_header(&page, txnum_pos)?;
                let offset = page.get_int(offset_pos)? as usize;
                let value = page.get_string(offset_pos + INT_BYTES as usize)?;
                Ok(LogRecord::SetString { txnum, block, offset, value })
            }
        }
    }

    fn parse_block_header(page: &Page, txnum_pos: usize) -> DbResult<(i32, BlockId, usize)> {
        let txnum = page.get_int(txnum_pos)?;
        let filename_pos = txnum_pos + INT_BYTES as usize;
        let filename = page.get_string(filename_pos)?;
        let block_number_pos = filename_pos + Page::max_length(filename.len());
        let block_number = page.get_int(block_number_pos)?;
        let offset_pos = block_number_pos + INT_BYTES as usize;
        Ok((txnum, BlockId::new(filename, block_number), offset_pos))
    }

    pub fn write_checkpoint(log_mgr: &LogMgr) -> DbResult<u64> {
        let mut page = Page::new(INT_BYTES as usize);
        page.set_int(0, LogOp::Checkpoint as i32)?;
        log_mgr.append(page.as_bytes())
    }

    pub fn write_start(log_mgr: &LogMgr, txnum: i32) -> DbResult<u64> {
        Self::write_txnum_record(log_mgr, LogOp::Start, txnum)
    }

    pub fn write_commit(log_mgr: &LogMgr, txnum: i32) -> DbResult<u64> {
        Self::write_txnum_record(log_mgr, LogOp::Commit, txnum)
    }

    pub fn write_rollback(log_mgr: &LogMgr, txnum: i32) -> DbResult<u64> {
        Self::write_txnum_record(log_mgr, LogOp::Rollback, txnum)
    }

    fn write_txnum_record(log_mgr: &LogMgr, op: LogOp, txnum: i32) -> DbResult<u64> {
        let mut page = Page::new(2 * INT_BYTES as usize);
        page.set_int(0, op as i32)?;
        page.set_int(INT_BYTES as usize, txnum)?;
        log_mgr.append(page.as_bytes())
    }

    pub fn write_set_int(
        log_mgr: &LogMgr,
        txnum: i32,
        block: &BlockId,
        offset: usize,
        value: i32,
    ) -> DbResult<u64> {
        let txnum_pos = INT_BYTES as usize;
        let filename_pos = txnum_pos + INT_BYTES as usize;
        let block_number_pos = filename_pos + Page::max_length(block.filename().len());
        let offset_pos = block_number_pos + INT_BYTES as usize;
        let value_pos = offset_pos + INT_BYTES as usize;

        let mut page = Page::new(value_pos + INT_BYTES as usize);
        page.set_int(0, LogOp::SetInt as i32)?;
        page.set_int(txnum_pos, txnum)?;
        page.set_string(filename_pos, block.filename())?;
        page.set_int(block_number_pos, block.block_number())?;
        page.set_int(offset_pos, offset as i32)?;
        page.set_int(value_pos, value)?;
        log_mgr.append(page.as_bytes())
    }

    pub fn write_set_string(
        log_mgr: &LogMgr,
        txnum: i32,
        block: &BlockId,
        offset: usize,
        value: &str,
    ) -> DbResult<u64> {
        let txnum_pos = INT_BYTES as usize;
        let filename_pos = txnum_pos + INT_BYTES as usize;
        let block_number_pos = filename_pos + Page::max_length(block.filename().len());
        let offset_pos = block_number_pos + INT_BYTES as usize;
        let value_pos = offset_pos + INT_BYTES as usize;

        let mut page = Page::new(value_pos + Page::max_length(value.len()));
        page.set_int(0, LogOp::SetString as i32)?;
        page.set_int(txnum_pos, txnum)?;
        page.set_string(filename_pos, block.filename())?;
        page.set_int(block_number_pos, block.block_number())?;
        page.set_int(offset_pos, offset as i32)?;
        page.set_string(value_pos, value)?;
        log_mgr.append(page.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file_mgr::FileMgr;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn set_int_round_trips_through_the_log() {
        let dir = tempdir().unwrap();
        let fm = Arc::new(FileMgr::new(dir.path(), 400).unwrap());
        let lm = LogMgr::new(Arc::clone(&fm), "simpledb.log").unwrap();
        let block = BlockId::new("testfile", 3);

        let lsn = LogRecord::write_set_int(&lm, 7, &block, 20, 99).unwrap();
        assert!(lsn > 0);

        let raw = lm.iter().unwrap().next().unwrap().unwrap();
        let record = LogRecord::parse(&raw).unwrap();
        match record {
            LogRecord::SetInt { txnum, block: b, offset, value } => {
                assert_eq!(txnum, 7);
                assert_eq!(b, block);
                assert_eq!(offset, 20);
                assert_eq!(value, 99);
            }
            other => panic!("expected SetInt, got {other}"),
        }
    }

    #[test]
    fn checkpoint_carries_no_transaction() {
        let dir = tempdir().unwrap();
        let fm = Arc::new(FileMgr::new(dir.path(), 400).unwrap());
        let lm = LogMgr::new(Arc::clone(&fm), "simpledb.log").unwrap();
        LogRecord::write_checkpoint(&lm).unwrap();

        let raw = lm.iter().unwrap().next().unwrap().unwrap();
        let record = LogRecord::parse(&raw).unwrap();
        assert_eq!(record.tx_number(), -1);
        assert_eq!(record.op(), LogOp::Checkpoint);
    }

    #[test]
    fn an_unknown_tag_is_a_decoding_error() {
        let mut page = Page::new(4);
        page.set_int(0, 99).unwrap();
        let err = LogRecord::parse(page.as_bytes()).unwrap_err();
        assert!(matches!(err, DbError::Decoding(_)));
    }
}
