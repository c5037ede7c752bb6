//! Crate-wide error type.
//!
//! The storage core never recovers from an error locally: it always
//! surfaces one of these variants to the caller. `BufferAbort` and
//! `LockAbort` are the only variants a caller is expected to react to, by
//! rolling back the transaction that produced them.

use log::error;
use thiserror::Error;

use crate::block_id::BlockId;

pub type DbResult<T> = Result<T, DbError>;

#[derive(Debug, Error)]
pub enum DbError {
    /// Any failure at the file layer. Fatal.
    #[error("I/O error on block {block:?}: {source}")]
    Io {
        block: Option<BlockId>,
        #[source]
        source: std::io::Error,
    },

    /// `BufferMgr::pin` timed out waiting for a free frame.
    #[error("timed out waiting for a buffer frame")]
    BufferAbort,

    /// A lock request timed out.
    #[error("timed out waiting for a lock")]
    LockAbort,

    /// A page offset was out of bounds, or a log record carried an unknown tag.
    #[error("decoding error: {0}")]
    Decoding(String),

    /// An unknown field name or a type mismatch at slot access.
    #[error("schema error: {0}")]
    Schema(String),

    /// A transaction tried to read or write a block it never pinned.
    #[error("block {0} is not currently pinned by this transaction")]
    NotPinned(BlockId),
}

impl DbError {
    pub fn io(block: Option<BlockId>, source: std::io::Error) -> Self {
        error!("I/O error on block {block:?}: {source}");
        DbError::Io { block, source }
    }

    /// True for the two abort kinds a transaction can recover from by rolling back.
    pub fn is_abort(&self) -> bool {
        matches!(self, DbError::BufferAbort | DbError::LockAbort)
    }
}
