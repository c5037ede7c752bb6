//! The buffer pool: a fixed-size array of frames, pinned and unpinned
//! under a single CV-guarded monitor. Frames are addressed by index once
//! pinned, so callers (the per-transaction `BufferList`) hold a `usize`
//! rather than a borrowed `&Buffer`.
//!
//! `pin` retries while a frame is unavailable and the deadline has not yet
//! passed, and only raises `BufferAbort` once the deadline is exceeded —
//! waiters are woken on every `unpin` so a released frame is claimed
//! promptly rather than discovered only after a spurious wakeup.

use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::block_id::BlockId;
use crate::buffer::Buffer;
use crate::error::{DbError, DbResult};
use crate::file_mgr::FileMgr;
use crate::log_mgr::LogMgr;
use std::sync::Arc;

const MAX_WAIT: Duration = Duration::from_secs(10);

struct PoolState {
    frames: Vec<Buffer>,
    available: usize,
}

pub struct BufferPool {
    state: Mutex<PoolState>,
    cv: Condvar,
    max_wait: Duration,
}

impl BufferPool {
    pub fn new(file_mgr: Arc<FileMgr>, log_mgr: Arc<LogMgr>, num_buffers: usize) -> Self {
        Self::with_timeout(file_mgr, log_mgr, num_buffers, MAX_WAIT)
    }

    /// Like `new`, but with an explicit wait bound instead of the
    /// production default. Used by tests that want to observe a
    /// `BufferAbort` without sleeping for the production timeout.
    pub fn with_timeout(
        file_mgr: Arc<FileMgr>,
        log_mgr: Arc<LogMgr>,
        num_buffers: usize,
        max_wait: Duration,
    ) -> Self {
        let frames = (0..num_buffers)
            .map(|_| Buffer::new(Arc::clone(&file_mgr), Arc::clone(&log_mgr)))
            .collect();

        BufferPool {
            state: Mutex::new(PoolState {
                frames,
                available: num_buffers,
            }),
            cv: Condvar::new(),
            max_wait,
        }
    }

    pub fn available(&self) -> usize {
        self.state.lock().expect("buffer pool mutex poisoned").available
    }

    /// Pins `block`, waiting up to a fixed timeout for a free frame. Returns
    /// the frame's index within the pool.
    pub fn pin(&self, block: &BlockId) -> DbResult<usize> {
        let mut state = self.state.lock().expect("buffer pool mutex poisoned");
        let deadline = Instant::now() + self.max_wait;

        loop {
            if let Some(idx) = Self::try_to_pin(&mut state, block)? {
                return Ok(idx);
            }

            let now = Instant::now();
            if now >= deadline {
                warn!("pin({block}) timed out waiting for a free buffer frame");
                return Err(DbError::BufferAbort);
            }

            let (guard, timeout_result) = self
                .cv
                .wait_timeout(state, deadline - now)
                .expect("buffer pool mutex poisoned");
            state = guard;
            let _ = timeout_result;
        }
    }

    pub fn unpin(&self, idx: usize) {
        let mut state = self.state.lock().expect("buffer pool mutex poisoned");
        state.frames[idx].unpin();
        if !state.frames[idx].is_pinned() {
            state.available += 1;
            self.cv.notify_all();
        }
    }

    /// Flushes every frame dirtied by `txnum`.
    pub fn flush_all(&self, txnum: i32) -> DbResult<()> {
        let mut state = self.state.lock().expect("buffer pool mutex poisoned");
        for frame in state.frames.iter_mut() {
            if frame.modifying_txnum() == txnum {
                frame.flush()?;
            }
        }
        Ok(())
    }

    pub fn block_of(&self, idx: usize) -> Option<BlockId> {
        self.state.lock().expect("buffer pool mutex poisoned").frames[idx]
            .block()
            .cloned()
    }

    pub fn get_int(&self, idx: usize, offset: usize) -> DbResult<i32> {
        self.state.lock().expect("buffer pool mutex poisoned").frames[idx]
            .contents()
            .get_int(offset)
    }

    pub fn get_string(&self, idx: usize, offset: usize) -> DbResult<String> {
        self.state.lock().expect("buffer pool mutex poisoned").frames[idx]
            .contents()
            .get_string(offset)
    }

    pub fn set_int(&self, idx: usize, offset: usize, value: i32) -> DbResult<()> {
        self.state.lock().expect("buffer pool mutex poisoned").frames[idx]
            .contents_mut()
            .set_int(offset, value)
    }

    pub fn set_string(&self, idx: usize, offset: usize, value: &str) -> DbResult<()> {
        self.state.lock().expect("buffer pool mutex poisoned").frames[idx]
            .contents_mut()
            .set_string(offset, value)
    }

    pub fn set_modified(&self, idx: usize, txnum: i32, lsn: i64) {
        self.state.lock().expect("buffer pool mutex poisoned").frames[idx].set_modified(txnum, lsn);
    }

    fn try_to_pin(state: &mut PoolState, block: &BlockId) -> DbResult<Option<usize>> {
        let existing = state
            .frames
            .iter()
            .position(|f| f.block() == Some(block));

        let idx = match existing {
            Some(idx) => idx,
            None => match Self::choose_unpinned(state) {
                Some(idx) => {
                    state.frames[idx].assign_to_block(block.clone())?;
                    debug!("assigned frame {idx} to {block}");
                    idx
                }
                None => return Ok(None),
            },
        };

        if !state.frames[idx].is_pinned() {
            state.available -= 1;
        }
        state.frames[idx].pin();
        Ok(Some(idx))
    }

    fn choose_unpinned(state: &PoolState) -> Option<usize> {
        state.frames.iter().position(|f| !f.is_pinned())
    }
}
