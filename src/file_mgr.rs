//! The paged file layer: a root directory of fixed-size block files,
//! read/written under one mutex so all I/O is serialized.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::{debug, info, trace};

use crate::block_id::BlockId;
use crate::error::{DbError, DbResult};
use crate::page::Page;

struct OpenFiles {
    handles: HashMap<String, File>,
}

impl OpenFiles {
    fn get_or_open(&mut self, db_directory: &Path, filename: &str) -> DbResult<&mut File> {
        if !self.handles.contains_key(filename) {
            let path = db_directory.join(filename);
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .open(&path)
                .map_err(|e| DbError::io(None, e))?;
            self.handles.insert(filename.to_string(), file);
        }
        Ok(self.handles.get_mut(filename).expect("just inserted"))
    }
}

/// Owns the database's root directory and serializes all block I/O.
pub struct FileMgr {
    db_directory: PathBuf,
    block_size: usize,
    is_new: bool,
    open_files: Mutex<OpenFiles>,
}

impl FileMgr {
    /// Creates `db_directory` if absent, and deletes any file beginning with
    /// `temp` (scratch-table cleanup left over from a previous run).
    pub fn new(db_directory: impl Into<PathBuf>, block_size: usize) -> DbResult<Self> {
        let db_directory = db_directory.into();
        let is_new = !db_directory.exists();

        if is_new {
            fs::create_dir_all(&db_directory).map_err(|e| DbError::io(None, e))?;
            info!("created new database directory {}", db_directory.display());
        }

        for entry in fs::read_dir(&db_directory).map_err(|e| DbError::io(None, e))? {
            let entry = entry.map_err(|e| DbError::io(None, e))?;
            let name = entry.file_name();
            if name.to_string_lossy().starts_with("temp") {
                fs::remove_file(entry.path()).map_err(|e| DbError::io(None, e))?;
                debug!("removed leftover scratch file {:?}", name);
            }
        }

        Ok(FileMgr {
            db_directory,
            block_size,
            is_new,
            open_files: Mutex::new(OpenFiles {
                handles: HashMap::new(),
            }),
        })
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Whether the database directory did not exist before this manager was
    /// constructed.
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// Reads exactly `block_size` bytes into `page`. If the file is shorter
    /// than the requested block, the unread suffix stays zero.
    pub fn read(&self, block: &BlockId, page: &mut Page) -> DbResult<()> {
        let mut open_files = self.open_files.lock().expect("file manager mutex poisoned");
        let file = open_files.get_or_open(&self.db_directory, block.filename())?;

        let offset = block.block_number() as u64 * self.block_size as u64;
        let mut buf = vec![0u8; self.block_size];

        file.seek(SeekFrom::Start(offset))
            .map_err(|e| DbError::io(Some(block.clone()), e))?;

        let mut read_so_far = 0usize;
        loop {
            match file.read(&mut buf[read_so_far..]) {
                Ok(0) => break,
                Ok(n) => read_so_far += n,
                Err(e) => return Err(DbError::io(Some(block.clone()), e)),
            }
        }

        *page = Page::from_bytes(buf);
        trace!("read {block}");
        Ok(())
    }

    /// Writes `block_size` bytes of `page` and flushes them to the OS.
    pub fn write(&self, block: &BlockId, page: &Page) -> DbResult<()> {
        let mut open_files = self.open_files.lock().expect("file manager mutex poisoned");
        let file = open_files.get_or_open(&self.db_directory, block.filename())?;

        let offset = block.block_number() as u64 * self.block_size as u64;
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| DbError::io(Some(block.clone()), e))?;
        file.write_all(page.as_bytes())
            .map_err(|e| DbError::io(Some(block.clone()), e))?;
        file.flush().map_err(|e| DbError::io(Some(block.clone()), e))?;
        trace!("wrote {block}");
        Ok(())
    }

    /// Appends a new zero-filled block to `filename` and returns its id.
    pub fn append(&self, filename: &str) -> DbResult<BlockId> {
        let mut open_files = self.open_files.lock().expect("file manager mutex poisoned");
        let new_block_number = Self::length_locked(&mut open_files, &self.db_directory, filename, self.block_size)?;
        let block = BlockId::new(filename, new_block_number);

        let file = open_files.get_or_open(&self.db_directory, filename)?;
        let offset = block.block_number() as u64 * self.block_size as u64;
        let zeros = vec![0u8; self.block_size];

        file.seek(SeekFrom::Start(offset))
            .map_err(|e| DbError::io(Some(block.clone()), e))?;
        file.write_all(&zeros).map_err(|e| DbError::io(Some(block.clone()), e))?;
        file.flush().map_err(|e| DbError::io(Some(block.clone()), e))?;

        debug!("appended {block}");
        Ok(block)
    }

    /// Byte length of `filename` in blocks, rounded down.
    pub fn length(&self, filename: &str) -> DbResult<i32> {
        let mut open_files = self.open_files.lock().expect("file manager mutex poisoned");
        Self::length_locked(&mut open_files, &self.db_directory, filename, self.block_size)
    }

    fn length_locked(
        open_files: &mut OpenFiles,
        db_directory: &Path,
        filename: &str,
        block_size: usize,
    ) -> DbResult<i32> {
        let file = open_files.get_or_open(db_directory, filename)?;
        let len = file.metadata().map_err(|e| DbError::io(None, e))?.len();
        Ok((len / block_size as u64) as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn append_extends_length_by_one_and_reads_as_zeros() {
        let dir = tempdir().unwrap();
        let fm = FileMgr::new(dir.path(), 400).unwrap();

        assert_eq!(fm.length("testfile").unwrap(), 0);
        let b0 = fm.append("testfile").unwrap();
        assert_eq!(b0.block_number(), 0);
        assert_eq!(fm.length("testfile").unwrap(), 1);

        let mut page = Page::new(400);
        fm.read(&b0, &mut page).unwrap();
        assert_eq!(page.as_bytes(), vec![0u8; 400].as_slice());
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempdir().unwrap();
        let fm = FileMgr::new(dir.path(), 400).unwrap();
        let block = fm.append("testfile").unwrap();

        let mut page = Page::new(400);
        page.set_int(0, 42).unwrap();
        fm.write(&block, &page).unwrap();

        let mut read_back = Page::new(400);
        fm.read(&block, &mut read_back).unwrap();
        assert_eq!(read_back.get_int(0).unwrap(), 42);
    }

    #[test]
    fn reading_a_short_file_zero_fills_the_suffix() {
        let dir = tempdir().unwrap();
        let fm = FileMgr::new(dir.path(), 400).unwrap();

        // Force the file to exist but shorter than one block.
        {
            let path = dir.path().join("shortfile");
            let mut f = File::create(&path).unwrap();
            f.write_all(&[1, 2, 3]).unwrap();
        }

        let mut page = Page::new(400);
        fm.read(&BlockId::new("shortfile", 0), &mut page).unwrap();
        assert_eq!(&page.as_bytes()[0..3], &[1, 2, 3]);
        assert!(page.as_bytes()[3..].iter().all(|&b| b == 0));
    }

    #[test]
    fn startup_deletes_temp_prefixed_files() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("temp_scratch"), b"junk").unwrap();
        fs::write(dir.path().join("keepme.tbl"), b"data").unwrap();

        let _fm = FileMgr::new(dir.path(), 400).unwrap();

        assert!(!dir.path().join("temp_scratch").exists());
        assert!(dir.path().join("keepme.tbl").exists());
    }
}
