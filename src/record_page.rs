//! A fixed-slot view over a single pinned block: every slot is either
//! empty or in use, and holds one record's worth of fields packed
//! according to a `Layout`.

use crate::block_id::BlockId;
use crate::error::DbResult;
use crate::layout::Layout;
use crate::schema::FieldType;
use crate::transaction::SharedTx;

const EMPTY: i32 = 0;
const USED: i32 = 1;

pub struct RecordPage {
    tx: SharedTx,
    block: BlockId,
    layout: Layout,
}

impl RecordPage {
    /// Pins `block` for the lifetime of this record page.
    pub fn new(tx: SharedTx, block: BlockId, layout: Layout) -> DbResult<Self> {
        tx.borrow_mut().pin(&block)?;
        Ok(RecordPage { tx, block, layout })
    }

    pub fn block(&self) -> &BlockId {
        &self.block
    }

    pub fn get_int(&self, slot: i32, field_name: &str) -> DbResult<i32> {
        let pos = self.field_position(slot, field_name)?;
        self.tx.borrow_mut().get_int(&self.block, pos)
    }

    pub fn get_string(&self, slot: i32, field_name: &str) -> DbResult<String> {
        let pos = self.field_position(slot, field_name)?;
        self.tx.borrow_mut().get_string(&self.block, pos)
    }

    pub fn set_int(&self, slot: i32, field_name: &str, value: i32) -> DbResult<()> {
        let pos = self.field_position(slot, field_name)?;
        self.tx.borrow_mut().set_int(&self.block, pos, value, true)
    }

    pub fn set_string(&self, slot: i32, field_name: &str, value: &str) -> DbResult<()> {
        let pos = self.field_position(slot, field_name)?;
        self.tx.borrow_mut().set_string(&self.block, pos, value, true)
    }

    pub fn delete(&self, slot: i32) -> DbResult<()> {
        self.set_flag(slot, EMPTY)
    }

    /// Writes an empty flag and a type-defaulted value into every slot
    /// that fits in the block. Unlogged: the bytes being overwritten are
    /// meaningless.
    pub fn format(&self) -> DbResult<()> {
        let mut slot = 0;
        while self.is_valid_slot(slot) {
            self.tx.borrow_mut().set_int(&self.block, self.offset(slot), EMPTY, false)?;
            let schema = self.layout.schema().clone();
            for field_name in schema.fields() {
                let pos = self.offset(slot) + self.layout.offset(field_name)?;
                match schema.field_type(field_name)? {
                    FieldType::Integer => {
                        self.tx.borrow_mut().set_int(&self.block, pos, 0, false)?;
                    }
                    FieldType::Varchar => {
                        self.tx.borrow_mut().set_string(&self.block, pos, "", false)?;
                    }
                }
            }
            slot += 1;
        }
        Ok(())
    }

    pub fn next_after(&self, slot: i32) -> DbResult<i32> {
        self.search_after(slot, USED)
    }

    /// Finds the first empty slot after `slot`, flips it to used, and
    /// returns it; -1 if the block is full.
    pub fn insert_after(&self, slot: i32) -> DbResult<i32> {
        let new_slot = self.search_after(slot, EMPTY)?;
        if new_slot >= 0 {
            self.set_flag(new_slot, USED)?;
        }
        Ok(new_slot)
    }

    fn set_flag(&self, slot: i32, flag: i32) -> DbResult<()> {
        self.tx.borrow_mut().set_int(&self.block, self.offset(slot), flag, true)
    }

    fn search_after(&self, slot: i32, flag: i32) -> DbResult<i32> {
        let mut slot = slot + 1;
        while self.is_valid_slot(slot) {
            if self.tx.borrow_mut().get_int(&self.block, self.offset(slot))? == flag {
                return Ok(slot);
            }
            slot += 1;
        }
        Ok(-1)
    }

    fn is_valid_slot(&self, slot: i32) -> bool {
        self.offset(slot + 1) <= self.tx.borrow().block_size()
    }

    fn offset(&self, slot: i32) -> usize {
        slot as usize * self.layout.slot_size()
    }

    fn field_position(&self, slot: i32, field_name: &str) -> DbResult<usize> {
        Ok(self.offset(slot) + self.layout.offset(field_name)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer_pool::BufferPool;
    use crate::file_mgr::FileMgr;
    use crate::lock_table::LockTable;
    use crate::log_mgr::LogMgr;
    use crate::schema::Schema;
    use crate::transaction::Transaction;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::Arc;
    use tempfile::tempdir;

    fn new_tx(dir: &std::path::Path) -> SharedTx {
        let fm = Arc::new(FileMgr::new(dir, 400).unwrap());
        let lm = Arc::new(LogMgr::new(Arc::clone(&fm), "simpledb.log").unwrap());
        let bp = Arc::new(BufferPool::new(Arc::clone(&fm), Arc::clone(&lm), 8));
        let lt = Arc::new(LockTable::new());
        Rc::new(RefCell::new(Transaction::new(fm, lm, bp, lt).unwrap()))
    }

    fn test_layout() -> Layout {
        let mut schema = Schema::new();
        schema.add_int_field("id");
        schema.add_string_field("name", 8);
        Layout::new(schema)
    }

    #[test]
    fn format_then_insert_after_claims_the_first_empty_slot() {
        let dir = tempdir().unwrap();
        let tx = new_tx(dir.path());
        tx.borrow_mut().append("testfile").unwrap();
        let block = BlockId::new("testfile", 0);
        let layout = test_layout();
        let page = RecordPage::new(Rc::clone(&tx), block, layout).unwrap();

        page.format().unwrap();
        let slot = page.insert_after(-1).unwrap();
        assert_eq!(slot, 0);
        page.set_int(slot, "id", 42).unwrap();
        assert_eq!(page.get_int(slot, "id").unwrap(), 42);
    }

    #[test]
    fn delete_frees_a_slot_for_next_after_to_skip() {
        let dir = tempdir().unwrap();
        let tx = new_tx(dir.path());
        tx.borrow_mut().append("testfile").unwrap();
        let block = BlockId::new("testfile", 0);
        let layout = test_layout();
        let page = RecordPage::new(Rc::clone(&tx), block, layout).unwrap();

        page.format().unwrap();
        let s0 = page.insert_after(-1).unwrap();
        let s1 = page.insert_after(s0).unwrap();
        page.delete(s0).unwrap();

        assert_eq!(page.next_after(-1).unwrap(), s1);
    }

    #[test]
    fn insert_after_returns_negative_one_once_the_block_is_full() {
        let dir = tempdir().unwrap();
        let tx = new_tx(dir.path());
        tx.borrow_mut().append("testfile").unwrap();
        let block = BlockId::new("testfile", 0);
        let layout = test_layout();
        let page = RecordPage::new(Rc::clone(&tx), block, layout).unwrap();
        page.format().unwrap();

        let mut slot = -1;
        loop {
            let next = page.insert_after(slot).unwrap();
            if next < 0 {
                break;
            }
            slot = next;
        }
        assert_eq!(page.insert_after(slot).unwrap(), -1);
    }
}
