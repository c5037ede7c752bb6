//! A cursor over a table's heap file (`<table>.tbl`): walks slots within
//! the current block, then rolls over to the next block, appending and
//! formatting a fresh one only when an insert needs space nothing else
//! has.

use crate::block_id::BlockId;
use crate::error::DbResult;
use crate::layout::Layout;
use crate::record_page::RecordPage;
use crate::schema::FieldType;
use crate::transaction::SharedTx;

/// A record identifier: the block it lives in and its slot within that
/// block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rid {
    block_number: i32,
    slot: i32,
}

impl Rid {
    pub fn new(block_number: i32, slot: i32) -> Self {
        Rid { block_number, slot }
    }

    pub fn block_number(&self) -> i32 {
        self.block_number
    }

    pub fn slot(&self) -> i32 {
        self.slot
    }
}

/// A value read out of (or about to be written into) a record field,
/// dispatched on the field's schema type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Int(i32),
    Varchar(String),
}

impl Value {
    pub fn as_int(&self) -> i32 {
        match self {
            Value::Int(v) => *v,
            Value::Varchar(_) => panic!("value is not an integer"),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Value::Varchar(v) => v,
            Value::Int(_) => panic!("value is not a string"),
        }
    }
}

pub struct TableScan {
    tx: SharedTx,
    layout: Layout,
    filename: String,
    current_slot: i32,
    record_page: Option<RecordPage>,
}

impl TableScan {
    /// If the table's file is empty, appends and formats a fresh block;
    /// otherwise positions at block 0.
    pub fn new(tx: SharedTx, table_name: &str, layout: Layout) -> DbResult<Self> {
        let filename = format!("{table_name}.tbl");
        let mut scan = TableScan {
            tx,
            layout,
            filename,
            current_slot: -1,
            record_page: None,
        };

        let is_empty = scan.tx.borrow_mut().size(&scan.filename)? == 0;
        if is_empty {
            scan.move_to_new_block()?;
        } else {
            scan.move_to_block(0)?;
        }
        Ok(scan)
    }

    pub fn before_first(&mut self) -> DbResult<()> {
        self.move_to_block(0)
    }

    /// Advances to the next used slot, rolling over blocks as needed.
    /// Returns false once the last block has been exhausted.
    pub fn next(&mut self) -> DbResult<bool> {
        self.current_slot = self.page().next_after(self.current_slot)?;
        while self.current_slot < 0 {
            if self.at_last_block()? {
                return Ok(false);
            }
            let next_block = self.page().block().block_number() + 1;
            self.move_to_block(next_block)?;
            self.current_slot = self.page().next_after(self.current_slot)?;
        }
        Ok(true)
    }

    pub fn get_int(&self, field_name: &str) -> DbResult<i32> {
        self.page().get_int(self.current_slot, field_name)
    }

    pub fn get_string(&self, field_name: &str) -> DbResult<String> {
        self.page().get_string(self.current_slot, field_name)
    }

    pub fn get_val(&self, field_name: &str) -> DbResult<Value> {
        match self.layout.schema().field_type(field_name)? {
            FieldType::Integer => Ok(Value::Int(self.get_int(field_name)?)),
            FieldType::Varchar => Ok(Value::Varchar(self.get_string(field_name)?)),
        }
    }

    pub fn has_field(&self, field_name: &str) -> bool {
        self.layout.schema().has_field(field_name)
    }

    pub fn set_int(&self, field_name: &str, value: i32) -> DbResult<()> {
        self.page().set_int(self.current_slot, field_name, value)
    }

    pub fn set_string(&self, field_name: &str, value: &str) -> DbResult<()> {
        self.page().set_string(self.current_slot, field_name, value)
    }

    pub fn set_val(&self, field_name: &str, value: &Value) -> DbResult<()> {
        match value {
            Value::Int(v) => self.set_int(field_name, *v),
            Value::Varchar(v) => self.set_string(field_name, v),
        }
    }

    /// Advances to the next empty slot, appending and formatting a new
    /// block if the current one (the last in the file) has no room.
    pub fn insert(&mut self) -> DbResult<()> {
        self.current_slot = self.page().insert_after(self.current_slot)?;
        while self.current_slot < 0 {
            if self.at_last_block()? {
                self.move_to_new_block()?;
            } else {
                let next_block = self.page().block().block_number() + 1;
                self.move_to_block(next_block)?;
            }
            self.current_slot = self.page().insert_after(self.current_slot)?;
        }
        Ok(())
    }

    pub fn delete(&self) -> DbResult<()> {
        self.page().delete(self.current_slot)
    }

    pub fn move_to_rid(&mut self, rid: Rid) -> DbResult<()> {
        self.close();
        let block = BlockId::new(&self.filename, rid.block_number());
        self.record_page = Some(RecordPage::new(self.tx.clone(), block, self.layout.clone())?);
        self.current_slot = rid.slot();
        Ok(())
    }

    pub fn get_rid(&self) -> Rid {
        Rid::new(self.page().block().block_number(), self.current_slot)
    }

    /// Unpins the current block, if any. Called automatically whenever
    /// this scan repositions, and should be called by the owner once the
    /// scan is no longer needed.
    pub fn close(&mut self) {
        if let Some(page) = self.record_page.take() {
            self.tx.borrow_mut().unpin(page.block());
        }
    }

    fn page(&self) -> &RecordPage {
        self.record_page.as_ref().expect("table scan is not positioned on a block")
    }

    fn move_to_block(&mut self, block_number: i32) -> DbResult<()> {
        self.close();
        let block = BlockId::new(&self.filename, block_number);
        self.record_page = Some(RecordPage::new(self.tx.clone(), block, self.layout.clone())?);
        self.current_slot = -1;
        Ok(())
    }

    fn move_to_new_block(&mut self) -> DbResult<()> {
        self.close();
        let block = self.tx.borrow_mut().append(&self.filename)?;
        let page = RecordPage::new(self.tx.clone(), block, self.layout.clone())?;
        page.format()?;
        self.record_page = Some(page);
        self.current_slot = -1;
        Ok(())
    }

    fn at_last_block(&self) -> DbResult<bool> {
        let size = self.tx.borrow_mut().size(&self.filename)?;
        Ok(self.page().block().block_number() == size - 1)
    }
}

impl Drop for TableScan {
    fn drop(&mut self) {
        self.close();
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
    fn insert_then_scan_recovers_every_inserted_row() {
        let dir = tempdir().unwrap();
        let tx = new_tx(dir.path());
        let mut scan = TableScan::new(Rc::clone(&tx), "people", test_layout()).unwrap();

        for i in 0..5 {
            scan.insert().unwrap();
            scan.set_int("id", i).unwrap();
            scan.set_string("name", &format!("n{i}")).unwrap();
        }

        scan.before_first().unwrap();
        let mut seen = Vec::new();
        while scan.next().unwrap() {
            seen.push(scan.get_int("id").unwrap());
        }
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn deleted_rows_are_skipped_by_next() {
        let dir = tempdir().unwrap();
        let tx = new_tx(dir.path());
        let mut scan = TableScan::new(Rc::clone(&tx), "people", test_layout()).unwrap();

        for i in 0..3 {
            scan.insert().unwrap();
            scan.set_int("id", i).unwrap();
        }

        scan.before_first().unwrap();
        scan.next().unwrap();
        scan.next().unwrap();
        scan.delete().unwrap();

        scan.before_first().unwrap();
        let mut seen = Vec::new();
        while scan.next().unwrap() {
            seen.push(scan.get_int("id").unwrap());
        }
        assert_eq!(seen, vec![0, 2]);
    }

    #[test]
    fn move_to_rid_then_get_rid_round_trips() {
        let dir = tempdir().unwrap();
        let tx = new_tx(dir.path());
        let mut scan = TableScan::new(Rc::clone(&tx), "people", test_layout()).unwrap();
        scan.insert().unwrap();
        scan.set_int("id", 7).unwrap();
        let rid = scan.get_rid();

        scan.move_to_rid(rid).unwrap();
        assert_eq!(scan.get_int("id").unwrap(), 7);
    }
}
