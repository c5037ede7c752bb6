//! Precomputes a schema's byte-level layout: the offset of each field
//! within a slot, and the total slot size. Either derived from the schema
//! alone, or reconstructed verbatim from offsets/slot size a catalog
//! already computed and stored.

use std::collections::HashMap;

use crate::error::{DbError, DbResult};
use crate::page::Page;
use crate::schema::{FieldType, Schema};

const INT_BYTES: usize = 4;

#[derive(Debug, Clone)]
pub struct Layout {
    schema: Schema,
    offsets: HashMap<String, usize>,
    slot_size: usize,
}

impl Layout {
    /// Computes offsets and slot size from `schema`: a 4-byte empty/inuse
    /// flag, then each field in declaration order.
    pub fn new(schema: Schema) -> Self {
        let mut offsets = HashMap::new();
        let mut position = INT_BYTES;
        for field_name in schema.fields() {
            offsets.insert(field_name.clone(), position);
            position += Self::length_in_bytes(&schema, field_name);
        }
        Layout { schema, offsets, slot_size: position }
    }

    /// Reconstructs a layout from offsets/slot size already computed and
    /// stored by a catalog, rather than recomputing them.
    pub fn from_metadata(schema: Schema, offsets: HashMap<String, usize>, slot_size: usize) -> Self {
        Layout { schema, offsets, slot_size }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn offset(&self, field_name: &str) -> DbResult<usize> {
        self.offsets
            .get(field_name)
            .copied()
            .ok_or_else(|| DbError::Schema(format!("unknown field {field_name}")))
    }

    pub fn slot_size(&self) -> usize {
        self.slot_size
    }

    fn length_in_bytes(schema: &Schema, field_name: &str) -> usize {
        match schema
            .field_type(field_name)
            .expect("field_name must come from schema's own field list")
        {
            FieldType::Integer => INT_BYTES,
            FieldType::Varchar => Page::max_length(
                schema
                    .length(field_name)
                    .expect("field_name must come from schema's own field list"),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_size_is_flag_plus_every_field() {
        let mut schema = Schema::new();
        schema.add_int_field("id");
        schema.add_string_field("name", 8);
        let layout = Layout::new(schema);

        assert_eq!(layout.offset("id").unwrap(), 4);
        assert_eq!(layout.offset("name").unwrap(), 8);
        assert_eq!(layout.slot_size(), 8 + Page::max_length(8));
    }

    #[test]
    fn from_metadata_keeps_caller_supplied_offsets() {
        let mut schema = Schema::new();
        schema.add_int_field("id");
        let mut offsets = HashMap::new();
        offsets.insert("id".to_string(), 100);
        let layout = Layout::from_metadata(schema, offsets, 200);

        assert_eq!(layout.offset("id").unwrap(), 100);
        assert_eq!(layout.slot_size(), 200);
    }

    #[test]
    fn unknown_field_is_a_schema_error() {
        let mut schema = Schema::new();
        schema.add_int_field("id");
        let layout = Layout::new(schema);
        assert!(matches!(layout.offset("missing"), Err(DbError::Schema(_))));
    }
}
