//! A table's record schema: the ordered field list plus each field's type
//! and, for VARCHAR fields, its declared length.

use std::collections::HashMap;

use crate::error::{DbError, DbResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Integer,
    Varchar,
}

#[derive(Debug, Clone, Copy)]
struct FieldInfo {
    field_type: FieldType,
    length: usize,
}

#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: Vec<String>,
    info: HashMap<String, FieldInfo>,
}

impl Schema {
    pub fn new() -> Self {
        Schema::default()
    }

    /// Adds a field with an explicit type and (for VARCHAR) length. The
    /// length is irrelevant for INTEGER fields.
    pub fn add_field(&mut self, field_name: &str, field_type: FieldType, length: usize) {
        self.fields.push(field_name.to_string());
        self.info.insert(field_name.to_string(), FieldInfo { field_type, length });
    }

    pub fn add_int_field(&mut self, field_name: &str) {
        self.add_field(field_name, FieldType::Integer, 0);
    }

    pub fn add_string_field(&mut self, field_name: &str, length: usize) {
        self.add_field(field_name, FieldType::Varchar, length);
    }

    /// Adds `field_name` with the same type and length it has in `schema`.
    pub fn add(&mut self, field_name: &str, schema: &Schema) {
        let field_type = schema
            .field_type(field_name)
            .expect("field_name must come from schema's own field list");
        let length = schema
            .length(field_name)
            .expect("field_name must come from schema's own field list");
        self.add_field(field_name, field_type, length);
    }

    /// Adds every field of `schema` to this one.
    pub fn add_all(&mut self, schema: &Schema) {
        for field_name in schema.fields.clone() {
            self.add(&field_name, schema);
        }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn has_field(&self, field_name: &str) -> bool {
        self.info.contains_key(field_name)
    }

    pub fn field_type(&self, field_name: &str) -> DbResult<FieldType> {
        Ok(self
            .info
            .get(field_name)
            .ok_or_else(|| DbError::Schema(format!("unknown field {field_name}")))?
            .field_type)
    }

    /// The declared length of a VARCHAR field. Undefined for INTEGER fields.
    pub fn length(&self, field_name: &str) -> DbResult<usize> {
        Ok(self
            .info
            .get(field_name)
            .ok_or_else(|| DbError::Schema(format!("unknown field {field_name}")))?
            .length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_all_copies_every_field_with_its_type_and_length() {
        let mut base = Schema::new();
        base.add_int_field("id");
        base.add_string_field("name", 20);

        let mut copy = Schema::new();
        copy.add_all(&base);

        assert_eq!(copy.fields(), base.fields());
        assert_eq!(copy.field_type("name").unwrap(), FieldType::Varchar);
        assert_eq!(copy.length("name").unwrap(), 20);
    }

    #[test]
    fn unknown_field_is_a_schema_error() {
        let schema = Schema::new();
        assert!(matches!(schema.field_type("missing"), Err(DbError::Schema(_))));
        assert!(matches!(schema.length("missing"), Err(DbError::Schema(_))));
    }

    #[test]
    fn has_field_reflects_additions() {
        let mut schema = Schema::new();
        assert!(!schema.has_field("id"));
        schema.add_int_field("id");
        assert!(schema.has_field("id"));
    }
}
