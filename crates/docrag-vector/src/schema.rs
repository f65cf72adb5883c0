//! Arrow layout of a collection table.
//!
//! `product` and `doc_type` are lifted out of the payload into their own
//! columns so equality filters run as Lance predicates; the full payload is
//! kept as JSON next to them.

use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

pub const ID: &str = "id";
pub const PRODUCT: &str = "product";
pub const DOC_TYPE: &str = "doc_type";
pub const PAYLOAD: &str = "payload";
pub const VECTOR: &str = "vector";
pub const DISTANCE: &str = "_distance";

pub fn collection_schema(dimension: i32) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new(ID, DataType::UInt64, false),
        Field::new(PRODUCT, DataType::Utf8, true),
        Field::new(DOC_TYPE, DataType::Utf8, true),
        Field::new(PAYLOAD, DataType::Utf8, false),
        Field::new(VECTOR, DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dimension), true),
    ]))
}

/// Vector width recorded in a table schema, if it has a vector column.
pub fn dimension_of(schema: &Schema) -> Option<usize> {
    match schema.field_with_name(VECTOR).ok()?.data_type() {
        DataType::FixedSizeList(_, n) => usize::try_from(*n).ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimension_round_trips_through_schema() {
        assert_eq!(dimension_of(&collection_schema(384)), Some(384));
        assert_eq!(dimension_of(&Schema::empty()), None);
    }
}
