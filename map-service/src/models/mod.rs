pub mod map_data;

pub use map_data::{bson_to_json, parse_document, StoredDocument, CREATED_AT_FIELD, ID_FIELD};
