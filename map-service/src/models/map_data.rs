use chrono::SecondsFormat;
use mongodb::bson::{self, Bson, Document};
use serde::{Serialize, Serializer};
use serde_json::Value;
use service_core::error::AppError;

/// Store-assigned identifier field.
pub const ID_FIELD: &str = "_id";
/// Creation timestamp attached on insert.
pub const CREATED_AT_FIELD: &str = "createdAt";

/// A record as it sits in the collection: caller fields plus `_id` and
/// `createdAt`.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument(Document);

impl StoredDocument {
    pub fn id(&self) -> Option<&Bson> {
        self.0.get(ID_FIELD)
    }

    pub fn created_at(&self) -> Option<bson::DateTime> {
        self.0.get_datetime(CREATED_AT_FIELD).ok().copied()
    }

    pub fn get(&self, field: &str) -> Option<&Bson> {
        self.0.get(field)
    }

    pub fn as_document(&self) -> &Document {
        &self.0
    }

    pub fn to_json(&self) -> Value {
        bson_to_json(Bson::Document(self.0.clone()))
    }
}

impl From<Document> for StoredDocument {
    fn from(doc: Document) -> Self {
        StoredDocument(doc)
    }
}

impl Serialize for StoredDocument {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// Accepts a JSON object as a new document body.
///
/// Null, scalars and arrays are rejected. Numbers that do not fit BSON's
/// integer range are rejected too.
pub fn parse_document(payload: Value) -> Result<Document, AppError> {
    let fields = match payload {
        Value::Object(fields) => fields,
        Value::Null => {
            return Err(AppError::Validation(
                "Please provide valid JSON data: body must not be null".to_string(),
            ))
        }
        Value::Array(_) => {
            return Err(AppError::Validation(
                "Please provide valid JSON data: expected an object, got an array".to_string(),
            ))
        }
        _ => {
            return Err(AppError::Validation(
                "Please provide valid JSON data: expected an object".to_string(),
            ))
        }
    };

    bson::to_document(&fields).map_err(|e| {
        AppError::Validation(format!("Please provide valid JSON data: {}", e))
    })
}

/// Renders BSON the way a JSON client expects: ObjectIds as hex strings,
/// datetimes as RFC 3339 with millisecond precision, everything else as
/// relaxed extended JSON.
pub fn bson_to_json(value: Bson) -> Value {
    match value {
        Bson::ObjectId(oid) => Value::String(oid.to_hex()),
        Bson::DateTime(dt) => {
            Value::String(dt.to_chrono().to_rfc3339_opts(SecondsFormat::Millis, true))
        }
        Bson::Document(doc) => Value::Object(
            doc.into_iter()
                .map(|(key, value)| (key, bson_to_json(value)))
                .collect(),
        ),
        Bson::Array(items) => Value::Array(items.into_iter().map(bson_to_json).collect()),
        other => other.into_relaxed_extjson(),
    }
}
