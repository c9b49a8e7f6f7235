//! Document type stored in collections
//!
//! A document is a JSON object carrying a mandatory `_id` field. Domain values
//! are mapped to and from documents at the store boundary with
//! [`Document::encode`] and [`Document::decode`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, StoreError};

/// A keyed JSON object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Identity of the document within its collection
    #[serde(rename = "_id")]
    pub id: String,

    /// Remaining fields of the object
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Document {
    /// Create an empty document with the given id
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fields: Map::new(),
        }
    }

    /// Encode any serializable value as a document.
    ///
    /// The value must serialize to a JSON object. A `_id` field in the value
    /// is replaced by `id`.
    pub fn encode<T: Serialize>(id: impl Into<String>, value: &T) -> Result<Self> {
        match serde_json::to_value(value)? {
            Value::Object(mut fields) => {
                fields.remove("_id");
                Ok(Self {
                    id: id.into(),
                    fields,
                })
            }
            other => Err(StoreError::invalid_document(format!(
                "expected an object, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Decode the document fields into a domain value
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(T::deserialize(Value::Object(self.fields.clone()))?)
    }

    /// Get a single field
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Set a single field, returning the document for chaining
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    /// A single JSON object including `_id`
    pub fn to_value(&self) -> Value {
        self.clone().into_value()
    }

    /// Convert into a single JSON object including `_id`
    pub fn into_value(self) -> Value {
        let mut fields = self.fields;
        fields.insert("_id".to_string(), Value::String(self.id));
        Value::Object(fields)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
