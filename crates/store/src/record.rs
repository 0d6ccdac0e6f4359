use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use intake_core::domain::RecordId;

/// Field names used across the store tables.
pub mod fields {
    pub const CHAT_ID: &str = "Chat_ID";
    pub const DEPARTMENT: &str = "Department";
    pub const NAME: &str = "Name";
    pub const STOCK: &str = "Stock";
    pub const SIZE: &str = "Size";
    pub const PRODUCTS: &str = "Products";
    pub const QUANTITY: &str = "Quantity";
    pub const RECIPIENT: &str = "Recipient";
    pub const PHONE: &str = "Phone";
    pub const ADDRESS: &str = "Address";
    pub const POSTAL_CODE: &str = "Postal_Code";
    pub const DELIVERY_METHOD: &str = "Delivery_Method";
    pub const STATUS: &str = "Status";
    pub const OWNER: &str = "User";
    pub const TRACKING: &str = "Tracking_Number";
    pub const ORDER_NUMBER: &str = "Order_Number";
    pub const CUSTOM_NAME: &str = "Custom_Name";
    pub const CREATED_AT: &str = "Created_At";
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store request failed: {0}")]
    Request(String),
    #[error("store returned status {status} for {context}")]
    Status { status: u16, context: String },
    #[error("could not decode store response: {0}")]
    Decode(String),
}

/// One row of a store table. Fields are loosely typed on the wire, so typed
/// access goes through the accessors below.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub fields: Map<String, Value>,
}

impl Record {
    pub fn text(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str).map(str::trim).filter(|text| !text.is_empty())
    }

    pub fn number(&self, key: &str) -> Option<i64> {
        self.fields.get(key).and_then(Value::as_i64)
    }

    /// First id of a linked-record field. Link fields hold arrays of ids.
    pub fn first_link(&self, key: &str) -> Option<RecordId> {
        self.fields
            .get(key)?
            .as_array()?
            .first()?
            .as_str()
            .map(|id| RecordId(id.to_owned()))
    }

    /// Some fields hold text in one base and numbers in another.
    pub fn text_or_number(&self, key: &str) -> Option<String> {
        match self.fields.get(key)? {
            Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_owned()),
            Value::Number(number) => Some(number.to_string()),
            _ => None,
        }
    }
}

/// Query shape understood by every backend. The HTTP backend renders it into
/// the remote filter formula; the in-memory backend evaluates it directly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SearchFilter {
    All,
    /// In-stock products whose name contains the query, limited to the given
    /// departments. An empty department list means no department restriction.
    ProductQuery { name_contains: String, departments: Vec<String> },
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn search(&self, table: &str, filter: &SearchFilter) -> Result<Vec<Record>, StoreError>;

    async fn get(&self, table: &str, id: &RecordId) -> Result<Option<Record>, StoreError>;

    async fn insert(&self, table: &str, fields: Map<String, Value>) -> Result<Record, StoreError>;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::Record;
    use intake_core::domain::RecordId;

    fn record(fields: serde_json::Value) -> Record {
        let serde_json::Value::Object(fields) = fields else {
            panic!("fields fixture must be an object");
        };
        Record { id: RecordId("rec1".to_owned()), fields }
    }

    #[test]
    fn text_ignores_blank_values() {
        let record = record(json!({ "Name": "  ", "Status": " Shipped " }));
        assert_eq!(record.text("Name"), None);
        assert_eq!(record.text("Status"), Some("Shipped"));
    }

    #[test]
    fn first_link_reads_the_head_of_a_link_array() {
        let record = record(json!({ "User": ["recOwner", "recOther"] }));
        assert_eq!(record.first_link("User"), Some(RecordId("recOwner".to_owned())));
        assert_eq!(record.first_link("Missing"), None);
    }

    #[test]
    fn text_or_number_accepts_both_shapes() {
        let record = record(json!({ "Order_Number": 17, "Chat_ID": "99100" }));
        assert_eq!(record.text_or_number("Order_Number"), Some("17".to_owned()));
        assert_eq!(record.text_or_number("Chat_ID"), Some("99100".to_owned()));
    }
}
