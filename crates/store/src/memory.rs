use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use intake_core::domain::RecordId;

use crate::record::{fields, Record, RecordStore, SearchFilter, StoreError};

/// In-memory backend used by tests and local experiments. Evaluates
/// [`SearchFilter`] directly instead of rendering it into a formula.
#[derive(Default)]
pub struct InMemoryRecordStore {
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    tables: HashMap<String, Vec<Record>>,
    next_id: u64,
    fail_all: bool,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed(&self, table: &str, id: &str, fields: Map<String, Value>) {
        let mut state = self.state.lock().await;
        state
            .tables
            .entry(table.to_owned())
            .or_default()
            .push(Record { id: RecordId(id.to_owned()), fields });
    }

    /// Makes every subsequent call fail, for error-path tests.
    pub async fn set_fail(&self, fail: bool) {
        self.state.lock().await.fail_all = fail;
    }

    /// Swaps a whole table, standing in for remote edits between polls.
    pub async fn replace_table(&self, table: &str, records: Vec<Record>) {
        self.state.lock().await.tables.insert(table.to_owned(), records);
    }

    pub async fn records(&self, table: &str) -> Vec<Record> {
        self.state.lock().await.tables.get(table).cloned().unwrap_or_default()
    }

    fn matches(record: &Record, filter: &SearchFilter) -> bool {
        match filter {
            SearchFilter::All => true,
            SearchFilter::ProductQuery { name_contains, departments } => {
                let name_matches = record
                    .text(fields::NAME)
                    .is_some_and(|name| {
                        name.to_lowercase().contains(&name_contains.to_lowercase())
                    });
                let in_stock = record.number(fields::STOCK).unwrap_or(0) >= 1;
                let department_matches = departments.is_empty()
                    || record
                        .text(fields::DEPARTMENT)
                        .is_some_and(|department| departments.iter().any(|d| d == department));

                name_matches && in_stock && department_matches
            }
        }
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn search(&self, table: &str, filter: &SearchFilter) -> Result<Vec<Record>, StoreError> {
        let state = self.state.lock().await;
        if state.fail_all {
            return Err(StoreError::Request("simulated outage".to_owned()));
        }

        Ok(state
            .tables
            .get(table)
            .map(|records| {
                records.iter().filter(|record| Self::matches(record, filter)).cloned().collect()
            })
            .unwrap_or_default())
    }

    async fn get(&self, table: &str, id: &RecordId) -> Result<Option<Record>, StoreError> {
        let state = self.state.lock().await;
        if state.fail_all {
            return Err(StoreError::Request("simulated outage".to_owned()));
        }

        Ok(state
            .tables
            .get(table)
            .and_then(|records| records.iter().find(|record| &record.id == id))
            .cloned())
    }

    async fn insert(&self, table: &str, mut fields: Map<String, Value>) -> Result<Record, StoreError> {
        let mut state = self.state.lock().await;
        if state.fail_all {
            return Err(StoreError::Request("simulated outage".to_owned()));
        }

        state.next_id += 1;
        let id = format!("rec{}", state.next_id);

        // The live store assigns order numbers server-side; mirror that here
        // so callers can rely on the field being present after an insert.
        if !fields.contains_key(fields::ORDER_NUMBER) {
            fields.insert(
                fields::ORDER_NUMBER.to_owned(),
                Value::String(format!("A-{:04}", state.next_id)),
            );
        }

        let record = Record { id: RecordId(id), fields };
        state.tables.entry(table.to_owned()).or_default().push(record.clone());
        Ok(record)
    }
}
