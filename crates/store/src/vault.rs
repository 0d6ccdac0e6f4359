use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;

use intake_core::config::StoreConfig;
use intake_core::domain::order::{DraftKind, OrderDraft, OrderReceipt, STATUS_PROCESSING};
use intake_core::domain::RecordId;
use intake_core::reconcile::FetchedOrder;

use crate::record::{fields, Record, RecordStore, SearchFilter, StoreError};

/// Persistence and read-back of submitted orders. Catalog and custom orders
/// live in separate tables but share the recipient and status fields.
#[async_trait]
pub trait OrderVault: Send + Sync {
    async fn submit(&self, draft: &OrderDraft) -> Result<OrderReceipt, StoreError>;

    /// Every order row from both tables, keyed by record id. Feeds the
    /// reconciliation diff.
    async fn fetch_status_rows(&self) -> Result<HashMap<RecordId, FetchedOrder>, StoreError>;

    /// Fresh point read of the owner's chat identity. Looked up per change so
    /// a reassigned chat id takes effect without a restart.
    async fn chat_identity_for(&self, owner: &RecordId) -> Result<Option<String>, StoreError>;

    /// Formatted history blocks for one owner, newest data as stored.
    async fn history_for(&self, owner: &RecordId) -> Result<Vec<String>, StoreError>;
}

pub struct StoreVault<S> {
    store: Arc<S>,
    users_table: String,
    products_table: String,
    orders_table: String,
    custom_orders_table: String,
}

impl<S: RecordStore> StoreVault<S> {
    pub fn new(store: Arc<S>, config: &StoreConfig) -> Self {
        Self {
            store,
            users_table: config.users_table.clone(),
            products_table: config.products_table.clone(),
            orders_table: config.orders_table.clone(),
            custom_orders_table: config.custom_orders_table.clone(),
        }
    }

    async fn rows_of(&self, table: &str) -> Result<Vec<Record>, StoreError> {
        self.store.search(table, &SearchFilter::All).await
    }

    async fn product_name(
        &self,
        cache: &mut HashMap<String, String>,
        id: &str,
    ) -> Result<String, StoreError> {
        if let Some(name) = cache.get(id) {
            return Ok(name.clone());
        }

        let name = self
            .store
            .get(&self.products_table, &RecordId(id.to_owned()))
            .await?
            .as_ref()
            .and_then(|record| record.text(fields::NAME))
            .map(str::to_owned)
            .unwrap_or_else(|| "(removed product)".to_owned());

        cache.insert(id.to_owned(), name.clone());
        Ok(name)
    }

    async fn history_block(
        &self,
        cache: &mut HashMap<String, String>,
        record: &Record,
        custom: bool,
    ) -> Result<String, StoreError> {
        let number = record
            .text_or_number(fields::ORDER_NUMBER)
            .unwrap_or_else(|| record.id.0.clone());
        let status = record.text(fields::STATUS).unwrap_or("unknown");

        let mut lines = vec![format!("Order {number}")];
        if custom {
            let name = record.text(fields::CUSTOM_NAME).unwrap_or("(no description)");
            lines.push(format!("Item: {name}"));
        } else {
            lines.push(format!("Items: {}", self.item_summary(cache, record).await?));
        }
        lines.push(format!("Status: {status}"));
        if let Some(created) = record.text(fields::CREATED_AT) {
            lines.push(format!("Created: {created}"));
        }
        if let Some(tracking) = record.text(fields::TRACKING) {
            lines.push(format!("Tracking: {tracking}"));
        }

        Ok(lines.join("\n"))
    }

    async fn item_summary(
        &self,
        cache: &mut HashMap<String, String>,
        record: &Record,
    ) -> Result<String, StoreError> {
        let product_ids: Vec<String> = record
            .fields
            .get(fields::PRODUCTS)
            .and_then(Value::as_array)
            .map(|ids| {
                ids.iter().filter_map(Value::as_str).map(str::to_owned).collect()
            })
            .unwrap_or_default();
        let quantities: Vec<&str> =
            record.text(fields::QUANTITY).map(|raw| raw.split(',').collect()).unwrap_or_default();
        let sizes: Vec<&str> =
            record.text(fields::SIZE).map(|raw| raw.split(',').collect()).unwrap_or_default();

        let mut parts = Vec::with_capacity(product_ids.len());
        for (position, id) in product_ids.iter().enumerate() {
            let name = self.product_name(cache, id).await?;
            let quantity = quantities.get(position).map(|q| q.trim()).unwrap_or("?");
            let size = sizes.get(position).map(|s| s.trim()).filter(|s| *s != "none" && !s.is_empty());
            match size {
                Some(size) => parts.push(format!("{name} x{quantity} (size {size})")),
                None => parts.push(format!("{name} x{quantity}")),
            }
        }

        Ok(parts.join(", "))
    }
}

fn status_row(record: &Record) -> FetchedOrder {
    FetchedOrder {
        status: record.text(fields::STATUS).unwrap_or_default().to_owned(),
        tracking: record.text(fields::TRACKING).map(str::to_owned),
        order_number: record
            .text_or_number(fields::ORDER_NUMBER)
            .unwrap_or_else(|| record.id.0.clone()),
        owner: record.first_link(fields::OWNER),
    }
}

fn common_fields(draft: &OrderDraft, map: &mut Map<String, Value>) {
    map.insert(fields::RECIPIENT.to_owned(), Value::String(draft.recipient.clone()));
    map.insert(fields::PHONE.to_owned(), Value::String(draft.phone.clone()));
    map.insert(fields::ADDRESS.to_owned(), Value::String(draft.address.clone()));
    map.insert(fields::POSTAL_CODE.to_owned(), Value::String(draft.postal_code.clone()));
    map.insert(fields::DELIVERY_METHOD.to_owned(), Value::String(draft.delivery.clone()));
    map.insert(fields::STATUS.to_owned(), Value::String(STATUS_PROCESSING.to_owned()));
    map.insert(fields::OWNER.to_owned(), Value::Array(vec![Value::String(draft.owner.0.clone())]));
}

#[async_trait]
impl<S: RecordStore> OrderVault for StoreVault<S> {
    async fn submit(&self, draft: &OrderDraft) -> Result<OrderReceipt, StoreError> {
        let mut map = Map::new();
        common_fields(draft, &mut map);

        let table = match &draft.kind {
            DraftKind::Catalog { product_ids, quantities, sizes } => {
                map.insert(
                    fields::PRODUCTS.to_owned(),
                    Value::Array(
                        product_ids.iter().map(|id| Value::String(id.0.clone())).collect(),
                    ),
                );
                map.insert(
                    fields::QUANTITY.to_owned(),
                    Value::String(
                        quantities
                            .iter()
                            .map(u32::to_string)
                            .collect::<Vec<_>>()
                            .join(","),
                    ),
                );
                map.insert(
                    fields::SIZE.to_owned(),
                    Value::String(
                        sizes
                            .iter()
                            .map(|size| size.as_deref().unwrap_or("none").to_owned())
                            .collect::<Vec<_>>()
                            .join(","),
                    ),
                );
                &self.orders_table
            }
            DraftKind::Custom { name } => {
                map.insert(fields::CUSTOM_NAME.to_owned(), Value::String(name.clone()));
                &self.custom_orders_table
            }
        };

        let record = self.store.insert(table, map).await?;
        let order_number = record
            .text_or_number(fields::ORDER_NUMBER)
            .unwrap_or_else(|| "unknown".to_owned());
        debug!(order_number, kind = draft.kind.type_label(), "order persisted");

        Ok(OrderReceipt { record_id: record.id, order_number })
    }

    async fn fetch_status_rows(&self) -> Result<HashMap<RecordId, FetchedOrder>, StoreError> {
        let mut rows = HashMap::new();
        for table in [&self.orders_table, &self.custom_orders_table] {
            for record in self.rows_of(table).await? {
                rows.insert(record.id.clone(), status_row(&record));
            }
        }
        Ok(rows)
    }

    async fn chat_identity_for(&self, owner: &RecordId) -> Result<Option<String>, StoreError> {
        let record = self.store.get(&self.users_table, owner).await?;
        Ok(record.as_ref().and_then(|record| record.text_or_number(fields::CHAT_ID)))
    }

    async fn history_for(&self, owner: &RecordId) -> Result<Vec<String>, StoreError> {
        let mut cache = HashMap::new();
        let mut blocks = Vec::new();

        for (table, custom) in
            [(&self.orders_table, false), (&self.custom_orders_table, true)]
        {
            for record in self.rows_of(table).await? {
                if record.first_link(fields::OWNER).as_ref() != Some(owner) {
                    continue;
                }
                blocks.push(self.history_block(&mut cache, &record, custom).await?);
            }
        }

        Ok(blocks)
    }
}
