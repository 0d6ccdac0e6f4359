use std::sync::Arc;

use async_trait::async_trait;

use intake_core::domain::account::Department;
use intake_core::domain::product::{parse_sizes, Product, ProductId};
use intake_core::domain::RecordId;

use crate::record::{fields, Record, RecordStore, SearchFilter, StoreError};

/// Product lookups as the dialogue needs them: a scoped search over the
/// catalog and a fresh point read at selection time.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn search_visible(
        &self,
        query: &str,
        department: &Department,
    ) -> Result<Vec<Product>, StoreError>;

    async fn fetch(&self, id: &ProductId) -> Result<Option<Product>, StoreError>;
}

pub struct StoreCatalog<S> {
    store: Arc<S>,
    products_table: String,
}

impl<S: RecordStore> StoreCatalog<S> {
    pub fn new(store: Arc<S>, products_table: impl Into<String>) -> Self {
        Self { store, products_table: products_table.into() }
    }
}

#[async_trait]
impl<S: RecordStore> ProductCatalog for StoreCatalog<S> {
    async fn search_visible(
        &self,
        query: &str,
        department: &Department,
    ) -> Result<Vec<Product>, StoreError> {
        let filter = SearchFilter::ProductQuery {
            name_contains: query.to_owned(),
            departments: department.search_scope(),
        };

        let records = self.store.search(&self.products_table, &filter).await?;
        Ok(records.iter().filter_map(product_from_record).collect())
    }

    async fn fetch(&self, id: &ProductId) -> Result<Option<Product>, StoreError> {
        let record = self.store.get(&self.products_table, &RecordId(id.0.clone())).await?;
        Ok(record.as_ref().and_then(product_from_record))
    }
}

/// A row without a name is unusable and is dropped rather than surfaced.
fn product_from_record(record: &Record) -> Option<Product> {
    let name = record.text(fields::NAME)?.to_owned();
    Some(Product {
        id: ProductId(record.id.0.clone()),
        name,
        sizes: record.text(fields::SIZE).map(parse_sizes).unwrap_or_default(),
        stock: record.number(fields::STOCK).unwrap_or(0),
        department: record.text(fields::DEPARTMENT).map(str::to_owned),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::{ProductCatalog, StoreCatalog};
    use crate::memory::InMemoryRecordStore;
    use intake_core::domain::account::Department;
    use intake_core::domain::product::ProductId;

    fn object(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
        let serde_json::Value::Object(map) = value else {
            panic!("fixture must be an object");
        };
        map
    }

    async fn seeded_catalog() -> StoreCatalog<InMemoryRecordStore> {
        let store = InMemoryRecordStore::new();
        store
            .seed(
                "Products",
                "rec1",
                object(json!({ "Name": "Shirt", "Stock": 4, "Size": "S, M, L", "Department": "Common" })),
            )
            .await;
        store
            .seed(
                "Products",
                "rec2",
                object(json!({ "Name": "Desk Shirt Folder", "Stock": 2, "Department": "Logistics" })),
            )
            .await;
        store.seed("Products", "rec3", object(json!({ "Stock": 9 }))).await;

        StoreCatalog::new(Arc::new(store), "Products")
    }

    #[tokio::test]
    async fn search_is_scoped_to_the_department_and_common() {
        let catalog = seeded_catalog().await;

        let common_only = catalog.search_visible("shirt", &Department::Common).await.unwrap();
        assert_eq!(common_only.len(), 1);
        assert_eq!(common_only[0].sizes, vec!["S", "M", "L"]);

        let logistics = catalog
            .search_visible("shirt", &Department::Named("Logistics".to_owned()))
            .await
            .unwrap();
        assert_eq!(logistics.len(), 2);
    }

    #[tokio::test]
    async fn administrators_see_every_department() {
        let catalog = seeded_catalog().await;
        let all = catalog.search_visible("shirt", &Department::Administrator).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn fetch_returns_none_for_missing_or_nameless_rows() {
        let catalog = seeded_catalog().await;

        assert!(catalog.fetch(&ProductId("recNope".to_owned())).await.unwrap().is_none());
        assert!(catalog.fetch(&ProductId("rec3".to_owned())).await.unwrap().is_none());

        let shirt = catalog.fetch(&ProductId("rec1".to_owned())).await.unwrap().expect("shirt");
        assert_eq!(shirt.name, "Shirt");
    }
}
