//! Access to the remote key-field record store: the low-level [`RecordStore`]
//! trait with HTTP and in-memory backends, plus the domain-facing views built
//! on top of it (account registry, product catalog, order vault).

pub mod catalog;
pub mod http;
pub mod memory;
pub mod record;
pub mod registry;
pub mod vault;

pub use catalog::{ProductCatalog, StoreCatalog};
pub use http::HttpRecordStore;
pub use memory::InMemoryRecordStore;
pub use record::{fields, Record, RecordStore, SearchFilter, StoreError};
pub use registry::AccessRegistry;
pub use vault::{OrderVault, StoreVault};
