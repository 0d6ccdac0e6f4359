pub mod config;
pub mod dialog;
pub mod domain;
pub mod errors;
pub mod reconcile;

pub use domain::account::{Account, Department};
pub use domain::order::{DraftKind, DraftPayload, OrderDraft, OrderReceipt, SelectedItem};
pub use domain::product::{Product, ProductId};
pub use domain::RecordId;
pub use errors::ApplicationError;
