use serde::{Deserialize, Serialize};

use super::product::ProductId;
use super::RecordId;

/// Status the store is asked to assign to every freshly submitted order.
pub const STATUS_PROCESSING: &str = "Processing";

/// One product chosen during a dialogue, with its size variant when the
/// product has any. A product id appears at most once in a selection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedItem {
    pub product_id: ProductId,
    pub name: String,
    pub size: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DraftKind {
    /// Catalog order: the three lists are parallel and of equal length.
    Catalog { product_ids: Vec<ProductId>, quantities: Vec<u32>, sizes: Vec<Option<String>> },
    /// Free-form order for an item that is not in the catalog.
    Custom { name: String },
}

impl DraftKind {
    pub fn type_label(&self) -> &'static str {
        match self {
            Self::Catalog { .. } => "catalog",
            Self::Custom { .. } => "custom",
        }
    }

    pub fn lists_are_consistent(&self) -> bool {
        match self {
            Self::Catalog { product_ids, quantities, sizes } => {
                product_ids.len() == quantities.len()
                    && product_ids.len() == sizes.len()
                    && quantities.iter().all(|quantity| *quantity >= 1)
            }
            Self::Custom { .. } => true,
        }
    }
}

/// Everything the dialogue collects, minus the owning account. The session
/// driver attaches the owner before handing the draft to the order store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftPayload {
    pub kind: DraftKind,
    pub recipient: String,
    pub phone: String,
    pub address: String,
    pub postal_code: String,
    pub delivery: String,
}

impl DraftPayload {
    pub fn with_owner(self, owner: RecordId) -> OrderDraft {
        OrderDraft {
            kind: self.kind,
            recipient: self.recipient,
            phone: self.phone,
            address: self.address,
            postal_code: self.postal_code,
            delivery: self.delivery,
            owner,
        }
    }
}

/// The finalized, immutable order payload written to the remote store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDraft {
    pub kind: DraftKind,
    pub recipient: String,
    pub phone: String,
    pub address: String,
    pub postal_code: String,
    pub delivery: String,
    pub owner: RecordId,
}

/// What the store hands back for a persisted draft. The order number is
/// generated server-side.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderReceipt {
    pub record_id: RecordId,
    pub order_number: String,
}

#[cfg(test)]
mod tests {
    use super::{DraftKind, ProductId};

    #[test]
    fn catalog_lists_must_align() {
        let kind = DraftKind::Catalog {
            product_ids: vec![ProductId("rec1".to_owned()), ProductId("rec2".to_owned())],
            quantities: vec![2, 3],
            sizes: vec![None, Some("M".to_owned())],
        };
        assert!(kind.lists_are_consistent());

        let short = DraftKind::Catalog {
            product_ids: vec![ProductId("rec1".to_owned())],
            quantities: vec![],
            sizes: vec![None],
        };
        assert!(!short.lists_are_consistent());
    }

    #[test]
    fn zero_quantity_is_inconsistent() {
        let kind = DraftKind::Catalog {
            product_ids: vec![ProductId("rec1".to_owned())],
            quantities: vec![0],
            sizes: vec![None],
        };
        assert!(!kind.lists_are_consistent());
    }
}
