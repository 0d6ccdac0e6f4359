use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductId(pub String);

impl std::fmt::Display for ProductId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A catalog product as read from the remote store. `sizes` is empty for
/// products sold without a size variant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub sizes: Vec<String>,
    pub stock: i64,
    pub department: Option<String>,
}

impl Product {
    pub fn has_sizes(&self) -> bool {
        !self.sizes.is_empty()
    }
}

/// Splits the store's comma-separated size field into selectable options.
pub fn parse_sizes(raw: &str) -> Vec<String> {
    raw.split(',').map(str::trim).filter(|size| !size.is_empty()).map(str::to_owned).collect()
}
