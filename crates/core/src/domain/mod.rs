use serde::{Deserialize, Serialize};

pub mod account;
pub mod order;
pub mod product;

/// Identifier of a row in the remote record store (accounts and orders alike).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId(pub String);

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
