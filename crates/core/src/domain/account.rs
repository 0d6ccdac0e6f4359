use serde::{Deserialize, Serialize};

use super::RecordId;

pub const DEPARTMENT_COMMON: &str = "Common";
pub const DEPARTMENT_ADMINISTRATOR: &str = "Administrator";
pub const DEPARTMENT_UNASSIGNED: &str = "Unassigned";

/// Visibility scope attached to an account. Controls which products the
/// account may search; administrators see every department.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Department {
    Named(String),
    Common,
    Administrator,
    Unassigned,
}

impl Department {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            None | Some("") => Self::Unassigned,
            Some(DEPARTMENT_COMMON) => Self::Common,
            Some(DEPARTMENT_ADMINISTRATOR) => Self::Administrator,
            Some(name) => Self::Named(name.to_owned()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Named(name) => name,
            Self::Common => DEPARTMENT_COMMON,
            Self::Administrator => DEPARTMENT_ADMINISTRATOR,
            Self::Unassigned => DEPARTMENT_UNASSIGNED,
        }
    }

    pub fn is_administrator(&self) -> bool {
        matches!(self, Self::Administrator)
    }

    /// Department labels a non-administrator may search. Administrators get an
    /// empty scope, meaning no department filter at all.
    pub fn search_scope(&self) -> Vec<String> {
        match self {
            Self::Administrator => Vec::new(),
            Self::Common => vec![DEPARTMENT_COMMON.to_owned()],
            other => vec![other.label().to_owned(), DEPARTMENT_COMMON.to_owned()],
        }
    }
}

/// A chat identity resolved to its row in the remote store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub record_id: RecordId,
    pub department: Department,
}
