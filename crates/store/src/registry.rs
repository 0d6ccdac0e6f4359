use std::collections::HashMap;

use tracing::{error, info, warn};

use intake_core::domain::account::{Account, Department};

use crate::record::{fields, RecordStore, SearchFilter};

/// Allow-list of chat identities, loaded once at startup from the users
/// table. Unknown identities are denied; rows without a chat id are skipped.
#[derive(Debug, Default)]
pub struct AccessRegistry {
    accounts: HashMap<String, Account>,
}

impl AccessRegistry {
    /// Loads every account. A load failure yields an empty registry rather
    /// than a startup abort, so the process can still serve its health
    /// endpoint while the store is down.
    pub async fn load(store: &dyn RecordStore, users_table: &str) -> Self {
        let records = match store.search(users_table, &SearchFilter::All).await {
            Ok(records) => records,
            Err(err) => {
                error!(error = %err, users_table, "failed to load the access registry");
                return Self::default();
            }
        };

        let mut accounts = HashMap::new();
        for record in records {
            let Some(chat_id) = record.text_or_number(fields::CHAT_ID) else {
                warn!(record_id = %record.id, "skipping user row without a chat id");
                continue;
            };

            let department = Department::parse(record.text(fields::DEPARTMENT));
            accounts.insert(chat_id, Account { record_id: record.id, department });
        }

        info!(accounts = accounts.len(), "access registry loaded");
        Self { accounts }
    }

    pub fn account(&self, identity: &str) -> Option<&Account> {
        self.accounts.get(identity)
    }

    /// Flat allow-list check. With `require_administrator` the identity must
    /// also carry the administrator tag.
    pub fn authorize(&self, identity: &str, require_administrator: bool) -> bool {
        match self.accounts.get(identity) {
            Some(account) => !require_administrator || account.department.is_administrator(),
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}
