use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{error, info, warn};

use intake_chat::NotificationSink;
use intake_core::reconcile::{diff_cycle, ChangeKind, OrderChange, Snapshot};
use intake_store::OrderVault;

/// Order-status snapshot shared between the session service (which inserts
/// freshly submitted orders) and the reconciliation loop (which diffs it).
pub type SharedSnapshot = Arc<Mutex<Snapshot>>;

/// Periodic loop that re-reads every order row, diffs it against the shared
/// snapshot, and notifies owners about status and tracking changes.
pub struct Reconciler<V, N> {
    vault: Arc<V>,
    notifier: Arc<N>,
    snapshot: SharedSnapshot,
    interval: Duration,
}

impl<V: OrderVault, N: NotificationSink> Reconciler<V, N> {
    pub fn new(vault: Arc<V>, notifier: Arc<N>, snapshot: SharedSnapshot, interval: Duration) -> Self {
        Self { vault, notifier, snapshot, interval }
    }

    pub async fn run(&self) {
        info!(
            event_name = "system.reconcile.start",
            interval_secs = self.interval.as_secs(),
            "reconciliation loop started"
        );
        let mut ticker = tokio::time::interval(self.interval);

        loop {
            ticker.tick().await;
            if let Err(err) = self.cycle().await {
                // The snapshot is untouched on a failed fetch, so the next
                // successful cycle picks up everything that changed meanwhile.
                error!(event_name = "system.reconcile.cycle_failed", error = %err, "reconciliation cycle failed");
            }
        }
    }

    pub async fn cycle(&self) -> Result<(), intake_store::StoreError> {
        let fetched = self.vault.fetch_status_rows().await?;

        let changes = {
            let mut snapshot = self.snapshot.lock().await;
            diff_cycle(&mut snapshot, fetched)
        };

        for change in changes {
            self.dispatch(change).await;
        }
        Ok(())
    }

    async fn dispatch(&self, change: OrderChange) {
        let Some(owner) = &change.owner else {
            warn!(
                order_number = %change.order_number,
                "order changed but has no owner, skipping notification"
            );
            return;
        };

        // Fresh lookup per change: a chat id reassigned in the users table
        // takes effect immediately.
        let identity = match self.vault.chat_identity_for(owner).await {
            Ok(Some(identity)) => identity,
            Ok(None) => {
                warn!(
                    order_number = %change.order_number,
                    owner = %owner,
                    "owner has no chat identity, skipping notification"
                );
                return;
            }
            Err(err) => {
                error!(
                    order_number = %change.order_number,
                    owner = %owner,
                    error = %err,
                    "failed to resolve the owner's chat identity"
                );
                return;
            }
        };

        let text = match &change.kind {
            ChangeKind::Status { from, to } => format!(
                "The status of your order #{} changed from '{from}' to '{to}'.",
                change.order_number
            ),
            ChangeKind::Tracking { tracking } => {
                format!("Tracking number for your order #{}: {tracking}", change.order_number)
            }
        };

        if let Err(err) = self.notifier.notify(&identity, &text).await {
            error!(
                order_number = %change.order_number,
                error = %err,
                "failed to deliver an order change notification"
            );
        }
    }
}
