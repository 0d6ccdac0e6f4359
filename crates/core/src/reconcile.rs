//! Snapshot diffing for the order-status reconciliation loop.
//!
//! Each poll cycle fetches every outstanding order and diffs it against the
//! snapshot kept from the previous cycle. The diff is incremental: a record
//! seen for the first time is recorded silently, a record that disappeared is
//! dropped silently, and only genuine status/tracking transitions produce
//! change events. Because every cycle compares against the immediately
//! preceding one, a failed fetch self-heals on the next successful cycle.

use std::collections::HashMap;

use crate::domain::RecordId;

/// Last known state of one remote order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusEntry {
    pub status: String,
    pub tracking: Option<String>,
    pub order_number: String,
}

/// One order row as returned by the poll fetch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchedOrder {
    pub status: String,
    pub tracking: Option<String>,
    pub order_number: String,
    pub owner: Option<RecordId>,
}

impl FetchedOrder {
    fn as_entry(&self) -> StatusEntry {
        StatusEntry {
            status: self.status.clone(),
            tracking: self.tracking.clone(),
            order_number: self.order_number.clone(),
        }
    }
}

pub type Snapshot = HashMap<RecordId, StatusEntry>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChangeKind {
    Status { from: String, to: String },
    /// Tracking reference newly present or different from the prior value.
    Tracking { tracking: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderChange {
    pub record_id: RecordId,
    pub owner: Option<RecordId>,
    pub order_number: String,
    pub kind: ChangeKind,
}

/// Applies one poll cycle to the snapshot and returns the resulting change
/// events. The snapshot entry is updated to the fetched values whether or not
/// the change can later be delivered.
pub fn diff_cycle(snapshot: &mut Snapshot, fetched: HashMap<RecordId, FetchedOrder>) -> Vec<OrderChange> {
    let mut changes = Vec::new();

    for (record_id, row) in &fetched {
        let Some(previous) = snapshot.get(record_id) else {
            // First observation, not a change.
            snapshot.insert(record_id.clone(), row.as_entry());
            continue;
        };

        if row.status != previous.status {
            changes.push(OrderChange {
                record_id: record_id.clone(),
                owner: row.owner.clone(),
                order_number: row.order_number.clone(),
                kind: ChangeKind::Status {
                    from: previous.status.clone(),
                    to: row.status.clone(),
                },
            });
        }

        if let Some(tracking) = &row.tracking {
            if previous.tracking.as_ref() != Some(tracking) {
                changes.push(OrderChange {
                    record_id: record_id.clone(),
                    owner: row.owner.clone(),
                    order_number: row.order_number.clone(),
                    kind: ChangeKind::Tracking { tracking: tracking.clone() },
                });
            }
        }

        snapshot.insert(record_id.clone(), row.as_entry());
    }

    // Orders deleted remotely vanish from the snapshot without notice.
    snapshot.retain(|record_id, _| fetched.contains_key(record_id));

    changes
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::{diff_cycle, ChangeKind, FetchedOrder, Snapshot};
    use crate::domain::RecordId;

    fn row(status: &str, tracking: Option<&str>) -> FetchedOrder {
        FetchedOrder {
            status: status.to_owned(),
            tracking: tracking.map(str::to_owned),
            order_number: "A-0001".to_owned(),
            owner: Some(RecordId("recUser".to_owned())),
        }
    }

    fn fetched(status: &str, tracking: Option<&str>) -> HashMap<RecordId, FetchedOrder> {
        HashMap::from([(RecordId("recOrder".to_owned()), row(status, tracking))])
    }

    #[test]
    fn first_observation_is_recorded_silently() {
        let mut snapshot = Snapshot::new();
        let changes = diff_cycle(&mut snapshot, fetched("processing", None));

        assert!(changes.is_empty());
        assert_eq!(snapshot.len(), 1);
    }

    #[test]
    fn repeated_cycle_without_remote_change_emits_nothing() {
        let mut snapshot = Snapshot::new();
        diff_cycle(&mut snapshot, fetched("processing", None));
        let second = diff_cycle(&mut snapshot, fetched("processing", None));

        assert!(second.is_empty());
    }

    #[test]
    fn status_and_tracking_change_emit_exactly_two_events() {
        let mut snapshot = Snapshot::new();
        diff_cycle(&mut snapshot, fetched("processing", None));
        let changes = diff_cycle(&mut snapshot, fetched("shipped", Some("T123")));

        assert_eq!(changes.len(), 2);
        assert!(matches!(
            &changes[0].kind,
            ChangeKind::Status { from, to } if from == "processing" && to == "shipped"
        ));
        assert!(matches!(
            &changes[1].kind,
            ChangeKind::Tracking { tracking } if tracking == "T123"
        ));

        let entry = snapshot.get(&RecordId("recOrder".to_owned())).expect("entry kept");
        assert_eq!(entry.status, "shipped");
        assert_eq!(entry.tracking.as_deref(), Some("T123"));
    }

    #[test]
    fn unchanged_tracking_is_not_reannounced() {
        let mut snapshot = Snapshot::new();
        diff_cycle(&mut snapshot, fetched("shipped", Some("T123")));
        let changes = diff_cycle(&mut snapshot, fetched("shipped", Some("T123")));

        assert!(changes.is_empty());
    }

    #[test]
    fn removed_order_leaves_the_snapshot_without_notification() {
        let mut snapshot = Snapshot::new();
        diff_cycle(&mut snapshot, fetched("processing", None));
        let changes = diff_cycle(&mut snapshot, HashMap::new());

        assert!(changes.is_empty());
        assert!(snapshot.is_empty());
    }

    #[test]
    fn tracking_removal_is_silent_but_recorded() {
        let mut snapshot = Snapshot::new();
        diff_cycle(&mut snapshot, fetched("shipped", Some("T123")));
        let changes = diff_cycle(&mut snapshot, fetched("shipped", None));

        assert!(changes.is_empty());
        let entry = snapshot.get(&RecordId("recOrder".to_owned())).expect("entry kept");
        assert_eq!(entry.tracking, None);
    }
}
