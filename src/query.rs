//! Read-only views over the monitor for the HTTP layer and callers embedding
//! the library.

use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::history::{HistoryStore, Window};
use crate::hub::{MessageKind, PushMessage};
use crate::roles::{Role, Sample};
use crate::sampler::{Inventory, InventorySlot, ProcessStatus};
use crate::trend::{TrendAnalyzer, TrendState};

/// Whether a role produced a sample in the most recent tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Availability {
    Available,
    Unavailable,
}

/// Latest known state of a role.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleSnapshot {
    pub status: Availability,
    /// Last recorded sample, possibly older than the latest tick.
    pub latest: Option<Sample>,
    pub trend: TrendState,
}

/// Samples for one role in chronological order.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub role: Role,
    pub status: Availability,
    pub samples: Vec<Sample>,
}

/// Query facade. Cheap to clone.
#[derive(Clone)]
pub struct QueryApi {
    store: Arc<HistoryStore>,
    analyzer: Arc<TrendAnalyzer>,
    inventory: InventorySlot,
}

impl QueryApi {
    pub fn new(store: Arc<HistoryStore>, analyzer: Arc<TrendAnalyzer>, inventory: InventorySlot) -> Self {
        Self {
            store,
            analyzer,
            inventory,
        }
    }

    fn status_of(inventory: &Inventory, role: Role) -> Availability {
        match inventory.entry(role) {
            Some(e) if e.status == ProcessStatus::Sampled => Availability::Available,
            _ => Availability::Unavailable,
        }
    }

    /// Latest sample, trend and availability for every role.
    pub fn snapshot(&self) -> BTreeMap<Role, RoleSnapshot> {
        let inventory = self.process_inventory();
        Role::ALL
            .into_iter()
            .map(|role| {
                let snap = RoleSnapshot {
                    status: Self::status_of(&inventory, role),
                    latest: self.store.latest(role),
                    trend: self.analyzer.current(role),
                };
                (role, snap)
            })
            .collect()
    }

    /// Samples for `role` within `window`.
    pub fn history(&self, role: Role, window: Window) -> HistoryResponse {
        let inventory = self.process_inventory();
        HistoryResponse {
            role,
            status: Self::status_of(&inventory, role),
            samples: self.store.range(role, window),
        }
    }

    /// Classification result of the latest tick.
    pub fn process_inventory(&self) -> Arc<Inventory> {
        match self.inventory.read() {
            Ok(g) => Arc::clone(&g),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Snapshot messages a new push subscriber receives first. Roles with no
    /// recorded sample are omitted.
    pub fn snapshot_messages(&self) -> Vec<PushMessage> {
        Role::ALL
            .into_iter()
            .filter_map(|role| {
                let sample = self.store.latest(role)?;
                let trend = self.analyzer.current(role);
                Some(PushMessage::new(MessageKind::Snapshot, &sample, &trend))
            })
            .collect()
    }
}
