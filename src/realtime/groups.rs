use std::collections::HashMap;

use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::realtime::events::ServerEvent;

/// Shared pool of currently-connected, currently-available driver sessions.
pub const AVAILABLE_DRIVERS: &str = "drivers:available";

/// Private per-actor group for direct delivery.
pub fn user_group(actor_id: Uuid) -> String {
    format!("user:{actor_id}")
}

pub type Outbox = mpsc::UnboundedSender<ServerEvent>;

/// Connection-scoped group membership: group name -> connection id -> outbox.
/// Join and leave are the only mutators. Delivery is fire-and-forget; senders
/// whose connection has gone away are dropped on the next send.
#[derive(Default)]
pub struct GroupRegistry {
    groups: DashMap<String, HashMap<Uuid, Outbox>>,
}

impl GroupRegistry {
    pub fn join(&self, group: &str, conn_id: Uuid, outbox: Outbox) {
        self.groups
            .entry(group.to_string())
            .or_default()
            .insert(conn_id, outbox);
    }

    pub fn leave(&self, group: &str, conn_id: Uuid) {
        if let Some(mut members) = self.groups.get_mut(group) {
            members.remove(&conn_id);
        }
        self.groups.remove_if(group, |_, members| members.is_empty());
    }

    pub fn leave_all(&self, conn_id: Uuid) {
        for mut entry in self.groups.iter_mut() {
            entry.value_mut().remove(&conn_id);
        }
        self.groups.retain(|_, members| !members.is_empty());
    }

    pub fn contains(&self, group: &str, conn_id: Uuid) -> bool {
        self.groups
            .get(group)
            .map(|members| members.contains_key(&conn_id))
            .unwrap_or(false)
    }

    pub fn member_count(&self, group: &str) -> usize {
        self.groups.get(group).map(|m| m.len()).unwrap_or(0)
    }

    pub fn members(&self, group: &str) -> Vec<(Uuid, Outbox)> {
        self.groups
            .get(group)
            .map(|members| {
                members
                    .iter()
                    .map(|(id, tx)| (*id, tx.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Deliver to every member of a group. Not guaranteed to complete before
    /// the triggering request is answered; dead connections are pruned.
    pub fn send_to(&self, group: &str, event: &ServerEvent) {
        if let Some(mut members) = self.groups.get_mut(group) {
            members.retain(|_, outbox| outbox.send(event.clone()).is_ok());
        }
    }
}
