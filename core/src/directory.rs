// Copyright 2026 MX Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Directory state: components keyed by peer id, message types keyed by
//! numeric type and by name. Touched only from the event-loop thread, per
//! the concurrency model — no internal locking here, the same way the
//! teacher's `p2p::peers::Peers` is the single place that knows about all
//! connected peers, except here ownership is exclusive to one thread rather
//! than shared behind an `RwLock`.

use crate::conn::Peer;
use crate::event::PeerId;
use std::collections::HashMap;
use std::sync::Arc;

/// Message type ids below this are reserved for the twelve built-in control
/// messages.
pub const FIRST_USER_TYPE: u32 = 12;

#[derive(Debug, Clone)]
pub struct MessageTypeRecord {
    pub msg_type: u32,
    pub name: Option<String>,
}

#[derive(Default)]
pub struct Directory {
    components: HashMap<PeerId, Arc<Peer>>,
    by_type: HashMap<u32, MessageTypeRecord>,
    by_name: HashMap<String, u32>,
    next_type: u32,
    next_component_id: u16,
}

impl Directory {
    pub fn new() -> Self {
        Directory {
            components: HashMap::new(),
            by_type: HashMap::new(),
            by_name: HashMap::new(),
            next_type: FIRST_USER_TYPE,
            // Id 0 is the master's own (`LocalComponent { id: 0, .. }` in
            // `build_master`); client ids are assigned starting at 1, per
            // S1's expectation that the first client gets id 1.
            next_component_id: 1,
        }
    }

    pub fn insert_peer(&mut self, peer: Arc<Peer>) {
        self.components.insert(peer.id, peer);
    }

    pub fn remove_peer(&mut self, id: PeerId) -> Option<Arc<Peer>> {
        self.components.remove(&id)
    }

    pub fn peer(&self, id: PeerId) -> Option<&Arc<Peer>> {
        self.components.get(&id)
    }

    pub fn peers(&self) -> impl Iterator<Item = &Arc<Peer>> {
        self.components.values()
    }

    pub fn peer_count(&self) -> usize {
        self.components.len()
    }

    /// The master's monotonically increasing component-id counter. Ids are
    /// never reused, unlike the name suffix below.
    pub fn next_component_id(&mut self) -> u16 {
        let id = self.next_component_id;
        self.next_component_id += 1;
        id
    }

    /// Computes `"<requested>/<n>"` where `n` is the 1-based count of
    /// *currently* connected peers whose name already starts with
    /// `requested`. This is a live scan, not a persistent counter, so a
    /// name can be reused after its earlier holder disconnects — the
    /// source does not guarantee uniqueness over time, only at the moment
    /// of assignment, and this matches that rather than inventing a
    /// stronger guarantee.
    pub fn assign_name(&self, requested: &str) -> String {
        let n = self
            .components
            .values()
            .filter(|p| {
                p.info
                    .lock()
                    .expect("peer info lock poisoned")
                    .name
                    .as_deref()
                    .map(|name| name.starts_with(requested))
                    .unwrap_or(false)
            })
            .count()
            + 1;
        format!("{}/{}", requested, n)
    }

    pub fn component_name(&self, id: PeerId) -> Option<String> {
        self.components
            .get(&id)
            .and_then(|p| p.info.lock().expect("peer info lock poisoned").name.clone())
    }

    /// Looks up a type by name, allocating a fresh id if it doesn't exist
    /// yet. Returns `(id, true)` if this call allocated a new id. An empty
    /// name always allocates a fresh anonymous type, matching how a
    /// `RegisterRequest` with no name is handled.
    pub fn register_type(&mut self, name: &str) -> (u32, bool) {
        if name.is_empty() {
            let id = self.next_type;
            self.next_type += 1;
            self.by_type.insert(
                id,
                MessageTypeRecord {
                    msg_type: id,
                    name: None,
                },
            );
            return (id, true);
        }
        if let Some(&id) = self.by_name.get(name) {
            return (id, false);
        }
        let id = self.next_type;
        self.next_type += 1;
        self.by_type.insert(
            id,
            MessageTypeRecord {
                msg_type: id,
                name: Some(name.to_string()),
            },
        );
        self.by_name.insert(name.to_string(), id);
        (id, true)
    }

    /// Creates a nameless type record for `id` if it doesn't exist yet —
    /// used when a `SubscribeUpdate`/`CancelUpdate` mentions a type this
    /// process has not yet heard a `RegisterReport` for.
    pub fn ensure_type(&mut self, id: u32) {
        self.by_type.entry(id).or_insert_with(|| MessageTypeRecord {
            msg_type: id,
            name: None,
        });
        if id >= self.next_type {
            self.next_type = id + 1;
        }
    }

    /// Fills in the name of a type learned later via `RegisterReport`.
    pub fn name_type(&mut self, id: u32, name: String) {
        if let Some(rec) = self.by_type.get_mut(&id) {
            rec.name = Some(name.clone());
        } else {
            self.by_type.insert(
                id,
                MessageTypeRecord {
                    msg_type: id,
                    name: Some(name.clone()),
                },
            );
        }
        self.by_name.insert(name, id);
    }

    pub fn type_name(&self, id: u32) -> Option<String> {
        self.by_type.get(&id).and_then(|r| r.name.clone())
    }

    /// Looks up a type's id by name without allocating, so a client can
    /// skip the master round-trip for a name it already learned via an
    /// earlier `RegisterReport` (S2).
    pub fn type_id_by_name(&self, name: &str) -> Option<u32> {
        self.by_name.get(name).copied()
    }

    pub fn known_types(&self) -> impl Iterator<Item = &MessageTypeRecord> {
        self.by_type.values()
    }

    /// Peers currently subscribed to `msg_type`.
    pub fn subscribers(&self, msg_type: u32) -> Vec<PeerId> {
        self.components
            .values()
            .filter(|p| {
                p.info
                    .lock()
                    .expect("peer info lock poisoned")
                    .subscriptions
                    .contains(&msg_type)
            })
            .map(|p| p.id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_register_always_allocates() {
        let mut dir = Directory::new();
        let (a, new_a) = dir.register_type("");
        let (b, new_b) = dir.register_type("");
        assert!(new_a && new_b);
        assert_ne!(a, b);
    }

    #[test]
    fn named_register_is_idempotent() {
        let mut dir = Directory::new();
        let (a, new_a) = dir.register_type("Ping");
        let (b, new_b) = dir.register_type("Ping");
        assert!(new_a);
        assert!(!new_b);
        assert_eq!(a, b);
        assert_eq!(a, FIRST_USER_TYPE);
    }

    #[test]
    fn component_ids_never_reused() {
        let mut dir = Directory::new();
        assert_eq!(dir.next_component_id(), 1);
        assert_eq!(dir.next_component_id(), 2);
    }
}
