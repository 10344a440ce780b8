// Copyright 2025 HEM Sp. z o.o.
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

use std::collections::{BTreeMap, HashMap};

use log::{debug, warn};

use crate::definitions::{ClientEventId, EventState, ServerEventId, WireProperties};

/// One outstanding or recently active feedback request.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub client_id: ClientEventId,
    pub server_id: Option<ServerEventId>,
    pub name: String,
    pub properties: WireProperties,
    pub state: EventState,
    pub pending_state: Option<EventState>,
}

/// Read-only view of a tracked event handed out to callers.
#[derive(Debug, Clone, PartialEq)]
pub struct EventSnapshot {
    pub client_id: ClientEventId,
    pub server_id: Option<ServerEventId>,
    pub name: String,
    pub state: EventState,
    pub pending_state: Option<EventState>,
}

impl From<&Event> for EventSnapshot {
    fn from(event: &Event) -> Self {
        Self {
            client_id: event.client_id,
            server_id: event.server_id,
            name: event.name.clone(),
            state: event.state,
            pending_state: event.pending_state,
        }
    }
}

/// Owns every in-flight event.
///
/// Events live in a single table keyed by client id; the server id index only
/// points back into that table, so an event is never stored twice.
pub struct EventRegistry {
    events: BTreeMap<ClientEventId, Event>,
    server_index: HashMap<ServerEventId, ClientEventId>,
    // None once u32::MAX has been handed out.
    next_client_id: Option<u32>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self {
            events: BTreeMap::new(),
            server_index: HashMap::new(),
            next_client_id: Some(1), // Start from 1
        }
    }

    #[cfg(test)]
    pub(crate) fn starting_at(next_client_id: u32) -> Self {
        Self { next_client_id: Some(next_client_id), ..Self::new() }
    }

    /// Creates a `New` event and returns its freshly issued client id, or
    /// `None` once every id of this session has been used.
    pub fn allocate(&mut self, name: &str, properties: WireProperties) -> Option<ClientEventId> {
        let client_id = ClientEventId(self.next_client_id?);
        self.next_client_id = client_id.0.checked_add(1);

        self.events.insert(client_id, Event {
            client_id,
            server_id: None,
            name: name.to_string(),
            properties,
            state: EventState::New,
            pending_state: None,
        });
        debug!("Event {} allocated for '{}'", client_id, name);
        Some(client_id)
    }

    pub fn find_by_client_id(&self, client_id: ClientEventId) -> Option<&Event> {
        self.events.get(&client_id)
    }

    pub fn find_by_client_id_mut(&mut self, client_id: ClientEventId) -> Option<&mut Event> {
        self.events.get_mut(&client_id)
    }

    pub fn find_by_server_id(&self, server_id: ServerEventId) -> Option<ClientEventId> {
        self.server_index.get(&server_id).copied()
    }

    /// Returns false without touching anything if the client id is unknown,
    /// already carries a server id, or the server id belongs to another event.
    pub fn attach_server_id(&mut self, client_id: ClientEventId, server_id: ServerEventId) -> bool {
        if let Some(owner) = self.server_index.get(&server_id) {
            warn!("Server id {} already owned by event {}", server_id, owner);
            return false;
        }
        let Some(event) = self.events.get_mut(&client_id) else {
            return false;
        };
        if event.server_id.is_some() {
            return false;
        }
        event.server_id = Some(server_id);
        self.server_index.insert(server_id, client_id);
        true
    }

    pub fn remove(&mut self, client_id: ClientEventId) -> Option<Event> {
        let event = self.events.remove(&client_id)?;
        if let Some(server_id) = event.server_id {
            self.server_index.remove(&server_id);
        }
        Some(event)
    }

    /// Empties the registry, returning the removed events in client id order.
    pub fn remove_all(&mut self) -> Vec<Event> {
        self.server_index.clear();
        std::mem::take(&mut self.events).into_values().collect()
    }

    pub fn client_ids_by_name(&self, name: &str) -> Vec<ClientEventId> {
        self.events
            .values()
            .filter(|event| event.name == name)
            .map(|event| event.client_id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl Default for EventRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allocate(registry: &mut EventRegistry, name: &str) -> ClientEventId {
        registry.allocate(name, WireProperties::new()).unwrap()
    }

    #[test]
    fn allocation_stops_after_the_last_id() {
        let mut registry = EventRegistry::new();
        registry.next_client_id = Some(u32::MAX - 1);

        assert_eq!(registry.allocate("ringtone", WireProperties::new()), Some(ClientEventId(u32::MAX - 1)));
        assert_eq!(registry.allocate("ringtone", WireProperties::new()), Some(ClientEventId(u32::MAX)));
        assert_eq!(registry.allocate("ringtone", WireProperties::new()), None);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn client_ids_are_monotonic_and_never_reused() {
        let mut registry = EventRegistry::new();
        let a = allocate(&mut registry, "ringtone");
        let b = allocate(&mut registry, "ringtone");
        registry.remove(b);
        let c = allocate(&mut registry, "chat");

        assert_eq!(a, ClientEventId(1));
        assert_eq!(b, ClientEventId(2));
        assert_eq!(c, ClientEventId(3));
        assert_eq!(registry.find_by_client_id(a).map(|e| e.state), Some(EventState::New));
    }

    #[test]
    fn attach_server_id_only_once() {
        let mut registry = EventRegistry::new();
        let a = allocate(&mut registry, "ringtone");

        assert!(registry.attach_server_id(a, ServerEventId(10)));
        assert!(!registry.attach_server_id(a, ServerEventId(11)));
        assert_eq!(registry.find_by_server_id(ServerEventId(10)), Some(a));
        assert_eq!(registry.find_by_server_id(ServerEventId(11)), None);
    }

    #[test]
    fn attach_server_id_rejects_unknown_client_and_taken_server_id() {
        let mut registry = EventRegistry::new();
        let a = allocate(&mut registry, "ringtone");
        let b = allocate(&mut registry, "chat");

        assert!(!registry.attach_server_id(ClientEventId(99), ServerEventId(1)));
        assert!(registry.attach_server_id(a, ServerEventId(1)));
        assert!(!registry.attach_server_id(b, ServerEventId(1)));
        assert_eq!(registry.find_by_client_id(b).and_then(|e| e.server_id), None);
    }

    #[test]
    fn remove_is_idempotent_and_clears_server_index() {
        let mut registry = EventRegistry::new();
        let a = allocate(&mut registry, "ringtone");
        registry.attach_server_id(a, ServerEventId(5));

        assert!(registry.remove(a).is_some());
        assert!(registry.remove(a).is_none());
        assert_eq!(registry.find_by_server_id(ServerEventId(5)), None);
        assert!(registry.is_empty());
    }

    #[test]
    fn remove_all_returns_everything_in_order() {
        let mut registry = EventRegistry::new();
        let a = allocate(&mut registry, "ringtone");
        let b = allocate(&mut registry, "chat");
        registry.attach_server_id(b, ServerEventId(7));

        let removed: Vec<ClientEventId> = registry.remove_all().iter().map(|e| e.client_id).collect();
        assert_eq!(removed, vec![a, b]);
        assert!(registry.is_empty());
        assert_eq!(registry.find_by_server_id(ServerEventId(7)), None);
    }

    #[test]
    fn lookup_by_name_returns_all_matches() {
        let mut registry = EventRegistry::new();
        let a = allocate(&mut registry, "ringtone");
        allocate(&mut registry, "chat");
        let c = allocate(&mut registry, "ringtone");

        assert_eq!(registry.client_ids_by_name("ringtone"), vec![a, c]);
        assert!(registry.client_ids_by_name("battery_low").is_empty());
        assert_eq!(registry.len(), 3);
    }
}
