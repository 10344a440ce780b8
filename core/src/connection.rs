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

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::debug;

use crate::definitions::ClientEventId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
}

/// Whether plays requested while offline must be sent once the link is up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoStart {
    Idle,
    Armed,
}

/// Tracks the link to the daemon and the plays waiting for it.
///
/// Only the session task mutates this; the connected flag is shared so that
/// callers can read it without a round trip.
pub struct ConnectionSupervisor {
    link: LinkState,
    connected: Arc<AtomicBool>,
    auto_start: AutoStart,
    deferred: Vec<ClientEventId>,
}

impl ConnectionSupervisor {
    pub fn new() -> Self {
        Self {
            link: LinkState::Disconnected,
            connected: Arc::new(AtomicBool::new(false)),
            auto_start: AutoStart::Idle,
            deferred: Vec::new(),
        }
    }

    pub fn connected_flag(&self) -> Arc<AtomicBool> {
        self.connected.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn link_state(&self) -> LinkState {
        self.link
    }

    pub fn auto_start(&self) -> AutoStart {
        self.auto_start
    }

    /// Returns true when the caller has to start a connection attempt.
    pub fn begin_connect(&mut self) -> bool {
        if self.link != LinkState::Disconnected {
            return false;
        }
        debug!("Connecting to feedback daemon");
        self.link = LinkState::Connecting;
        true
    }

    /// Queues a play until the link is up.
    pub fn defer(&mut self, client_id: ClientEventId) {
        self.deferred.push(client_id);
        self.auto_start = AutoStart::Armed;
    }

    /// Returns true if this is a transition into the connected state.
    pub fn mark_connected(&mut self) -> bool {
        let was_connected = self.link == LinkState::Connected;
        self.link = LinkState::Connected;
        self.connected.store(true, Ordering::Release);
        !was_connected
    }

    /// Returns the state the link was in before.
    pub fn mark_disconnected(&mut self) -> LinkState {
        let previous = self.link;
        self.link = LinkState::Disconnected;
        self.connected.store(false, Ordering::Release);
        previous
    }

    /// Disarms auto-start and hands out the deferred plays. Empty when idle.
    pub fn take_auto_start(&mut self) -> Vec<ClientEventId> {
        match self.auto_start {
            AutoStart::Idle => Vec::new(),
            AutoStart::Armed => {
                self.auto_start = AutoStart::Idle;
                std::mem::take(&mut self.deferred)
            }
        }
    }
}

impl Default for ConnectionSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_is_idempotent_while_connecting_or_connected() {
        let mut supervisor = ConnectionSupervisor::new();
        assert!(supervisor.begin_connect());
        assert!(!supervisor.begin_connect());
        assert!(supervisor.mark_connected());
        assert!(!supervisor.begin_connect());
        assert!(!supervisor.mark_connected());
        assert!(supervisor.is_connected());
    }

    #[test]
    fn deferred_plays_are_handed_out_once() {
        let mut supervisor = ConnectionSupervisor::new();
        supervisor.defer(ClientEventId(1));
        supervisor.defer(ClientEventId(2));
        assert_eq!(supervisor.auto_start(), AutoStart::Armed);

        assert_eq!(supervisor.take_auto_start(), vec![ClientEventId(1), ClientEventId(2)]);
        assert_eq!(supervisor.auto_start(), AutoStart::Idle);
        assert!(supervisor.take_auto_start().is_empty());
    }

    #[test]
    fn disconnect_reports_previous_state_and_clears_flag() {
        let mut supervisor = ConnectionSupervisor::new();
        let flag = supervisor.connected_flag();
        supervisor.begin_connect();
        assert_eq!(supervisor.mark_disconnected(), LinkState::Connecting);

        supervisor.begin_connect();
        supervisor.mark_connected();
        assert!(flag.load(Ordering::Acquire));
        assert_eq!(supervisor.mark_disconnected(), LinkState::Connected);
        assert!(!flag.load(Ordering::Acquire));
        assert_eq!(supervisor.mark_disconnected(), LinkState::Disconnected);
    }
}
