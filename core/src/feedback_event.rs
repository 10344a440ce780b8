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

use std::sync::Arc;

use log::{debug, warn};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::client::FeedbackClient;
use crate::definitions::{ClientEventId, EventState, Properties};
use crate::events::ClientEvent;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EventStatus {
    #[default]
    Stopped,
    Playing,
    Paused,
    Failed,
}

/// One named feedback cue that can be played, paused and stopped repeatedly.
///
/// Each [`FeedbackEvent::play`] creates a new event in the session; the handle
/// only follows the most recent one.
pub struct FeedbackEvent {
    client: Arc<FeedbackClient>,
    events: UnboundedReceiver<ClientEvent>,
    event: String,
    properties: Properties,
    event_id: Option<ClientEventId>,
    status: EventStatus,
}

impl FeedbackEvent {
    pub fn new(client: Arc<FeedbackClient>) -> Self {
        Self::with_event(client, "")
    }

    pub fn with_event(client: Arc<FeedbackClient>, event: impl Into<String>) -> Self {
        let events = client.subscribe();
        Self {
            client,
            events,
            event: event.into(),
            properties: Properties::new(),
            event_id: None,
            status: EventStatus::default(),
        }
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    /// Changes the cue name. A running event is stopped and restarted under
    /// the new name.
    pub async fn set_event(&mut self, event: impl Into<String>) {
        let event = event.into();
        if event == self.event {
            return;
        }
        let restart = self.event_id.is_some();
        if restart {
            self.stop().await;
        }
        self.event = event;
        if restart {
            self.play().await;
        }
    }

    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// Takes effect on the next play.
    pub fn set_properties(&mut self, properties: Properties) {
        self.properties = properties;
    }

    pub fn status(&self) -> EventStatus {
        self.status
    }

    pub fn event_id(&self) -> Option<ClientEventId> {
        self.event_id
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_connected()
    }

    /// Plays the cue. Returns false while the previous play has not been
    /// confirmed by the daemon yet, or when no cue name is set.
    pub async fn play(&mut self) -> bool {
        if self.event.is_empty() {
            warn!("Cannot play feedback, no event name set");
            return false;
        }

        if let Some(current) = self.event_id {
            match self.client.event_info(current).await {
                Some(info) if info.state == EventState::New => {
                    debug!("Play of '{}' ignored, event {} not confirmed yet", self.event, current);
                    return false;
                }
                Some(_) => {
                    self.client.stop(current).await;
                }
                None => {}
            }
            self.event_id = None;
        }

        match self.client.play(&self.event, self.properties.clone()).await {
            Ok(client_id) => {
                self.event_id = Some(client_id);
                true
            }
            Err(e) => {
                warn!("Play of '{}' failed: {}", self.event, e);
                self.status = EventStatus::Failed;
                false
            }
        }
    }

    pub async fn pause(&self) -> bool {
        match self.event_id {
            Some(client_id) => self.client.pause(client_id).await,
            None => false,
        }
    }

    pub async fn resume(&self) -> bool {
        match self.event_id {
            Some(client_id) => self.client.resume(client_id).await,
            None => false,
        }
    }

    pub async fn stop(&mut self) -> bool {
        let Some(client_id) = self.event_id.take() else {
            return false;
        };
        self.status = EventStatus::Stopped;
        self.client.stop(client_id).await
    }

    /// Waits for the next state change of the current event and returns the
    /// updated status. Returns `None` once the session is gone.
    pub async fn next_status(&mut self) -> Option<EventStatus> {
        loop {
            match self.events.recv().await? {
                ClientEvent::StateChanged { client_id, state } if Some(client_id) == self.event_id => {
                    let status = match state {
                        EventState::New => continue,
                        EventState::Playing => EventStatus::Playing,
                        EventState::Paused => EventStatus::Paused,
                        EventState::Stopped => EventStatus::Stopped,
                        EventState::Failed => EventStatus::Failed,
                    };
                    if state.is_terminal() {
                        self.event_id = None;
                    }
                    self.status = status;
                    return Some(status);
                }
                _ => continue,
            }
        }
    }
}

impl Drop for FeedbackEvent {
    fn drop(&mut self) {
        if let Some(client_id) = self.event_id.take() {
            self.client.stop_detached(client_id);
        }
    }
}
