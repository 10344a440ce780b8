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

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::definitions::{ClientEventId, EventState};

/// Events published by the session to every subscribed caller.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// An event changed state. Emitted once per accepted transition; a
    /// terminal state means the handle is no longer valid.
    StateChanged { client_id: ClientEventId, state: EventState },

    /// The link to the daemon came up or went down.
    ConnectivityChanged(bool),
}

/// Fan-out of [`ClientEvent`]s. Every subscriber gets its own unbounded
/// queue, so a slow reader never loses a transition.
#[derive(Clone, Default)]
pub(crate) struct Subscribers {
    senders: Arc<Mutex<Vec<UnboundedSender<ClientEvent>>>>,
}

impl Subscribers {
    pub fn subscribe(&self) -> UnboundedReceiver<ClientEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.lock().unwrap_or_else(PoisonError::into_inner).push(tx);
        rx
    }

    /// Delivers `event` to every live subscriber and forgets the dropped ones.
    pub fn publish(&self, event: ClientEvent) {
        self.senders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Ends every subscription; receivers see the end of the stream.
    pub fn close(&self) {
        self.senders.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.senders.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
