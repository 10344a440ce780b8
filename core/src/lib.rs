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

pub mod definitions;
pub mod transport;
pub mod ipc;
pub mod config;

mod event_registry;
mod connection;
mod session;
mod client;
mod events;
mod feedback_event;
mod service;

#[cfg(test)]
mod mock_transport;

pub use client::{ClientError, ClientProvider, FeedbackClient, TransportFactory};
pub use config::ClientConfig;
pub use definitions::{ClientEventId, EventState, Properties, PropertyValue, ServerEventId};
pub use event_registry::EventSnapshot;
pub use events::ClientEvent;
pub use feedback_event::{EventStatus, FeedbackEvent};
pub use ipc::IpcTransport;
pub use transport::{FeedbackTransport, NotificationSink, TransportError, TransportNotification};
