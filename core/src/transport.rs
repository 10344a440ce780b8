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

use std::io;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

use crate::definitions::{ServerEventId, WireProperties};

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Not connected to the feedback daemon")]
    Disconnected,

    #[error("Request rejected by the daemon: {0}")]
    Rejected(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Request timed out")]
    Timeout,
}

/// Unsolicited messages pushed by a transport into the session.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportNotification {
    /// Daemon reported a new raw status for one of its events.
    StateChanged { server_id: ServerEventId, raw_state: u32 },
    /// Daemon reported that an event could not be rendered.
    Failed { server_id: ServerEventId },
    /// Link to the daemon came up or went down.
    Connectivity(bool),
}

pub type NotificationSink = UnboundedSender<TransportNotification>;

/// Asynchronous link to the feedback daemon.
///
/// Calls may be issued concurrently from separate tasks. A transport reports
/// link state only through [`TransportNotification::Connectivity`] on the sink
/// handed to [`FeedbackTransport::connect`].
#[async_trait]
pub trait FeedbackTransport: Send + Sync {
    /// Establishes the link. `Connectivity(true)` is expected on the sink once
    /// calls can be issued.
    async fn connect(&self, sink: NotificationSink) -> Result<(), TransportError>;

    /// Closes the link. Pending calls fail with [`TransportError::Disconnected`].
    async fn disconnect(&self);

    async fn play(&self, name: &str, properties: &WireProperties) -> Result<ServerEventId, TransportError>;

    async fn pause(&self, server_id: ServerEventId) -> Result<(), TransportError>;

    async fn resume(&self, server_id: ServerEventId) -> Result<(), TransportError>;

    async fn stop(&self, server_id: ServerEventId) -> Result<(), TransportError>;
}
