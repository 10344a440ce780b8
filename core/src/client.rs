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
use std::sync::{Arc, Mutex, PoisonError, Weak};

use log::{debug, info};
use thiserror::Error;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;

use crate::config::ClientConfig;
use crate::definitions::{ClientEventId, Properties};
use crate::event_registry::EventSnapshot;
use crate::events::{ClientEvent, Subscribers};
use crate::ipc::IpcTransport;
use crate::service::{spawn_service, ServiceHandle};
use crate::session::{Command, ControlOp, SessionManager, SessionMessage, Target};
use crate::transport::FeedbackTransport;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    #[error("Feedback session is closed")]
    SessionClosed,

    #[error("Feedback session has no client event ids left")]
    IdsExhausted,
}

/// Caller-facing handle to one feedback session.
///
/// Every call is forwarded to the session task and returns as soon as the
/// session has taken it into account; the outcome is reported later through
/// [`FeedbackClient::subscribe`]. Dropping the last reference shuts the
/// session down and closes the daemon connection.
pub struct FeedbackClient {
    commands: UnboundedSender<SessionMessage>,
    subscribers: Subscribers,
    connected: Arc<AtomicBool>,
    service: Mutex<Option<ServiceHandle>>,
}

impl FeedbackClient {
    /// Starts a session on the current tokio runtime.
    pub fn new(transport: Arc<dyn FeedbackTransport>) -> Self {
        let subscribers = Subscribers::default();
        let session = SessionManager::new(transport, subscribers.clone());
        let commands = session.sender();
        let connected = session.connected_flag();
        let service = spawn_service(move |stop| session.run(stop));

        info!("Feedback session started");
        Self {
            commands,
            subscribers,
            connected,
            service: Mutex::new(Some(service)),
        }
    }

    /// Requests playback of `name`. The returned handle is valid right away,
    /// even if the daemon has not acknowledged the request yet.
    pub async fn play(&self, name: &str, properties: Properties) -> Result<ClientEventId, ClientError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Play { name: name.to_string(), properties, reply })?;
        rx.await.map_err(|_| ClientError::SessionClosed)?
    }

    pub async fn pause(&self, client_id: ClientEventId) -> bool {
        self.control(ControlOp::Pause, Target::Id(client_id)).await
    }

    pub async fn resume(&self, client_id: ClientEventId) -> bool {
        self.control(ControlOp::Resume, Target::Id(client_id)).await
    }

    pub async fn stop(&self, client_id: ClientEventId) -> bool {
        self.control(ControlOp::Stop, Target::Id(client_id)).await
    }

    pub async fn pause_by_name(&self, name: &str) -> bool {
        self.control(ControlOp::Pause, Target::Name(name.to_string())).await
    }

    pub async fn resume_by_name(&self, name: &str) -> bool {
        self.control(ControlOp::Resume, Target::Name(name.to_string())).await
    }

    pub async fn stop_by_name(&self, name: &str) -> bool {
        self.control(ControlOp::Stop, Target::Name(name.to_string())).await
    }

    /// Stops an event without waiting for the session. Usable from `Drop`.
    pub fn stop_detached(&self, client_id: ClientEventId) {
        let _ = self.send(Command::Control {
            op: ControlOp::Stop,
            target: Target::Id(client_id),
            reply: None,
        });
    }

    pub async fn event_info(&self, client_id: ClientEventId) -> Option<EventSnapshot> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::EventInfo { client_id, reply }).ok()?;
        rx.await.ok().flatten()
    }

    /// Starts connecting if not connected already.
    pub fn connect(&self) {
        let _ = self.send(Command::Connect);
    }

    /// Drops the link. Every tracked event ends and is reported.
    pub fn disconnect(&self) {
        let _ = self.send(Command::Disconnect);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Every subscriber receives every event published after it subscribed,
    /// in order and without loss.
    pub fn subscribe(&self) -> UnboundedReceiver<ClientEvent> {
        self.subscribers.subscribe()
    }

    /// Stops the session task and waits for it to close the connection.
    pub async fn shutdown(&self) {
        let service = self.service.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(service) = service {
            if let Err(e) = service.shutdown().await {
                debug!("Feedback session task ended abnormally: {}", e);
            }
        }
    }

    async fn control(&self, op: ControlOp, target: Target) -> bool {
        let (reply, rx) = oneshot::channel();
        if self.send(Command::Control { op, target, reply: Some(reply) }).is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    fn send(&self, command: Command) -> Result<(), ClientError> {
        self.commands
            .send(SessionMessage::Command(command))
            .map_err(|_| ClientError::SessionClosed)
    }
}

impl Drop for FeedbackClient {
    fn drop(&mut self) {
        let service = self.service.get_mut().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(mut service) = service {
            debug!("Last feedback client released, stopping session");
            service.request_shutdown();
        }
    }
}

pub type TransportFactory = Box<dyn Fn(&ClientConfig) -> Arc<dyn FeedbackTransport> + Send + Sync>;

/// Hands out one shared [`FeedbackClient`] to any number of callers.
///
/// The client is created on the first [`ClientProvider::acquire`] and lives
/// as long as someone holds it; once every caller has dropped its `Arc`, the
/// next acquire starts a fresh session.
pub struct ClientProvider {
    config: ClientConfig,
    factory: TransportFactory,
    current: Mutex<Weak<FeedbackClient>>,
}

impl ClientProvider {
    pub fn new(config: ClientConfig, factory: TransportFactory) -> Self {
        Self {
            config,
            factory,
            current: Mutex::new(Weak::new()),
        }
    }

    /// Provider talking to the daemon over the local IPC endpoint.
    pub fn with_ipc(config: ClientConfig) -> Self {
        Self::new(config, Box::new(|config: &ClientConfig| -> Arc<dyn FeedbackTransport> {
            Arc::new(IpcTransport::new(config.endpoint.clone(), config.request_timeout))
        }))
    }

    /// Returns the live client, or creates one. Must run inside a tokio runtime.
    pub fn acquire(&self) -> Arc<FeedbackClient> {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = current.upgrade() {
            return client;
        }
        let transport = (self.factory)(&self.config);
        let client = Arc::new(FeedbackClient::new(transport));
        *current = Arc::downgrade(&client);
        client
    }
}
