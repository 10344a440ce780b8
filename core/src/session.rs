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

//! Event session state machine.
//!
//! A single task owns the registry and the connection supervisor. Caller
//! commands, transport call results and connection results all arrive through
//! one inbox and are applied in arrival order; transport notifications arrive
//! on the sink handed to the transport. Transport calls never run on the
//! session task itself: each is spawned and reports back through the inbox.

use std::sync::Arc;

use log::{debug, info, warn};
use tokio::select;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::client::ClientError;
use crate::connection::{ConnectionSupervisor, LinkState};
use crate::definitions::{
    filter_properties, ClientEventId, EventState, Properties, RawEventStatus, ServerEventId,
};
use crate::event_registry::{EventRegistry, EventSnapshot};
use crate::events::{ClientEvent, Subscribers};
use crate::service::StopHandle;
use crate::transport::{FeedbackTransport, TransportError, TransportNotification};

/// Upper bound for notifications held back while their play reply is in flight.
const MAX_EARLY_NOTIFICATIONS: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ControlOp {
    Pause,
    Resume,
    Stop,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Target {
    Id(ClientEventId),
    Name(String),
}

/// Requests issued by [`crate::FeedbackClient`].
pub(crate) enum Command {
    Play {
        name: String,
        properties: Properties,
        reply: oneshot::Sender<Result<ClientEventId, ClientError>>,
    },
    Control {
        op: ControlOp,
        target: Target,
        reply: Option<oneshot::Sender<bool>>,
    },
    EventInfo {
        client_id: ClientEventId,
        reply: oneshot::Sender<Option<EventSnapshot>>,
    },
    Connect,
    Disconnect,
}

/// Results of transport calls spawned by the session.
pub(crate) enum Completion {
    Play {
        client_id: ClientEventId,
        result: Result<ServerEventId, TransportError>,
    },
    Control {
        client_id: ClientEventId,
        server_id: ServerEventId,
        op: ControlOp,
        result: Result<(), TransportError>,
    },
    Connect {
        attempt: u64,
        result: Result<(), TransportError>,
    },
}

pub(crate) enum SessionMessage {
    Command(Command),
    Completion(Completion),
}

pub(crate) struct SessionManager {
    transport: Arc<dyn FeedbackTransport>,
    registry: EventRegistry,
    connection: ConnectionSupervisor,
    subscribers: Subscribers,
    inbox_tx: UnboundedSender<SessionMessage>,
    inbox_rx: UnboundedReceiver<SessionMessage>,
    // Replaced on every connection attempt so a previous link cannot leak into the next one.
    notification_rx: Option<UnboundedReceiver<TransportNotification>>,
    plays_in_flight: usize,
    early_notifications: Vec<TransportNotification>,
    // Link changes run in order: a disconnect waits for the connect before
    // it, and a connect waits for the disconnect before it.
    pending_connect: Option<JoinHandle<()>>,
    pending_disconnect: Option<JoinHandle<()>>,
    connect_attempt: u64,
}

impl SessionManager {
    pub fn new(transport: Arc<dyn FeedbackTransport>, subscribers: Subscribers) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        Self {
            transport,
            registry: EventRegistry::new(),
            connection: ConnectionSupervisor::new(),
            subscribers,
            inbox_tx,
            inbox_rx,
            notification_rx: None,
            plays_in_flight: 0,
            early_notifications: Vec::new(),
            pending_connect: None,
            pending_disconnect: None,
            connect_attempt: 0,
        }
    }

    pub fn sender(&self) -> UnboundedSender<SessionMessage> {
        self.inbox_tx.clone()
    }

    pub fn connected_flag(&self) -> Arc<std::sync::atomic::AtomicBool> {
        self.connection.connected_flag()
    }

    pub async fn run(mut self, mut stop: StopHandle) {
        loop {
            select! {
                biased;
                _ = stop.signaled() => {
                    info!("Feedback session shutdown requested");
                    break;
                }
                msg = self.inbox_rx.recv() => {
                    // The session keeps its own sender, so the inbox never closes.
                    if let Some(msg) = msg {
                        self.on_message(msg);
                    }
                }
                notification = recv_notification(&mut self.notification_rx) => {
                    match notification {
                        Some(notification) => self.on_notification(notification),
                        None => {
                            debug!("Transport notification channel closed");
                            self.notification_rx = None;
                        }
                    }
                }
            }
        }
        self.teardown().await;
    }

    fn on_message(&mut self, msg: SessionMessage) {
        match msg {
            SessionMessage::Command(command) => self.on_command(command),
            SessionMessage::Completion(completion) => self.on_completion(completion),
        }
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Play { name, properties, reply } => match self.play(&name, &properties) {
                Some(client_id) => {
                    let _ = reply.send(Ok(client_id));
                    self.dispatch_or_defer(client_id);
                }
                None => {
                    warn!("No client event ids left in this session");
                    let _ = reply.send(Err(ClientError::IdsExhausted));
                }
            },
            Command::Control { op, target, reply } => {
                let accepted = match target {
                    Target::Id(client_id) => self.control(op, client_id),
                    Target::Name(name) => self.control_by_name(op, &name),
                };
                if let Some(reply) = reply {
                    let _ = reply.send(accepted);
                }
            }
            Command::EventInfo { client_id, reply } => {
                let snapshot = self.registry.find_by_client_id(client_id).map(EventSnapshot::from);
                let _ = reply.send(snapshot);
            }
            Command::Connect => self.ensure_connecting(),
            Command::Disconnect => self.disconnect(),
        }
    }

    fn on_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Play { client_id, result } => self.on_play_completed(client_id, result),
            Completion::Control { client_id, server_id, op, result } => {
                self.on_control_completed(client_id, server_id, op, result)
            }
            Completion::Connect { attempt, result } => self.on_connect_completed(attempt, result),
        }
    }

    fn on_notification(&mut self, notification: TransportNotification) {
        if let Some(server_id) = notification_server_id(&notification) {
            if self.registry.find_by_server_id(server_id).is_none() {
                self.hold_or_drop(notification);
                return;
            }
        }

        match notification {
            TransportNotification::StateChanged { server_id, raw_state } => {
                match RawEventStatus::try_from(raw_state) {
                    Ok(raw) => self.set_event_state(server_id, raw.into()),
                    Err(unknown) => warn!("Ignoring unknown state {} for {}", unknown, server_id),
                }
            }
            TransportNotification::Failed { server_id } => self.event_failed(server_id),
            TransportNotification::Connectivity(true) => self.on_connected(),
            TransportNotification::Connectivity(false) => self.on_disconnected(),
        }
    }

    // Requests

    fn play(&mut self, name: &str, properties: &Properties) -> Option<ClientEventId> {
        self.registry.allocate(name, filter_properties(properties))
    }

    fn dispatch_or_defer(&mut self, client_id: ClientEventId) {
        if self.connection.is_connected() {
            self.dispatch_play(client_id);
        } else {
            debug!("Event {} deferred until the daemon is connected", client_id);
            self.connection.defer(client_id);
            self.ensure_connecting();
        }
    }

    fn dispatch_play(&mut self, client_id: ClientEventId) {
        let Some(event) = self.registry.find_by_client_id(client_id) else {
            return;
        };
        let name = event.name.clone();
        let properties = event.properties.clone();
        let transport = self.transport.clone();
        let inbox = self.inbox_tx.clone();

        self.plays_in_flight += 1;
        debug!("Requesting play of '{}' for event {}", name, client_id);
        tokio::spawn(async move {
            let result = transport.play(&name, &properties).await;
            let _ = inbox.send(SessionMessage::Completion(Completion::Play { client_id, result }));
        });
    }

    fn control_by_name(&mut self, op: ControlOp, name: &str) -> bool {
        let mut accepted = false;
        for client_id in self.registry.client_ids_by_name(name) {
            accepted |= self.control(op, client_id);
        }
        accepted
    }

    fn control(&mut self, op: ControlOp, client_id: ClientEventId) -> bool {
        let Some(event) = self.registry.find_by_client_id_mut(client_id) else {
            debug!("{:?} for unknown event {}", op, client_id);
            return false;
        };

        match op {
            ControlOp::Stop => {
                if let Some(server_id) = event.server_id {
                    self.spawn_control(op, client_id, server_id);
                }
                self.finish(client_id, EventState::Stopped);
                true
            }
            ControlOp::Pause | ControlOp::Resume => {
                let Some(server_id) = event.server_id else {
                    debug!("{:?} for event {} ignored, play not acknowledged yet", op, client_id);
                    return false;
                };
                event.pending_state = Some(match op {
                    ControlOp::Pause => EventState::Paused,
                    _ => EventState::Playing,
                });
                self.spawn_control(op, client_id, server_id);
                true
            }
        }
    }

    fn spawn_control(&self, op: ControlOp, client_id: ClientEventId, server_id: ServerEventId) {
        let transport = self.transport.clone();
        let inbox = self.inbox_tx.clone();
        tokio::spawn(async move {
            let result = match op {
                ControlOp::Pause => transport.pause(server_id).await,
                ControlOp::Resume => transport.resume(server_id).await,
                ControlOp::Stop => transport.stop(server_id).await,
            };
            let _ = inbox.send(SessionMessage::Completion(Completion::Control {
                client_id,
                server_id,
                op,
                result,
            }));
        });
    }

    // Replies

    fn on_play_completed(&mut self, client_id: ClientEventId, result: Result<ServerEventId, TransportError>) {
        self.plays_in_flight = self.plays_in_flight.saturating_sub(1);

        match result {
            Ok(server_id) => {
                if self.registry.find_by_client_id(client_id).is_none() {
                    // Stopped or dropped while the request was in flight.
                    debug!("Late play reply {} for removed event {}, stopping it", server_id, client_id);
                    self.spawn_control(ControlOp::Stop, client_id, server_id);
                } else if self.registry.attach_server_id(client_id, server_id) {
                    debug!("Event {} acknowledged as {}", client_id, server_id);
                    self.replay_early_notifications(server_id);
                } else {
                    warn!("Could not bind {} to event {}", server_id, client_id);
                    self.finish(client_id, EventState::Failed);
                }
            }
            Err(e) => {
                warn!("Play request for event {} failed: {}", client_id, e);
                self.finish(client_id, EventState::Failed);
            }
        }

        if self.plays_in_flight == 0 {
            self.early_notifications.clear();
        }
    }

    fn on_control_completed(
        &mut self,
        client_id: ClientEventId,
        server_id: ServerEventId,
        op: ControlOp,
        result: Result<(), TransportError>,
    ) {
        let Err(e) = result else {
            return;
        };
        if op == ControlOp::Stop {
            warn!("Stop request for {} failed: {}", server_id, e);
            return;
        }
        warn!("{:?} request for event {} failed: {}", op, client_id, e);
        let still_tracked = self
            .registry
            .find_by_client_id(client_id)
            .is_some_and(|event| event.server_id == Some(server_id));
        if still_tracked {
            self.finish(client_id, EventState::Failed);
        }
    }

    // Notifications

    fn set_event_state(&mut self, server_id: ServerEventId, state: EventState) {
        let Some(client_id) = self.registry.find_by_server_id(server_id) else {
            return;
        };

        if state.is_terminal() {
            self.finish(client_id, state);
            return;
        }

        let Some(event) = self.registry.find_by_client_id_mut(client_id) else {
            return;
        };
        if event.pending_state == Some(state) {
            event.pending_state = None;
        }
        if event.state == state {
            return;
        }
        debug!("Event {} {} -> {}", client_id, event.state, state);
        event.state = state;
        self.subscribers.publish(ClientEvent::StateChanged { client_id, state });
    }

    fn event_failed(&mut self, server_id: ServerEventId) {
        if let Some(client_id) = self.registry.find_by_server_id(server_id) {
            self.finish(client_id, EventState::Failed);
        }
    }

    /// A notification may overtake the reply of the play that created its id.
    /// Such notifications are kept while plays are in flight and dropped otherwise.
    fn hold_or_drop(&mut self, notification: TransportNotification) {
        if self.plays_in_flight == 0 {
            debug!("Dropping notification for unknown event: {:?}", notification);
            return;
        }
        if self.early_notifications.len() == MAX_EARLY_NOTIFICATIONS {
            self.early_notifications.remove(0);
        }
        self.early_notifications.push(notification);
    }

    fn replay_early_notifications(&mut self, server_id: ServerEventId) {
        let (matching, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.early_notifications)
            .into_iter()
            .partition(|n| notification_server_id(n) == Some(server_id));
        self.early_notifications = rest;
        for notification in matching {
            self.on_notification(notification);
        }
    }

    /// Moves an event into a terminal state, removes it and publishes the
    /// transition. Returns false if the event was already gone.
    fn finish(&mut self, client_id: ClientEventId, state: EventState) -> bool {
        let Some(event) = self.registry.remove(client_id) else {
            return false;
        };
        debug!("Event {} ('{}') {} -> {}", client_id, event.name, event.state, state);
        self.subscribers.publish(ClientEvent::StateChanged { client_id, state });
        true
    }

    // Connectivity

    fn ensure_connecting(&mut self) {
        if !self.connection.begin_connect() {
            return;
        }
        let (sink, notification_rx) = mpsc::unbounded_channel();
        self.notification_rx = Some(notification_rx);

        self.connect_attempt += 1;
        let attempt = self.connect_attempt;
        let previous_disconnect = self.pending_disconnect.take();
        let transport = self.transport.clone();
        let inbox = self.inbox_tx.clone();
        self.pending_connect = Some(tokio::spawn(async move {
            if let Some(previous_disconnect) = previous_disconnect {
                let _ = previous_disconnect.await;
            }
            let result = transport.connect(sink).await;
            let _ = inbox.send(SessionMessage::Completion(Completion::Connect { attempt, result }));
        }));
    }

    fn on_connect_completed(&mut self, attempt: u64, result: Result<(), TransportError>) {
        if attempt != self.connect_attempt {
            debug!("Ignoring result of superseded connection attempt {}", attempt);
            return;
        }
        self.pending_connect = None;
        match result {
            Ok(()) => debug!("Connection attempt finished"),
            Err(e) => {
                warn!("Could not connect to feedback daemon: {}", e);
                if self.connection.link_state() == LinkState::Connecting {
                    self.connection.mark_disconnected();
                    self.fail_deferred();
                }
            }
        }
    }

    fn on_connected(&mut self) {
        if !self.connection.mark_connected() {
            return;
        }
        info!("Connected to feedback daemon");
        self.subscribers.publish(ClientEvent::ConnectivityChanged(true));

        for client_id in self.connection.take_auto_start() {
            let waiting = self
                .registry
                .find_by_client_id(client_id)
                .is_some_and(|event| event.state == EventState::New && event.server_id.is_none());
            if waiting {
                self.dispatch_play(client_id);
            }
        }
    }

    fn on_disconnected(&mut self) {
        match self.connection.mark_disconnected() {
            LinkState::Connected => {
                info!("Disconnected from feedback daemon");
                self.drop_all_events();
                self.connection.take_auto_start();
                self.subscribers.publish(ClientEvent::ConnectivityChanged(false));
            }
            LinkState::Connecting => {
                warn!("Feedback daemon went away while connecting");
                self.fail_deferred();
            }
            LinkState::Disconnected => {}
        }
    }

    fn disconnect(&mut self) {
        if self.connection.link_state() == LinkState::Disconnected {
            return;
        }
        self.on_disconnected();
        self.notification_rx = None;
        let previous_connect = self.pending_connect.take();
        let transport = self.transport.clone();
        self.pending_disconnect = Some(tokio::spawn(async move {
            if let Some(previous_connect) = previous_connect {
                let _ = previous_connect.await;
            }
            transport.disconnect().await;
        }));
    }

    /// Every tracked event ends: those never started as Stopped, the rest as Failed.
    fn drop_all_events(&mut self) {
        self.early_notifications.clear();
        for event in self.registry.remove_all() {
            let state = if event.state == EventState::New {
                EventState::Stopped
            } else {
                EventState::Failed
            };
            debug!("Event {} ('{}') {} -> {} on disconnect", event.client_id, event.name, event.state, state);
            self.subscribers.publish(ClientEvent::StateChanged { client_id: event.client_id, state });
        }
    }

    fn fail_deferred(&mut self) {
        for client_id in self.connection.take_auto_start() {
            self.finish(client_id, EventState::Failed);
        }
    }

    async fn teardown(&mut self) {
        if let Some(connect) = self.pending_connect.take() {
            connect.abort();
        }
        if self.connection.link_state() != LinkState::Disconnected {
            self.connection.mark_disconnected();
            self.transport.disconnect().await;
        }
        self.subscribers.close();
        let dropped = self.registry.remove_all();
        if !dropped.is_empty() {
            debug!("Dropped {} events on session teardown", dropped.len());
        }
    }
}

async fn recv_notification(
    rx: &mut Option<UnboundedReceiver<TransportNotification>>,
) -> Option<TransportNotification> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn notification_server_id(notification: &TransportNotification) -> Option<ServerEventId> {
    match notification {
        TransportNotification::StateChanged { server_id, .. } => Some(*server_id),
        TransportNotification::Failed { server_id } => Some(*server_id),
        TransportNotification::Connectivity(_) => None,
    }
}
