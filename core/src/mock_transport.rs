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

//! In-memory transport for tests. Records every call, answers plays with
//! increasing server ids starting at 100, and lets a test hold replies back,
//! inject notifications and flip connectivity.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::definitions::{ServerEventId, WireProperties};
use crate::transport::{FeedbackTransport, NotificationSink, TransportError, TransportNotification};

#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    Connect,
    Disconnect,
    Play(String, WireProperties),
    Pause(ServerEventId),
    Resume(ServerEventId),
    Stop(ServerEventId),
}

pub type HeldReply = oneshot::Sender<Result<ServerEventId, TransportError>>;

pub struct MockTransport {
    calls: Mutex<Vec<MockCall>>,
    sink: Mutex<Option<NotificationSink>>,
    announce_on_connect: AtomicBool,
    refuse_connect: AtomicBool,
    reject_plays: AtomicBool,
    fail_controls: AtomicBool,
    next_server_id: AtomicU32,
    held_plays: Mutex<HashMap<String, oneshot::Receiver<Result<ServerEventId, TransportError>>>>,
    held_connect: Mutex<Option<oneshot::Receiver<()>>>,
}

impl MockTransport {
    /// Transport that reports itself connected as soon as `connect` is called.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            sink: Mutex::new(None),
            announce_on_connect: AtomicBool::new(true),
            refuse_connect: AtomicBool::new(false),
            reject_plays: AtomicBool::new(false),
            fail_controls: AtomicBool::new(false),
            next_server_id: AtomicU32::new(100),
            held_plays: Mutex::new(HashMap::new()),
            held_connect: Mutex::new(None),
        })
    }

    /// Transport whose link only comes up when the test calls `set_connected(true)`.
    pub fn manual() -> Arc<Self> {
        let mock = Self::new();
        mock.announce_on_connect.store(false, Ordering::SeqCst);
        mock
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &MockCall) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == call).count()
    }

    pub fn refuse_connections(&self) {
        self.refuse_connect.store(true, Ordering::SeqCst);
    }

    pub fn reject_plays(&self) {
        self.reject_plays.store(true, Ordering::SeqCst);
    }

    pub fn fail_controls(&self) {
        self.fail_controls.store(true, Ordering::SeqCst);
    }

    /// The next play of `name` waits until the returned sender is used.
    pub fn hold_play(&self, name: &str) -> HeldReply {
        let (tx, rx) = oneshot::channel();
        self.held_plays.lock().unwrap().insert(name.to_string(), rx);
        tx
    }

    /// The next connect waits until the returned sender is used.
    pub fn hold_connect(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.held_connect.lock().unwrap() = Some(rx);
        tx
    }

    pub fn push(&self, notification: TransportNotification) {
        if let Some(sink) = self.sink.lock().unwrap().as_ref() {
            let _ = sink.send(notification);
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.push(TransportNotification::Connectivity(connected));
    }

    fn record(&self, call: MockCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn control_result(&self) -> Result<(), TransportError> {
        if self.fail_controls.load(Ordering::SeqCst) {
            Err(TransportError::Rejected("control refused".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl FeedbackTransport for MockTransport {
    async fn connect(&self, sink: NotificationSink) -> Result<(), TransportError> {
        self.record(MockCall::Connect);
        let held = self.held_connect.lock().unwrap().take();
        if let Some(held) = held {
            let _ = held.await;
        }
        if self.refuse_connect.load(Ordering::SeqCst) {
            return Err(TransportError::Io(io::Error::new(io::ErrorKind::ConnectionRefused, "no daemon")));
        }
        if self.announce_on_connect.load(Ordering::SeqCst) {
            let _ = sink.send(TransportNotification::Connectivity(true));
        }
        *self.sink.lock().unwrap() = Some(sink);
        Ok(())
    }

    async fn disconnect(&self) {
        self.record(MockCall::Disconnect);
        if let Some(sink) = self.sink.lock().unwrap().take() {
            let _ = sink.send(TransportNotification::Connectivity(false));
        }
    }

    async fn play(&self, name: &str, properties: &WireProperties) -> Result<ServerEventId, TransportError> {
        self.record(MockCall::Play(name.to_string(), properties.clone()));
        let held = self.held_plays.lock().unwrap().remove(name);
        if let Some(held) = held {
            return held.await.unwrap_or(Err(TransportError::Disconnected));
        }
        if self.reject_plays.load(Ordering::SeqCst) {
            return Err(TransportError::Rejected(format!("unknown event '{}'", name)));
        }
        Ok(ServerEventId(self.next_server_id.fetch_add(1, Ordering::SeqCst)))
    }

    async fn pause(&self, server_id: ServerEventId) -> Result<(), TransportError> {
        self.record(MockCall::Pause(server_id));
        self.control_result()
    }

    async fn resume(&self, server_id: ServerEventId) -> Result<(), TransportError> {
        self.record(MockCall::Resume(server_id));
        self.control_result()
    }

    async fn stop(&self, server_id: ServerEventId) -> Result<(), TransportError> {
        self.record(MockCall::Stop(server_id));
        self.control_result()
    }
}
