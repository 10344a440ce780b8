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

//! IPC client transport using parity-tokio-ipc (unix socket / named pipe)
//! with newline-delimited JSON framing.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use parity_tokio_ipc::Endpoint;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};

use crate::definitions::{ServerEventId, WireProperties};
use crate::ipc::protocol::{self, Call, Inbound, Request};
use crate::transport::{FeedbackTransport, NotificationSink, TransportError, TransportNotification};

const MAX_LINE_LENGTH: usize = 64 * 1024;

type PendingCalls = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value, TransportError>>>>>;

struct Link {
    outgoing: mpsc::UnboundedSender<String>,
    closed: Arc<AtomicBool>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl Link {
    fn close(self) {
        self.closed.store(true, Ordering::SeqCst);
        self.reader.abort();
        self.writer.abort();
    }
}

/// [`FeedbackTransport`] talking to the daemon over a local IPC endpoint.
pub struct IpcTransport {
    endpoint: String,
    request_timeout: Duration,
    next_request_id: AtomicU64,
    pending: PendingCalls,
    link: Mutex<Option<Link>>,
}

impl IpcTransport {
    pub fn new(endpoint: String, request_timeout: Duration) -> Self {
        Self {
            endpoint,
            request_timeout,
            next_request_id: AtomicU64::new(1),
            pending: Arc::new(Mutex::new(HashMap::new())),
            link: Mutex::new(None),
        }
    }

    fn close_link(&self) {
        let link = self.link.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(link) = link {
            link.close();
        }
        fail_pending(&self.pending);
    }

    /// Sends `call` and waits for its reply, for at most `limit` if given.
    async fn call(&self, call: Call, limit: Option<Duration>) -> Result<Value, TransportError> {
        let (outgoing, closed) = {
            let link = self.link.lock().unwrap_or_else(PoisonError::into_inner);
            let link = link.as_ref().ok_or(TransportError::Disconnected)?;
            (link.outgoing.clone(), link.closed.clone())
        };

        let id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
        let line = protocol::encode(&Request { id, call })?;
        let (reply_tx, reply_rx) = oneshot::channel();
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).insert(id, reply_tx);

        // The reader drains pending calls after setting `closed`, so checking
        // after the insert cannot miss a closed link.
        if closed.load(Ordering::SeqCst) || outgoing.send(line).is_err() {
            self.forget(id);
            return Err(TransportError::Disconnected);
        }

        let Some(limit) = limit else {
            return reply_rx.await.unwrap_or(Err(TransportError::Disconnected));
        };
        match tokio::time::timeout(limit, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(TransportError::Disconnected),
            Err(_) => {
                debug!("Request {} timed out", id);
                self.forget(id);
                Err(TransportError::Timeout)
            }
        }
    }

    fn forget(&self, id: u64) {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).remove(&id);
    }
}

#[async_trait]
impl FeedbackTransport for IpcTransport {
    async fn connect(&self, sink: NotificationSink) -> Result<(), TransportError> {
        self.close_link();

        debug!("Connecting to feedback daemon at {}", self.endpoint);
        let stream = Endpoint::connect(&self.endpoint).await?;
        let (mut write_half, mut read_half) = Framed::new(stream, LinesCodec::new_with_max_length(MAX_LINE_LENGTH)).split::<String>();

        let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<String>();
        let writer = tokio::spawn(async move {
            while let Some(line) = outgoing_rx.recv().await {
                if let Err(e) = write_half.send(line).await {
                    warn!("Failed to write to feedback daemon: {}", e);
                    break;
                }
            }
        });

        // The reader announces the link only once it is stored, so calls
        // issued in response to `Connectivity(true)` find it.
        let (stored_tx, stored_rx) = oneshot::channel::<()>();
        let closed = Arc::new(AtomicBool::new(false));
        let pending = self.pending.clone();
        let reader_closed = closed.clone();
        let reader = tokio::spawn(async move {
            if stored_rx.await.is_err() {
                return;
            }
            let _ = sink.send(TransportNotification::Connectivity(true));
            while let Some(line) = read_half.next().await {
                match line {
                    Ok(line) => dispatch_line(&line, &pending, &sink),
                    Err(LinesCodecError::MaxLineLengthExceeded) => {
                        warn!("Discarding oversized message from feedback daemon");
                    }
                    Err(LinesCodecError::Io(e)) => {
                        warn!("Failed to read from feedback daemon: {}", e);
                        break;
                    }
                }
            }
            info!("IPC link to feedback daemon closed");
            reader_closed.store(true, Ordering::SeqCst);
            fail_pending(&pending);
            let _ = sink.send(TransportNotification::Connectivity(false));
        });

        *self.link.lock().unwrap_or_else(PoisonError::into_inner) = Some(Link { outgoing, closed, reader, writer });
        let _ = stored_tx.send(());
        info!("IPC link to feedback daemon at {} established", self.endpoint);
        Ok(())
    }

    async fn disconnect(&self) {
        debug!("Closing IPC link to feedback daemon");
        self.close_link();
    }

    async fn play(&self, name: &str, properties: &WireProperties) -> Result<ServerEventId, TransportError> {
        // No deadline: an unanswered play stays pending until the link closes,
        // and a late acknowledgment still reaches the session.
        let result = self
            .call(Call::Play { event: name.to_string(), properties: properties.clone() }, None)
            .await?;
        protocol::decode_play_result(result)
    }

    async fn pause(&self, server_id: ServerEventId) -> Result<(), TransportError> {
        self.call(Call::Pause { event_id: server_id }, Some(self.request_timeout)).await.map(|_| ())
    }

    async fn resume(&self, server_id: ServerEventId) -> Result<(), TransportError> {
        self.call(Call::Resume { event_id: server_id }, Some(self.request_timeout)).await.map(|_| ())
    }

    async fn stop(&self, server_id: ServerEventId) -> Result<(), TransportError> {
        self.call(Call::Stop { event_id: server_id }, Some(self.request_timeout)).await.map(|_| ())
    }
}

impl Drop for IpcTransport {
    fn drop(&mut self) {
        self.close_link();
    }
}

fn dispatch_line(line: &str, pending: &PendingCalls, sink: &NotificationSink) {
    match protocol::decode(line) {
        Ok(Inbound::Reply(reply)) => {
            let waiter = pending.lock().unwrap_or_else(PoisonError::into_inner).remove(&reply.id);
            match waiter {
                Some(waiter) => {
                    let _ = waiter.send(reply.into_result());
                }
                None => debug!("Reply for unknown request {}", reply.id),
            }
        }
        Ok(Inbound::Notification(notification)) => {
            let _ = sink.send(notification.into());
        }
        Err(e) => warn!("Ignoring malformed message from feedback daemon: {}", e),
    }
}

fn fail_pending(pending: &PendingCalls) {
    let drained: Vec<_> = pending
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .drain()
        .collect();
    for (_, waiter) in drained {
        let _ = waiter.send(Err(TransportError::Disconnected));
    }
}
