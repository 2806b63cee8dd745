//! Messenger server
//!
//! The server owns a named channel. It answers client requests with the
//! handlers registered through [`MessengerServer::handle`], fans client
//! publishes out to local subscribers, and broadcasts its own publishes to
//! every connected client.

use crate::{
    config::MessengerConfig,
    error::{Error, Result},
    models::{Envelope, send_envelope},
    subscription::Subscribers,
};
use async_channel::Receiver;
use async_net::unix::{UnixListener, UnixStream};
use async_tungstenite::accept_async;
use futures::channel::mpsc::{self, UnboundedSender};
use futures::future::BoxFuture;
use futures::lock::Mutex;
use futures::{FutureExt, SinkExt, StreamExt};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, info, warn};
use tungstenite::Message;
use uuid::Uuid;

/// Request handler registered on a server
pub type Handler = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// State shared between the server handle, the accept loop and connections
struct ServerShared {
    handlers: Mutex<HashMap<String, Handler>>,
    /// Outgoing queues of connected clients
    connections: Mutex<HashMap<Uuid, UnboundedSender<Envelope>>>,
    subscribers: Subscribers,
}

/// Owns the socket file and the accept loop
struct ListenerGuard {
    path: PathBuf,
    accept_task: Mutex<Option<smol::Task<()>>>,
    /// Set once the socket file has been removed; the path may belong to a successor afterwards
    released: AtomicBool,
}

impl ListenerGuard {
    /// Remove the socket file, at most once
    fn release(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            remove_socket_file(&self.path);
        }
    }
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        // Dropping the task cancels the accept loop
        self.accept_task.get_mut().take();
        self.release();
    }
}

/// Server end of a messenger channel
///
/// Cloning is cheap; the channel stays bound until [`close`](Self::close) is
/// called or the last clone is dropped.
#[derive(Clone)]
pub struct MessengerServer {
    shared: Arc<ServerShared>,
    listener: Arc<ListenerGuard>,
}

impl MessengerServer {
    /// Bind a server on the channel described by `config`
    ///
    /// A leftover socket file nobody listens on is replaced. If a live server
    /// already owns the channel, binding fails with [`Error::ChannelInUse`].
    pub fn bind(config: &MessengerConfig) -> Result<Self> {
        let path = config.socket_path();
        prepare_socket_path(&path)?;

        let listener = UnixListener::bind(&path)?;
        info!("Messenger server listening on {:?}", path);

        let shared = Arc::new(ServerShared {
            handlers: Mutex::new(HashMap::new()),
            connections: Mutex::new(HashMap::new()),
            subscribers: Subscribers::default(),
        });

        let accept_task = smol::spawn(accept_loop(listener, shared.clone()));

        Ok(Self {
            shared,
            listener: Arc::new(ListenerGuard {
                path,
                accept_task: Mutex::new(Some(accept_task)),
                released: AtomicBool::new(false),
            }),
        })
    }

    /// Path of the socket file
    pub fn path(&self) -> &Path {
        &self.listener.path
    }

    /// Register the handler answering `action`, replacing any previous one
    pub async fn handle<F, Fut>(&self, action: impl Into<String>, handler: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let action = action.into();
        debug!("Registering messenger handler: {}", action);

        let handler: Handler = Arc::new(move |data| handler(data).boxed());
        self.shared.handlers.lock().await.insert(action, handler);
    }

    /// Check whether a handler answers `action`
    pub async fn has_handler(&self, action: &str) -> bool {
        self.shared.handlers.lock().await.contains_key(action)
    }

    /// Run the handler for `action` in this process, without a round trip
    pub async fn dispatch(&self, action: &str, data: Value) -> Result<Value> {
        self.shared.dispatch(action, data).await
    }

    /// Publish `data` on `topic` to every connected client and local subscriber
    ///
    /// Returns the number of clients the message was queued for.
    pub async fn broadcast(&self, topic: &str, data: Value) -> usize {
        let envelope = Envelope::Publish {
            topic: topic.to_string(),
            data: data.clone(),
        };

        let reached = {
            let mut connections = self.shared.connections.lock().await;
            connections.retain(|_, tx| tx.unbounded_send(envelope.clone()).is_ok());
            connections.len()
        };

        self.shared.subscribers.deliver(topic, &data).await;
        debug!("Broadcast on {} reached {} clients", topic, reached);
        reached
    }

    /// Receive everything published on `topic`, by clients or by this server
    pub async fn subscribe(&self, topic: &str) -> Receiver<Value> {
        self.shared.subscribers.subscribe(topic).await
    }

    /// Number of connected clients
    pub async fn connection_count(&self) -> usize {
        self.shared.connections.lock().await.len()
    }

    /// Stop accepting clients, disconnect the connected ones and remove the socket file
    pub async fn close(&self) {
        self.listener.accept_task.lock().await.take();
        // Dropping the outgoing queues makes every connection send a close frame
        self.shared.connections.lock().await.clear();
        self.listener.release();
        info!("Messenger server on {:?} closed", self.listener.path);
    }
}

impl ServerShared {
    async fn dispatch(&self, action: &str, data: Value) -> Result<Value> {
        let handler = self
            .handlers
            .lock()
            .await
            .get(action)
            .cloned()
            .ok_or_else(|| Error::NoHandler(action.to_string()))?;

        handler(data).await
    }

    /// Answer one request
    async fn respond(&self, id: String, action: String, data: Value) -> Envelope {
        debug!("Request {}: {}", id, action);
        match self.dispatch(&action, data).await {
            Ok(data) => Envelope::ok(id, data),
            Err(e) => {
                warn!("Request {} ({}) failed: {}", id, action, e);
                Envelope::err(id, &e)
            }
        }
    }

    /// Process one incoming frame
    ///
    /// Requests run on their own task and queue their response on `replies`,
    /// so a slow handler never holds up the rest of the connection.
    async fn process_frame(
        self: &Arc<Self>,
        text: &str,
        replies: &UnboundedSender<Envelope>,
    ) -> Result<()> {
        let envelope: Envelope = serde_json::from_str(text)?;

        match envelope {
            Envelope::Request { id, action, data } => {
                let shared = self.clone();
                let replies = replies.clone();
                smol::spawn(async move {
                    let response = shared.respond(id, action, data).await;
                    // The connection may be gone by the time the handler finishes
                    let _ = replies.unbounded_send(response);
                })
                .detach();
            }
            Envelope::Publish { topic, data } => {
                self.subscribers.deliver(&topic, &data).await;
            }
            Envelope::Response { id, .. } => {
                warn!("Unexpected response {} from messenger client", id);
            }
        }
        Ok(())
    }
}

fn prepare_socket_path(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }

    if path.exists() {
        if std::os::unix::net::UnixStream::connect(path).is_ok() {
            return Err(Error::ChannelInUse(path.to_path_buf()));
        }
        debug!("Removing stale messenger socket {:?}", path);
        std::fs::remove_file(path)?;
    }

    Ok(())
}

fn remove_socket_file(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove messenger socket {:?}: {}", path, e);
        }
    }
}

async fn accept_loop(listener: UnixListener, shared: Arc<ServerShared>) {
    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                let shared = shared.clone();
                smol::spawn(async move {
                    if let Err(e) = handle_connection(stream, shared).await {
                        debug!("Messenger connection ended with error: {}", e);
                    }
                })
                .detach();
            }
            Err(e) => {
                error!("Failed to accept messenger connection: {}", e);
            }
        }
    }
}

async fn handle_connection(stream: UnixStream, shared: Arc<ServerShared>) -> Result<()> {
    let ws = accept_async(stream).await?;

    let connection_id = Uuid::new_v4();
    let (tx, mut outgoing) = mpsc::unbounded();
    let (reply_tx, mut replies) = mpsc::unbounded();
    shared.connections.lock().await.insert(connection_id, tx);
    debug!("Messenger client {} connected", connection_id);

    let (mut sink, incoming) = ws.split();
    let mut incoming = incoming.fuse();

    let result = loop {
        futures::select! {
            envelope = outgoing.next() => match envelope {
                Some(envelope) => {
                    if let Err(e) = send_envelope(&mut sink, &envelope).await {
                        break Err(e);
                    }
                }
                None => {
                    let _ = sink.send(Message::Close(None)).await;
                    break Ok(());
                }
            },
            reply = replies.next() => {
                if let Some(response) = reply {
                    if let Err(e) = send_envelope(&mut sink, &response).await {
                        break Err(e);
                    }
                }
            },
            frame = incoming.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if let Err(e) = shared.process_frame(&text, &reply_tx).await {
                        error!("Error processing messenger frame: {}", e);
                    }
                }
                Some(Ok(Message::Close(_))) | None => break Ok(()),
                Some(Ok(_)) => {}
                Some(Err(e)) => break Err(e.into()),
            },
        }
    };

    shared.connections.lock().await.remove(&connection_id);
    debug!("Messenger client {} disconnected", connection_id);
    result
}
