//! Messenger client

use crate::{
    config::MessengerConfig,
    error::{Error, Result},
    models::{Envelope, send_envelope},
    subscription::Subscribers,
};
use async_channel::Receiver;
use async_net::unix::UnixStream;
use async_tungstenite::{WebSocketStream, client_async};
use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use futures::channel::oneshot;
use futures::lock::Mutex;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tungstenite::Message;
use uuid::Uuid;

type Pending = Arc<Mutex<HashMap<String, oneshot::Sender<Result<Value>>>>>;

enum ClientCommand {
    Send(Envelope),
    Close,
}

/// Handles onto one live connection
///
/// Each connection has its own pending map, so the task of a dead connection
/// only fails the requests that were sent over it.
#[derive(Clone)]
struct Link {
    tx: UnboundedSender<ClientCommand>,
    pending: Pending,
}

struct Connection {
    link: Link,
    task: smol::Task<()>,
}

/// Client end of a messenger channel
///
/// The client connects lazily: nothing touches the socket until the first
/// request, publish or subscription, so connection failures surface from
/// whichever call needed the channel. A dropped connection is re-established
/// on the next call.
#[derive(Clone)]
pub struct MessengerClient {
    path: PathBuf,
    connection: Arc<Mutex<Option<Connection>>>,
    subscribers: Subscribers,
}

impl MessengerClient {
    /// Create a client for the channel described by `config`
    pub fn new(config: &MessengerConfig) -> Self {
        Self {
            path: config.socket_path(),
            connection: Arc::new(Mutex::new(None)),
            subscribers: Subscribers::default(),
        }
    }

    /// Path of the socket file this client talks to
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Connect now instead of on first use
    pub async fn connect(&self) -> Result<()> {
        self.sender().await.map(|_| ())
    }

    /// Whether a live connection exists
    pub async fn is_connected(&self) -> bool {
        self.connection
            .lock()
            .await
            .as_ref()
            .is_some_and(|c| !c.link.tx.is_closed())
    }

    /// Send a request and wait for the server's answer
    pub async fn request(&self, action: &str, data: Value) -> Result<Value> {
        let Link { tx, pending } = self.sender().await?;

        let id = Uuid::new_v4().to_string();
        let (reply_tx, reply_rx) = oneshot::channel();
        pending.lock().await.insert(id.clone(), reply_tx);

        let envelope = Envelope::Request {
            id: id.clone(),
            action: action.to_string(),
            data,
        };

        if tx.unbounded_send(ClientCommand::Send(envelope)).is_err() {
            pending.lock().await.remove(&id);
            return Err(Error::Closed);
        }

        match reply_rx.await {
            Ok(result) => result,
            Err(_) => {
                pending.lock().await.remove(&id);
                Err(Error::Closed)
            }
        }
    }

    /// Publish `data` on `topic` to the server
    pub async fn publish(&self, topic: &str, data: Value) -> Result<()> {
        let Link { tx, .. } = self.sender().await?;
        let envelope = Envelope::Publish {
            topic: topic.to_string(),
            data,
        };

        tx.unbounded_send(ClientCommand::Send(envelope))
            .map_err(|_| Error::Closed)
    }

    /// Receive what the server broadcasts on `topic`
    pub async fn subscribe(&self, topic: &str) -> Result<Receiver<Value>> {
        self.sender().await?;
        Ok(self.subscribers.subscribe(topic).await)
    }

    /// Close the connection, if any
    pub async fn close(&self) {
        let connection = self.connection.lock().await.take();
        if let Some(connection) = connection {
            let _ = connection.link.tx.unbounded_send(ClientCommand::Close);
            connection.task.await;
            info!("Messenger client for {:?} closed", self.path);
        }
    }

    /// The live connection, connecting first if needed
    async fn sender(&self) -> Result<Link> {
        let mut connection = self.connection.lock().await;

        if let Some(existing) = connection.as_ref() {
            if !existing.link.tx.is_closed() {
                return Ok(existing.link.clone());
            }
            debug!("Messenger connection to {:?} was lost, reconnecting", self.path);
        }

        let stream = UnixStream::connect(&self.path).await?;
        let (ws, _) = client_async("ws://localhost/", stream).await?;
        info!("Connected to messenger channel {:?}", self.path);

        let (tx, rx) = mpsc::unbounded();
        let link = Link {
            tx,
            pending: Arc::new(Mutex::new(HashMap::new())),
        };
        let task = smol::spawn(run_connection(
            ws,
            rx,
            link.pending.clone(),
            self.subscribers.clone(),
        ));

        *connection = Some(Connection {
            link: link.clone(),
            task,
        });
        Ok(link)
    }
}

async fn run_connection(
    ws: WebSocketStream<UnixStream>,
    mut commands: UnboundedReceiver<ClientCommand>,
    pending: Pending,
    subscribers: Subscribers,
) {
    let (mut sink, incoming) = ws.split();
    let mut incoming = incoming.fuse();

    loop {
        futures::select! {
            command = commands.next() => match command {
                Some(ClientCommand::Send(envelope)) => {
                    if let Err(e) = send_envelope(&mut sink, &envelope).await {
                        error!("Failed to send messenger frame: {}", e);
                        break;
                    }
                }
                Some(ClientCommand::Close) | None => {
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                }
            },
            frame = incoming.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if let Err(e) = handle_frame(&text, &pending, &subscribers).await {
                        error!("Error handling messenger frame: {}", e);
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    info!("Messenger server closed connection");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    error!("Messenger connection error: {}", e);
                    break;
                }
            },
        }
    }

    // Stop further sends before failing whatever is still in flight
    commands.close();
    for (_, reply) in pending.lock().await.drain() {
        let _ = reply.send(Err(Error::Closed));
    }
}

async fn handle_frame(text: &str, pending: &Pending, subscribers: &Subscribers) -> Result<()> {
    let envelope: Envelope = serde_json::from_str(text)?;

    match envelope {
        Envelope::Response { id, data, error } => {
            let Some(reply) = pending.lock().await.remove(&id) else {
                debug!("Dropping response for unknown request {}", id);
                return Ok(());
            };
            let result = match error {
                Some(error) => Err(Error::Remote {
                    code: error.code,
                    message: error.message,
                }),
                None => Ok(data.unwrap_or(Value::Null)),
            };
            let _ = reply.send(result);
        }
        Envelope::Publish { topic, data } => {
            subscribers.deliver(&topic, &data).await;
        }
        Envelope::Request { id, action, .. } => {
            warn!("Ignoring request {} ({}) sent to a messenger client", id, action);
        }
    }

    Ok(())
}
