//! Wire model for messenger traffic
//!
//! Every frame on the channel is a WebSocket text message holding one
//! JSON-encoded [`Envelope`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Messenger frame
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    /// Client request, answered by exactly one [`Envelope::Response`]
    Request {
        /// Request ID for correlation
        id: String,
        /// Action the server should run
        action: String,
        /// Action payload
        data: Value,
    },
    /// Server response
    Response {
        /// ID of the request being answered
        id: String,
        /// Response data
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
        /// Error information
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<ErrorInfo>,
    },
    /// Fire-and-forget message on a topic
    Publish {
        /// Topic name
        topic: String,
        /// Message payload
        data: Value,
    },
}

/// Error information carried by a failed response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorInfo {
    /// Error code
    pub code: String,
    /// Error message
    pub message: String,
}

impl From<&crate::Error> for ErrorInfo {
    fn from(error: &crate::Error) -> Self {
        Self {
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}

impl Envelope {
    /// Build a successful response
    pub fn ok(id: impl Into<String>, data: Value) -> Self {
        Envelope::Response {
            id: id.into(),
            data: Some(data),
            error: None,
        }
    }

    /// Build an error response
    pub fn err(id: impl Into<String>, error: &crate::Error) -> Self {
        Envelope::Response {
            id: id.into(),
            data: None,
            error: Some(error.into()),
        }
    }

    pub(crate) fn to_message(&self) -> crate::Result<tungstenite::Message> {
        let json = serde_json::to_string(self)?;
        Ok(tungstenite::Message::Text(json.into()))
    }
}

/// Write one envelope to a WebSocket sink
pub(crate) async fn send_envelope<S>(sink: &mut S, envelope: &Envelope) -> crate::Result<()>
where
    S: futures::Sink<tungstenite::Message, Error = tungstenite::Error> + Unpin,
{
    use futures::SinkExt;

    sink.send(envelope.to_message()?).await?;
    Ok(())
}
