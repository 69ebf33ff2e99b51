//! Message schema and the factory that constructs validated messages
//!
//! A `Message` is immutable once built: callers go through
//! [`MessageFactory::create`] rather than constructing the struct directly,
//! so every message in the system has already passed type and size
//! validation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain_types::{
    AgentId, MessageId, MessageTimestamp, ValidatedMessageType, MAX_MESSAGE_PAYLOAD_BYTES,
};
use crate::error::MessageError;

/// An immutable, validated unit of communication between two agents.
///
/// `from == to` is permitted (an agent may address itself).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[allow(clippy::struct_field_names)]
pub struct Message {
    id: MessageId,
    from: AgentId,
    to: AgentId,
    message_type: ValidatedMessageType,
    payload: Value,
    timestamp: MessageTimestamp,
}

impl Message {
    /// Unique id of this message
    #[must_use]
    pub fn id(&self) -> MessageId {
        self.id
    }

    /// Sender of this message
    #[must_use]
    pub fn from(&self) -> AgentId {
        self.from
    }

    /// Recipient of this message
    #[must_use]
    pub fn to(&self) -> AgentId {
        self.to
    }

    /// Routing key / type of this message
    #[must_use]
    pub fn message_type(&self) -> &ValidatedMessageType {
        &self.message_type
    }

    /// JSON payload carried by this message
    #[must_use]
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Wall-clock time this message was constructed
    #[must_use]
    pub fn timestamp(&self) -> MessageTimestamp {
        self.timestamp
    }

    /// Whether this message's type string contains "error" — the
    /// Correlation Manager treats such a response payload as a request
    /// failure rather than a success.
    #[must_use]
    pub fn is_error_response(&self) -> bool {
        self.message_type.as_ref().to_lowercase().contains("error")
    }
}

/// Constructs [`Message`]s with a generated id, current timestamp, and
/// validated type/payload size.
#[derive(Debug, Clone, Default)]
pub struct MessageFactory;

impl MessageFactory {
    /// Creates a new factory.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Builds a validated [`Message`].
    ///
    /// # Errors
    /// Returns [`MessageError::InvalidType`] if `message_type` fails the
    /// `ValidatedMessageType` constructor, [`MessageError::NullPayload`] if
    /// `payload` is JSON `null`, [`MessageError::SerializationFailed`] if the
    /// payload cannot be measured, or [`MessageError::TooLarge`] if the
    /// serialized payload exceeds 1 MiB.
    pub fn create(
        &self,
        from: AgentId,
        to: AgentId,
        message_type: impl Into<String>,
        payload: Value,
    ) -> Result<Message, MessageError> {
        Self::build(MessageId::generate(), from, to, message_type, payload)
    }

    /// Builds a validated reply to `request_id`, reusing it as the reply's
    /// own id — the mechanism the Correlation Manager uses to match a
    /// response back to the request that triggered it.
    ///
    /// # Errors
    /// Same failure modes as [`MessageFactory::create`].
    pub fn create_reply(
        &self,
        request_id: MessageId,
        from: AgentId,
        to: AgentId,
        message_type: impl Into<String>,
        payload: Value,
    ) -> Result<Message, MessageError> {
        Self::build(request_id, from, to, message_type, payload)
    }

    fn build(
        id: MessageId,
        from: AgentId,
        to: AgentId,
        message_type: impl Into<String>,
        payload: Value,
    ) -> Result<Message, MessageError> {
        let message_type =
            ValidatedMessageType::try_new(message_type.into()).map_err(|e| {
                MessageError::InvalidType {
                    reason: e.to_string(),
                }
            })?;

        if payload.is_null() {
            return Err(MessageError::NullPayload);
        }

        let size = serde_json::to_vec(&payload)
            .map_err(|e| MessageError::SerializationFailed {
                reason: e.to_string(),
            })?
            .len();

        if size > MAX_MESSAGE_PAYLOAD_BYTES {
            return Err(MessageError::TooLarge {
                size,
                max: MAX_MESSAGE_PAYLOAD_BYTES,
            });
        }

        Ok(Message {
            id,
            from,
            to,
            message_type,
            payload,
            timestamp: MessageTimestamp::now(),
        })
    }
}
