//! Message types for the hydra protocol
//!
//! This module defines the closed set of messages exchanged between the
//! three tiers. Messages are serialized into newline-terminated records by
//! the codec defined in `codec.rs`.
//!
//! # Wire Format
//!
//! Each record is a JSON object with a protocol version field `v`, a
//! `type` discriminator, and the payload fields of the variant. Field order
//! is not significant:
//!
//! ```text
//! {"item":"test/a_test.rb","output":".","type":"work_result","v":1}
//! ```
//!
//! Records are decoded with `serde_json`. A record with an unknown version or
//! type is rejected, never interpreted.
//!
//! # Message Flow
//!
//! 1. Executor sends `RequestWork`, the agent relays it to the coordinator
//! 2. Agent sends `AgentReady` once its executors are booted
//! 3. Coordinator answers with `AssignWork`, the agent forwards it to an idle executor
//! 4. Executor replies with `WorkResult`, the agent relays it upward
//! 5. Coordinator sends the next `AssignWork`, or `Shutdown` once the queue is drained
//! 6. `Heartbeat` may travel in either direction and is ignored on receipt
//! 7. Agent sends `ExecutorLost` for the in-flight item of an executor that died

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;
use crate::work::WorkItem;

/// Current protocol version.
///
/// Bumped on any change to the record layout.
pub const PROTOCOL_VERSION: u64 = 1;

/// Message type identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// Requester is idle and wants an item
    RequestWork,
    /// Item handed down to run
    AssignWork,
    /// Output of a finished item
    WorkResult,
    /// Stop after in-flight work
    Shutdown,
    /// Liveness ping
    Heartbeat,
    /// Agent finished booting its executors
    AgentReady,
    /// Executor died with an item in flight
    ExecutorLost,
}

impl MessageType {
    /// Wire name of this message type
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::RequestWork => "request_work",
            MessageType::AssignWork => "assign_work",
            MessageType::WorkResult => "work_result",
            MessageType::Shutdown => "shutdown",
            MessageType::Heartbeat => "heartbeat",
            MessageType::AgentReady => "agent_ready",
            MessageType::ExecutorLost => "executor_lost",
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Protocol messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    /// The sender is idle and wants an item to run
    RequestWork,

    /// Run this item
    AssignWork {
        /// Item to run
        item: WorkItem,
    },

    /// An item finished
    WorkResult {
        /// Item that was run
        item: WorkItem,
        /// Runner output. `"."` or empty means success, anything else is
        /// failure detail.
        output: String,
    },

    /// Stop processing after any in-flight item
    Shutdown,

    /// Liveness ping, ignored on receipt
    Heartbeat,

    /// Agent has booted its executors
    AgentReady {
        /// Number of executors the agent booted
        executors: usize,
    },

    /// An executor exited while running `item`. Final failure result for
    /// the item that, unlike `WorkResult`, frees no capacity.
    ExecutorLost {
        /// Item that was in flight
        item: WorkItem,
        /// Failure detail
        output: String,
    },
}

impl Message {
    /// Get the message type for this message
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::RequestWork => MessageType::RequestWork,
            Message::AssignWork { .. } => MessageType::AssignWork,
            Message::WorkResult { .. } => MessageType::WorkResult,
            Message::Shutdown => MessageType::Shutdown,
            Message::Heartbeat => MessageType::Heartbeat,
            Message::AgentReady { .. } => MessageType::AgentReady,
            Message::ExecutorLost { .. } => MessageType::ExecutorLost,
        }
    }

    /// Serialize into a single wire record, without the trailing newline
    pub fn to_line(&self) -> Result<String, ProtocolError> {
        let mut value = serde_json::to_value(self)
            .map_err(|e| ProtocolError::UnprocessableMessage(e.to_string()))?;

        let Value::Object(ref mut fields) = value else {
            return Err(ProtocolError::UnprocessableMessage(format!(
                "{} did not serialize to an object",
                self.message_type()
            )));
        };
        fields.insert("v".to_string(), Value::from(PROTOCOL_VERSION));

        serde_json::to_string(&value).map_err(|e| ProtocolError::UnprocessableMessage(e.to_string()))
    }

    /// Parse a single wire record. Surrounding whitespace (including a
    /// trailing `\r` from a pseudo-terminal) is ignored.
    pub fn from_line(line: &str) -> Result<Self, ProtocolError> {
        let trimmed = line.trim();
        let mut value: Value = serde_json::from_str(trimmed)
            .map_err(|_| ProtocolError::NotAMessage(abbreviate(trimmed)))?;

        let Value::Object(ref mut fields) = value else {
            return Err(ProtocolError::NotAMessage(abbreviate(trimmed)));
        };

        match fields.remove("v").and_then(|v| v.as_u64()) {
            Some(PROTOCOL_VERSION) => {}
            Some(other) => return Err(ProtocolError::UnsupportedVersion(other)),
            None => return Err(ProtocolError::NotAMessage(abbreviate(trimmed))),
        }

        serde_json::from_value(value).map_err(|_| ProtocolError::NotAMessage(abbreviate(trimmed)))
    }
}

/// Shorten noise lines for error messages and logs
fn abbreviate(line: &str) -> String {
    const MAX: usize = 80;
    if line.len() <= MAX {
        return line.to_string();
    }
    let mut end = MAX;
    while !line.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &line[..end])
}
