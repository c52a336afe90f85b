//! hy-protocol: Wire protocol for hydra work dispatch
//!
//! This crate defines the line-oriented protocol spoken between the
//! coordinator, its agents, and their executors. Every record is a single
//! JSON object terminated by a newline.

pub mod codec;
pub mod error;
pub mod message;
pub mod work;

pub use codec::{MessageCodec, MAX_LINE_LENGTH};
pub use error::ProtocolError;
pub use message::{Message, MessageType, PROTOCOL_VERSION};
pub use work::WorkItem;
