//! Executor loop
//!
//! An executor asks for work once at start, then runs each assigned item
//! and replies with its result. The result doubles as the next request,
//! so exactly one item is in flight per executor.

use std::sync::Arc;

use hy_core::{Transport, TransportError};
use hy_protocol::Message;

use crate::runner::WorkRunner;

/// Runs assigned items one at a time
pub struct Executor {
    transport: Transport,
    runner: Arc<dyn WorkRunner>,
}

impl Executor {
    /// Create an executor speaking over `transport`
    pub fn new(transport: Transport, runner: Arc<dyn WorkRunner>) -> Self {
        Self { transport, runner }
    }

    /// Run until shut down or the link to the agent goes away.
    ///
    /// Returns the number of items run. Losing the link is not an error;
    /// only a message that could not be encoded is.
    pub async fn run(self) -> Result<usize, TransportError> {
        let Executor { transport, runner } = self;
        let (sender, mut receiver) = transport.split();
        let mut completed = 0;

        match sender.send(Message::RequestWork).await {
            Ok(()) => {}
            Err(TransportError::ChannelBroken) => {
                tracing::warn!("Agent closed the link before the first request");
                return Ok(completed);
            }
            Err(e) => return Err(e),
        }

        loop {
            let message = match receiver.receive().await {
                Ok(Some(message)) => message,
                Ok(None) => {
                    tracing::debug!("Agent closed the link");
                    break;
                }
                Err(e) => {
                    tracing::warn!("Link to agent failed: {}", e);
                    break;
                }
            };

            match message {
                Message::AssignWork { item } => {
                    tracing::debug!("Running {}", item);
                    let output = runner.run(&item).await;
                    completed += 1;

                    match sender.send(Message::WorkResult { item, output }).await {
                        Ok(()) => {}
                        Err(TransportError::ChannelBroken) => {
                            tracing::warn!("Agent went away before the result was delivered");
                            break;
                        }
                        Err(e) => return Err(e),
                    }
                }
                Message::Heartbeat => {}
                Message::Shutdown => {
                    tracing::debug!("Shutting down after {} items", completed);
                    break;
                }
                other => {
                    tracing::trace!("Ignoring {} from agent", other.message_type());
                }
            }
        }

        let _ = sender.close().await;
        Ok(completed)
    }
}
