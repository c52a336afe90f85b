//! Link health via periodic heartbeats

use std::time::Duration;

use hy_core::MessageSender;
use hy_protocol::Message;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Sends heartbeats upward so a dead link is noticed while idle
pub struct HeartbeatMonitor {
    /// Heartbeat interval
    pub interval: Duration,
}

impl HeartbeatMonitor {
    /// Create a new heartbeat monitor
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Start sending heartbeats on `sender`.
    ///
    /// The task ends when `cancel` fires. A failed send cancels the token,
    /// which stops every task sharing it.
    pub fn spawn_monitor(
        &self,
        sender: MessageSender,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let interval = self.interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = sender.send(Message::Heartbeat).await {
                            tracing::warn!("Heartbeat failed, link is gone: {}", e);
                            cancel.cancel();
                            break;
                        }
                        tracing::trace!("Heartbeat sent");
                    }
                }
            }
        })
    }
}
