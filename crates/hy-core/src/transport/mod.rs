//! Message transports between tiers
//!
//! A [`Transport`] carries [`Message`] records over a pair of byte streams.
//! It splits into a cloneable [`MessageSender`] and a single-owner
//! [`MessageReceiver`], so one listener task can read while heartbeat and
//! dispatch code write on the same link.
//!
//! Three kinds of streams are used:
//!
//! - the piped stdin/stdout of a child process ([`Transport::from_child`]),
//!   and the child's own stdio on the other end ([`Transport::stdio`])
//! - an in-memory pair for in-process roles and tests ([`pair`])
//! - an `ssh -tt` child for remote agents ([`ssh::connect`])

pub mod ssh;

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use hy_protocol::{Message, MessageCodec, ProtocolError};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::process::Child;
use tokio::sync::Mutex;
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::error::TransportError;

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Buffer size of each direction of an in-memory pair
const PAIR_BUFFER_SIZE: usize = 64 * 1024;

/// Map a codec error on a live link into a transport error
fn link_error(err: ProtocolError) -> TransportError {
    match err {
        ProtocolError::Io(e) => {
            tracing::debug!("Link I/O error: {}", e);
            TransportError::ChannelBroken
        }
        other => other.into(),
    }
}

/// Writing half of a transport. Cheap to clone.
#[derive(Clone)]
pub struct MessageSender {
    writer: Arc<Mutex<Option<FramedWrite<BoxedWriter, MessageCodec>>>>,
    close_command: Option<Arc<str>>,
}

impl MessageSender {
    fn new(writer: BoxedWriter) -> Self {
        Self {
            writer: Arc::new(Mutex::new(Some(FramedWrite::new(writer, MessageCodec::new())))),
            close_command: None,
        }
    }

    /// Send one message and flush it
    pub async fn send(&self, message: Message) -> Result<(), TransportError> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(TransportError::ChannelBroken)?;
        writer.send(message).await.map_err(link_error)
    }

    /// Write a raw line that is not a protocol record, such as a shell
    /// command on a remote link
    pub async fn write_line(&self, line: &str) -> Result<(), TransportError> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(TransportError::ChannelBroken)?;
        SinkExt::<Message>::flush(writer).await.map_err(link_error)?;

        let stream = writer.get_mut();
        let result = async {
            stream.write_all(line.as_bytes()).await?;
            stream.write_all(b"\n").await?;
            stream.flush().await
        }
        .await;

        result.map_err(|e| {
            tracing::debug!("Link I/O error: {}", e);
            TransportError::ChannelBroken
        })
    }

    /// Close the writing half. Further sends fail with `ChannelBroken`.
    ///
    /// A remote link writes its close command (`exit`) first so the login
    /// shell on the other side terminates.
    pub async fn close(&self) -> Result<(), TransportError> {
        let Some(mut writer) = self.writer.lock().await.take() else {
            return Ok(());
        };

        if let Some(command) = &self.close_command {
            let stream = writer.get_mut();
            let _ = stream.write_all(format!("{}\n", command).as_bytes()).await;
        }

        SinkExt::<Message>::close(&mut writer)
            .await
            .map_err(link_error)
    }

    /// Whether `close` has been called
    pub async fn is_closed(&self) -> bool {
        self.writer.lock().await.is_none()
    }
}

impl std::fmt::Debug for MessageSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageSender")
            .field("close_command", &self.close_command)
            .finish_non_exhaustive()
    }
}

/// Reading half of a transport
pub struct MessageReceiver {
    reader: FramedRead<BoxedReader, MessageCodec>,
}

impl MessageReceiver {
    fn new(reader: BoxedReader) -> Self {
        Self {
            reader: FramedRead::new(reader, MessageCodec::new()),
        }
    }

    /// Wait for the next message.
    ///
    /// Returns `Ok(None)` once the peer has closed its end. Lines that are
    /// not protocol records are skipped.
    pub async fn receive(&mut self) -> Result<Option<Message>, TransportError> {
        match self.reader.next().await {
            Some(Ok(message)) => Ok(Some(message)),
            Some(Err(e)) => Err(link_error(e)),
            None => Ok(None),
        }
    }
}

impl std::fmt::Debug for MessageReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageReceiver").finish_non_exhaustive()
    }
}

/// A bidirectional message link
#[derive(Debug)]
pub struct Transport {
    sender: MessageSender,
    receiver: MessageReceiver,
}

impl Transport {
    /// Build a transport over arbitrary byte streams
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self {
            sender: MessageSender::new(Box::new(writer)),
            receiver: MessageReceiver::new(Box::new(reader)),
        }
    }

    /// The current process's stdin/stdout, used by agent and executor roles
    pub fn stdio() -> Self {
        Self::new(tokio::io::stdin(), tokio::io::stdout())
    }

    /// Adopt the piped stdin/stdout of a freshly spawned child.
    ///
    /// Fails with `Unidentified` if the child was not spawned with piped
    /// stdin and stdout, or if they were already taken.
    pub fn from_child(child: &mut Child) -> Result<Self, TransportError> {
        let stdin = child.stdin.take().ok_or(TransportError::Unidentified)?;
        let stdout = child.stdout.take().ok_or(TransportError::Unidentified)?;
        Ok(Self::new(stdout, stdin))
    }

    /// Write `command` on close, before shutting the stream down
    pub fn with_close_command(mut self, command: impl Into<String>) -> Self {
        let command: String = command.into();
        self.sender.close_command = Some(Arc::from(command));
        self
    }

    /// A clone of the writing half
    pub fn sender(&self) -> MessageSender {
        self.sender.clone()
    }

    /// Send one message
    pub async fn send(&self, message: Message) -> Result<(), TransportError> {
        self.sender.send(message).await
    }

    /// Receive the next message, `None` on EOF
    pub async fn receive(&mut self) -> Result<Option<Message>, TransportError> {
        self.receiver.receive().await
    }

    /// Close the writing half
    pub async fn close(&self) -> Result<(), TransportError> {
        self.sender.close().await
    }

    /// Split into the writing and reading halves
    pub fn split(self) -> (MessageSender, MessageReceiver) {
        (self.sender, self.receiver)
    }
}

/// Two transports connected back to back in memory
pub fn pair() -> (Transport, Transport) {
    let (left, right) = tokio::io::duplex(PAIR_BUFFER_SIZE);
    let (left_read, left_write) = tokio::io::split(left);
    let (right_read, right_write) = tokio::io::split(right);
    (
        Transport::new(left_read, left_write),
        Transport::new(right_read, right_write),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use hy_protocol::WorkItem;
    use std::process::Stdio;

    #[tokio::test]
    async fn test_pair_roundtrip() {
        let (coordinator, mut agent) = pair();

        let message = Message::WorkResult {
            item: WorkItem::new("foo.test"),
            output: "HYDRA".to_string(),
        };
        coordinator.send(message.clone()).await.unwrap();

        assert_eq!(agent.receive().await.unwrap(), Some(message));
    }

    #[tokio::test]
    async fn test_close_gives_eof() {
        let (left, mut right) = pair();
        left.send(Message::RequestWork).await.unwrap();
        left.close().await.unwrap();

        assert_eq!(right.receive().await.unwrap(), Some(Message::RequestWork));
        assert_eq!(right.receive().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_send_after_close_is_broken() {
        let (left, _right) = pair();
        left.close().await.unwrap();
        assert!(left.sender().is_closed().await);
        assert!(matches!(
            left.send(Message::Heartbeat).await,
            Err(TransportError::ChannelBroken)
        ));
    }

    #[tokio::test]
    async fn test_send_to_dropped_peer_is_broken() {
        let (left, right) = pair();
        drop(right);
        assert!(matches!(
            left.send(Message::Heartbeat).await,
            Err(TransportError::ChannelBroken)
        ));
    }

    #[tokio::test]
    async fn test_receive_skips_noise() {
        let (left, mut right) = pair();
        let sender = left.sender();
        sender.write_line("Last login: yesterday").await.unwrap();
        sender.write_line("").await.unwrap();
        sender.send(Message::Shutdown).await.unwrap();

        assert_eq!(right.receive().await.unwrap(), Some(Message::Shutdown));
    }

    #[tokio::test]
    async fn test_close_command_is_written() {
        let (client, server) = tokio::io::duplex(1024);
        let (client_read, client_write) = tokio::io::split(client);
        let transport = Transport::new(client_read, client_write).with_close_command("exit");
        transport.close().await.unwrap();

        let mut raw = String::new();
        let (mut server_read, _server_write) = tokio::io::split(server);
        tokio::io::AsyncReadExt::read_to_string(&mut server_read, &mut raw)
            .await
            .unwrap();
        assert_eq!(raw, "exit\n");
    }

    #[tokio::test]
    async fn test_from_child_without_pipes_is_unidentified() {
        let mut child = tokio::process::Command::new("true")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .spawn()
            .unwrap();

        assert!(matches!(
            Transport::from_child(&mut child),
            Err(TransportError::Unidentified)
        ));
        let _ = child.wait().await;
    }

    #[tokio::test]
    async fn test_from_child_talks_to_cat() {
        let mut child = tokio::process::Command::new("cat")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .unwrap();

        let mut transport = Transport::from_child(&mut child).unwrap();
        transport.send(Message::RequestWork).await.unwrap();
        assert_eq!(transport.receive().await.unwrap(), Some(Message::RequestWork));

        transport.close().await.unwrap();
        assert_eq!(transport.receive().await.unwrap(), None);
        let _ = child.wait().await;
    }
}
