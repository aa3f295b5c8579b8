//! Per-connection read/reply loop.
//!
//! Each accepted connection gets its own `Session`, driven on its own task.
//! The session alternates strictly between reading one request line and
//! writing its reply, so replies on a connection are never pipelined or
//! reordered. The only state shared with other sessions is the counter.

use crate::counter::MessageCounter;
use crate::protocol::{self, Request};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, trace};

/// Initial capacity of the line buffer
const LINE_CAPACITY: usize = 1024;

/// Longest accepted request line, terminator included
pub const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Why a session ended without an I/O error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Client sent the exit sentinel.
    ExitRequested,
    /// Client closed its end of the connection.
    PeerClosed,
}

/// Current state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    /// Waiting for the next request line.
    Reading,
    /// A message was received and must be answered before reading again.
    Replying,
    /// Terminal; the connection is released.
    Closing(SessionEnd),
}

/// A single client connection and its line buffer.
pub struct Session<S> {
    stream: BufReader<S>,
    peer: SocketAddr,
    counter: Arc<MessageCounter>,
    line: Vec<u8>,
    state: SessionState,
    replies: u64,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an accepted connection.
    pub fn new(stream: S, peer: SocketAddr, counter: Arc<MessageCounter>) -> Self {
        Self {
            stream: BufReader::new(stream),
            peer,
            counter,
            line: Vec::with_capacity(LINE_CAPACITY),
            state: SessionState::Reading,
            replies: 0,
        }
    }

    /// Run the session to completion and release the connection.
    ///
    /// The stream is shut down and dropped on every path, including I/O
    /// errors, which are returned to the caller after cleanup.
    pub async fn run(mut self) -> io::Result<SessionEnd> {
        let result = self.drive().await;
        self.close().await;

        info!(
            peer = %self.peer,
            replies = self.replies,
            reason = ?result.as_ref().ok(),
            "Client disconnected"
        );
        result
    }

    async fn drive(&mut self) -> io::Result<SessionEnd> {
        loop {
            self.state = match self.state {
                SessionState::Reading => self.read_request().await?,
                SessionState::Replying => {
                    self.reply().await?;
                    SessionState::Reading
                }
                SessionState::Closing(end) => return Ok(end),
            };
        }
    }

    /// Read one line and decide the next state.
    async fn read_request(&mut self) -> io::Result<SessionState> {
        self.line.clear();

        let n = (&mut self.stream)
            .take(MAX_LINE_LENGTH as u64)
            .read_until(b'\n', &mut self.line)
            .await?;
        if n == 0 {
            trace!(peer = %self.peer, "Connection closed by client");
            return Ok(SessionState::Closing(SessionEnd::PeerClosed));
        }
        if n == MAX_LINE_LENGTH && !self.line.ends_with(b"\n") {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("line exceeds {MAX_LINE_LENGTH} bytes"),
            ));
        }

        match protocol::parse_request(&self.line) {
            Request::Exit => {
                info!(peer = %self.peer, "Client is disconnecting");
                Ok(SessionState::Closing(SessionEnd::ExitRequested))
            }
            Request::Message(message) => {
                info!(peer = %self.peer, %message, "Received message");
                Ok(SessionState::Replying)
            }
        }
    }

    /// Count the message and send the new total back.
    async fn reply(&mut self) -> io::Result<()> {
        let count = self.counter.increment_and_get();
        let reply = protocol::format_reply(count);

        self.stream.write_all(&reply).await?;
        self.stream.flush().await?;

        self.replies += 1;
        debug!(peer = %self.peer, count, "Sent reply");
        Ok(())
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.shutdown().await {
            debug!(peer = %self.peer, error = %e, "Shutdown failed");
        }
    }
}

/// Handle a single client connection until it exits, closes or fails.
pub async fn handle_connection<S>(
    stream: S,
    peer: SocketAddr,
    counter: Arc<MessageCounter>,
) -> io::Result<SessionEnd>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    Session::new(stream, peer, counter).run().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    fn peer() -> SocketAddr {
        "127.0.0.1:50000".parse().unwrap()
    }

    #[tokio::test]
    async fn test_reply_per_message_then_exit() {
        let counter = Arc::new(MessageCounter::new());
        let stream = Builder::new()
            .read(b"hello\n")
            .write(b"Total messages received by server: 1\n")
            .read(b"again\n")
            .write(b"Total messages received by server: 2\n")
            .read(b"exit\n")
            .build();

        let end = handle_connection(stream, peer(), Arc::clone(&counter))
            .await
            .unwrap();
        assert_eq!(end, SessionEnd::ExitRequested);
        assert_eq!(counter.current(), 2);
    }

    #[tokio::test]
    async fn test_exit_sends_no_reply() {
        let counter = Arc::new(MessageCounter::new());
        let stream = Builder::new().read(b"exit\r\n").build();

        let end = handle_connection(stream, peer(), Arc::clone(&counter))
            .await
            .unwrap();
        assert_eq!(end, SessionEnd::ExitRequested);
        assert_eq!(counter.current(), 0);
    }

    #[tokio::test]
    async fn test_peer_close() {
        let counter = Arc::new(MessageCounter::new());
        let stream = Builder::new()
            .read(b"hi\n")
            .write(b"Total messages received by server: 1\n")
            .build();

        let end = handle_connection(stream, peer(), Arc::clone(&counter))
            .await
            .unwrap();
        assert_eq!(end, SessionEnd::PeerClosed);
        assert_eq!(counter.current(), 1);
    }

    #[tokio::test]
    async fn test_unterminated_last_line_is_counted() {
        let counter = Arc::new(MessageCounter::new());
        let (mut client, server) = tokio::io::duplex(1024);
        let session = tokio::spawn(handle_connection(server, peer(), Arc::clone(&counter)));

        client.write_all(b"tail").await.unwrap();
        client.shutdown().await.unwrap();

        let mut reply = String::new();
        client.read_to_string(&mut reply).await.unwrap();
        assert_eq!(reply, "Total messages received by server: 1\n");
        assert_eq!(session.await.unwrap().unwrap(), SessionEnd::PeerClosed);
        assert_eq!(counter.current(), 1);
    }

    #[tokio::test]
    async fn test_overlong_line_ends_session() {
        let counter = Arc::new(MessageCounter::new());
        let stream = Builder::new().read(&vec![b'a'; MAX_LINE_LENGTH]).build();

        let err = handle_connection(stream, peer(), Arc::clone(&counter))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert_eq!(counter.current(), 0);
    }

    #[tokio::test]
    async fn test_line_at_limit_is_accepted() {
        let counter = Arc::new(MessageCounter::new());
        let mut line = vec![b'a'; MAX_LINE_LENGTH - 1];
        line.push(b'\n');
        let stream = Builder::new()
            .read(&line)
            .write(b"Total messages received by server: 1\n")
            .build();

        let end = handle_connection(stream, peer(), counter).await.unwrap();
        assert_eq!(end, SessionEnd::PeerClosed);
    }

    #[tokio::test]
    async fn test_lines_in_one_segment_answered_in_order() {
        let counter = Arc::new(MessageCounter::new());
        let stream = Builder::new()
            .read(b"first\nsecond\n")
            .write(b"Total messages received by server: 1\n")
            .write(b"Total messages received by server: 2\n")
            .read(b"exit\n")
            .build();

        let end = handle_connection(stream, peer(), counter).await.unwrap();
        assert_eq!(end, SessionEnd::ExitRequested);
    }

    #[tokio::test]
    async fn test_sessions_share_counter() {
        let counter = Arc::new(MessageCounter::new());
        let first = Builder::new()
            .read(b"a\n")
            .write(b"Total messages received by server: 1\n")
            .read(b"exit\n")
            .build();
        let second = Builder::new()
            .read(b"b\n")
            .write(b"Total messages received by server: 2\n")
            .build();

        handle_connection(first, peer(), Arc::clone(&counter))
            .await
            .unwrap();
        handle_connection(second, peer(), Arc::clone(&counter))
            .await
            .unwrap();
        assert_eq!(counter.current(), 2);
    }

    #[tokio::test]
    async fn test_read_error_ends_session() {
        let counter = Arc::new(MessageCounter::new());
        let stream = Builder::new()
            .read(b"hi\n")
            .write(b"Total messages received by server: 1\n")
            .read_error(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            .build();

        let err = handle_connection(stream, peer(), Arc::clone(&counter))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);
        assert_eq!(counter.current(), 1);
    }

    #[tokio::test]
    async fn test_write_error_ends_session() {
        let counter = Arc::new(MessageCounter::new());
        let stream = Builder::new()
            .read(b"hi\n")
            .write_error(io::Error::new(io::ErrorKind::BrokenPipe, "gone"))
            .build();

        let err = handle_connection(stream, peer(), Arc::clone(&counter))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        // The increment happened before the write failed; it is not retried
        assert_eq!(counter.current(), 1);
    }
}
