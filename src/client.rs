//! Interactive client for the line-tally server.
//!
//! Reads one line of user input at a time, forwards it, and prints the
//! server's reply. Typing `exit` sends the sentinel, waits a short grace
//! period so the server can log the disconnection, then closes.

use crate::protocol::{self, EXIT_SENTINEL};
use bytes::{BufMut, BytesMut};
use std::io;
use std::time::Duration;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

const PROMPT: &[u8] = b"Enter message (type 'exit' to quit): ";

/// Default wait between sending `exit` and closing the connection
pub const DEFAULT_EXIT_GRACE: Duration = Duration::from_secs(2);

/// Client behavior settings
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// How long to wait after sending `exit` before closing
    pub exit_grace: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            exit_grace: DEFAULT_EXIT_GRACE,
        }
    }
}

/// How an interactive session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientOutcome {
    /// The user typed `exit` (or local input ended).
    ExitRequested,
    /// The server closed the connection while a reply was expected.
    ServerClosed,
}

/// A connected client
pub struct Client<S> {
    stream: BufReader<S>,
    options: ClientOptions,
    reply: String,
}

impl Client<TcpStream> {
    /// Connect to a server.
    pub async fn connect(addr: &str, options: ClientOptions) -> io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        info!(server = %addr, local = ?stream.local_addr().ok(), "Connected");
        Ok(Self::new(stream, options))
    }
}

impl<S> Client<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, options: ClientOptions) -> Self {
        Self {
            stream: BufReader::new(stream),
            options,
            reply: String::new(),
        }
    }

    /// Drive the prompt/send/reply loop until exit or server closure.
    ///
    /// `input` supplies user lines and `output` receives the transcript.
    /// The connection is shut down before returning on the non-error paths.
    pub async fn run<I, O>(mut self, mut input: I, mut output: O) -> io::Result<ClientOutcome>
    where
        I: AsyncBufRead + Unpin,
        O: AsyncWrite + Unpin,
    {
        let mut line = Vec::new();

        let outcome = loop {
            output.write_all(PROMPT).await?;
            output.flush().await?;

            line.clear();
            let message = if input.read_until(b'\n', &mut line).await? == 0 {
                debug!("Input closed, leaving");
                output.write_all(b"\n").await?;
                EXIT_SENTINEL.as_bytes()
            } else {
                protocol::trim_line_ending(&line)
            };

            self.send(message).await?;

            if protocol::is_exit(message) {
                output.write_all(b"Disconnecting from server...\n").await?;
                output.flush().await?;
                self.exit_grace().await;
                break ClientOutcome::ExitRequested;
            }

            self.reply.clear();
            if self.stream.read_line(&mut self.reply).await? == 0 {
                output.write_all(b"Server closed the connection.\n").await?;
                break ClientOutcome::ServerClosed;
            }

            let reply = self.reply.trim_end_matches(['\r', '\n']);
            debug!(count = ?protocol::parse_reply(reply), "Received reply");
            output
                .write_all(format!("Server response: {reply}\n\n").as_bytes())
                .await?;
        };

        if let Err(e) = self.stream.shutdown().await {
            debug!(error = %e, "Shutdown failed");
        }
        output.write_all(b"Connection closed.\n").await?;
        output.flush().await?;

        Ok(outcome)
    }

    /// Send one line verbatim, whatever its encoding.
    async fn send(&mut self, message: &[u8]) -> io::Result<()> {
        let mut request = BytesMut::with_capacity(message.len() + 1);
        request.put_slice(message);
        request.put_u8(b'\n');

        self.stream.write_all(&request).await?;
        self.stream.flush().await
    }

    /// Give the server time to process the disconnection.
    async fn exit_grace(&self) {
        if self.options.exit_grace.is_zero() {
            return;
        }

        tokio::select! {
            _ = tokio::time::sleep(self.options.exit_grace) => {}
            result = tokio::signal::ctrl_c() => match result {
                Ok(()) => warn!("Interrupted during exit grace period"),
                Err(e) => warn!(error = %e, "Exit grace period cut short"),
            },
        }
    }
}
