//! Line protocol shared by the server and the client.
//!
//! Every request is a single line of text terminated by `\n` (a preceding
//! `\r` is tolerated). The exact line `exit` ends the session and gets no
//! reply. Any other line is a message, answered with one line:
//!
//! ```text
//! Request:  hello\n
//! Response: Total messages received by server: 1\n
//!
//! Request:  exit\n
//! Response: (none, server closes the connection)
//! ```

use bytes::{BufMut, BytesMut};
use std::borrow::Cow;

/// Line that terminates a session
pub const EXIT_SENTINEL: &str = "exit";

/// Text preceding the count in every reply
pub const REPLY_PREFIX: &str = "Total messages received by server: ";

/// A classified request line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request<'a> {
    /// Client is leaving; no reply is sent.
    Exit,
    /// Ordinary message to be counted.
    Message(Cow<'a, str>),
}

/// Strip a trailing `\n` or `\r\n` from a raw line.
pub fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Classify a raw line as read from the connection, terminator included.
///
/// The sentinel match is exact and case-sensitive. Invalid UTF-8 is decoded
/// lossily since message text is only ever logged.
pub fn parse_request(raw: &[u8]) -> Request<'_> {
    let line = trim_line_ending(raw);
    if line == EXIT_SENTINEL.as_bytes() {
        Request::Exit
    } else {
        Request::Message(String::from_utf8_lossy(line))
    }
}

/// Format the reply line for a given total.
pub fn format_reply(count: u64) -> BytesMut {
    let count = count.to_string();
    let mut reply = BytesMut::with_capacity(REPLY_PREFIX.len() + count.len() + 1);
    reply.put_slice(REPLY_PREFIX.as_bytes());
    reply.put_slice(count.as_bytes());
    reply.put_u8(b'\n');
    reply
}

/// Extract the count from a reply line, if it is well formed.
pub fn parse_reply(line: &str) -> Option<u64> {
    line.trim_end_matches(['\r', '\n'])
        .strip_prefix(REPLY_PREFIX)?
        .parse()
        .ok()
}

/// Whether a user-typed line, terminator stripped, is the exit sentinel
pub fn is_exit(line: &[u8]) -> bool {
    line == EXIT_SENTINEL.as_bytes()
}
