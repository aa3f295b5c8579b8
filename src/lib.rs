//! line-tally: a line-oriented TCP message counter
//!
//! The server accepts any number of concurrent connections. Every line a
//! client sends is counted in one process-wide total, and the client gets
//! the new total back on the same connection:
//!
//! ```text
//! Request:  hello\n
//! Response: Total messages received by server: 1\n
//! ```
//!
//! Sending `exit` ends the session without a reply.

pub mod client;
pub mod config;
pub mod counter;
pub mod protocol;
pub mod server;
pub mod session;

