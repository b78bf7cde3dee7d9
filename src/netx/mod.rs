//! Connection framework shared by the line oriented listeners.
//!
//! A [`Server`] accepts TCP connections (optionally completing a TLS handshake first), wraps
//! each one in a [`LoggingConn`] and runs the protocol [`Handler`] for it on its own task.
//!
//! [`LoggingConn`] records every byte read from and written to the peer in a [`Transcript`]
//! and bounds every read and write by the connection's [`Limits`]:
//!
//! - an idle peer is disconnected `idle_timeout` after the last I/O call started,
//! - no connection lives longer than `session_timeout`, even when the peer keeps trickling
//!   data in faster than the idle timeout,
//! - no more than `max_bytes` are consumed from the peer.
//!
//! Mid-session TLS (e.g. SMTP `STARTTLS`) is an explicit [`LoggingConn::upgrade`] that
//! consumes the plaintext connection and returns a new one carrying the same transcript.

mod conn;
mod server;
pub mod tls;

pub use conn::{Closed, Limits, LoggingConn, Stream, Transcript, UpgradeError};
pub use server::{Handler, Server};

/// Split a command line into its uppercased verb and the arguments after the first space.
#[must_use]
pub fn parse_cmd(line: &str) -> (String, &str) {
    let (verb, args) = line.split_once(' ').unwrap_or((line, ""));
    (verb.to_ascii_uppercase(), args)
}
