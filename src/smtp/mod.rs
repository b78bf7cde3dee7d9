//! SMTP listener.
//!
//! Accepts mail for any address and records the envelope and message body. The conversation
//! follows the states `HELO → MAIL FROM → RCPT TO → DATA`, where the end of a message (a line
//! holding a single `.`) returns to `MAIL FROM` so several messages can share a connection.
//! Out of sequence commands get `503 Bad sequence of commands`.
//!
//! When a TLS certificate is configured `EHLO` advertises `STARTTLS`. After a successful
//! upgrade the client has to greet again; the captured transcript carries on unbroken across
//! the plaintext and TLS parts of the conversation.
//!
//! ```text
//! S: 220 sonar.test ESMTP ready
//! C: EHLO client
//! S: 250-sonar.test
//! S: 250 STARTTLS
//! C: STARTTLS
//! S: 220 Ready to start TLS
//! ... TLS handshake ...
//! C: EHLO client
//! S: 250 sonar.test
//! C: MAIL FROM:<a@example.com>
//! S: 250 OK
//! C: RCPT TO:<c1da9f3d@sonar.test>
//! S: 250 OK
//! C: DATA
//! S: 354 Send data
//! C: Subject: hello
//! C: .
//! S: 250 OK
//! C: QUIT
//! S: 221 OK
//! ```
//!
//! Every connection produces exactly one [`Event`] when it ends, whether by `QUIT`, timeout or
//! I/O error.

mod session;

use crate::event::{Event, Meta, Protocol, SharedSink};
use crate::netx::{Handler, LoggingConn};
use serde::Serialize;
use session::Session;
use time::OffsetDateTime;
use tokio_rustls::TlsAcceptor;
use tracing::{info, warn};

/// Command arguments recorded during an SMTP session.
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct SmtpMeta {
    pub helo: String,
    pub ehlo: String,
    pub mail_from: String,
    pub rcpt_to: Vec<String>,
    /// Body lines of every message, each terminated by `\n`.
    pub data: String,
}

#[allow(clippy::module_name_repetitions)]
pub struct SmtpHandler {
    greeting: String,
    starttls: Option<TlsAcceptor>,
    sink: SharedSink,
}

impl SmtpHandler {
    /// `greeting` is the host name announced in the banner and the `EHLO` reply. `STARTTLS` is
    /// offered only when `starttls` is set.
    pub fn new(
        greeting: impl Into<String>,
        starttls: Option<TlsAcceptor>,
        sink: SharedSink,
    ) -> Self {
        SmtpHandler {
            greeting: greeting.into(),
            starttls,
            sink,
        }
    }
}

#[async_trait::async_trait]
impl Handler for SmtpHandler {
    async fn handle(&self, conn: LoggingConn) {
        let received_at = OffsetDateTime::now_utc();
        let remote_addr = conn.remote_addr();

        let mut session = Session::new(&self.greeting, self.starttls.as_ref());
        let (closed, result) = session.run(conn).await;
        match result {
            Ok(()) => {}
            Err(err) if err.is_normal_termination() => {
                info!(peer = %remote_addr, "smtp session ended: {err}");
            }
            Err(err) => warn!(peer = %remote_addr, "smtp session failed: {err:?}"),
        }
        info!(
            peer = %remote_addr,
            secure = closed.secure,
            bytes = closed.transcript.combined.len(),
            "smtp session closed"
        );

        self.sink.emit(Event {
            protocol: Protocol::Smtp,
            remote_addr,
            read: closed.transcript.read,
            written: closed.transcript.written,
            combined: closed.transcript.combined,
            meta: Meta::Smtp(session.meta),
            secure: closed.secure,
            received_at,
        });
    }
}
