//! FTP listener.
//!
//! Records the arguments of the commands an FTP client sends, typically as the result of an
//! SSRF or XXE payload pointing at `ftp://`. Files are never transferred: passive mode is
//! refused and `RETR` fails with `451` right away, then the session is closed.
//!
//! | Command        | Reply                                |
//! |----------------|--------------------------------------|
//! | `USER`         | `331 Please specify the password.`   |
//! | `PASS`         | `230 Login successful.`              |
//! | `TYPE I`/`A`   | `200 Switching to Binary/ASCII mode.`|
//! | `EPSV ALL`     | `200 EPSV ALL ok.`                   |
//! | `EPSV`, `PASV` | `550 Permission denied.`             |
//! | `EPRT`, `PORT` | `200 EPRT command successful`        |
//! | `RETR`         | `451 Nope.` `221 Goodbye.`, close    |
//! | `QUIT`         | `221 Goodbye.`, close                |
//! | anything else  | `500 Unknown command.`               |

mod session;

use crate::event::{Event, Meta, Protocol, SharedSink};
use crate::netx::{Handler, LoggingConn};
use serde::Serialize;
use session::Session;
use time::OffsetDateTime;
use tracing::{info, warn};

/// Arguments of the last command of each kind seen during an FTP session.
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct FtpMeta {
    pub user: String,
    pub pass: String,
    #[serde(rename = "type")]
    pub transfer_type: String,
    pub pasv: String,
    pub epsv: String,
    pub port: String,
    pub eprt: String,
    pub retr: String,
}

#[allow(clippy::module_name_repetitions)]
pub struct FtpHandler {
    greeting: String,
    sink: SharedSink,
}

impl FtpHandler {
    pub fn new(greeting: impl Into<String>, sink: SharedSink) -> Self {
        FtpHandler {
            greeting: greeting.into(),
            sink,
        }
    }
}

#[async_trait::async_trait]
impl Handler for FtpHandler {
    async fn handle(&self, conn: LoggingConn) {
        let received_at = OffsetDateTime::now_utc();
        let remote_addr = conn.remote_addr();

        let mut session = Session::default();
        let (closed, result) = session.run(conn, &self.greeting).await;
        if let Err(err) = result {
            if err.is_normal_termination() {
                info!(peer = %remote_addr, "ftp session ended: {err}");
            } else {
                warn!(peer = %remote_addr, "ftp session failed: {err:?}");
            }
        }
        info!(
            peer = %remote_addr,
            retr = %session.meta.retr,
            bytes = closed.transcript.combined.len(),
            "ftp session closed"
        );

        self.sink.emit(Event {
            protocol: Protocol::Ftp,
            remote_addr,
            read: closed.transcript.read,
            written: closed.transcript.written,
            combined: closed.transcript.combined,
            meta: Meta::Ftp(session.meta),
            secure: closed.secure,
            received_at,
        });
    }
}
