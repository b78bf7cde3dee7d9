use crate::error::Error;
use crate::netx::{parse_cmd, Closed, LoggingConn, UpgradeError};
use crate::smtp::SmtpMeta;
use lazy_static::lazy_static;
use regex::Regex;
use tokio_rustls::TlsAcceptor;
use tracing::debug;

lazy_static! {
    // NB: unwrap is safe: constant pattern.
    static ref ADDR_REGEX: Regex = Regex::new(r"(?i)^\s*(?:FROM|TO):\s*(<[^>]*>|\S*)").unwrap();
}

const BAD_SEQUENCE: &str = "503 Bad sequence of commands";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Helo,
    MailFrom,
    RcptTo,
    Data,
}

/// What the I/O loop has to do after a line was processed.
#[derive(Debug, PartialEq, Eq)]
enum Action {
    Reply(Vec<String>),
    /// A body line, nothing is sent back.
    Silent,
    StartTls,
    Quit,
}

fn reply(line: &str) -> Action {
    Action::Reply(vec![line.to_string()])
}

/// One SMTP conversation. Lives as long as the connection, across `STARTTLS` upgrades.
pub(super) struct Session<'a> {
    greeting: &'a str,
    tls: Option<&'a TlsAcceptor>,
    state: State,
    pub(super) meta: SmtpMeta,
}

impl<'a> Session<'a> {
    pub(super) fn new(greeting: &'a str, tls: Option<&'a TlsAcceptor>) -> Self {
        Session {
            greeting,
            tls,
            state: State::Helo,
            meta: SmtpMeta::default(),
        }
    }

    /// Drive the conversation until the peer quits, the connection fails or a limit is hit.
    /// The connection is always closed; its remains are returned with the reason.
    pub(super) async fn run(&mut self, conn: LoggingConn) -> (Closed, Result<(), Error>) {
        let mut conn = conn;

        if let Err(err) = conn
            .write_line(&format!("220 {} ESMTP ready", self.greeting))
            .await
        {
            return (conn.close().await, Err(err));
        }

        loop {
            let line = match conn.read_line().await {
                Ok(Some(line)) => line,
                Ok(None) => return (conn.close().await, Ok(())),
                Err(err) => return (conn.close().await, Err(err)),
            };

            match self.step(&line, conn.is_secure()) {
                Action::Silent => {}
                Action::Reply(lines) => {
                    for line in lines {
                        if let Err(err) = conn.write_line(&line).await {
                            return (conn.close().await, Err(err));
                        }
                    }
                }
                Action::Quit => {
                    let res = conn.write_line("221 OK").await;
                    return (conn.close().await, res);
                }
                Action::StartTls => {
                    // step only asks for an upgrade when an acceptor is configured.
                    let Some(acceptor) = self.tls else {
                        continue;
                    };
                    if let Err(err) = conn.write_line("220 Ready to start TLS").await {
                        return (conn.close().await, Err(err));
                    }
                    conn = match conn.upgrade(acceptor).await {
                        Ok(upgraded) => upgraded,
                        Err(UpgradeError { closed, error }) => return (closed, Err(error)),
                    };
                    debug!(peer = %conn.remote_addr(), "connection upgraded to TLS");
                    self.state = State::Helo;
                }
            }
        }
    }

    fn step(&mut self, line: &str, secure: bool) -> Action {
        if self.state == State::Data {
            if line == "." {
                self.state = State::MailFrom;
                return reply("250 OK");
            }
            self.meta.data.push_str(line);
            self.meta.data.push('\n');
            return Action::Silent;
        }

        let (verb, args) = parse_cmd(line);
        debug!(verb = %verb, state = ?self.state, "smtp command");

        match (self.state, verb.as_str()) {
            (_, "QUIT") => Action::Quit,
            (_, "NOOP") => reply("250 OK"),
            (state, "RSET") => {
                if state != State::Helo {
                    self.state = State::MailFrom;
                }
                reply("250 OK")
            }
            (State::Helo, "HELO") => {
                self.meta.helo = args.to_string();
                self.state = State::MailFrom;
                reply("250 Hello")
            }
            (State::Helo, "EHLO") => {
                self.meta.ehlo = args.to_string();
                self.state = State::MailFrom;
                if self.tls.is_some() && !secure {
                    Action::Reply(vec![
                        format!("250-{}", self.greeting),
                        "250 STARTTLS".to_string(),
                    ])
                } else {
                    Action::Reply(vec![format!("250 {}", self.greeting)])
                }
            }
            (State::MailFrom, "STARTTLS") => match self.tls {
                None => reply("502 Command not implemented"),
                Some(_) if secure => reply(BAD_SEQUENCE),
                Some(_) => Action::StartTls,
            },
            (State::MailFrom, "MAIL") => {
                self.meta.mail_from = extract_addr(args);
                self.state = State::RcptTo;
                reply("250 OK")
            }
            (State::RcptTo, "RCPT") => {
                self.meta.rcpt_to.push(extract_addr(args));
                reply("250 OK")
            }
            (State::RcptTo, "DATA") => {
                self.state = State::Data;
                reply("354 Send data")
            }
            _ => reply(BAD_SEQUENCE),
        }
    }
}

// "FROM:<a@b> SIZE=10" -> "<a@b>"
fn extract_addr(args: &str) -> String {
    ADDR_REGEX
        .captures(args)
        .and_then(|c| c.get(1))
        .map_or_else(|| args.trim().to_string(), |m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::netx::tls::acceptor_from_der;

    fn lines(lines: &[&str]) -> Action {
        Action::Reply(lines.iter().map(ToString::to_string).collect())
    }

    fn acceptor() -> TlsAcceptor {
        let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        acceptor_from_der(
            vec![cert.serialize_der().unwrap()],
            cert.serialize_private_key_der(),
        )
        .unwrap()
    }

    #[test]
    fn test_extract_addr() {
        assert_eq!(extract_addr("FROM:<a@b.c>"), "<a@b.c>");
        assert_eq!(extract_addr("from: <a@b.c> SIZE=100"), "<a@b.c>");
        assert_eq!(extract_addr("TO:user@host"), "user@host");
        assert_eq!(extract_addr("<x@y>"), "<x@y>");
    }

    #[test]
    fn test_message_flow() {
        let mut s = Session::new("sonar.test", None);
        assert_eq!(s.step("HELO client", false), lines(&["250 Hello"]));
        assert_eq!(s.step("MAIL FROM:<a@x>", false), lines(&["250 OK"]));
        assert_eq!(s.step("RCPT TO:<b@y>", false), lines(&["250 OK"]));
        assert_eq!(s.step("rcpt to:<c@y>", false), lines(&["250 OK"]));
        assert_eq!(s.step("DATA", false), lines(&["354 Send data"]));
        assert_eq!(s.step("Subject: hi", false), Action::Silent);
        assert_eq!(s.step("", false), Action::Silent);
        assert_eq!(s.step("QUIT", false), Action::Silent);
        assert_eq!(s.step(".", false), lines(&["250 OK"]));
        assert_eq!(s.step("MAIL FROM:<d@x>", false), lines(&["250 OK"]));
        assert_eq!(s.step("QUIT", false), Action::Quit);

        assert_eq!(s.meta.helo, "client");
        assert_eq!(s.meta.mail_from, "<d@x>");
        assert_eq!(s.meta.rcpt_to, vec!["<b@y>", "<c@y>"]);
        assert_eq!(s.meta.data, "Subject: hi\n\nQUIT\n");
    }

    #[test]
    fn test_bad_sequence() {
        let mut s = Session::new("sonar.test", None);
        assert_eq!(s.step("MAIL FROM:<a@x>", false), lines(&[BAD_SEQUENCE]));
        assert_eq!(s.step("DATA", false), lines(&[BAD_SEQUENCE]));
        assert_eq!(s.step("NOOP", false), lines(&["250 OK"]));
        assert_eq!(s.step("EHLO client", false), lines(&["250 sonar.test"]));
        assert_eq!(s.step("EHLO again", false), lines(&[BAD_SEQUENCE]));
        assert_eq!(s.step("RCPT TO:<b@y>", false), lines(&[BAD_SEQUENCE]));
        assert_eq!(s.step("STARTTLS", false), lines(&["502 Command not implemented"]));
        assert_eq!(s.meta.ehlo, "client");
        assert!(s.meta.mail_from.is_empty());
    }

    #[test]
    fn test_rset() {
        let mut s = Session::new("sonar.test", None);
        assert_eq!(s.step("RSET", false), lines(&["250 OK"]));
        assert_eq!(s.state, State::Helo);

        s.step("HELO client", false);
        s.step("MAIL FROM:<a@x>", false);
        assert_eq!(s.step("RSET", false), lines(&["250 OK"]));
        assert_eq!(s.state, State::MailFrom);
        assert_eq!(s.meta.mail_from, "<a@x>");
    }

    #[test]
    fn test_starttls_negotiation() {
        let acceptor = acceptor();
        let mut s = Session::new("sonar.test", Some(&acceptor));
        assert_eq!(
            s.step("EHLO client", false),
            lines(&["250-sonar.test", "250 STARTTLS"])
        );
        assert_eq!(s.step("STARTTLS", false), Action::StartTls);

        // After the upgrade the client greets again over TLS.
        s.state = State::Helo;
        assert_eq!(s.step("EHLO client", true), lines(&["250 sonar.test"]));
        assert_eq!(s.step("STARTTLS", true), lines(&[BAD_SEQUENCE]));
    }
}
