use crate::error::Error;
use crate::ftp::FtpMeta;
use crate::netx::{parse_cmd, Closed, LoggingConn};
use tracing::debug;

/// Replies to one command, and whether the session ends after them.
#[derive(Debug, PartialEq, Eq)]
struct Reply {
    lines: &'static [&'static str],
    close: bool,
}

const fn reply(lines: &'static [&'static str]) -> Reply {
    Reply {
        lines,
        close: false,
    }
}

const fn closing(lines: &'static [&'static str]) -> Reply {
    Reply { lines, close: true }
}

#[derive(Default)]
pub(super) struct Session {
    pub(super) meta: FtpMeta,
}

impl Session {
    pub(super) async fn run(
        &mut self,
        mut conn: LoggingConn,
        greeting: &str,
    ) -> (Closed, Result<(), Error>) {
        if let Err(err) = conn.write_line(&format!("220 {greeting}")).await {
            return (conn.close().await, Err(err));
        }

        loop {
            let line = match conn.read_line().await {
                Ok(Some(line)) => line,
                Ok(None) => return (conn.close().await, Ok(())),
                Err(err) => return (conn.close().await, Err(err)),
            };

            let reply = self.step(&line);
            for line in reply.lines {
                if let Err(err) = conn.write_line(line).await {
                    return (conn.close().await, Err(err));
                }
            }
            if reply.close {
                return (conn.close().await, Ok(()));
            }
        }
    }

    // No data connection is ever opened: passive mode is refused and RETR fails before a
    // transfer would start, which is enough to learn the requested path.
    fn step(&mut self, line: &str) -> Reply {
        let (verb, args) = parse_cmd(line);
        debug!(verb = %verb, "ftp command");

        let meta = &mut self.meta;
        match verb.as_str() {
            "USER" => {
                meta.user = args.to_string();
                reply(&["331 Please specify the password."])
            }
            "PASS" => {
                meta.pass = args.to_string();
                reply(&["230 Login successful."])
            }
            "TYPE" => {
                meta.transfer_type = args.to_string();
                match args.to_ascii_uppercase().as_str() {
                    "I" => reply(&["200 Switching to Binary mode."]),
                    "A" => reply(&["200 Switching to ASCII mode."]),
                    _ => reply(&["500 Unrecognised TYPE command."]),
                }
            }
            "EPSV" => {
                meta.epsv = args.to_string();
                if args.eq_ignore_ascii_case("ALL") {
                    reply(&["200 EPSV ALL ok."])
                } else {
                    reply(&["550 Permission denied."])
                }
            }
            "PASV" => {
                meta.pasv = args.to_string();
                reply(&["550 Permission denied."])
            }
            "EPRT" => {
                meta.eprt = args.to_string();
                reply(&["200 EPRT command successful"])
            }
            "PORT" => {
                meta.port = args.to_string();
                reply(&["200 EPRT command successful"])
            }
            "RETR" => {
                meta.retr = args.to_string();
                closing(&["451 Nope.", "221 Goodbye."])
            }
            "QUIT" => closing(&["221 Goodbye."]),
            _ => reply(&["500 Unknown command."]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xxe_retrieval() {
        let mut s = Session::default();
        assert_eq!(
            s.step("USER username"),
            reply(&["331 Please specify the password."])
        );
        assert_eq!(s.step("PASS password"), reply(&["230 Login successful."]));
        assert_eq!(s.step("TYPE I"), reply(&["200 Switching to Binary mode."]));
        assert_eq!(s.step("EPSV ALL"), reply(&["200 EPSV ALL ok."]));
        assert_eq!(s.step("EPSV"), reply(&["550 Permission denied."]));
        assert_eq!(
            s.step("EPRT |1|172.17.0.5|43337|"),
            reply(&["200 EPRT command successful"])
        );
        assert_eq!(
            s.step("RETR filename"),
            closing(&["451 Nope.", "221 Goodbye."])
        );

        assert_eq!(
            s.meta,
            FtpMeta {
                user: "username".to_string(),
                pass: "password".to_string(),
                transfer_type: "I".to_string(),
                pasv: String::new(),
                epsv: String::new(),
                port: String::new(),
                eprt: "|1|172.17.0.5|43337|".to_string(),
                retr: "filename".to_string(),
            }
        );
    }

    #[test]
    fn test_other_replies() {
        let mut s = Session::default();
        assert_eq!(s.step("type a"), reply(&["200 Switching to ASCII mode."]));
        assert_eq!(s.step("TYPE L 8"), reply(&["500 Unrecognised TYPE command."]));
        assert_eq!(s.step("PASV"), reply(&["550 Permission denied."]));
        assert_eq!(
            s.step("PORT 127,0,0,1,4,1"),
            reply(&["200 EPRT command successful"])
        );
        assert_eq!(s.step("SITE CHMOD"), reply(&["500 Unknown command."]));
        assert_eq!(s.step("quit"), closing(&["221 Goodbye."]));
        assert_eq!(s.meta.transfer_type, "L 8");
        assert_eq!(s.meta.port, "127,0,0,1,4,1");
    }
}
