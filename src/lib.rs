//! OOB Crab
//!
//! Out-of-band interaction capture for blind vulnerability testing (SSRF, XXE, DNS
//! exfiltration, email callbacks).
//!
//! Authoritative DNS, SMTP and FTP listeners for a controlled domain record every query and
//! session they see. Testers embed a payload token in the traffic they provoke (a subdomain
//! label, a recipient address, an FTP path) and later correlate the captured [`Event`]s with
//! it. The DNS listener also answers per-payload records with
//! [`ALL`, `ROUND_ROBIN` or `REBIND`][store::Strategy] strategies, and provides an
//! [RFC-8555][RFC-8555] [DNS-01] [challenge provider][dns::ChallengeProvider] for
//! certificates covering the domain.
//!
//! [RFC-8555]: https://www.rfc-editor.org/rfc/rfc8555
//! [DNS-01]: https://www.rfc-editor.org/rfc/rfc8555#section-8.4
//!
#![warn(clippy::pedantic)]

pub mod config;
pub mod dns;
pub mod error;
pub mod event;
pub mod ftp;
pub mod netx;
pub mod smtp;
pub mod store;

pub use config::{Config, SharedConfig};
pub use dns::new as new_dns;
pub use event::{Event, EventSink, SharedSink};
pub use ftp::FtpHandler;
pub use smtp::SmtpHandler;
pub use store::InMemoryStore;
