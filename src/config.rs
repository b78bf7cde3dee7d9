use crate::dns::names::fqdn;
use crate::error::Error;
use crate::netx::Limits;
use serde::Deserialize;
use serde_with::{serde_as, DurationSeconds};
use std::borrow::Cow;
use std::fs::File;
use std::io::BufReader;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use trust_dns_proto::rr::Name;

pub type SharedConfig = Arc<Config>;

#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    /// Origin served by the DNS listener and announced by the session listeners.
    pub domain: String,
    /// Address returned by the default A/AAAA records.
    pub ip: IpAddr,
    /// SOA contact, `user@domain` or DNS name form.
    pub ns_admin: String,
    #[serde(default)]
    pub dns: DnsConfig,
    /// SMTP listener, disabled when absent.
    pub smtp: Option<SessionConfig>,
    /// FTP listener, disabled when absent.
    pub ftp: Option<SessionConfig>,
    /// Certificate for implicit TLS listeners and SMTP `STARTTLS`.
    pub tls: Option<TlsConfig>,
    /// JSON file seeding the in-memory payload and record store.
    pub store_fixtures: Option<PathBuf>,
}

#[serde_as]
#[derive(Deserialize, Debug, Clone)]
pub struct DnsConfig {
    #[serde(default = "default_dns_bind_addr")]
    pub bind_addr: SocketAddr,
    /// TCP listener, UDP only when absent.
    pub tcp_bind_addr: Option<SocketAddr>,
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_dns_tcp_timeout")]
    pub tcp_timeout: Duration,
    /// Extra records in zone file syntax, answered before the default records.
    pub zone_file: Option<PathBuf>,
}

impl Default for DnsConfig {
    fn default() -> Self {
        DnsConfig {
            bind_addr: default_dns_bind_addr(),
            tcp_bind_addr: None,
            tcp_timeout: default_dns_tcp_timeout(),
            zone_file: None,
        }
    }
}

#[serde_as]
#[derive(Deserialize, Debug, Clone)]
pub struct SessionConfig {
    pub bind_addr: SocketAddr,
    /// Complete a TLS handshake before the protocol starts (SMTPS, FTPS).
    #[serde(default)]
    pub implicit_tls: bool,
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_session_timeout")]
    pub session_timeout: Duration,
    #[serde(default = "default_max_bytes")]
    pub max_bytes: u64,
    #[serde(default = "default_max_line_length")]
    pub max_line_length: usize,
    /// Text of the greeting banner, the domain when absent.
    pub greeting: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct TlsConfig {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

fn default_dns_bind_addr() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 53)
}

fn default_dns_tcp_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_idle_timeout() -> Duration {
    Limits::default().idle_timeout
}

fn default_session_timeout() -> Duration {
    Limits::default().session_timeout
}

fn default_max_bytes() -> u64 {
    Limits::default().max_bytes
}

fn default_max_line_length() -> usize {
    Limits::default().max_line_length
}

impl Config {
    /// Load and validate a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IO`] if the file can't be read, [`Error::InvalidJSON`] if it can't be
    /// parsed and [`Error::InvalidConfig`] if the settings are inconsistent.
    pub fn try_from_file(p: impl AsRef<Path>) -> Result<Self, Error> {
        let f = File::open(p)?;
        let reader = BufReader::new(f);
        let conf: Config = serde_json::from_reader(reader)?;
        conf.validate()?;
        Ok(conf)
    }

    /// Check settings that parse fine but can't work together.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] naming the first problem found.
    pub fn validate(&self) -> Result<(), Error> {
        if self.domain.trim_matches('.').is_empty() {
            return Err(Error::InvalidConfig("domain must not be empty".to_string()));
        }
        self.origin()?;
        self.ns_admin()?;

        for (proto, session) in [("smtp", &self.smtp), ("ftp", &self.ftp)] {
            let Some(session) = session else { continue };
            if session.implicit_tls && self.tls.is_none() {
                return Err(Error::InvalidConfig(format!(
                    "{proto}.implicit_tls requires a tls section"
                )));
            }
            if session.idle_timeout.is_zero() || session.session_timeout.is_zero() {
                return Err(Error::InvalidConfig(format!(
                    "{proto} timeouts must be non-zero"
                )));
            }
            if session.max_bytes == 0 || session.max_line_length == 0 {
                return Err(Error::InvalidConfig(format!(
                    "{proto} byte limits must be non-zero"
                )));
            }
        }
        Ok(())
    }

    /// The served origin as a fully qualified name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DNSError`] if `domain` is not a valid DNS name.
    pub fn origin(&self) -> Result<Name, Error> {
        Ok(Name::from_ascii(fqdn(&self.domain))?)
    }

    /// The SOA contact as a fully qualified name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DNSError`] if `ns_admin` does not form a valid DNS name.
    pub fn ns_admin(&self) -> Result<Name, Error> {
        Ok(Name::from_ascii(fqdn(&self.sanitized_ns_admin()))?)
    }

    fn sanitized_ns_admin(&self) -> Cow<str> {
        match self.ns_admin.split_once('@') {
            Some((user, domain)) => {
                let user = user.replace('.', "\\.");
                Cow::Owned(format!("{user}.{domain}"))
            }
            _ => Cow::Borrowed(&self.ns_admin),
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub fn limits(&self) -> Limits {
        Limits {
            idle_timeout: self.idle_timeout,
            session_timeout: self.session_timeout,
            max_bytes: self.max_bytes,
            max_line_length: self.max_line_length,
        }
    }

    /// Greeting banner text, falling back to `domain`.
    #[must_use]
    pub fn greeting<'a>(&'a self, domain: &'a str) -> &'a str {
        self.greeting.as_deref().unwrap_or(domain)
    }
}
