//! Error types.

use trust_dns_proto::error::ProtoError;
use trust_dns_proto::rr::RecordType;

/// Error enumerates the possible capture engine error states.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Returned when a generic IO error occurs, including socket failures inside a session.
    #[error("an IO error occurred")]
    IO(#[from] std::io::Error),

    /// Returned when processing JSON from disk (e.g. [loading a `Config`][crate::config::Config::try_from_file]
    /// or [loading store fixtures][crate::store::InMemoryStore::try_from_file]) fails due to
    /// invalid JSON content.
    #[error("invalid JSON")]
    InvalidJSON(#[from] serde_json::Error),

    /// Returned when the DNS server encounters a generic DNS protocol error.
    #[error("DNS error")]
    DNSError(#[from] ProtoError),

    /// Returned when a stored or templated record value can't be turned into record data of
    /// the given type.
    #[error("invalid {rtype} record value: \"{value}\"")]
    InvalidRecord { rtype: RecordType, value: String },

    /// Returned when a record of a type the engine does not serve is requested or configured.
    #[error("unsupported record type: {0}")]
    UnsupportedRecordType(String),

    /// Returned when a line of record text can't be split into name, TTL, type and value.
    #[error("malformed record line: \"{0}\"")]
    MalformedRecordLine(String),

    /// Returned when the TLS certificate or key can't be loaded.
    #[error("TLS configuration error: {0}")]
    TLSConfig(String),

    /// Returned by a [`RecordStore`][crate::store::RecordStore] when the backing store fails.
    #[error("record store error: {0}")]
    Store(String),

    /// Returned when the loaded configuration is inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The peer sent nothing for longer than the idle timeout.
    #[error("idle timeout")]
    IdleTimeout,

    /// The session outlived its session-wide timeout.
    #[error("session timeout")]
    SessionTimeout,

    /// The peer sent a line longer than the configured maximum.
    #[error("line too long")]
    LineTooLong,

    /// The peer sent more bytes than a single connection may carry.
    #[error("connection byte limit exceeded")]
    MaxBytesExceeded,
}

impl Error {
    /// Whether the error is one of the ways a session ends without anything having gone wrong
    /// on our side: timeouts and byte limits.
    #[must_use]
    pub fn is_normal_termination(&self) -> bool {
        matches!(
            self,
            Error::IdleTimeout | Error::SessionTimeout | Error::MaxBytesExceeded
        )
    }
}
