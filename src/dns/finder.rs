use crate::error::Error;
use std::sync::Arc;
use trust_dns_proto::rr::{Record, RecordType};

/// Outcome of asking one [`Finder`] about one candidate name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// No opinion, try the next candidate name or finder.
    Decline,
    /// Authoritative answer. An empty list asserts the name has no records of the type.
    Answer(Vec<Record>),
}

/// A source of answers consulted by the DNS server in priority order.
#[async_trait::async_trait]
pub trait Finder: Send + Sync {
    /// Look up records of `qtype` for `name`, a lowercase FQDN that may be a wildcard.
    async fn find(&self, name: &str, qtype: RecordType) -> Result<Lookup, Error>;
}

/// `DynFinder` is a type alias for a [`Finder`] shared with the DNS server.
pub type DynFinder = Arc<dyn Finder>;
