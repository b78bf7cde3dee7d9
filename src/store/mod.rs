//! Payload and dynamic DNS record storage.
//!
//! The capture engine only consults storage, it does not own it. [`RecordStore`] describes
//! the three lookups the [dynamic DNS finder][crate::dns::DynamicFinder] needs; real
//! deployments put a database behind it. [`memory::InMemoryStore`] is provided for tests and
//! for running the binary without a database, optionally seeded from a JSON fixture file.
//!
//! Consistency of the per-record strategy state (`last_answer`, `last_accessed_at`) is the
//! store's business: the engine performs a plain read-modify-write and adds no locking, so
//! concurrent queries for one record may interleave.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::OffsetDateTime;
use trust_dns_proto::rr::RecordType;

pub mod memory;

#[allow(clippy::module_name_repetitions)]
pub use memory::InMemoryStore;

/// A registered token. Its `subdomain` is the label embedded in captured traffic.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub id: i64,
    pub subdomain: String,
}

/// Policy choosing which of a record's values are returned for each query.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Every value, in stored order.
    #[default]
    All,
    /// Every value, rotated left by one on each query.
    RoundRobin,
    /// A single value, advancing while queries keep arriving within the rebind window.
    Rebind,
}

/// DNS record owned by a payload, answered by the dynamic finder.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DnsRecord {
    pub id: i64,
    pub payload_id: i64,

    /// Name relative to the payload subdomain, e.g. `test` or `*.test`.
    pub name: String,

    /// Record type name, e.g. `A` or `TXT`.
    #[serde(rename = "type")]
    pub qtype: String,

    pub ttl: u32,
    pub values: Vec<String>,

    #[serde(default)]
    pub strategy: Strategy,

    /// Values returned by the previous query.
    #[serde(default)]
    pub last_answer: Option<Vec<String>>,

    /// Time of the previous query.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub last_accessed_at: Option<OffsetDateTime>,
}

/// `DynRecordStore` is a type alias for a [`RecordStore`] shared between DNS handlers.
#[allow(clippy::module_name_repetitions)]
pub type DynRecordStore = Arc<dyn RecordStore>;

/// Lookups the dynamic DNS finder performs against external storage.
///
/// A missing payload or record is `Ok(None)`, not an error.
#[async_trait::async_trait]
pub trait RecordStore: Send + Sync {
    /// Find the payload owning `subdomain` (case-insensitive).
    async fn payload_by_subdomain(&self, subdomain: &str) -> Result<Option<Payload>, Error>;

    /// Find the payload's record with the given relative name and type.
    async fn dns_record(
        &self,
        payload_id: i64,
        name: &str,
        qtype: RecordType,
    ) -> Result<Option<DnsRecord>, Error>;

    /// Persist the record's strategy state.
    async fn update_dns_record(&self, record: &DnsRecord) -> Result<(), Error>;
}
