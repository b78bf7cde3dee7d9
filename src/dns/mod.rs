//! Authoritative DNS answer engine.
//!
//! Every query for a name at or below the configured
//! [`Config::domain`][`crate::config::Config::domain`] is answered from an ordered list of
//! [`Finder`]s. For each finder, highest priority first, the exact query name and then its
//! wildcard generalizations are tried:
//!
//! ```text
//! a.b.c1da9f3d.sonar.test.
//! *.b.c1da9f3d.sonar.test.
//! *.c1da9f3d.sonar.test.
//! *.sonar.test.
//! ```
//!
//! The first finder to give an authoritative answer wins, even an empty one (NOERROR with no
//! records). Wildcard owner names in the winning answer are replaced by the query name. When
//! every finder declines the response is NXDOMAIN, as it is for names outside the origin. A
//! finder error is answered with SERVFAIL. Opcodes other than QUERY get NOTIMP.
//!
//! UDP responses are truncated to 512 bytes, or to the payload size a client advertises with
//! EDNS, by dropping trailing answers and setting the TC bit.
//!
//! # Finders
//!
//! [`new`] wires the finders in this order:
//!
//! 1. ACME [DNS-01] challenge records provisioned through [`ChallengeProvider`].
//! 2. [`DynamicFinder`]: records owned by payloads in a [`RecordStore`][crate::store::RecordStore],
//!    answered according to their [`Strategy`][crate::store::Strategy].
//! 3. Extra records from [`DnsConfig::zone_file`][crate::config::DnsConfig::zone_file], if set.
//! 4. [`SoaFinder`]: the SOA of the apex and of `*.<domain>`.
//! 5. The [default records][records::default_records].
//!
//! ## Default records
//!
//! With config:
//! ```json
//! {
//!   "domain": "sonar.test",
//!   "ip": "192.0.2.1",
//!   "ns_admin": "dns-admin@sonar.test",
//!   ...
//! }
//! ```
//!
//! the apex and every name below it answer:
//!
//! ```text
//! NS    600  ns1.sonar.test. ns2.sonar.test.
//! A     600  192.0.2.1
//! AAAA  60   ::ffff:192.0.2.1
//! MX    600  10 mx.sonar.test.
//! ```
//!
//! and the apex has `CAA 0 issue "letsencrypt.org"`. The apex and `*.sonar.test` answer:
//!
//! ```text
//! SOA   ns1.sonar.test. dns-admin.sonar.test. 20230312 86400 7200 3600000 172800
//! ```
//!
//! _Note: The zone serial (`20230312`) is the UTC date the query is answered._
//!
//! ## Dynamic records
//!
//! A query for `test.c1da9f3d.sonar.test` looks up the payload with subdomain `c1da9f3d` and
//! its record named `test` of the queried type; labels further left become part of the record
//! name (`a.b.c1da9f3d` is record `a.b`). Missing payloads or records fall through to the next
//! finder.
//!
//! [DNS-01]: https://www.rfc-editor.org/rfc/rfc8555#section-8.4

mod dynamic;
mod finder;
pub mod names;
pub mod records;
mod server;
mod soa;
mod static_records;

pub use dynamic::{DynamicFinder, REBIND_WINDOW};
pub use finder::{DynFinder, Finder, Lookup};
pub use server::{Handler, Server};
pub use soa::SoaFinder;
pub use static_records::{dns01_record, ChallengeProvider, StaticRecords};

use crate::config::Config;
use crate::error::Error;
use crate::event::SharedSink;
use crate::store::DynRecordStore;
use std::sync::Arc;

/// Bind the DNS server described by `config`.
///
/// Returns the server along with the challenge record set, to be handed to an ACME client as
/// its [`ChallengeProvider`].
///
/// # Errors
///
/// Returns [`Error::IO`] if the zone file can't be read or a listener can't be bound, and the
/// parse error of the first bad line in the zone file.
pub async fn new(
    config: &Config,
    store: DynRecordStore,
    sink: Option<SharedSink>,
) -> Result<(Server, Arc<StaticRecords>), Error> {
    let origin = config.origin()?;

    let challenges = Arc::new(StaticRecords::default());
    let mut finders: Vec<DynFinder> = vec![
        challenges.clone(),
        Arc::new(DynamicFinder::new(store, &origin)),
    ];

    if let Some(zone_file) = &config.dns.zone_file {
        let text = tokio::fs::read_to_string(zone_file).await?;
        let extra = records::parse_records(&text, &origin)?;
        tracing::debug!(
            "loaded {} records from {}",
            extra.len(),
            zone_file.display()
        );
        finders.push(Arc::new(StaticRecords::new(extra)));
    }

    finders.push(Arc::new(SoaFinder::new(&origin, config.ns_admin()?)?));
    let defaults = records::default_records(&origin, config.ip)?;
    finders.push(Arc::new(StaticRecords::new(defaults)));

    let handler = Handler::new(&origin, finders, sink);
    let tcp = config
        .dns
        .tcp_bind_addr
        .map(|addr| (addr, config.dns.tcp_timeout));
    let server = Server::bind(config.dns.bind_addr, tcp, handler).await?;
    Ok((server, challenges))
}
