use crate::dns::finder::{Finder, Lookup};
use crate::dns::names::fqdn;
use crate::dns::records::new_rrs;
use crate::error::Error;
use crate::store::{DnsRecord, DynRecordStore, Strategy};
use time::{Duration, OffsetDateTime};
use tracing::debug;
use trust_dns_proto::rr::{Name, RecordType};

/// Queries for a [`Strategy::Rebind`] record arriving closer together than this advance to the
/// next value; a slower query starts over at the first one.
pub const REBIND_WINDOW: Duration = Duration::seconds(3);

/// Finder answering from payload-owned records in a [`RecordStore`][crate::store::RecordStore].
///
/// A name `<labels>.<subdomain>.<origin>` is answered by the record named `<labels>` of
/// the payload owning `<subdomain>`. Every answer rewrites the record's `last_answer` and
/// `last_accessed_at`.
pub struct DynamicFinder {
    store: DynRecordStore,
    origin: Name,
    zone_suffix: String,
}

impl DynamicFinder {
    #[must_use]
    pub fn new(store: DynRecordStore, origin: &Name) -> Self {
        DynamicFinder {
            store,
            origin: origin.clone(),
            zone_suffix: format!(".{}", fqdn(&origin.to_ascii())),
        }
    }
}

#[async_trait::async_trait]
impl Finder for DynamicFinder {
    async fn find(&self, name: &str, qtype: RecordType) -> Result<Lookup, Error> {
        let name = fqdn(name);
        let Some(relative) = name.strip_suffix(&self.zone_suffix) else {
            return Ok(Lookup::Decline);
        };

        // a.b.c1da9f3d -> record "a.b" of payload "c1da9f3d"
        let Some((labels, subdomain)) = relative.rsplit_once('.') else {
            return Ok(Lookup::Decline);
        };

        let Some(payload) = self.store.payload_by_subdomain(subdomain).await? else {
            return Ok(Lookup::Decline);
        };
        let Some(mut record) = self.store.dns_record(payload.id, labels, qtype).await? else {
            return Ok(Lookup::Decline);
        };

        let now = OffsetDateTime::now_utc();
        let values = select_values(&record, now);
        debug!(
            record = record.id,
            strategy = ?record.strategy,
            ?values,
            "dynamic answer"
        );

        let owner = Name::from_ascii(format!(
            "{}.{}{}",
            record.name, payload.subdomain, self.zone_suffix
        ))?;
        let records = new_rrs(&owner, qtype, record.ttl, &values, &self.origin)?;

        record.last_answer = Some(values);
        record.last_accessed_at = Some(now);
        self.store.update_dns_record(&record).await?;

        Ok(Lookup::Answer(records))
    }
}

/// Values of `record` to answer with at `now`, according to its strategy.
fn select_values(record: &DnsRecord, now: OffsetDateTime) -> Vec<String> {
    let values = &record.values;
    let previous_first = record
        .last_answer
        .as_ref()
        .and_then(|last| last.first())
        .and_then(|first| values.iter().position(|v| v == first));

    match record.strategy {
        Strategy::All => values.clone(),
        Strategy::RoundRobin => match previous_first {
            Some(i) => {
                let mut rotated = values.clone();
                rotated.rotate_left((i + 1) % values.len());
                rotated
            }
            None => values.clone(),
        },
        Strategy::Rebind => {
            let recent = record
                .last_accessed_at
                .map_or(false, |at| now - at < REBIND_WINDOW);
            let index = match previous_first {
                Some(i) if recent => (i + 1).min(values.len() - 1),
                _ => 0,
            };
            values.get(index).cloned().into_iter().collect()
        }
    }
}
