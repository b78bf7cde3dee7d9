use crate::dns::finder::{Finder, Lookup};
use crate::dns::names::fqdn;
use crate::dns::records::DEFAULT_TTL;
use crate::error::Error;
use base64::engine::{self, general_purpose};
use base64::{alphabet, Engine};
use lazy_static::lazy_static;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tracing::debug;
use trust_dns_proto::rr::rdata::TXT;
use trust_dns_proto::rr::{Name, RData, Record, RecordType};

lazy_static! {
    static ref BASE64_ENGINE: engine::GeneralPurpose =
        engine::GeneralPurpose::new(&alphabet::URL_SAFE, general_purpose::NO_PAD);
}

/// Record set held in memory and keyed by `(lowercase name, type)`.
///
/// Seeded once at startup and afterwards only changed through [`ChallengeProvider`], which
/// races with queries, hence the mutex.
#[derive(Debug, Default)]
pub struct StaticRecords {
    records: Mutex<HashMap<(String, RecordType), Vec<Record>>>,
}

impl StaticRecords {
    #[must_use]
    pub fn new(records: Vec<Record>) -> Self {
        let set = Self::default();
        for record in records {
            set.add(record);
        }
        set
    }

    /// Append `record` to the records already held for its name and type.
    pub fn add(&self, record: Record) {
        let key = (fqdn(&record.name().to_ascii()), record.record_type());
        self.records.lock().entry(key).or_default().push(record);
    }

    /// Append `record` unless an identical record is already held. Returns whether it was
    /// added.
    pub fn add_unique(&self, record: Record) -> bool {
        let key = (fqdn(&record.name().to_ascii()), record.record_type());
        let mut records = self.records.lock();
        let held = records.entry(key).or_default();
        if held.contains(&record) {
            return false;
        }
        held.push(record);
        true
    }

    /// Drop every record held for `name` and `rtype`.
    pub fn remove(&self, name: &str, rtype: RecordType) {
        self.records.lock().remove(&(fqdn(name), rtype));
    }

    /// Copies of the records held for `name` and `rtype`, if any.
    #[must_use]
    pub fn get(&self, name: &str, rtype: RecordType) -> Option<Vec<Record>> {
        self.records.lock().get(&(fqdn(name), rtype)).cloned()
    }
}

#[async_trait::async_trait]
impl Finder for StaticRecords {
    async fn find(&self, name: &str, qtype: RecordType) -> Result<Lookup, Error> {
        Ok(match self.get(name, qtype) {
            Some(records) => Lookup::Answer(records),
            None => Lookup::Decline,
        })
    }
}

/// Provisioning of [RFC-8555][RFC-8555] [DNS-01] challenge responses, used by an ACME client
/// solving challenges for certificates covering the served domain.
///
/// Both operations are idempotent for the caller.
///
/// [RFC-8555]: https://www.rfc-editor.org/rfc/rfc8555
/// [DNS-01]: https://www.rfc-editor.org/rfc/rfc8555#section-8.4
pub trait ChallengeProvider: Send + Sync {
    /// Serve the DNS-01 TXT record for `domain` and `key_auth`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DNSError`] if `domain` is not a valid DNS name.
    fn present(&self, domain: &str, token: &str, key_auth: &str) -> Result<(), Error>;

    /// Stop serving every DNS-01 TXT record for `domain`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DNSError`] if `domain` is not a valid DNS name.
    fn cleanup(&self, domain: &str, token: &str, key_auth: &str) -> Result<(), Error>;
}

/// The DNS-01 record name and TXT value for `domain` and `key_auth`.
#[must_use]
pub fn dns01_record(domain: &str, key_auth: &str) -> (String, String) {
    let name = fqdn(&format!("_acme-challenge.{}", domain.trim_end_matches('.')));
    let value = BASE64_ENGINE.encode(Sha256::digest(key_auth.as_bytes()));
    (name, value)
}

impl ChallengeProvider for StaticRecords {
    fn present(&self, domain: &str, _token: &str, key_auth: &str) -> Result<(), Error> {
        let (name, value) = dns01_record(domain, key_auth);
        debug!(record = %name, value = %value, "presenting DNS-01 challenge");

        let record = Record::from_rdata(
            Name::from_ascii(&name)?,
            DEFAULT_TTL,
            RData::TXT(TXT::new(vec![value])),
        );
        self.add_unique(record);
        Ok(())
    }

    fn cleanup(&self, domain: &str, _token: &str, key_auth: &str) -> Result<(), Error> {
        let (name, _) = dns01_record(domain, key_auth);
        Name::from_ascii(&name)?;
        debug!(record = %name, "cleaning up DNS-01 challenge");
        self.remove(&name, RecordType::TXT);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn a(name: &str, ip: Ipv4Addr) -> Record {
        Record::from_rdata(Name::from_ascii(name).unwrap(), 60, RData::A(ip))
    }

    #[test]
    fn test_dns01_record() {
        assert_eq!(
            dns01_record("sonar.test", "key1"),
            (
                "_acme-challenge.sonar.test.".to_string(),
                "gXQJloeiZiH04s3XzAOz2s7bP7liJVsar9Azyr6DFTA".to_string()
            )
        );
        assert_eq!(
            dns01_record("sonar.test.", "key2").1,
            "sQJTdkyLIz-zdULiNAHHtFDlpvl1HztaAU9vZ-i8mZ0"
        );
    }

    #[tokio::test]
    async fn test_find_ignores_case() {
        let set = StaticRecords::new(vec![
            a("Test.Sonar.Test.", Ipv4Addr::new(1, 1, 1, 1)),
            a("test.sonar.test.", Ipv4Addr::new(2, 2, 2, 2)),
        ]);

        match set.find("TEST.sonar.test", RecordType::A).await.unwrap() {
            Lookup::Answer(records) => assert_eq!(records.len(), 2),
            Lookup::Decline => panic!("expected answer"),
        }
        assert_eq!(
            set.find("test.sonar.test.", RecordType::AAAA).await.unwrap(),
            Lookup::Decline
        );
    }

    #[test]
    fn test_present_and_cleanup() {
        let set = StaticRecords::default();
        set.present("sonar.test", "token", "key1").unwrap();
        set.present("sonar.test", "token", "key1").unwrap();
        set.present("sonar.test", "token", "key2").unwrap();

        let records = set
            .get("_acme-challenge.sonar.test.", RecordType::TXT)
            .unwrap();
        assert_eq!(records.len(), 2);
        assert!(records[0]
            .to_string()
            .contains("gXQJloeiZiH04s3XzAOz2s7bP7liJVsar9Azyr6DFTA"));

        set.cleanup("sonar.test", "token", "key1").unwrap();
        assert!(set
            .get("_acme-challenge.sonar.test.", RecordType::TXT)
            .is_none());
        set.cleanup("sonar.test", "token", "key1").unwrap();
    }

    #[test]
    fn test_concurrent_present_adds_once() {
        let set = StaticRecords::default();
        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..50 {
                        set.present("sonar.test", "token", "key1").unwrap();
                    }
                });
            }
        });

        let records = set
            .get("_acme-challenge.sonar.test.", RecordType::TXT)
            .unwrap();
        assert_eq!(records.len(), 1);
    }
}
