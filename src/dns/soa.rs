use crate::dns::finder::{Finder, Lookup};
use crate::dns::names::fqdn;
use crate::dns::records::soa_record;
use crate::error::Error;
use trust_dns_proto::rr::{Name, RecordType};

/// Finder answering SOA queries for the origin and `*.origin`, building the record on every
/// query so the serial is the date the query was answered.
pub struct SoaFinder {
    apex: Name,
    wildcard: Name,
    mname: Name,
    rname: Name,
}

impl SoaFinder {
    /// # Errors
    ///
    /// Returns [`Error::DNSError`] if `origin` can't be extended with the fixed labels.
    pub fn new(origin: &Name, rname: Name) -> Result<Self, Error> {
        Ok(SoaFinder {
            apex: origin.clone(),
            wildcard: Name::from_ascii("*")?.append_domain(origin)?,
            mname: Name::from_ascii("ns1")?.append_domain(origin)?,
            rname,
        })
    }
}

#[async_trait::async_trait]
impl Finder for SoaFinder {
    async fn find(&self, name: &str, qtype: RecordType) -> Result<Lookup, Error> {
        if qtype != RecordType::SOA {
            return Ok(Lookup::Decline);
        }
        let name = fqdn(name);
        let owner = [&self.apex, &self.wildcard]
            .into_iter()
            .find(|owner| fqdn(&owner.to_ascii()) == name);
        Ok(match owner {
            Some(owner) => Lookup::Answer(vec![soa_record(
                owner.clone(),
                self.mname.clone(),
                self.rname.clone(),
            )]),
            None => Lookup::Decline,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> Name {
        Name::from_ascii(s).unwrap()
    }

    #[tokio::test]
    async fn test_apex_and_wildcard_only() {
        let finder = SoaFinder::new(&name("sonar.test."), name("hostmaster.sonar.test.")).unwrap();

        for qname in ["sonar.test.", "*.sonar.test.", "Sonar.Test"] {
            match finder.find(qname, RecordType::SOA).await.unwrap() {
                Lookup::Answer(records) => {
                    assert_eq!(records.len(), 1);
                    assert!(records[0].to_string().contains("ns1.sonar.test."));
                }
                Lookup::Decline => panic!("no SOA for {qname}"),
            }
        }
        assert_eq!(
            finder.find("x.sonar.test.", RecordType::SOA).await.unwrap(),
            Lookup::Decline
        );
        assert_eq!(
            finder.find("sonar.test.", RecordType::A).await.unwrap(),
            Lookup::Decline
        );
    }
}
