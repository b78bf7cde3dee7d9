use crate::error::Error;
use crate::store::{DnsRecord, Payload, RecordStore};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio::sync::RwLock;
use trust_dns_proto::rr::RecordType;

#[derive(Default, Debug, Clone, Serialize, Deserialize)]
struct Contents {
    #[serde(default)]
    payloads: Vec<Payload>,
    #[serde(default)]
    dns_records: Vec<DnsRecord>,
}

/// An in-memory [`RecordStore`]. Not durable across restarts.
#[derive(Default, Debug)]
pub struct InMemoryStore {
    contents: RwLock<Contents>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load an [`InMemoryStore`] seeded with the payloads and records in the JSON file at
    /// the given path:
    ///
    /// ```json
    /// {
    ///   "payloads": [ { "id": 1, "subdomain": "c1da9f3d" } ],
    ///   "dns_records": [
    ///     { "id": 1, "payload_id": 1, "name": "test", "type": "A", "ttl": 60,
    ///       "values": ["192.168.1.1"], "strategy": "round-robin" }
    ///   ]
    /// }
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`Error::IO`] if the path can't be opened or read.
    ///
    /// Returns [`Error::InvalidJSON`] if the file content is invalid.
    pub async fn try_from_file(p: impl AsRef<Path>) -> Result<Self, Error> {
        let mut buf = vec![];
        File::open(p).await?.read_to_end(&mut buf).await?;
        let contents: Contents = serde_json::from_slice(&buf)?;
        Ok(Self {
            contents: RwLock::new(contents),
        })
    }

    pub async fn add_payload(&self, payload: Payload) {
        self.contents.write().await.payloads.push(payload);
    }

    pub async fn add_dns_record(&self, record: DnsRecord) {
        self.contents.write().await.dns_records.push(record);
    }

    pub async fn dns_record_by_id(&self, id: i64) -> Option<DnsRecord> {
        self.contents
            .read()
            .await
            .dns_records
            .iter()
            .find(|r| r.id == id)
            .cloned()
    }
}

#[async_trait::async_trait]
impl RecordStore for InMemoryStore {
    async fn payload_by_subdomain(&self, subdomain: &str) -> Result<Option<Payload>, Error> {
        Ok(self
            .contents
            .read()
            .await
            .payloads
            .iter()
            .find(|p| p.subdomain.eq_ignore_ascii_case(subdomain))
            .cloned())
    }

    async fn dns_record(
        &self,
        payload_id: i64,
        name: &str,
        qtype: RecordType,
    ) -> Result<Option<DnsRecord>, Error> {
        let qtype = qtype.to_string();
        Ok(self
            .contents
            .read()
            .await
            .dns_records
            .iter()
            .find(|r| {
                r.payload_id == payload_id
                    && r.name.eq_ignore_ascii_case(name)
                    && r.qtype.eq_ignore_ascii_case(&qtype)
            })
            .cloned())
    }

    async fn update_dns_record(&self, record: &DnsRecord) -> Result<(), Error> {
        let mut contents = self.contents.write().await;
        match contents.dns_records.iter_mut().find(|r| r.id == record.id) {
            Some(stored) => {
                *stored = record.clone();
                Ok(())
            }
            None => Err(Error::Store(format!("dns record {} not found", record.id))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Strategy;

    fn record(id: i64, name: &str, qtype: &str) -> DnsRecord {
        DnsRecord {
            id,
            payload_id: 1,
            name: name.to_string(),
            qtype: qtype.to_string(),
            ttl: 60,
            values: vec!["192.168.1.1".to_string()],
            strategy: Strategy::All,
            last_answer: None,
            last_accessed_at: None,
        }
    }

    #[tokio::test]
    async fn lookups_ignore_case() {
        let store = InMemoryStore::new();
        store
            .add_payload(Payload {
                id: 1,
                subdomain: "c1da9f3d".to_string(),
            })
            .await;
        store.add_dns_record(record(1, "test", "A")).await;

        let payload = store.payload_by_subdomain("C1DA9F3D").await.unwrap();
        assert_eq!(payload.map(|p| p.id), Some(1));

        let found = store.dns_record(1, "TEST", RecordType::A).await.unwrap();
        assert_eq!(found.map(|r| r.id), Some(1));

        let missing = store.dns_record(1, "test", RecordType::AAAA).await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn update_replaces_state() {
        let store = InMemoryStore::new();
        store.add_dns_record(record(7, "test", "A")).await;

        let mut rec = store.dns_record_by_id(7).await.unwrap();
        rec.last_answer = Some(vec!["192.168.1.1".to_string()]);
        store.update_dns_record(&rec).await.unwrap();

        assert_eq!(store.dns_record_by_id(7).await, Some(rec));
        assert!(matches!(
            store.update_dns_record(&record(8, "x", "A")).await,
            Err(Error::Store(_))
        ));
    }

    #[test]
    fn parses_fixtures() {
        let contents: Contents = serde_json::from_str(
            r#"{
                "payloads": [{ "id": 1, "subdomain": "c1da9f3d" }],
                "dns_records": [{
                    "id": 1, "payload_id": 1, "name": "test-rebind", "type": "A", "ttl": 60,
                    "values": ["192.168.1.1", "192.168.1.2"], "strategy": "rebind"
                }]
            }"#,
        )
        .unwrap();
        assert_eq!(contents.dns_records[0].strategy, Strategy::Rebind);
        assert_eq!(contents.dns_records[0].last_answer, None);
    }
}
