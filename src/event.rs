//! Captured interaction events.
//!
//! Every finished SMTP or FTP session and every answered DNS query is handed to an
//! [`EventSink`] exactly once as an [`Event`]. The sink is the single boundary between the
//! capture engine and everything downstream of it: storage, enrichment and notification.

use crate::ftp::FtpMeta;
use crate::smtp::SmtpMeta;
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::mpsc::UnboundedSender;

/// Protocol the interaction was captured on.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Dns,
    Smtp,
    Ftp,
}

/// DNS question as seen in the query.
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct DnsQuestion {
    pub name: String,
    #[serde(rename = "type")]
    pub qtype: String,
}

/// Summary of one answer record.
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct DnsAnswer {
    pub name: String,
    #[serde(rename = "type")]
    pub rtype: String,
    pub ttl: u32,
}

/// DNS-specific event metadata.
#[derive(Serialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct DnsMeta {
    pub question: DnsQuestion,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub answer: Vec<DnsAnswer>,
}

/// Protocol specific part of an [`Event`].
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum Meta {
    Dns(DnsMeta),
    Smtp(SmtpMeta),
    Ftp(FtpMeta),
}

/// A finished interaction.
#[derive(Serialize, Debug, Clone)]
pub struct Event {
    pub protocol: Protocol,
    pub remote_addr: SocketAddr,

    /// Bytes received from the peer. For DNS, the query re-encoded from its decoded form.
    #[serde(skip)]
    pub read: Vec<u8>,

    /// Bytes sent to the peer.
    #[serde(skip)]
    pub written: Vec<u8>,

    /// Both directions interleaved in the order they were observed.
    #[serde(serialize_with = "serialize_lossy")]
    pub combined: Vec<u8>,

    pub meta: Meta,

    /// Whether the final connection was protected by TLS.
    pub secure: bool,

    #[serde(with = "time::serde::rfc3339")]
    pub received_at: OffsetDateTime,
}

fn serialize_lossy<S: serde::Serializer>(data: &[u8], s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&String::from_utf8_lossy(data))
}

/// Consumer of finished events.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);
}

/// `SharedSink` is a type alias for an [`EventSink`] shared between listeners and sessions.
pub type SharedSink = Arc<dyn EventSink>;

impl<F> EventSink for F
where
    F: Fn(Event) + Send + Sync,
{
    fn emit(&self, event: Event) {
        self(event);
    }
}

/// Sink forwarding events into a tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelSink(pub UnboundedSender<Event>);

impl EventSink for ChannelSink {
    fn emit(&self, event: Event) {
        if self.0.send(event).is_err() {
            tracing::warn!("event dropped: receiver closed");
        }
    }
}

/// Sink that only writes a line per event to the log. Used when nothing downstream is wired.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn emit(&self, event: Event) {
        match serde_json::to_string(&event) {
            Ok(json) => tracing::info!(target: "oobcrab::event", "{json}"),
            Err(err) => tracing::error!("failed to serialize event: {err}"),
        }
    }
}
