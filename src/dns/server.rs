use crate::dns::finder::{DynFinder, Lookup};
use crate::dns::names::{fix_wildcards, fqdn, in_zone, make_wildcards};
use crate::error::Error;
use crate::event::{DnsAnswer, DnsMeta, DnsQuestion, Event, Meta, Protocol, SharedSink};
use std::net::SocketAddr;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::net::{TcpListener, UdpSocket};
use tracing::{debug, error};
use trust_dns_proto::op::{Edns, Header, Message, MessageType, OpCode, Query, ResponseCode};
use trust_dns_proto::rr::{Name, Record, RecordType};
use trust_dns_proto::serialize::binary::BinEncoder;
use trust_dns_server::authority::MessageResponseBuilder;
use trust_dns_server::server::{self, Request, RequestHandler, ResponseHandler, ResponseInfo};
use trust_dns_server::ServerFuture;

// Largest UDP response for a client that did not advertise a payload size with EDNS.
const MIN_UDP_PAYLOAD: u16 = 512;

/// Answers queries for one origin from an ordered list of [`Finder`][crate::dns::Finder]s.
#[derive(Clone)]
pub struct Handler {
    zone: String,
    finders: Vec<DynFinder>,
    sink: Option<SharedSink>,
}

impl Handler {
    /// `finders` are consulted in the given order, highest priority first.
    #[must_use]
    pub fn new(origin: &Name, finders: Vec<DynFinder>, sink: Option<SharedSink>) -> Self {
        Handler {
            zone: fqdn(&origin.to_ascii()),
            finders,
            sink,
        }
    }

    /// Response code and answers for the question `qname`/`qtype`.
    ///
    /// Names outside the origin and names every finder declines are NXDOMAIN. A finder error
    /// is logged and answered with SERVFAIL.
    pub async fn resolve(&self, qname: &Name, qtype: RecordType) -> (ResponseCode, Vec<Record>) {
        let name = fqdn(&qname.to_ascii());
        if !in_zone(&name, &self.zone) {
            return (ResponseCode::NXDomain, Vec::new());
        }

        let mut candidates = vec![name.clone()];
        candidates.extend(make_wildcards(&name, &self.zone));

        match self.find(&candidates, qtype).await {
            Ok(Some(records)) => (ResponseCode::NoError, fix_wildcards(records, qname)),
            Ok(None) => (ResponseCode::NXDomain, Vec::new()),
            Err(err) => {
                error!(qname = %name, "error finding records: {err:?}");
                (ResponseCode::ServFail, Vec::new())
            }
        }
    }

    // First authoritative answer over every finder and candidate name, in that order.
    async fn find(
        &self,
        candidates: &[String],
        qtype: RecordType,
    ) -> Result<Option<Vec<Record>>, Error> {
        for finder in &self.finders {
            for name in candidates {
                if let Lookup::Answer(records) = finder.find(name, qtype).await? {
                    return Ok(Some(records));
                }
            }
        }
        Ok(None)
    }

    async fn dispatch_request<R: ResponseHandler>(
        &self,
        request: &Request,
        mut response_handle: R,
    ) -> Result<ResponseInfo, Error> {
        let received_at = OffsetDateTime::now_utc();

        let (rcode, records) =
            if request.op_code() != OpCode::Query || request.message_type() != MessageType::Query {
                (ResponseCode::NotImp, Vec::new())
            } else {
                let query = question(request);
                self.resolve(query.name(), query.query_type()).await
            };

        let mut header = Header::response_from_request(request.header());
        header.set_authoritative(true);
        header.set_response_code(rcode);

        // Drop trailing answers until the response fits what the client can receive.
        let max_size = usize::from(max_payload(request));
        let mut count = records.len();
        let written = loop {
            header.set_truncated(count < records.len());
            let written = encode_response(request, header, &records[..count])?;
            if written.len() <= max_size || count == 0 {
                break written;
            }
            count -= 1;
        };
        let records = &records[..count];

        let response = response_builder(request).build(header, records.iter(), &[], &[], &[]);
        let info = response_handle.send_response(response).await?;

        debug!(
            peer = %request.src(),
            qname = %request.query().name(),
            qtype = %request.query().query_type(),
            rcode = ?rcode,
            truncated = header.truncated(),
            "answered query"
        );
        self.emit(request, records, written, received_at);
        Ok(info)
    }

    fn emit(&self, request: &Request, answers: &[Record], written: Vec<u8>, at: OffsetDateTime) {
        let Some(sink) = &self.sink else {
            return;
        };

        let query = question(request);
        let meta = DnsMeta {
            question: DnsQuestion {
                name: query.name().to_ascii().trim_end_matches('.').to_string(),
                qtype: query.query_type().to_string(),
            },
            answer: answers
                .iter()
                .map(|r| DnsAnswer {
                    name: r.name().to_ascii().trim_end_matches('.').to_string(),
                    rtype: r.record_type().to_string(),
                    ttl: r.ttl(),
                })
                .collect(),
        };

        let read = request_bytes(request);
        let mut combined = Vec::with_capacity(read.len() + written.len());
        combined.extend_from_slice(&read);
        combined.extend_from_slice(&written);
        sink.emit(Event {
            protocol: Protocol::Dns,
            remote_addr: request.src(),
            read,
            written,
            combined,
            meta: Meta::Dns(meta),
            secure: false,
            received_at: at,
        });
    }
}

#[async_trait::async_trait]
impl RequestHandler for Handler {
    async fn handle_request<R: ResponseHandler>(
        &self,
        request: &Request,
        response_handle: R,
    ) -> ResponseInfo {
        match self.dispatch_request(request, response_handle).await {
            Ok(info) => info,
            Err(error) => {
                error!("error in RequestHandler: {:?}", error);
                let mut header = Header::new();
                header.set_response_code(ResponseCode::ServFail);
                header.into()
            }
        }
    }
}

// The question as the client sent it, name case included.
fn question(request: &Request) -> Query {
    request.query().original().clone()
}

// Largest response the client accepts: its EDNS payload size over UDP (never below 512),
// unbounded over TCP.
fn max_payload(request: &Request) -> u16 {
    match request.protocol() {
        server::Protocol::Udp => request
            .edns()
            .map_or(MIN_UDP_PAYLOAD, |edns| edns.max_payload().max(MIN_UDP_PAYLOAD)),
        _ => u16::MAX,
    }
}

// EDNS clients get an OPT record back advertising the same payload size.
fn response_builder(request: &Request) -> MessageResponseBuilder<'_> {
    let mut builder = MessageResponseBuilder::from_message_request(request);
    if let Some(request_edns) = request.edns() {
        let mut edns = Edns::new();
        edns.set_max_payload(request_edns.max_payload().max(MIN_UDP_PAYLOAD));
        edns.set_version(0);
        builder.edns(edns);
    }
    builder
}

// The bytes `response_builder` produces for these answers, as they go on the wire.
fn encode_response(request: &Request, header: Header, answers: &[Record]) -> Result<Vec<u8>, Error> {
    let mut bytes = Vec::with_capacity(usize::from(MIN_UDP_PAYLOAD));
    let mut encoder = BinEncoder::new(&mut bytes);
    response_builder(request)
        .build(header, answers.iter(), &[], &[], &[])
        .destructive_emit(&mut encoder)?;
    Ok(bytes)
}

// The query re-encoded from its decoded form.
fn request_bytes(request: &Request) -> Vec<u8> {
    let mut message = Message::new();
    message.set_header(*request.header());
    message.add_query(question(request));
    if let Some(edns) = request.edns() {
        message.set_edns(edns.clone());
    }
    match message.to_vec() {
        Ok(bytes) => bytes,
        Err(err) => {
            debug!(peer = %request.src(), "failed to encode query for event: {err}");
            Vec::new()
        }
    }
}

/// DNS server listening on UDP and optionally TCP.
pub struct Server {
    inner: ServerFuture<Handler>,
    udp_addr: SocketAddr,
    tcp_addr: Option<SocketAddr>,
}

impl Server {
    /// Bind the UDP socket and, when `tcp` is set, the TCP listener with its idle timeout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IO`] if an address can't be bound.
    pub async fn bind(
        udp_addr: SocketAddr,
        tcp: Option<(SocketAddr, Duration)>,
        handler: Handler,
    ) -> Result<Self, Error> {
        let mut inner = ServerFuture::new(handler);

        let socket = UdpSocket::bind(udp_addr).await?;
        let udp_addr = socket.local_addr()?;
        inner.register_socket(socket);

        let tcp_addr = match tcp {
            Some((addr, timeout)) => {
                let listener = TcpListener::bind(addr).await?;
                let tcp_addr = listener.local_addr()?;
                inner.register_listener(listener, timeout);
                Some(tcp_addr)
            }
            None => None,
        };

        Ok(Server {
            inner,
            udp_addr,
            tcp_addr,
        })
    }

    /// The address the UDP socket is bound to.
    ///
    /// # Errors
    ///
    /// Never fails; the address is read when the socket is bound.
    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        Ok(self.udp_addr)
    }

    /// The address the TCP listener is bound to, if there is one.
    #[must_use]
    pub fn tcp_local_addr(&self) -> Option<SocketAddr> {
        self.tcp_addr
    }

    /// Serve queries until a listener fails or the task is dropped.
    ///
    /// # Errors
    ///
    /// Returns the error that stopped a listener.
    pub async fn block_until_done(self) -> Result<(), Error> {
        Ok(self.inner.block_until_done().await?)
    }
}
