use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use bytes::Bytes;
use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::RecordSet;
use hickory_proto::serialize::binary::BinEncodable;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::runtime::Handle;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::UpstreamSettings;
use crate::error::ResolveError;
use crate::nameserver_address::NameserverAddress;
use crate::resolver::{Completion, Resolver};

const MAX_UDP_RESPONSE: usize = 4096;
const MAX_TCP_FRAME: usize = 64 * 1024;

static NEXT_ID: AtomicU16 = AtomicU16::new(1);

/// A [`Resolver`] that forwards every query to one recursive upstream.
///
/// Queries run as tasks on the runtime the resolver was created on; the
/// completion is called from that task.
pub struct UpstreamResolver {
    upstream: Arc<ArcSwap<UpstreamSettings>>,
    runtime: Handle,
}

impl UpstreamResolver {
    /// Must be called from within a tokio runtime.
    pub fn new(upstream: Arc<ArcSwap<UpstreamSettings>>) -> Self {
        Self::with_handle(upstream, Handle::current())
    }

    pub fn with_handle(upstream: Arc<ArcSwap<UpstreamSettings>>, runtime: Handle) -> Self {
        Self { upstream, runtime }
    }
}

impl Resolver for UpstreamResolver {
    fn submit(&self, query: Query, completion: Completion) {
        let settings = self.upstream.load_full();
        self.runtime.spawn(async move {
            let result = match settings.socket_addr() {
                Ok(addr) => exchange(addr, settings.timeout(), &query).await,
                Err(err) => Err(ResolveError::Io(err.to_string())),
            };
            if let Err(err) = &result {
                debug!(
                    query = %query,
                    upstream = %settings.address,
                    error = %err,
                    "upstream query failed"
                );
            }
            completion(result);
        });
    }
}

async fn exchange(
    upstream: SocketAddr,
    timeout_dur: Duration,
    query: &Query,
) -> Result<RecordSet, ResolveError> {
    let response = exchange_with(upstream, timeout_dur, query).await?;
    answer_to_rrset(&response, query)
}

/// Sends `query` to `server` and returns whatever reply comes back, over UDP
/// first and TCP when UDP fails or the answer is truncated.
pub async fn exchange_with(
    server: SocketAddr,
    timeout_dur: Duration,
    query: &Query,
) -> Result<Message, ResolveError> {
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    let packet = Bytes::from(build_query(query, id)?);
    let start = Instant::now();
    let response = match send_udp_smart(&packet, server, timeout_dur, id).await {
        Ok(response) if !response.truncated() => response,
        Ok(_) => {
            debug!(server = %server, "udp answer truncated, retrying over tcp");
            send_tcp(&packet, server, timeout_dur, id).await?
        }
        Err(err) => {
            debug!(server = %server, error = %err, "falling back to tcp");
            send_tcp(&packet, server, timeout_dur, id).await?
        }
    };
    debug!(
        server = %server,
        query = %query,
        upstream_ns = start.elapsed().as_nanos() as u64,
        "upstream call latency"
    );
    Ok(response)
}

/// Times one query to the selected address and feeds the outcome back to
/// its nameserver: the RTT on any reply, an unreachable mark otherwise.
pub async fn measure_rtt(
    address: &NameserverAddress,
    port: u16,
    query: &Query,
    timeout_dur: Duration,
) -> Result<Duration, ResolveError> {
    let server = SocketAddr::new(address.ip(), port);
    let start = Instant::now();
    match exchange_with(server, timeout_dur, query).await {
        Ok(_) => {
            let rtt = start.elapsed();
            address.update_rtt(rtt);
            Ok(rtt)
        }
        Err(err) => {
            debug!(server = %server, error = %err, "nameserver did not answer");
            address.mark_unreachable();
            Err(err)
        }
    }
}

pub(crate) fn build_query(query: &Query, id: u16) -> Result<Vec<u8>, ResolveError> {
    let mut msg = Message::new();
    msg.set_id(id)
        .set_message_type(MessageType::Query)
        .set_op_code(OpCode::Query)
        .set_recursion_desired(true)
        .add_query(query.clone());
    Ok(msg.to_bytes()?)
}

/// Pulls the answer RRset for `query` out of an upstream response.
pub(crate) fn answer_to_rrset(
    response: &Message,
    query: &Query,
) -> Result<RecordSet, ResolveError> {
    if response.response_code() != ResponseCode::NoError {
        return Err(ResolveError::ResponseCode(response.response_code()));
    }
    let matching = response
        .answers()
        .iter()
        .filter(|r| r.record_type() == query.query_type() && r.dns_class() == query.query_class())
        .collect::<Vec<_>>();
    let first = matching
        .first()
        .ok_or(ResolveError::NoData(query.query_type()))?;

    let ttl = matching.iter().map(|r| r.ttl()).min().unwrap_or(0);
    let mut rrset = RecordSet::with_ttl(first.name().clone(), query.query_type(), ttl);
    rrset.set_dns_class(query.query_class());
    for record in matching {
        rrset.insert(record.clone(), 0);
    }
    Ok(rrset)
}

fn parse_response(raw: &[u8], id: u16) -> Result<Option<Message>, ResolveError> {
    let msg = Message::from_vec(raw)?;
    if msg.id() != id || msg.message_type() != MessageType::Response {
        return Ok(None);
    }
    Ok(Some(msg))
}

/// UDP with a hedged retry: the first attempt gets half the budget.
async fn send_udp_smart(
    packet: &[u8],
    upstream: SocketAddr,
    timeout_dur: Duration,
    id: u16,
) -> Result<Message, ResolveError> {
    let hedge_timeout = (timeout_dur / 2).max(Duration::from_millis(50)).min(timeout_dur);
    let attempts = [hedge_timeout, timeout_dur];

    let mut last_err = ResolveError::Timeout;
    for (idx, dur) in attempts.iter().enumerate() {
        match timeout(*dur, send_udp(packet, upstream, id)).await {
            Ok(Ok(msg)) => return Ok(msg),
            Ok(Err(err)) => last_err = err,
            Err(_) => last_err = ResolveError::Timeout,
        }
        debug!(
            event = "udp_query_retry",
            upstream = %upstream,
            attempt = idx + 1,
            timeout_ms = dur.as_millis() as u64,
            error = %last_err,
            "udp attempt failed",
        );
    }
    Err(last_err)
}

async fn send_udp(packet: &[u8], upstream: SocketAddr, id: u16) -> Result<Message, ResolveError> {
    let socket = udp_socket(upstream)?;
    socket.send_to(packet, upstream).await?;

    let mut buf = vec![0u8; MAX_UDP_RESPONSE];
    loop {
        let (len, src) = socket.recv_from(&mut buf).await?;
        if src != upstream {
            continue;
        }
        if let Some(msg) = parse_response(&buf[..len], id)? {
            return Ok(msg);
        }
    }
}

fn udp_socket(upstream: SocketAddr) -> Result<UdpSocket, ResolveError> {
    let (domain, bind): (Domain, SocketAddr) = if upstream.is_ipv4() {
        (Domain::IPV4, SocketAddr::from(([0, 0, 0, 0], 0)))
    } else {
        (Domain::IPV6, SocketAddr::from(([0u16; 8], 0)))
    };
    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
    if let Err(e) = socket.set_recv_buffer_size(256 * 1024) {
        warn!("failed to set udp recv buffer size: {}", e);
    }
    socket.bind(&bind.into())?;
    socket.set_nonblocking(true)?;
    Ok(UdpSocket::from_std(socket.into())?)
}

async fn send_tcp(
    packet: &[u8],
    upstream: SocketAddr,
    timeout_dur: Duration,
    id: u16,
) -> Result<Message, ResolveError> {
    let fut = async {
        let mut stream = TcpStream::connect(upstream).await?;
        let len = u16::try_from(packet.len())
            .map_err(|_| ResolveError::Protocol("query too large for tcp".into()))?;
        stream.write_all(&len.to_be_bytes()).await?;
        stream.write_all(packet).await?;

        let mut len_buf = [0u8; 2];
        stream.read_exact(&mut len_buf).await?;
        let frame_len = u16::from_be_bytes(len_buf) as usize;
        if frame_len == 0 || frame_len > MAX_TCP_FRAME {
            return Err(ResolveError::Protocol(format!("bad tcp frame length {frame_len}")));
        }
        let mut buf = vec![0u8; frame_len];
        stream.read_exact(&mut buf).await?;
        parse_response(&buf, id)?
            .ok_or_else(|| ResolveError::Protocol("tcp answer id mismatch".into()))
    };
    timeout(timeout_dur, fut).await.map_err(|_| ResolveError::Timeout)?
}
