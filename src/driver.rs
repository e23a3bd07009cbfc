use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use hickory_proto::op::Message;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};

use crate::classify::RawProbe;
use crate::dns::{build_query, is_matching_response};
use crate::transport::{EndpointTarget, QType, Transport};

/// Floor for the TCP retry budget once the UDP exchange has consumed
/// the probe deadline. Bounds worst-case probe latency without granting
/// the fallback a fresh full timeout window.
const TCP_FALLBACK_FLOOR: Duration = Duration::from_millis(300);

fn ms(elapsed: Duration) -> f64 {
	elapsed.as_secs_f64() * 1000.0
}

/// Send a single DNS query over UDP and observe the result.
///
/// Binds a dedicated socket per probe to avoid response stealing between
/// concurrent tasks. Datagrams whose transaction id does not match are
/// skipped; malformed wire data ends the probe as a parse error. A
/// response with the truncation bit set is re-queried once over TCP
/// within the remaining deadline.
pub async fn udp_probe(
	resolver: SocketAddr,
	domain: &str,
	qtype: QType,
	timeout: Duration,
	edns_payload: u16,
) -> RawProbe {
	let txid: u16 = rand::random();
	let query_bytes = match build_query(domain, qtype, txid, edns_payload) {
		Ok(bytes) => bytes,
		Err(_) => return RawProbe::transport_error(),
	};

	let bind_addr = if resolver.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
	let socket = match UdpSocket::bind(bind_addr).await {
		Ok(s) => s,
		Err(_) => return RawProbe::socket_unavailable(),
	};

	let start = Instant::now();
	if socket.send_to(&query_bytes, resolver).await.is_err() {
		return RawProbe::transport_error();
	}
	let deadline = start + timeout;

	let mut buf = vec![0u8; usize::from(edns_payload.max(512))];
	loop {
		let elapsed = start.elapsed();
		if elapsed >= timeout {
			return RawProbe::timed_out();
		}
		let remaining = timeout - elapsed;

		match tokio::time::timeout(remaining, socket.recv_from(&mut buf)).await {
			Ok(Ok((len, _src))) => {
				let latency = ms(start.elapsed());
				let message = match Message::from_vec(&buf[..len]) {
					Ok(m) => m,
					Err(_) => {
						return RawProbe {
							latency_ms: Some(latency),
							response_size: Some(len),
							malformed: true,
							..RawProbe::default()
						};
					}
				};
				if !is_matching_response(&message, txid) {
					// Stray datagram; keep waiting for ours
					continue;
				}
				if message.truncated() {
					return tcp_fallback(resolver, &query_bytes, txid, deadline).await;
				}
				return RawProbe {
					latency_ms: Some(latency),
					response_size: Some(len),
					rcode: Some(message.response_code()),
					..RawProbe::default()
				};
			}
			Ok(Err(_)) => return RawProbe::transport_error(),
			Err(_) => return RawProbe::timed_out(),
		}
	}
}

/// Re-issue a truncated query over TCP to the same resolver.
///
/// The retry shares the remaining budget of the original probe deadline,
/// falling back to a short fixed budget when the UDP exchange has
/// already consumed it.
async fn tcp_fallback(
	resolver: SocketAddr,
	query_bytes: &[u8],
	txid: u16,
	deadline: Instant,
) -> RawProbe {
	let remaining = deadline.saturating_duration_since(Instant::now());
	let budget = if remaining.is_zero() { TCP_FALLBACK_FLOOR } else { remaining };

	let fallback = RawProbe {
		truncated: true,
		tcp_fallback: true,
		..RawProbe::default()
	};

	let start = Instant::now();
	let exchange = tokio::time::timeout(budget, async {
		let mut stream = TcpStream::connect(resolver).await?;
		stream.write_all(&(query_bytes.len() as u16).to_be_bytes()).await?;
		stream.write_all(query_bytes).await?;

		let mut len_buf = [0u8; 2];
		stream.read_exact(&mut len_buf).await?;
		let resp_len = usize::from(u16::from_be_bytes(len_buf));
		let mut resp = vec![0u8; resp_len];
		stream.read_exact(&mut resp).await?;
		Ok::<Vec<u8>, std::io::Error>(resp)
	}).await;

	match exchange {
		Err(_) => RawProbe { timed_out: true, ..fallback },
		Ok(Err(_)) => RawProbe { transport_error: true, ..fallback },
		Ok(Ok(resp)) => {
			let latency = ms(start.elapsed());
			match Message::from_vec(&resp) {
				Ok(message) if is_matching_response(&message, txid) => RawProbe {
					latency_ms: Some(latency),
					response_size: Some(resp.len()),
					rcode: Some(message.response_code()),
					..fallback
				},
				_ => RawProbe {
					latency_ms: Some(latency),
					response_size: Some(resp.len()),
					malformed: true,
					..fallback
				},
			}
		}
	}
}

/// HTTP client serving all probes against one DoH endpoint.
pub struct DohClient {
	http: reqwest::Client,
	uses: AtomicU64,
}

impl DohClient {
	/// Record one use. Returns true when the client has served a request
	/// before, i.e. the underlying connection was plausibly not freshly
	/// established for this probe. reqwest does not expose per-request
	/// reuse, so this is the same estimate the run reports.
	fn mark_used(&self) -> bool {
		self.uses.fetch_add(1, Ordering::Relaxed) > 0
	}
}

/// Per-endpoint DoH connection pools, created at run start and shared by
/// all probe tasks. Pools are keyed by endpoint URL so a slow endpoint
/// cannot head-of-line block probes against another.
pub struct DohPool {
	clients: HashMap<String, DohClient>,
}

impl DohPool {
	/// Build one client per distinct DoH endpoint in the target list.
	/// With keep-alive disabled every probe gets a fresh connection.
	pub fn build(
		targets: &[EndpointTarget],
		keepalive: bool,
		pool_size: usize,
		timeout: Duration,
	) -> Result<Self, reqwest::Error> {
		let max_idle = if keepalive { pool_size.max(1) } else { 0 };
		let mut clients = HashMap::new();
		for target in targets {
			if target.transport != Transport::Doh || clients.contains_key(&target.address) {
				continue;
			}
			let http = reqwest::Client::builder()
				.use_rustls_tls()
				.pool_max_idle_per_host(max_idle)
				.connect_timeout(timeout)
				.build()?;
			clients.insert(target.address.clone(), DohClient {
				http,
				uses: AtomicU64::new(0),
			});
		}
		Ok(DohPool { clients })
	}

	pub fn client_for(&self, address: &str) -> Option<&DohClient> {
		self.clients.get(address)
	}

	pub fn len(&self) -> usize {
		self.clients.len()
	}
}

/// Send a single DNS query over DoH and observe the result.
///
/// POSTs the wire-format query to the endpoint URL. HTTP-layer failures
/// and transport-level failures are recorded as distinct facets; a 2xx
/// body is parsed as a DNS message.
pub async fn doh_probe(
	client: &DohClient,
	url: &str,
	domain: &str,
	qtype: QType,
	timeout: Duration,
	edns_payload: u16,
	keepalive: bool,
) -> RawProbe {
	let txid: u16 = rand::random();
	let query_bytes = match build_query(domain, qtype, txid, edns_payload) {
		Ok(bytes) => bytes,
		Err(_) => return RawProbe::transport_error(),
	};

	let reused = client.mark_used() && keepalive;
	let base = RawProbe {
		connection_reused: reused,
		..RawProbe::default()
	};

	let start = Instant::now();
	let response = client.http.post(url)
		.header("content-type", "application/dns-message")
		.header("accept", "application/dns-message")
		.timeout(timeout)
		.body(query_bytes)
		.send()
		.await;

	let response = match response {
		Ok(r) => r,
		Err(e) if e.is_timeout() => return RawProbe { timed_out: true, ..base },
		Err(_) => return RawProbe { transport_error: true, ..base },
	};

	let status = response.status().as_u16();
	let http_version = Some(format!("{:?}", response.version()));
	let body = match response.bytes().await {
		Ok(b) => b,
		Err(e) if e.is_timeout() => return RawProbe { timed_out: true, http_version, ..base },
		Err(_) => return RawProbe { transport_error: true, http_version, ..base },
	};
	let latency = ms(start.elapsed());

	if !(200..300).contains(&status) {
		return RawProbe {
			latency_ms: Some(latency),
			response_size: Some(body.len()),
			http_status: Some(status),
			http_version,
			..base
		};
	}

	match Message::from_vec(&body) {
		Ok(message) => RawProbe {
			latency_ms: Some(latency),
			response_size: Some(body.len()),
			http_status: Some(status),
			http_version,
			rcode: Some(message.response_code()),
			..base
		},
		Err(_) => RawProbe {
			latency_ms: Some(latency),
			response_size: Some(body.len()),
			http_status: Some(status),
			http_version,
			malformed: true,
			..base
		},
	}
}

#[cfg(test)]
pub(crate) mod testutil {
	use std::net::SocketAddr;

	use hickory_proto::op::{Message, MessageType};
	use tokio::io::{AsyncReadExt, AsyncWriteExt};
	use tokio::net::{TcpListener, UdpSocket};

	/// Spawn a loopback UDP responder answering every query with a
	/// NoError response, optionally with the truncation bit set.
	pub async fn spawn_udp_responder(truncated: bool) -> SocketAddr {
		let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
		let addr = socket.local_addr().unwrap();
		tokio::spawn(async move {
			let mut buf = vec![0u8; 2048];
			loop {
				let Ok((len, src)) = socket.recv_from(&mut buf).await else { break };
				let Ok(mut message) = Message::from_vec(&buf[..len]) else { continue };
				message.set_message_type(MessageType::Response);
				message.set_truncated(truncated);
				let Ok(bytes) = message.to_vec() else { continue };
				let _ = socket.send_to(&bytes, src).await;
			}
		});
		addr
	}

	/// Spawn a loopback TCP responder on the given address that answers
	/// length-prefixed DNS queries with full (non-truncated) responses.
	pub async fn spawn_tcp_responder(addr: SocketAddr) {
		let listener = TcpListener::bind(addr).await.unwrap();
		tokio::spawn(async move {
			while let Ok((mut stream, _)) = listener.accept().await {
				tokio::spawn(async move {
					let mut len_buf = [0u8; 2];
					if stream.read_exact(&mut len_buf).await.is_err() {
						return;
					}
					let qlen = usize::from(u16::from_be_bytes(len_buf));
					let mut qbuf = vec![0u8; qlen];
					if stream.read_exact(&mut qbuf).await.is_err() {
						return;
					}
					let Ok(mut message) = Message::from_vec(&qbuf) else { return };
					message.set_message_type(MessageType::Response);
					message.set_truncated(false);
					let Ok(bytes) = message.to_vec() else { return };
					let _ = stream.write_all(&(bytes.len() as u16).to_be_bytes()).await;
					let _ = stream.write_all(&bytes).await;
				});
			}
		});
	}
}
