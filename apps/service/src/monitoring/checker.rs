use std::io;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use futures::future::join_all;
use hickory_resolver::TokioResolver;
use hickory_resolver::config::ResolverConfig;
use hickory_resolver::name_server::TokioConnectionProvider;
use rand::random;
use surge_ping::{
    Client as PingClient, Config as PingConfig, ICMP, PingIdentifier, PingSequence, SurgeError,
};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::warn;

use super::types::{ProbeError, ProbeOutcome, RTT_UNMEASURED};

/// Echo payload sent with every ICMP request.
const PING_PAYLOAD: [u8; 16] = [0; 16];

/// Network errors that mean the target is down, not that the probe broke.
///
/// Covers timeouts, refused/reset/aborted connections and unreachable
/// networks or hosts; everything else surfaces as a probe error.
pub fn is_down_error(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NetworkUnreachable
            | io::ErrorKind::HostUnreachable
            | io::ErrorKind::NetworkDown
    )
}

fn elapsed_ns(start: Instant) -> i64 {
    i64::try_from(start.elapsed().as_nanos()).unwrap_or(i64::MAX)
}

fn duration_ns(duration: Duration) -> i64 {
    i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX)
}

/// One probe protocol. Implementations never return transport-level
/// down conditions as errors; see `is_down_error`.
#[async_trait::async_trait]
pub trait Checker: Send + Sync {
    /// Probe the target once and report latency and reachability.
    async fn check(&self, target: &str) -> ProbeOutcome;
}

/// HTTP/HTTPS checker.
pub struct HttpChecker {
    client: reqwest::Client,
    method: reqwest::Method,
}

impl HttpChecker {
    pub fn new(timeout_seconds: u64, method: reqwest::Method) -> anyhow::Result<Self> {
        // Connection reuse is disabled so every probe pays the full
        // connect and handshake cost in its measured rtt.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .pool_max_idle_per_host(0)
            .build()?;

        Ok(Self { client, method })
    }
}

#[async_trait::async_trait]
impl Checker for HttpChecker {
    async fn check(&self, target: &str) -> ProbeOutcome {
        let start = Instant::now();
        let response = self.client.request(self.method.clone(), target).send().await;
        let rtt = elapsed_ns(start);

        match response {
            Ok(response) => {
                let status = response.status().as_u16();
                if (200..400).contains(&status) {
                    ProbeOutcome::up(rtt)
                } else {
                    ProbeOutcome::failed(rtt, ProbeError::BadStatus(status))
                }
            }
            Err(err) if is_down_request_error(&err) => ProbeOutcome::down(rtt),
            Err(err) => ProbeOutcome::failed(rtt, err.into()),
        }
    }
}

/// reqwest wraps transport failures in layers of source errors; walk the
/// chain down to the underlying `io::Error` before classifying.
fn is_down_request_error(err: &reqwest::Error) -> bool {
    if err.is_timeout() {
        return true;
    }

    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            return is_down_error(io_err);
        }
        source = cause.source();
    }
    false
}

/// TCP connect checker for `host:port` targets.
pub struct TcpChecker {
    timeout_duration: Duration,
}

impl TcpChecker {
    pub fn new(timeout_seconds: u64) -> Self {
        Self { timeout_duration: Duration::from_secs(timeout_seconds) }
    }
}

#[async_trait::async_trait]
impl Checker for TcpChecker {
    async fn check(&self, target: &str) -> ProbeOutcome {
        let start = Instant::now();
        let connect = TcpStream::connect(target);

        match timeout(self.timeout_duration, connect).await {
            Ok(Ok(_stream)) => ProbeOutcome::up(elapsed_ns(start)),
            Ok(Err(err)) if is_down_error(&err) => ProbeOutcome::down(elapsed_ns(start)),
            Ok(Err(err)) => ProbeOutcome::failed(elapsed_ns(start), err.into()),
            Err(_elapsed) => ProbeOutcome::down(elapsed_ns(start)),
        }
    }
}

/// ICMP echo checker.
///
/// Resolves the host and pings every address concurrently, repeating the
/// fan-out `retry_count` times; the host is up when any address answers
/// and the reported rtt is the minimum over all replies.
pub struct IcmpChecker {
    resolver: TokioResolver,
    client_v4: Option<PingClient>,
    client_v6: Option<PingClient>,
    timeout_duration: Duration,
    retry_count: u32,
}

impl IcmpChecker {
    pub fn new(timeout_seconds: u64, retry_count: u32) -> Self {
        let resolver = match TokioResolver::builder_tokio() {
            Ok(builder) => builder.build(),
            Err(err) => {
                warn!("Failed to read system resolver config, using defaults: {err}");
                TokioResolver::builder_with_config(
                    ResolverConfig::default(),
                    TokioConnectionProvider::default(),
                )
                .build()
            }
        };

        // ICMP sockets need elevated privileges; without them every ICMP
        // target reports down, so say why once at startup.
        let client_v4 = match PingClient::new(&PingConfig::default()) {
            Ok(client) => Some(client),
            Err(err) => {
                warn!("ICMPv4 socket unavailable, icmp targets will report down: {err}");
                None
            }
        };
        let client_v6 = match PingClient::new(&PingConfig::builder().kind(ICMP::V6).build()) {
            Ok(client) => Some(client),
            Err(err) => {
                warn!("ICMPv6 socket unavailable: {err}");
                None
            }
        };

        Self {
            resolver,
            client_v4,
            client_v6,
            timeout_duration: Duration::from_secs(timeout_seconds),
            retry_count: retry_count.max(1),
        }
    }

    /// Send one echo request; `Ok(None)` means no reply within the deadline.
    async fn ping_addr(&self, addr: IpAddr) -> Result<Option<i64>, ProbeError> {
        let client = match addr {
            IpAddr::V4(_) => self.client_v4.as_ref(),
            IpAddr::V6(_) => self.client_v6.as_ref(),
        };
        let Some(client) = client else {
            return Err(ProbeError::IcmpUnavailable);
        };

        let mut pinger = client.pinger(addr, PingIdentifier(random())).await;
        pinger.timeout(self.timeout_duration);

        match pinger.ping(PingSequence(0), &PING_PAYLOAD).await {
            Ok((_reply, rtt)) => Ok(Some(duration_ns(rtt))),
            Err(SurgeError::Timeout { .. }) => Ok(None),
            Err(SurgeError::IOError(err)) if is_down_error(&err) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

#[async_trait::async_trait]
impl Checker for IcmpChecker {
    async fn check(&self, target: &str) -> ProbeOutcome {
        let addrs: Vec<IpAddr> = if let Ok(addr) = target.parse::<IpAddr>() {
            vec![addr]
        } else {
            match self.resolver.lookup_ip(target).await {
                Ok(lookup) => lookup.iter().collect(),
                // An unresolvable name is a monitoring outcome, not a
                // probe failure.
                Err(_) => return ProbeOutcome::down(RTT_UNMEASURED),
            }
        };

        if addrs.is_empty() {
            return ProbeOutcome::failed(RTT_UNMEASURED, ProbeError::NoAddresses);
        }

        let mut best: Option<i64> = None;
        for _ in 0..self.retry_count {
            for result in join_all(addrs.iter().map(|addr| self.ping_addr(*addr))).await {
                match result {
                    Ok(Some(rtt)) => best = Some(best.map_or(rtt, |prev| prev.min(rtt))),
                    Ok(None) => {}
                    Err(err) => warn!("Ping of {target} failed: {err}"),
                }
            }
        }

        match best {
            Some(rtt) => ProbeOutcome::up(rtt),
            None => ProbeOutcome::down(RTT_UNMEASURED),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn test_down_error_classification() {
        assert!(is_down_error(&io::Error::from(io::ErrorKind::TimedOut)));
        assert!(is_down_error(&io::Error::from(io::ErrorKind::ConnectionRefused)));
        assert!(is_down_error(&io::Error::from(io::ErrorKind::ConnectionReset)));
        assert!(is_down_error(&io::Error::from(io::ErrorKind::HostUnreachable)));
        assert!(!is_down_error(&io::Error::from(io::ErrorKind::PermissionDenied)));
        assert!(!is_down_error(&io::Error::from(io::ErrorKind::InvalidInput)));
    }

    #[tokio::test]
    async fn test_tcp_check_open_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target = listener.local_addr().unwrap().to_string();

        let checker = TcpChecker::new(2);
        let outcome = checker.check(&target).await;

        assert!(outcome.up);
        assert!(outcome.rtt >= 0);
        assert!(outcome.error.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tcp_check_timeout_is_clean_down() {
        // 192.0.2.0/24 is reserved for documentation; nothing answers
        // there, so the connect runs into the deadline.
        let checker = TcpChecker::new(2);
        let outcome = checker.check("192.0.2.1:80").await;

        assert!(!outcome.up);
        assert!(outcome.error.is_none(), "timeout must not be an error");
    }

    #[tokio::test]
    async fn test_tcp_check_closed_port_is_clean_down() {
        // Bind then drop to find a port with nothing listening on it.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let target = listener.local_addr().unwrap().to_string();
        drop(listener);

        let checker = TcpChecker::new(2);
        let outcome = checker.check(&target).await;

        assert!(!outcome.up);
        assert!(outcome.error.is_none(), "refused connect must not be an error");
        assert!(outcome.rtt >= 0);
    }

    /// Serve a fixed response to every connection, returning the base URL.
    async fn spawn_responder(response: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    let _ = stream.read(&mut buf).await;
                    let _ = stream.write_all(response.as_bytes()).await;
                });
            }
        });

        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_http_check_success_status() {
        let url = spawn_responder("HTTP/1.1 204 No Content\r\ncontent-length: 0\r\n\r\n").await;

        let checker = HttpChecker::new(2, reqwest::Method::GET).unwrap();
        let outcome = checker.check(&url).await;

        assert!(outcome.up);
        assert!(outcome.rtt >= 0);
    }

    #[tokio::test]
    async fn test_http_check_bad_status() {
        let url =
            spawn_responder("HTTP/1.1 503 Service Unavailable\r\ncontent-length: 0\r\n\r\n").await;

        let checker = HttpChecker::new(2, reqwest::Method::GET).unwrap();
        let outcome = checker.check(&url).await;

        assert!(!outcome.up);
        assert!(matches!(outcome.error, Some(ProbeError::BadStatus(503))));
    }

    #[tokio::test]
    async fn test_http_check_timeout_is_clean_down() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());

        // Accept and read but never answer, holding the connection open
        // until the client gives up.
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                tokio::spawn(async move {
                    let mut buf = [0u8; 1024];
                    while stream.read(&mut buf).await.is_ok_and(|n| n > 0) {}
                });
            }
        });

        let checker = HttpChecker::new(1, reqwest::Method::GET).unwrap();
        let outcome = checker.check(&url).await;

        assert!(!outcome.up);
        assert!(outcome.error.is_none(), "timeout must not be an error");
    }

    #[tokio::test]
    async fn test_http_check_refused_is_clean_down() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let checker = HttpChecker::new(2, reqwest::Method::GET).unwrap();
        let outcome = checker.check(&url).await;

        assert!(!outcome.up);
        assert!(outcome.error.is_none());
    }

    #[tokio::test]
    async fn test_icmp_check_unresolvable_host() {
        let checker = IcmpChecker::new(1, 1);
        // Reserved TLD, resolution cannot succeed.
        let outcome = checker.check("unresolvable.srvmon.invalid").await;

        assert!(!outcome.up);
        assert_eq!(outcome.rtt, RTT_UNMEASURED);
        assert!(outcome.error.is_none());
    }
}
