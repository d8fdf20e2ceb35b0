use thiserror::Error;

/// Sentinel round-trip time recorded when no measurement was taken.
pub const RTT_UNMEASURED: i64 = -1;

/// Outcome of probing a single target once.
///
/// A down target is a monitoring result, not a failure; `error` is only
/// populated when the probe itself misbehaved (bad status, protocol error,
/// unclassified I/O error) and is logged for diagnostics.
#[derive(Debug)]
pub struct ProbeOutcome {
    /// Round-trip time in nanoseconds, `RTT_UNMEASURED` when unknown.
    pub rtt: i64,
    pub up: bool,
    pub error: Option<ProbeError>,
}

impl ProbeOutcome {
    pub fn up(rtt: i64) -> Self {
        Self { rtt, up: true, error: None }
    }

    pub fn down(rtt: i64) -> Self {
        Self { rtt, up: false, error: None }
    }

    pub fn failed(rtt: i64, error: ProbeError) -> Self {
        Self { rtt, up: false, error: Some(error) }
    }
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("unsupported target")]
    UnsupportedTarget,
    #[error("host has no A/AAAA records")]
    NoAddresses,
    #[error("icmp sockets unavailable")]
    IcmpUnavailable,
    #[error("response status: {0}")]
    BadStatus(u16),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Ping(#[from] surge_ping::SurgeError),
}
