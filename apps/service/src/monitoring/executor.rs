use std::sync::Arc;

use anyhow::Result;

use super::checker::{Checker, HttpChecker, IcmpChecker, TcpChecker};
use super::classify::{CheckKind, check_kind};
use super::types::{ProbeError, ProbeOutcome, RTT_UNMEASURED};

/// Routes targets to the matching protocol probe.
///
/// The scheduled tick and the on-demand single check both go through
/// `dispatch`, so the two entry points cannot drift apart.
pub struct ProbeExecutor {
    http_checker: Arc<HttpChecker>,
    tcp_checker: Arc<TcpChecker>,
    icmp_checker: Arc<IcmpChecker>,
}

impl ProbeExecutor {
    pub fn new(timeout_seconds: u64, http_method: &str, ping_retry_count: u32) -> Result<Self> {
        let method = reqwest::Method::from_bytes(http_method.as_bytes())?;

        Ok(Self {
            http_checker: Arc::new(HttpChecker::new(timeout_seconds, method)?),
            tcp_checker: Arc::new(TcpChecker::new(timeout_seconds)),
            icmp_checker: Arc::new(IcmpChecker::new(timeout_seconds, ping_retry_count)),
        })
    }

    /// Classify the target and run the matching probe. Invalid targets
    /// report an unsupported-target error without any network I/O.
    pub async fn dispatch(&self, target: &str) -> ProbeOutcome {
        let checker: &dyn Checker = match check_kind(target) {
            CheckKind::Http => self.http_checker.as_ref(),
            CheckKind::Tcp => self.tcp_checker.as_ref(),
            CheckKind::Icmp => self.icmp_checker.as_ref(),
            CheckKind::Invalid => {
                return ProbeOutcome::failed(RTT_UNMEASURED, ProbeError::UnsupportedTarget);
            }
        };

        checker.check(target).await
    }
}
