//! Fast TCP reachability probe
//!
//! A single bounded-time connect attempt against the backend. The probe only
//! decides forward-vs-interstitial; it deliberately uses a much shorter
//! timeout than the forwarding path so an asleep backend fails fast. There is
//! no retry here: the client's next request re-probes.

use std::io;
use std::time::Duration;

use tokio::net::TcpStream;
use tracing::debug;

/// Result of one reachability probe. Computed fresh per request, never cached.
#[derive(Debug)]
pub enum ProbeOutcome {
    Reachable,
    Unreachable(ProbeFailure),
}

impl ProbeOutcome {
    pub fn is_reachable(&self) -> bool {
        matches!(self, ProbeOutcome::Reachable)
    }
}

/// Why a probe failed. Logged for diagnostics; all causes collapse to
/// "unreachable" downstream.
#[derive(Debug, thiserror::Error)]
pub enum ProbeFailure {
    #[error("connection attempt timed out")]
    TimedOut,
    #[error("connection refused")]
    Refused,
    #[error("socket error: {0}")]
    Socket(io::Error),
}

/// Attempt a TCP handshake with `addr` within `timeout`.
pub async fn probe(addr: &str, timeout: Duration) -> ProbeOutcome {
    match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
        Ok(Ok(_stream)) => {
            debug!(addr, "Probe succeeded (TCP connect)");
            ProbeOutcome::Reachable
        }
        Ok(Err(e)) if e.kind() == io::ErrorKind::ConnectionRefused => {
            debug!(addr, "Probe failed (connection refused)");
            ProbeOutcome::Unreachable(ProbeFailure::Refused)
        }
        Ok(Err(e)) => {
            debug!(addr, error = %e, "Probe failed (socket error)");
            ProbeOutcome::Unreachable(ProbeFailure::Socket(e))
        }
        Err(_) => {
            debug!(addr, "Probe failed (timeout)");
            ProbeOutcome::Unreachable(ProbeFailure::TimedOut)
        }
    }
}
