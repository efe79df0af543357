use std::{
    fmt,
    net::Ipv4Addr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, OnceLock,
    },
    time::Duration,
};

use tokio_util::sync::CancellationToken;

/// Reverse DNS state of a hop, shared with the task resolving it.
#[derive(Debug, Default)]
pub(crate) struct Resolution {
    hostname: OnceLock<String>,
    finished: AtomicBool,
    token: CancellationToken,
}

impl Resolution {
    fn finished() -> Self {
        let resolution = Self::default();
        resolution.finished.store(true, Ordering::Release);
        resolution
    }

    pub(crate) fn set_hostname(&self, hostname: String) {
        let _ = self.hostname.set(hostname);
    }

    pub(crate) fn finish(&self) {
        self.finished.store(true, Ordering::Release);
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }
}

/// One point on the path to the destination.
///
/// Hops are handed out as `Arc<Hop>`: the same hop is appended to the trace
/// result and published to every subscriber. The hostname is filled in later by
/// a background lookup; use [`crate::resolver::wait_all`] to wait for it.
/// Dropping the last reference to a hop cancels its pending lookup.
#[derive(Debug)]
pub struct Hop {
    address: Option<Ipv4Addr>,
    ttl: u8,
    success: bool,
    elapsed: Duration,
    resolution: Arc<Resolution>,
}

impl Hop {
    /// A hop that answered the probe. Its hostname is still unresolved.
    pub fn reply(address: Ipv4Addr, ttl: u8, elapsed: Duration) -> Self {
        Self {
            address: Some(address),
            ttl,
            success: true,
            elapsed,
            resolution: Arc::new(Resolution::default()),
        }
    }

    /// A hop where every attempt timed out.
    pub fn unanswered(ttl: u8) -> Self {
        Self {
            address: None,
            ttl,
            success: false,
            elapsed: Duration::ZERO,
            resolution: Arc::new(Resolution::finished()),
        }
    }

    /// The closing hop added when a trace gives up before reaching the destination.
    pub(crate) fn assumed_destination(destination: Ipv4Addr, ttl: u8) -> Self {
        Self {
            address: Some(destination),
            ttl,
            success: true,
            elapsed: Duration::ZERO,
            resolution: Arc::new(Resolution::finished()),
        }
    }

    pub fn address(&self) -> Option<Ipv4Addr> {
        self.address
    }

    /// Resolved hostname, `None` until resolution succeeds.
    pub fn hostname(&self) -> Option<&str> {
        self.resolution.hostname.get().map(String::as_str)
    }

    pub fn ttl(&self) -> u8 {
        self.ttl
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Whether reverse DNS for this hop is done, successfully or not.
    pub fn is_resolved(&self) -> bool {
        self.resolution.is_finished()
    }

    /// Stops a pending reverse lookup. The hop is marked resolved once the task notices.
    pub fn cancel_resolution(&self) {
        self.resolution.token.cancel();
    }

    pub(crate) fn is_resolution_cancelled(&self) -> bool {
        self.resolution.token.is_cancelled()
    }

    pub(crate) fn resolution(&self) -> Arc<Resolution> {
        Arc::clone(&self.resolution)
    }
}

impl Drop for Hop {
    fn drop(&mut self) {
        self.resolution.token.cancel();
    }
}

impl fmt::Display for Hop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.address, self.hostname()) {
            (None, _) => write!(f, "{:>3}  *", self.ttl),
            (Some(address), Some(hostname)) => write!(
                f,
                "{:>3}  {} ({})  {:.3?}",
                self.ttl, hostname, address, self.elapsed
            ),
            (Some(address), None) => {
                write!(f, "{:>3}  {}  {:.3?}", self.ttl, address, self.elapsed)
            }
        }
    }
}
