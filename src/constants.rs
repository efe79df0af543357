use std::time::Duration;

pub(crate) const DEFAULT_MAX_HOPS: u8 = 64;
pub(crate) const DEFAULT_PACKET_SIZE: usize = 52;
pub(crate) const DEFAULT_TIMEOUT: Duration = Duration::from_millis(500);
pub(crate) const DEFAULT_PORT: u16 = 33434;
pub(crate) const DEFAULT_FIRST_HOP: u8 = 1;
pub(crate) const DEFAULT_RETRIES: usize = 3;

/// Fully retried hops in a row after which a trace gives up.
pub(crate) const MAX_CONTINUOUS_FAILURES: usize = 10;

pub(crate) const PROBE_PAYLOAD: [u8; 1] = [0];

pub(crate) const LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);
pub(crate) const LOOKUP_POLL_INTERVAL: Duration = Duration::from_millis(500);
pub(crate) const LOOKUP_POLL_ROUNDS: usize = 10;

pub(crate) const PUBLISH_GRACE: Duration = Duration::from_millis(1);
pub(crate) const FINAL_HOP_DELAY: Duration = Duration::from_millis(1);
pub(crate) const DRAIN_DELAY_PER_NOTIFIER: Duration = Duration::from_millis(1);
