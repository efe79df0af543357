use std::{
    net::{IpAddr, Ipv4Addr},
    time::Duration,
};

use log::debug;
use pnet::datalink;

use crate::binding::SessionBinding;
use crate::constants::{
    DEFAULT_FIRST_HOP, DEFAULT_MAX_HOPS, DEFAULT_PACKET_SIZE, DEFAULT_PORT, DEFAULT_RETRIES,
    DEFAULT_TIMEOUT,
};
use crate::notification::HopStream;

/// Parameters of a trace.
///
/// Unset values fall back to defaults: 64 hops, 52 byte receive buffer,
/// 500 ms per attempt, port 33434, first hop 1 and 3 retries per hop. The
/// source address defaults to the first non-loopback IPv4 interface address.
///
/// The same options can drive any number of traces one after another, and
/// [`TraceOptions::subscribe`] can be called from other tasks to watch the
/// trace running with them. Share them behind an `Arc` for that.
///
/// # Example
/// ```no_run
/// use hoptrace::TraceOptions;
/// use std::time::Duration;
///
/// let options = TraceOptions::new("192.0.2.1")
///     .with_max_hops(30)
///     .with_timeout(Duration::from_millis(250));
/// assert_eq!(options.max_hops(), 30);
/// ```
#[derive(Debug)]
pub struct TraceOptions {
    max_hops: Option<u8>,
    packet_size: Option<usize>,
    timeout: Option<Duration>,
    port: Option<u16>,
    first_hop: Option<u8>,
    retries: Option<usize>,
    source_address: Option<Ipv4Addr>,
    destination_address: Option<Ipv4Addr>,

    binding: SessionBinding,
}

impl TraceOptions {
    /// Options for tracing the route to `destination_address`.
    ///
    /// An address that does not parse as IPv4 leaves the destination unset,
    /// and any trace with these options fails.
    pub fn new(destination_address: &str) -> Self {
        Self {
            max_hops: None,
            packet_size: None,
            timeout: None,
            port: None,
            first_hop: None,
            retries: None,
            source_address: None,
            destination_address: destination_address.trim().parse().ok(),
            binding: SessionBinding::new(),
        }
    }

    /// Waits until a trace runs with these options and returns its live hops.
    ///
    /// Returns `None` if that trace finished before the subscription could be
    /// registered.
    pub async fn subscribe(&self) -> Option<HopStream> {
        self.binding.subscribe().await
    }

    /// Whether a trace is currently running with these options.
    pub fn is_tracing(&self) -> bool {
        self.binding.is_bound()
    }

    pub(crate) fn binding(&self) -> &SessionBinding {
        &self.binding
    }

    pub fn set_max_hops(&mut self, max_hops: u8) {
        self.max_hops = Some(max_hops);
    }

    pub fn with_max_hops(mut self, max_hops: u8) -> Self {
        self.set_max_hops(max_hops);
        self
    }

    pub fn max_hops(&self) -> u8 {
        non_zero(self.max_hops).unwrap_or(DEFAULT_MAX_HOPS)
    }

    pub fn set_packet_size(&mut self, packet_size: usize) {
        self.packet_size = Some(packet_size);
    }

    pub fn with_packet_size(mut self, packet_size: usize) -> Self {
        self.set_packet_size(packet_size);
        self
    }

    /// Size of the buffer a single ICMP notification is read into.
    pub fn packet_size(&self) -> usize {
        non_zero(self.packet_size).unwrap_or(DEFAULT_PACKET_SIZE)
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = Some(timeout);
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.set_timeout(timeout);
        self
    }

    /// How long a single attempt waits for an answer.
    pub fn timeout(&self) -> Duration {
        self.timeout
            .filter(|timeout| !timeout.is_zero())
            .unwrap_or(DEFAULT_TIMEOUT)
    }

    pub fn set_port(&mut self, port: u16) {
        self.port = Some(port);
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.set_port(port);
        self
    }

    pub fn port(&self) -> u16 {
        non_zero(self.port).unwrap_or(DEFAULT_PORT)
    }

    pub fn set_first_hop(&mut self, first_hop: u8) {
        self.first_hop = Some(first_hop);
    }

    pub fn with_first_hop(mut self, first_hop: u8) -> Self {
        self.set_first_hop(first_hop);
        self
    }

    /// TTL of the first probe. Capped below 255 so the hop after it stays addressable.
    pub fn first_hop(&self) -> u8 {
        non_zero(self.first_hop)
            .unwrap_or(DEFAULT_FIRST_HOP)
            .min(u8::MAX - 1)
    }

    pub fn set_retries(&mut self, retries: usize) {
        self.retries = Some(retries);
    }

    pub fn with_retries(mut self, retries: usize) -> Self {
        self.set_retries(retries);
        self
    }

    /// Extra attempts per hop before it is recorded as unanswered.
    pub fn retries(&self) -> usize {
        self.retries.unwrap_or(DEFAULT_RETRIES)
    }

    pub fn set_source_address(&mut self, source_address: Ipv4Addr) {
        self.source_address = Some(source_address);
    }

    pub fn with_source_address(mut self, source_address: Ipv4Addr) -> Self {
        self.set_source_address(source_address);
        self
    }

    /// The configured source address, else the first non-loopback interface
    /// address, else loopback.
    pub fn source_address(&self) -> Ipv4Addr {
        self.source_address
            .or_else(interface_address)
            .unwrap_or(Ipv4Addr::LOCALHOST)
    }

    pub fn set_destination_address(&mut self, destination_address: Ipv4Addr) {
        self.destination_address = Some(destination_address);
    }

    pub fn with_destination_address(mut self, destination_address: Ipv4Addr) -> Self {
        self.set_destination_address(destination_address);
        self
    }

    pub fn destination_address(&self) -> Option<Ipv4Addr> {
        self.destination_address
    }
}

fn non_zero<T: Default + PartialEq>(value: Option<T>) -> Option<T> {
    value.filter(|value| *value != T::default())
}

fn interface_address() -> Option<Ipv4Addr> {
    let address = datalink::interfaces()
        .into_iter()
        .flat_map(|iface| iface.ips)
        .find_map(|net| match net.ip() {
            IpAddr::V4(ip) if !ip.is_loopback() => Some(ip),
            _ => None,
        });
    if address.is_none() {
        debug!("no non-loopback IPv4 interface address, falling back to loopback");
    }
    address
}
