use std::{
    future::Future,
    io,
    mem::MaybeUninit,
    net::{Ipv4Addr, SocketAddrV4},
    time::{Duration, Instant},
};

use log::debug;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};

use crate::constants::PROBE_PAYLOAD;
use crate::error::{Error, ProbeStage, Result};

/// Parameters of a single probe attempt.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct ProbeRequest {
    pub ttl: u8,
    pub timeout: Duration,
    pub port: u16,
    pub packet_size: usize,
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
}

/// An ICMP notification that answered a probe.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct ProbeReply {
    pub address: Ipv4Addr,
    pub elapsed: Duration,
}

/// Sends one probe and waits for the notification it triggers.
///
/// `Ok(None)` means nothing answered within the timeout. Errors are reserved
/// for failures to set up or send the probe and end the whole trace.
pub trait ProbePort: Send + Sync {
    fn attempt(
        &self,
        request: ProbeRequest,
    ) -> impl Future<Output = Result<Option<ProbeReply>>> + Send;
}

/// Probes with a UDP datagram and listens for the ICMP answer on a raw socket.
///
/// Opening the raw socket needs elevated privileges (`CAP_NET_RAW` or root).
#[derive(Copy, Clone, Debug, Default)]
pub struct SocketProbe;

impl SocketProbe {
    pub fn new() -> Self {
        Self
    }
}

impl ProbePort for SocketProbe {
    async fn attempt(&self, request: ProbeRequest) -> Result<Option<ProbeReply>> {
        tokio::task::spawn_blocking(move || probe_once(&request))
            .await
            .map_err(|err| Error::Opaque(format!("probe task failed, reason: {}", err).into()))?
    }
}

fn probe_once(request: &ProbeRequest) -> Result<Option<ProbeReply>> {
    let started = Instant::now();

    let receiver = Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4))
        .map_err(Error::transport(ProbeStage::ReceiveSocket))?;
    let sender = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
        .map_err(Error::transport(ProbeStage::SendSocket))?;

    sender
        .set_ttl(u32::from(request.ttl))
        .map_err(Error::transport(ProbeStage::Ttl))?;
    receiver
        .set_read_timeout(Some(request.timeout))
        .map_err(Error::transport(ProbeStage::ReceiveTimeout))?;
    receiver
        .bind(&SockAddr::from(SocketAddrV4::new(request.source, request.port)))
        .map_err(Error::transport(ProbeStage::Bind))?;
    sender
        .send_to(
            &PROBE_PAYLOAD,
            &SockAddr::from(SocketAddrV4::new(request.destination, request.port)),
        )
        .map_err(Error::transport(ProbeStage::Send))?;

    let mut buf = vec![MaybeUninit::<u8>::uninit(); request.packet_size];
    match receiver.recv_from(&mut buf) {
        Ok((_, from)) => Ok(from.as_socket_ipv4().map(|from| ProbeReply {
            address: *from.ip(),
            elapsed: started.elapsed(),
        })),
        Err(err) => {
            if !matches!(
                err.kind(),
                io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
            ) {
                debug!("ttl {} receive failed, reason: {}", request.ttl, err);
            }
            Ok(None)
        }
    }
}
