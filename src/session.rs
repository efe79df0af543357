use std::{
    collections::HashSet,
    net::Ipv4Addr,
    sync::Arc,
};

use log::{debug, info, warn};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::constants::{DRAIN_DELAY_PER_NOTIFIER, FINAL_HOP_DELAY, MAX_CONTINUOUS_FAILURES};
use crate::error::Result;
use crate::hop::Hop;
use crate::notification::{HopNotifier, HopStream};
use crate::probe::{ProbePort, ProbeRequest};
use crate::resolver::HostResolver;
use crate::tracer::TraceOutcome;

/// Subscribers of one trace.
#[derive(Debug)]
pub(crate) struct SessionHub {
    capacity: usize,
    state: Mutex<HubState>,
}

#[derive(Debug, Default)]
struct HubState {
    notifiers: Vec<Arc<HopNotifier>>,
    closed: bool,
}

impl SessionHub {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(HubState::default()),
        }
    }

    /// Adds a subscriber, `None` once the trace has shut its subscribers down.
    pub(crate) async fn register(&self) -> Option<HopStream> {
        let mut state = self.state.lock().await;
        if state.closed {
            return None;
        }
        let (notifier, stream) = HopNotifier::new(self.capacity);
        state.notifiers.push(Arc::new(notifier));
        Some(stream)
    }

    async fn publish(&self, hop: &Arc<Hop>) {
        let notifiers = self.state.lock().await.notifiers.clone();
        futures::future::join_all(
            notifiers
                .iter()
                .map(|notifier| notifier.publish(Arc::clone(hop))),
        )
        .await;
    }

    /// Lets in-flight hops drain, then ends every subscriber's stream.
    async fn shutdown(&self) {
        let notifiers = {
            let mut state = self.state.lock().await;
            state.closed = true;
            state.notifiers.clone()
        };
        tokio::time::sleep(DRAIN_DELAY_PER_NOTIFIER * notifiers.len() as u32).await;
        for notifier in notifiers {
            notifier.close().await;
        }
    }

    #[cfg(test)]
    pub(crate) async fn subscriber_count(&self) -> usize {
        self.state.lock().await.notifiers.len()
    }
}

/// State of one trace: the TTL cursor and its counters, the hops found so far
/// and the addresses already seen.
pub(crate) struct ProbeSession<'a, P> {
    port: &'a P,
    resolver: &'a HostResolver,
    hub: Arc<SessionHub>,
    request: ProbeRequest,
    max_hops: u8,
    retries: usize,
    hops: Vec<Arc<Hop>>,
    seen: HashSet<Ipv4Addr>,
    retry: usize,
    continuous_failures: usize,
}

impl<'a, P: ProbePort> ProbeSession<'a, P> {
    pub(crate) fn new(
        port: &'a P,
        resolver: &'a HostResolver,
        hub: Arc<SessionHub>,
        request: ProbeRequest,
        max_hops: u8,
        retries: usize,
    ) -> Self {
        Self {
            port,
            resolver,
            hub,
            request,
            max_hops,
            retries,
            hops: Vec::with_capacity(usize::from(max_hops)),
            seen: HashSet::new(),
            retry: 0,
            continuous_failures: 0,
        }
    }

    /// Probes until the trace ends, then closes every subscriber.
    ///
    /// The hops found before a fatal error are returned along with it.
    pub(crate) async fn run(mut self, cancel: Option<&CancellationToken>) -> TraceOutcome {
        let result = self.probe_loop(cancel).await;
        if let Err(err) = &result {
            warn!(
                "trace to {} aborted at ttl {}, reason: {}",
                self.request.destination, self.request.ttl, err
            );
        }
        self.hub.shutdown().await;
        TraceOutcome {
            hops: self.hops,
            error: result.err(),
        }
    }

    async fn probe_loop(&mut self, cancel: Option<&CancellationToken>) -> Result<()> {
        let destination = self.request.destination;
        loop {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                info!("trace to {} cancelled at ttl {}", destination, self.request.ttl);
                return Ok(());
            }

            let hop = match self.port.attempt(self.request).await? {
                None => {
                    if self.retry < self.retries {
                        self.retry += 1;
                        debug!(
                            "ttl {} unanswered, retry {}/{}",
                            self.request.ttl, self.retry, self.retries
                        );
                        continue;
                    }
                    self.continuous_failures += 1;
                    Arc::new(Hop::unanswered(self.request.ttl))
                }
                Some(reply) => {
                    self.continuous_failures = 0;
                    if !self.seen.insert(reply.address) {
                        info!(
                            "{} answered again at ttl {}, routing loop, stopping",
                            reply.address, self.request.ttl
                        );
                        return Ok(());
                    }
                    let hop = Arc::new(Hop::reply(reply.address, self.request.ttl, reply.elapsed));
                    self.resolver.spawn(&hop);
                    hop
                }
            };

            debug!("{}", hop);
            let reached = hop.address() == Some(destination);
            self.record(hop).await;
            self.retry = 0;
            self.request.ttl = self.request.ttl.saturating_add(1);

            if reached {
                info!("reached {} in {} hops", destination, self.hops.len());
                return Ok(());
            }

            if self.request.ttl >= self.max_hops
                || self.continuous_failures >= MAX_CONTINUOUS_FAILURES
            {
                info!(
                    "giving up on {} at ttl {} after {} unanswered hops in a row",
                    destination, self.request.ttl, self.continuous_failures
                );
                tokio::time::sleep(FINAL_HOP_DELAY).await;
                let last = Arc::new(Hop::assumed_destination(destination, self.request.ttl));
                self.record(last).await;
                return Ok(());
            }
        }
    }

    async fn record(&mut self, hop: Arc<Hop>) {
        self.hub.publish(&hop).await;
        self.hops.push(hop);
    }
}
