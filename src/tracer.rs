use std::sync::Arc;

use log::info;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::hop::Hop;
use crate::options::TraceOptions;
use crate::probe::{ProbePort, ProbeRequest, SocketProbe};
use crate::resolver::HostResolver;
use crate::session::{ProbeSession, SessionHub};

/// Hops found by a trace, plus the error that ended it early, if any.
#[derive(Debug)]
pub struct TraceOutcome {
    pub hops: Vec<Arc<Hop>>,
    pub error: Option<Error>,
}

impl TraceOutcome {
    fn failed(error: Error) -> Self {
        Self {
            hops: Vec::new(),
            error: Some(error),
        }
    }

    /// The hops, or the error if the trace ended on one. Hops found before the
    /// error are discarded.
    pub fn into_result(self) -> Result<Vec<Arc<Hop>>> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.hops),
        }
    }
}

/// Runs traces with a probe port and a hostname resolver.
///
/// # Example
/// ```no_run
/// use hoptrace::{resolver, TraceOptions, Tracer};
///
/// tokio_test::block_on(async {
///     let options = TraceOptions::new("192.0.2.1");
///     let hops = Tracer::system().run(&options).await.into_result().unwrap();
///     resolver::wait_all(&hops).await;
///     for hop in &hops {
///         println!("{}", hop);
///     }
/// })
/// ```
#[derive(Debug)]
pub struct Tracer<P = SocketProbe> {
    port: P,
    resolver: HostResolver,
}

impl Tracer<SocketProbe> {
    /// Raw socket probing with the system DNS configuration.
    pub fn system() -> Self {
        Self::new(SocketProbe::new(), HostResolver::system())
    }
}

impl<P: ProbePort> Tracer<P> {
    pub fn new(port: P, resolver: HostResolver) -> Self {
        Self { port, resolver }
    }

    /// Traces the route described by `options`.
    ///
    /// Fails without probing if the destination is unset or another trace is
    /// running with the same options. Reaching the destination, running out of
    /// hops, too many unanswered hops in a row, or a routing loop all end the
    /// trace without an error.
    pub async fn run(&self, options: &TraceOptions) -> TraceOutcome {
        self.trace(options, None).await
    }

    /// Like [`Tracer::run`], but also stops before the next attempt once
    /// `token` is cancelled, returning the hops found so far.
    pub async fn run_until_cancelled(
        &self,
        options: &TraceOptions,
        token: &CancellationToken,
    ) -> TraceOutcome {
        self.trace(options, Some(token)).await
    }

    async fn trace(
        &self,
        options: &TraceOptions,
        cancel: Option<&CancellationToken>,
    ) -> TraceOutcome {
        let Some(destination) = options.destination_address() else {
            return TraceOutcome::failed(Error::MissingDestination);
        };
        let max_hops = options.max_hops();
        let request = ProbeRequest {
            ttl: options.first_hop(),
            timeout: options.timeout(),
            port: options.port(),
            packet_size: options.packet_size(),
            source: options.source_address(),
            destination,
        };

        let hub = Arc::new(SessionHub::new(usize::from(max_hops)));
        let _bound = match options.binding().bind(Arc::clone(&hub)) {
            Ok(bound) => bound,
            Err(err) => return TraceOutcome::failed(err),
        };

        info!(
            "tracing route to {} from {}, {} hops max",
            destination, request.source, max_hops
        );
        ProbeSession::new(
            &self.port,
            &self.resolver,
            hub,
            request,
            max_hops,
            options.retries(),
        )
        .run(cancel)
        .await
    }
}

/// Traces the route described by `options` over raw sockets.
///
/// Shorthand for [`Tracer::system`] followed by [`Tracer::run`].
pub async fn traceroute(options: &TraceOptions) -> TraceOutcome {
    Tracer::system().run(options).await
}
