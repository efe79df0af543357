use std::{
    net::{IpAddr, Ipv4Addr},
    sync::Arc,
    time::Duration,
};

use futures::future::BoxFuture;
use hickory_resolver::{
    config::ResolverConfig, name_server::TokioConnectionProvider, Resolver, TokioResolver,
};
use log::{debug, trace};
use tokio::task::JoinHandle;

use crate::constants::{LOOKUP_POLL_INTERVAL, LOOKUP_POLL_ROUNDS, LOOKUP_TIMEOUT};
use crate::hop::{Hop, Resolution};

/// A reverse DNS backend.
///
/// Returns the first name for `address`, or `None` when there is none or the
/// lookup failed.
pub trait NameLookup: Send + Sync + 'static {
    fn lookup(&self, address: Ipv4Addr) -> BoxFuture<'_, Option<String>>;
}

impl NameLookup for TokioResolver {
    fn lookup(&self, address: Ipv4Addr) -> BoxFuture<'_, Option<String>> {
        Box::pin(async move {
            match self.reverse_lookup(IpAddr::V4(address)).await {
                Ok(names) => names.iter().next().map(|name| name.to_string()),
                Err(err) => {
                    debug!("reverse lookup of {} failed, reason: {}", address, err);
                    None
                }
            }
        })
    }
}

/// Resolves hostnames of discovered hops in the background.
#[derive(Clone)]
pub struct HostResolver {
    backend: Arc<dyn NameLookup>,
    timeout: Duration,
}

impl std::fmt::Debug for HostResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostResolver")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl HostResolver {
    pub fn new(backend: impl NameLookup) -> Self {
        Self {
            backend: Arc::new(backend),
            timeout: LOOKUP_TIMEOUT,
        }
    }

    /// Resolver backed by the system DNS configuration.
    ///
    /// Falls back to the default public configuration when the system one
    /// cannot be read.
    pub fn system() -> Self {
        let resolver = match Resolver::builder_tokio() {
            Ok(builder) => builder.build(),
            Err(err) => {
                debug!(
                    "failed to read system DNS configuration, using defaults, reason: {}",
                    err
                );
                Resolver::builder_with_config(
                    ResolverConfig::default(),
                    TokioConnectionProvider::default(),
                )
                .build()
            }
        };
        Self::new(resolver)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Starts a detached lookup for `hop`.
    ///
    /// The task holds only the hop's resolution state, so dropping every
    /// reference to the hop cancels the lookup.
    pub fn spawn(&self, hop: &Hop) -> Option<JoinHandle<()>> {
        let address = hop.address()?;
        if hop.is_resolved() {
            return None;
        }
        let resolver = self.clone();
        let guard = FinishGuard(hop.resolution());
        Some(tokio::spawn(async move {
            resolver.resolve(address, &guard.0).await;
        }))
    }

    async fn resolve(&self, address: Ipv4Addr, resolution: &Resolution) {
        tokio::select! {
            _ = resolution.token().cancelled() => {
                trace!("reverse lookup of {} cancelled", address);
            }
            found = tokio::time::timeout(self.timeout, self.backend.lookup(address)) => {
                match found {
                    Ok(Some(name)) => {
                        let name = name.trim_end_matches('.');
                        if !name.is_empty() {
                            resolution.set_hostname(name.to_string());
                        }
                    }
                    Ok(None) => {}
                    Err(_) => debug!("reverse lookup of {} timed out", address),
                }
            }
        }
    }
}

/// Marks the hop resolved when the lookup future is dropped, polled or not.
struct FinishGuard(Arc<Resolution>);

impl Drop for FinishGuard {
    fn drop(&mut self) {
        self.0.finish();
    }
}

/// Waits for the reverse lookups of `hops` to finish.
///
/// Each hop is polled on its own; a hop still unresolved after the last round
/// is given up on. Returns within the fixed poll bound whatever the outcome.
pub async fn wait_all<'a, I>(hops: I)
where
    I: IntoIterator<Item = &'a Arc<Hop>>,
{
    futures::future::join_all(hops.into_iter().map(|hop| wait_one(hop))).await;
}

async fn wait_one(hop: &Hop) {
    for _ in 0..LOOKUP_POLL_ROUNDS {
        if hop.is_resolved() || hop.is_resolution_cancelled() {
            return;
        }
        tokio::time::sleep(LOOKUP_POLL_INTERVAL).await;
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    struct StaticLookup(HashMap<Ipv4Addr, String>);

    impl NameLookup for StaticLookup {
        fn lookup(&self, address: Ipv4Addr) -> BoxFuture<'_, Option<String>> {
            Box::pin(async move { self.0.get(&address).cloned() })
        }
    }

    struct StalledLookup;

    impl NameLookup for StalledLookup {
        fn lookup(&self, _address: Ipv4Addr) -> BoxFuture<'_, Option<String>> {
            Box::pin(futures::future::pending())
        }
    }

    fn reply(last_octet: u8, ttl: u8) -> Arc<Hop> {
        Arc::new(Hop::reply(
            Ipv4Addr::new(10, 0, 0, last_octet),
            ttl,
            Duration::from_millis(1),
        ))
    }

    #[tokio::test]
    async fn test_resolve_sets_hostname_without_root_dot() {
        let resolver = HostResolver::new(StaticLookup(HashMap::from([(
            Ipv4Addr::new(10, 0, 0, 1),
            "gw.example.".to_string(),
        )])));
        let hop = reply(1, 1);
        resolver.spawn(&hop).unwrap().await.unwrap();

        assert!(hop.is_resolved());
        assert_eq!(hop.hostname(), Some("gw.example"));
    }

    #[tokio::test]
    async fn test_unknown_address_still_finishes() {
        let resolver = HostResolver::new(StaticLookup(HashMap::new()));
        let hop = reply(2, 1);
        resolver.spawn(&hop).unwrap().await.unwrap();

        assert!(hop.is_resolved());
        assert_eq!(hop.hostname(), None);
    }

    #[tokio::test]
    async fn test_unanswered_hop_is_not_looked_up() {
        let resolver = HostResolver::new(StaticLookup(HashMap::new()));
        assert!(resolver.spawn(&Hop::unanswered(3)).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lookup_timeout_finishes_hop() {
        let resolver = HostResolver::new(StalledLookup).with_timeout(Duration::from_secs(1));
        let hop = reply(3, 1);
        resolver.spawn(&hop).unwrap().await.unwrap();

        assert!(hop.is_resolved());
        assert_eq!(hop.hostname(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_lookup_finishes_hop() {
        let resolver = HostResolver::new(StalledLookup);
        let hop = reply(4, 1);
        let handle = resolver.spawn(&hop).unwrap();
        hop.cancel_resolution();
        handle.await.unwrap();

        assert!(hop.is_resolved());
    }

    #[tokio::test(start_paused = true)]
    async fn test_aborted_lookup_finishes_hop() {
        let resolver = HostResolver::new(StalledLookup);
        let hop = reply(5, 1);
        let handle = resolver.spawn(&hop).unwrap();
        tokio::task::yield_now().await;
        handle.abort();
        assert!(handle.await.unwrap_err().is_cancelled());

        assert!(hop.is_resolved());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lookup_aborted_before_first_poll_finishes_hop() {
        let resolver = HostResolver::new(StalledLookup);
        let hop = reply(11, 1);
        let handle = resolver.spawn(&hop).unwrap();
        handle.abort();
        assert!(handle.await.unwrap_err().is_cancelled());

        assert!(hop.is_resolved());
        assert_eq!(hop.hostname(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_all_is_bounded() {
        let hops = vec![reply(6, 1), reply(7, 2), Arc::new(Hop::unanswered(3))];

        let start = tokio::time::Instant::now();
        wait_all(&hops).await;
        let waited = start.elapsed();

        let bound = LOOKUP_POLL_INTERVAL * LOOKUP_POLL_ROUNDS as u32;
        assert!(waited <= bound, "waited {:?}", waited);
        assert!(waited >= bound - LOOKUP_POLL_INTERVAL);
        assert!(!hops[0].is_resolved());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_all_returns_when_resolved() {
        let resolver = HostResolver::new(StaticLookup(HashMap::new()));
        let hops = vec![reply(8, 1), reply(9, 2)];
        for hop in &hops {
            resolver.spawn(hop);
        }

        let start = tokio::time::Instant::now();
        wait_all(&hops).await;

        assert!(hops.iter().all(|hop| hop.is_resolved()));
        assert!(start.elapsed() <= LOOKUP_POLL_INTERVAL);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_all_skips_cancelled_hops() {
        let hops = vec![reply(10, 1)];
        hops[0].cancel_resolution();

        let start = tokio::time::Instant::now();
        wait_all(&hops).await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
