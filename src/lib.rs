//! ## Example
//! Following example traces the route to a destination, printing hops as they are discovered
//! and then their hostnames once reverse lookups are done.
//! Probing opens a raw ICMP socket, so it must run with `CAP_NET_RAW` or as root.
//! ```rust,no_run
#![doc = include_str!("../demos/trace.rs")]
//! ```
//! A custom [`probe::ProbePort`] or [`resolver::NameLookup`] can be plugged in through [`tracer::Tracer::new`].

pub mod error;
pub mod hop;
pub mod notification;
pub mod options;
pub mod probe;
pub mod resolver;
pub mod tracer;

pub(crate) mod binding;
pub(crate) mod constants;
pub(crate) mod session;

pub use error::{Error, ProbeStage, Result};
pub use hop::Hop;
pub use notification::HopStream;
pub use options::TraceOptions;
pub use probe::{ProbePort, ProbeReply, ProbeRequest, SocketProbe};
pub use resolver::{wait_all, HostResolver, NameLookup};
pub use tracer::{traceroute, TraceOutcome, Tracer};
