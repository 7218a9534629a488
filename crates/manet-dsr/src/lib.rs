//! # MANET DSR
//!
//! Dynamic Source Routing for mobile ad-hoc networks.
//!
//! Every packet carries the complete hop list it travels, so intermediate
//! nodes need no routing table. Routes are discovered on demand by flooding
//! route requests and are cached at every node that sees them.
//!
//! ## Core Components
//!
//! - [`Dsr`]: Per-node protocol engine, driven by the node's network layer
//! - [`RouteCache`]: Cached routes, looked up shortest first and aged out
//! - [`RequestTable`]: Requests seen from others and discoveries in progress
//! - [`SendBuffer`]: Packets waiting for a route
//! - [`RexmtBuffer`]: Transmissions waiting for link-layer confirmation
//! - [`codec`]: The DSR header and its options on the wire
//!
//! ## Route Discovery
//!
//! A node without a route buffers the packet and broadcasts a route request,
//! first to its neighbors only, then network-wide with exponential backoff.
//! The target, or any node with a cached route to it, answers with a route
//! reply carrying the full path.
//!
//! ## Route Maintenance
//!
//! Every unicast hop is confirmed by the link layer. After repeated
//! failures the link is declared broken, routes over it are purged, the
//! source is told with a route error, and the packet is salvaged over an
//! alternate cached route when one exists.
//!
//! ## Example
//!
//! ```rust,ignore
//! use manet_dsr::{Dsr, DsrConfig, RouteDecision};
//!
//! let mut dsr = Dsr::new(local_address, DsrConfig::default())?;
//!
//! match dsr.route_packet(&mut ctx, datagram, None) {
//!     RouteDecision::NotRouted(datagram) => { /* deliver locally */ }
//!     RouteDecision::Buffered => { /* discovery in progress */ }
//!     _ => {}
//! }
//! ```

pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod list;
pub mod pool;
pub mod request_table;
pub mod rexmt_buffer;
pub mod route_cache;
pub mod send_buffer;
pub mod stats;
pub mod timers;

// Re-export main types
pub use codec::{DsrOption, DsrPacket, RouteError, RouteReply, RouteRequest, SourceRoute};
pub use config::{
    DiscoveryConfig, DsrConfig, MaintenanceConfig, RequestTableConfig, RouteCacheConfig,
    SendBufferConfig,
};
pub use engine::{Dsr, RouteDecision};
pub use error::{ConfigError, DsrError, DsrResult, ParseError, SendBufferError};
pub use pool::{EntryPool, Handle};
pub use request_table::{RequestTable, SeenEntry, SentEntry};
pub use rexmt_buffer::{RexmtBuffer, RexmtEntry};
pub use route_cache::{InsertOutcome, RouteCache, RouteEntry, SweepOutcome};
pub use send_buffer::{BufferedPacket, SendBuffer};
pub use stats::DsrStats;
pub use timers::{DsrTimer, TimerRegistry};

// Re-export core types for convenience
pub use manet_core::{Datagram, DropReason, LinkStatus, NodeAddress, NodeContext, TimerToken};
