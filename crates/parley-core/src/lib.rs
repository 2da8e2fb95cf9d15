//! # parley-core
//!
//! Connection registry and message routing for the Parley signaling relay.
//!
//! - [`directory::RegistryDirectory`]: group code → [`group::GroupRegistry`]
//! - [`group::GroupRegistry`]: client identifier → [`connection::PeerHandle`]
//! - [`router`]: broadcast / unicast / ignore decision for one inbound message
//! - [`lifecycle`]: per-connection receive loop and teardown
//!
//! The transport is reached only through [`transport::FrameSource`] and
//! [`transport::FrameSink`], so everything here runs against in-memory
//! transports in tests.
//!
//! ## Locking
//!
//! Two lock levels: the directory lock (group existence) and one lock per
//! group (membership and fan-out). The order is always directory → group.

#![deny(unsafe_code)]

pub mod connection;
pub mod directory;
pub mod errors;
pub mod frame;
pub mod group;
pub mod ids;
pub mod lifecycle;
pub mod message;
pub mod metrics;
pub mod router;
pub mod transport;

pub use connection::PeerHandle;
pub use directory::{Joined, RegistryDirectory};
pub use errors::{RelayError, TransportError};
pub use frame::{CloseFrame, Frame, FrameKind};
pub use group::{DuplicatePolicy, GroupRegistry};
pub use ids::{ClientId, ConnectionId, GroupCode};
pub use lifecycle::{ActiveConnection, CloseReason, ConnectionLifecycle, ConnectionState, LifecycleConfig};
pub use message::{BROADCAST_TARGET, Envelope, Message, Target};
pub use router::{DeliveryReport, RouteKind};
pub use transport::{FrameSink, FrameSource};
