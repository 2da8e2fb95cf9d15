//! Fan-out / unicast routing within one group.
//!
//! Routing is content-blind: recipients get the frame exactly as it was
//! received. The caller must hold the group lock for the whole call so the
//! member map cannot change mid-iteration.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::connection::PeerHandle;
use crate::frame::FrameKind;
use crate::ids::ClientId;
use crate::message::{Message, Target};
use crate::metrics::{
    RELAY_DELIVERY_DROPS_TOTAL, RELAY_FRAMES_DELIVERED_TOTAL, RELAY_UNROUTABLE_TOTAL,
};

/// What the router decided to do with a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteKind {
    /// Control frame; consumed by the transport, never forwarded.
    Ignored,
    /// Sent to every member except the sender.
    Broadcast,
    /// Sent to one member.
    Unicast,
    /// Unicast target not in the group; silently dropped.
    Unroutable,
}

/// Outcome of one delivery.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Routing decision.
    pub route: RouteKind,
    /// Recipients a send was attempted on.
    pub attempted: usize,
    /// Recipients whose queue accepted the frame.
    pub delivered: usize,
}

impl DeliveryReport {
    fn new(route: RouteKind) -> Self {
        Self {
            route,
            attempted: 0,
            delivered: 0,
        }
    }

    /// Recipients that could not take the frame.
    pub fn dropped(&self) -> usize {
        self.attempted - self.delivered
    }
}

/// Decide the route without touching any connection.
pub fn resolve(message: &Message) -> RouteKind {
    if message.kind() == FrameKind::Control {
        return RouteKind::Ignored;
    }
    match message.target {
        Target::Broadcast => RouteKind::Broadcast,
        Target::Peer(_) => RouteKind::Unicast,
    }
}

/// Deliver `message` to the members it targets.
///
/// Best-effort: a failed send to one recipient is counted and skipped, and
/// nothing is reported back to the sender.
pub(crate) fn dispatch(
    members: &HashMap<ClientId, Arc<PeerHandle>>,
    message: &Message,
) -> DeliveryReport {
    let route = resolve(message);
    let mut report = DeliveryReport::new(route);
    match (route, &message.target) {
        (RouteKind::Broadcast, _) => {
            for (id, peer) in members {
                if *id == message.sender {
                    continue;
                }
                report.attempted += 1;
                if peer.send(message.frame.clone()) {
                    report.delivered += 1;
                } else {
                    trace!(recipient = %id, "broadcast recipient queue unavailable");
                }
            }
        }
        (RouteKind::Unicast, Target::Peer(to)) => match members.get(to) {
            Some(peer) => {
                report.attempted = 1;
                if peer.send(message.frame.clone()) {
                    report.delivered = 1;
                } else {
                    trace!(recipient = %to, "unicast recipient queue unavailable");
                }
            }
            None => {
                debug!(sender = %message.sender, target = %to, "unknown target, dropping");
                report.route = RouteKind::Unroutable;
                ::metrics::counter!(RELAY_UNROUTABLE_TOTAL).increment(1);
            }
        },
        _ => {}
    }

    if report.delivered > 0 {
        ::metrics::counter!(RELAY_FRAMES_DELIVERED_TOTAL).increment(report.delivered as u64);
    }
    if report.dropped() > 0 {
        ::metrics::counter!(RELAY_DELIVERY_DROPS_TOTAL).increment(report.dropped() as u64);
    }
    report
}
