//! Metric names, defined once so recording and scraping sides agree.

/// Connections registered (counter).
pub const RELAY_CONNECTIONS_TOTAL: &str = "relay_connections_total";
/// Connections torn down (counter, labels: reason).
pub const RELAY_DISCONNECTIONS_TOTAL: &str = "relay_disconnections_total";
/// Live connections (gauge).
pub const RELAY_CONNECTIONS_ACTIVE: &str = "relay_connections_active";
/// Live groups (gauge).
pub const RELAY_GROUPS_ACTIVE: &str = "relay_groups_active";
/// Frames read from clients (counter, labels: kind).
pub const RELAY_FRAMES_RECEIVED_TOTAL: &str = "relay_frames_received_total";
/// Frames handed to a recipient's send queue (counter).
pub const RELAY_FRAMES_DELIVERED_TOTAL: &str = "relay_frames_delivered_total";
/// Frames a recipient could not accept (counter).
pub const RELAY_DELIVERY_DROPS_TOTAL: &str = "relay_delivery_drops_total";
/// Unicast messages whose target is not in the group (counter).
pub const RELAY_UNROUTABLE_TOTAL: &str = "relay_unroutable_total";
/// Joins refused because the identifier was taken (counter).
pub const RELAY_DUPLICATE_JOINS_TOTAL: &str = "relay_duplicate_joins_total";
