//! WebSocket upgrade, transport adapters, heartbeat and connection slots.

pub mod heartbeat;
pub mod slots;
pub mod transport;
pub mod upgrade;
