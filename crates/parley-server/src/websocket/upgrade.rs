//! `GET /signal/{group_code}?user=<uuid>`: admission and upgrade.
//!
//! A request is refused before the handshake when `user` is not a UUID
//! (400), when the identifier is already in the group and duplicates are
//! rejected (409), or when no connection slot is free (503). Otherwise the
//! socket is upgraded and handed to a [`ConnectionLifecycle`] tracked by the
//! server; the slot is held until that lifecycle has torn down.

use std::sync::Arc;

use axum::Json;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use parley_core::{ClientId, ConnectionLifecycle, DuplicatePolicy, GroupCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use super::slots::Slot;
use super::{heartbeat, transport};
use crate::metrics::HTTP_UPGRADES_REJECTED_TOTAL;
use crate::server::AppState;

/// Query string of the signal endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct SignalQuery {
    /// Client identifier; must parse as a UUID.
    #[serde(default)]
    pub user: String,
}

/// Why an upgrade was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refusal {
    /// `user` is missing or not a UUID.
    InvalidUser,
    /// Identifier already connected and duplicates are rejected.
    Duplicate,
    /// `max_connections` reached.
    AtCapacity,
    /// Server is shutting down.
    ShuttingDown,
}

impl Refusal {
    fn as_str(self) -> &'static str {
        match self {
            Self::InvalidUser => "invalid_user",
            Self::Duplicate => "duplicate",
            Self::AtCapacity => "at_capacity",
            Self::ShuttingDown => "shutting_down",
        }
    }
}

impl IntoResponse for Refusal {
    fn into_response(self) -> Response {
        ::metrics::counter!(HTTP_UPGRADES_REJECTED_TOTAL, "reason" => self.as_str()).increment(1);
        let (status, msg) = match self {
            Self::InvalidUser => (StatusCode::BAD_REQUEST, "Not a valid UUID"),
            Self::Duplicate => (StatusCode::CONFLICT, "Client already connected"),
            Self::AtCapacity => (StatusCode::SERVICE_UNAVAILABLE, "Too many connections"),
            Self::ShuttingDown => (StatusCode::SERVICE_UNAVAILABLE, "Server shutting down"),
        };
        (status, Json(json!({ "msg": msg }))).into_response()
    }
}

/// Decide whether `user` may join `group`, reserving a connection slot.
pub fn admit(
    state: &AppState,
    group: &GroupCode,
    user: &str,
) -> Result<(ClientId, Slot), Refusal> {
    if Uuid::parse_str(user).is_err() {
        return Err(Refusal::InvalidUser);
    }
    if state.shutdown.is_shutting_down() {
        return Err(Refusal::ShuttingDown);
    }
    let client = ClientId::from(user);
    if state.config.duplicate_policy == DuplicatePolicy::Reject
        && state.directory.contains(group, &client)
    {
        return Err(Refusal::Duplicate);
    }
    let slot = state.slots.try_reserve().ok_or(Refusal::AtCapacity)?;
    Ok((client, slot))
}

/// GET /signal/{group_code}
pub async fn signal_handler(
    Path(group_code): Path<String>,
    Query(query): Query<SignalQuery>,
    State(state): State<AppState>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let group = GroupCode::from(group_code);
    let (client, slot) = match admit(&state, &group, &query.user) {
        Ok(admitted) => admitted,
        Err(refusal) => {
            debug!(group = %group, user = %query.user, reason = refusal.as_str(), "upgrade refused");
            return refusal.into_response();
        }
    };
    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    let limit = state.config.max_message_size;
    let tracker = state.shutdown.tracker().clone();
    ws.max_message_size(limit)
        .max_frame_size(limit)
        .on_upgrade(move |socket| tracker.track_future(serve(socket, state, group, client, slot)))
}

/// Drive one upgraded connection to completion. `slot` is released on return.
async fn serve(
    socket: WebSocket,
    state: AppState,
    group: GroupCode,
    client: ClientId,
    slot: Slot,
) {
    let (sink, source) = transport::split(socket);
    let lifecycle = ConnectionLifecycle::new(
        Arc::clone(&state.directory),
        group.clone(),
        client.clone(),
        state.config.lifecycle(),
        &state.shutdown.token(),
    );

    let active = match lifecycle.attach(sink).await {
        Ok(active) => active,
        Err(e) => {
            info!(group = %group, client = %client, error = %e, "join refused after upgrade");
            return;
        }
    };

    let heartbeat = tokio::spawn(heartbeat::run_heartbeat(
        Arc::clone(active.handle()),
        state.config.heartbeat_interval(),
        state.config.heartbeat_timeout(),
    ));

    let reason = active.run(source).await;
    state.slots.record_close(&reason);
    debug!(group = %group, client = %client, reason = reason.as_str(), "connection finished");

    // Teardown requested close on the handle, which ends the heartbeat.
    let _ = heartbeat.await;
    drop(slot);
}
