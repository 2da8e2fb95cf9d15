//! Group registry: the live members of one group.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::connection::PeerHandle;
use crate::errors::RelayError;
use crate::ids::{ClientId, GroupCode};
use crate::message::Message;
use crate::router::{self, DeliveryReport};

/// What to do when an identifier joins a group it is already in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Last join wins; the displaced connection is asked to close.
    #[default]
    Replace,
    /// Refuse the new join.
    Reject,
}

/// Members of one group, keyed by client identifier.
///
/// Every mutation and every fan-out happens under `members`' lock.
pub struct GroupRegistry {
    code: GroupCode,
    members: Mutex<HashMap<ClientId, Arc<PeerHandle>>>,
}

impl GroupRegistry {
    /// Create an empty group.
    pub fn new(code: GroupCode) -> Self {
        Self {
            code,
            members: Mutex::new(HashMap::new()),
        }
    }

    /// Group code.
    pub fn code(&self) -> &GroupCode {
        &self.code
    }

    /// Insert a handle. Last registration wins; the displaced handle, if
    /// any, is returned untouched.
    pub fn register(&self, handle: Arc<PeerHandle>) -> Option<Arc<PeerHandle>> {
        let mut members = self.members.lock();
        members.insert(handle.client_id().clone(), handle)
    }

    /// Insert a handle according to `policy`.
    ///
    /// With [`DuplicatePolicy::Replace`] the displaced handle is asked to
    /// close and returned.
    pub fn try_register(
        &self,
        handle: Arc<PeerHandle>,
        policy: DuplicatePolicy,
    ) -> Result<Option<Arc<PeerHandle>>, RelayError> {
        let mut members = self.members.lock();
        let client = handle.client_id().clone();
        if policy == DuplicatePolicy::Reject && members.contains_key(&client) {
            return Err(RelayError::DuplicateClient {
                group: self.code.clone(),
                client,
            });
        }
        let displaced = members.insert(client, handle);
        drop(members);

        if let Some(old) = &displaced {
            warn!(
                group = %self.code,
                client = %old.client_id(),
                connection = %old.connection_id(),
                "identifier re-registered, closing previous connection"
            );
            old.request_close();
        }
        Ok(displaced)
    }

    /// Remove `client`. Returns `true` only if an entry was removed and the
    /// group is now empty.
    pub fn unregister(&self, client: &ClientId) -> bool {
        let mut members = self.members.lock();
        members.remove(client).is_some() && members.is_empty()
    }

    /// Remove `handle`'s entry if it still belongs to that connection.
    ///
    /// A connection displaced by a later join with the same identifier finds
    /// the replacement in its slot and leaves it alone. Returns `true` only
    /// if an entry was removed and the group is now empty.
    pub fn unregister_connection(&self, handle: &PeerHandle) -> bool {
        let mut members = self.members.lock();
        let owned = members
            .get(handle.client_id())
            .is_some_and(|current| current.connection_id() == handle.connection_id());
        if !owned {
            debug!(
                group = %self.code,
                client = %handle.client_id(),
                "slot no longer held by this connection"
            );
            return false;
        }
        let _ = members.remove(handle.client_id());
        members.is_empty()
    }

    /// Route `message` to its recipients while holding the lock.
    pub fn deliver(&self, message: &Message) -> DeliveryReport {
        let members = self.members.lock();
        router::dispatch(&members, message)
    }

    /// Whether `client` is a member.
    pub fn contains(&self, client: &ClientId) -> bool {
        self.members.lock().contains_key(client)
    }

    /// Handle registered for `client`.
    pub fn get(&self, client: &ClientId) -> Option<Arc<PeerHandle>> {
        self.members.lock().get(client).cloned()
    }

    /// Member count.
    pub fn len(&self) -> usize {
        self.members.lock().len()
    }

    /// Whether the group has no members.
    pub fn is_empty(&self) -> bool {
        self.members.lock().is_empty()
    }

    /// Member identifiers, in no particular order.
    pub fn members(&self) -> Vec<ClientId> {
        self.members.lock().keys().cloned().collect()
    }
}

impl std::fmt::Debug for GroupRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupRegistry")
            .field("code", &self.code)
            .field("members", &self.len())
            .finish()
    }
}
