//! Registry directory: group code → group registry.
//!
//! One instance lives for the whole process and is passed explicitly to the
//! HTTP boundary and to every connection lifecycle.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::connection::PeerHandle;
use crate::errors::RelayError;
use crate::group::{DuplicatePolicy, GroupRegistry};
use crate::ids::{ClientId, GroupCode};
use crate::metrics::RELAY_GROUPS_ACTIVE;

/// Result of a successful join.
#[derive(Debug)]
pub struct Joined {
    /// Group the handle now belongs to.
    pub group: Arc<GroupRegistry>,
    /// Handle previously registered under the same identifier.
    pub displaced: Option<Arc<PeerHandle>>,
}

/// Live groups by code.
///
/// Lock order is directory → group. Nothing takes the directory lock while
/// holding a group lock.
#[derive(Default)]
pub struct RegistryDirectory {
    groups: Mutex<HashMap<GroupCode, Arc<GroupRegistry>>>,
}

impl RegistryDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Existing group for `code`, or a new empty one inserted atomically.
    pub fn get_or_create(&self, code: &GroupCode) -> Arc<GroupRegistry> {
        let mut groups = self.groups.lock();
        Self::entry(&mut groups, code)
    }

    /// Register `handle` into `code`'s group, creating the group if needed.
    ///
    /// Creation and registration happen under the directory lock, so the
    /// handle can never land in a group that a concurrent
    /// [`remove_if_empty`](Self::remove_if_empty) has just retired.
    pub fn join(
        &self,
        code: &GroupCode,
        handle: Arc<PeerHandle>,
        policy: DuplicatePolicy,
    ) -> Result<Joined, RelayError> {
        let mut groups = self.groups.lock();
        let created = !groups.contains_key(code);
        let group = Self::entry(&mut groups, code);
        match group.try_register(handle, policy) {
            Ok(displaced) => Ok(Joined { group, displaced }),
            Err(e) => {
                if created {
                    let _ = groups.remove(code);
                    ::metrics::gauge!(RELAY_GROUPS_ACTIVE).decrement(1.0);
                }
                Err(e)
            }
        }
    }

    /// Drop `code` from the directory if its group has no members.
    ///
    /// Call after the removal that emptied the group has released the group
    /// lock. Emptiness is re-checked here because another connection may
    /// have joined in between. Returns whether the entry was removed.
    pub fn remove_if_empty(&self, code: &GroupCode) -> bool {
        let mut groups = self.groups.lock();
        let empty = groups.get(code).is_some_and(|g| g.is_empty());
        if empty {
            let _ = groups.remove(code);
            ::metrics::gauge!(RELAY_GROUPS_ACTIVE).decrement(1.0);
            debug!(group = %code, "group removed");
        }
        empty
    }

    /// Group for `code`, if it exists.
    pub fn get(&self, code: &GroupCode) -> Option<Arc<GroupRegistry>> {
        self.groups.lock().get(code).cloned()
    }

    /// Whether `client` is currently registered in `code`.
    pub fn contains(&self, code: &GroupCode, client: &ClientId) -> bool {
        self.groups
            .lock()
            .get(code)
            .is_some_and(|g| g.contains(client))
    }

    /// Number of live groups.
    pub fn group_count(&self) -> usize {
        self.groups.lock().len()
    }

    /// Number of registered connections across all groups.
    pub fn connection_count(&self) -> usize {
        self.groups.lock().values().map(|g| g.len()).sum()
    }

    fn entry(
        groups: &mut HashMap<GroupCode, Arc<GroupRegistry>>,
        code: &GroupCode,
    ) -> Arc<GroupRegistry> {
        groups
            .entry(code.clone())
            .or_insert_with(|| {
                debug!(group = %code, "group created");
                ::metrics::gauge!(RELAY_GROUPS_ACTIVE).increment(1.0);
                Arc::new(GroupRegistry::new(code.clone()))
            })
            .clone()
    }
}

impl std::fmt::Debug for RegistryDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryDirectory")
            .field("groups", &self.group_count())
            .finish()
    }
}
