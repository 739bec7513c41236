//! Per-role permission cache.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use common::RoleId;
use store::Permission;

/// The permissions granted to one role, indexed both ways a check may ask.
#[derive(Debug, Default, Clone)]
pub struct RoleGrants {
    names: HashSet<String>,
    pairs: HashSet<(String, String)>,
}

impl RoleGrants {
    pub fn from_permissions(permissions: impl IntoIterator<Item = Permission>) -> Self {
        let mut grants = RoleGrants::default();
        for permission in permissions {
            grants
                .pairs
                .insert((permission.resource, permission.action));
            grants.names.insert(permission.name);
        }
        grants
    }

    /// Returns true if a permission named `{resource}.{action}`, or one whose
    /// resource and action pair matches, is granted.
    pub fn allows(&self, resource: &str, action: &str) -> bool {
        self.names.contains(&format!("{resource}.{action}"))
            || self
                .pairs
                .contains(&(resource.to_string(), action.to_string()))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

type Snapshot = Arc<HashMap<RoleId, Arc<RoleGrants>>>;

/// Copy-on-write cache of [`RoleGrants`] keyed by role.
///
/// Writers are serialized and build the next map outside the snapshot lock,
/// which they take only to swap the pointer. Readers clone the current
/// pointer, so at most they wait for that swap.
///
/// Every invalidation bumps a generation counter. A loader reads
/// [`generation`](Self::generation) before going to the store and caches
/// through [`insert_if_current`](Self::insert_if_current), so grants loaded
/// before an invalidation are never cached after it.
#[derive(Debug, Default)]
pub struct PermissionCache {
    snapshot: RwLock<Snapshot>,
    writer: Mutex<()>,
    generation: AtomicU64,
}

impl PermissionCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn current(&self) -> Snapshot {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Builds the next snapshot from the current one and swaps it in. The
    /// caller must hold `writer`.
    fn replace(&self, update: impl FnOnce(&mut HashMap<RoleId, Arc<RoleGrants>>)) {
        let mut next = HashMap::clone(&self.current());
        update(&mut next);
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(next);
    }

    fn lock_writer(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, role_id: RoleId) -> Option<Arc<RoleGrants>> {
        self.current().get(&role_id).cloned()
    }

    /// Current invalidation generation.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn insert(&self, role_id: RoleId, grants: RoleGrants) -> Arc<RoleGrants> {
        let _writer = self.lock_writer();
        let grants = Arc::new(grants);
        let cached = grants.clone();
        self.replace(move |map| {
            map.insert(role_id, cached);
        });
        grants
    }

    /// Caches `grants` only if no invalidation happened since `seen` was
    /// read. The grants are returned either way.
    pub fn insert_if_current(
        &self,
        role_id: RoleId,
        grants: RoleGrants,
        seen: u64,
    ) -> Arc<RoleGrants> {
        let _writer = self.lock_writer();
        let grants = Arc::new(grants);
        if self.generation() != seen {
            tracing::debug!(%role_id, "permissions changed while loading, not cached");
            return grants;
        }
        let cached = grants.clone();
        self.replace(move |map| {
            map.insert(role_id, cached);
        });
        grants
    }

    /// Drops the cached grants of one role. Call after its permissions change.
    pub fn invalidate_role(&self, role_id: RoleId) {
        let _writer = self.lock_writer();
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.replace(|map| {
            map.remove(&role_id);
        });
    }

    /// Drops every cached role.
    pub fn invalidate_all(&self) {
        let _writer = self.lock_writer();
        self.generation.fetch_add(1, Ordering::AcqRel);
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = Arc::default();
    }

    pub fn len(&self) -> usize {
        self.current().len()
    }

    pub fn is_empty(&self) -> bool {
        self.current().is_empty()
    }
}
