use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use super::domain::{ManagerId, PropertyId};
use super::repository::{retry_read, SessionRepository, StorageError};

struct CacheEntry {
    properties: HashSet<PropertyId>,
    loaded_at: Instant,
}

/// Short-TTL, read-through cache of `manager -> owned property ids`.
///
/// Staleness is bounded by the TTL; entries are dropped immediately when an
/// assignment mutation calls [`invalidate`](Self::invalidate). The cache is
/// never written through.
pub struct PropertyAccessCache<R> {
    repository: Arc<R>,
    ttl: Duration,
    entries: RwLock<HashMap<ManagerId, CacheEntry>>,
}

impl<R: SessionRepository> PropertyAccessCache<R> {
    pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

    pub fn new(repository: Arc<R>) -> Self {
        Self::with_ttl(repository, Self::DEFAULT_TTL)
    }

    pub fn with_ttl(repository: Arc<R>, ttl: Duration) -> Self {
        Self {
            repository,
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Cached set if present and unexpired, otherwise a repository load
    /// stored with a fresh TTL.
    pub fn owned_properties(
        &self,
        manager_id: &ManagerId,
    ) -> Result<HashSet<PropertyId>, StorageError> {
        {
            let entries = self.entries.read().expect("property cache lock poisoned");
            if let Some(entry) = entries.get(manager_id) {
                if entry.loaded_at.elapsed() < self.ttl {
                    return Ok(entry.properties.clone());
                }
            }
        }

        let assignments = retry_read(|| self.repository.load_property_assignments(manager_id))?;
        let properties: HashSet<PropertyId> = assignments
            .into_iter()
            .map(|assignment| assignment.property_id)
            .collect();

        let mut entries = self.entries.write().expect("property cache lock poisoned");
        entries.insert(
            manager_id.clone(),
            CacheEntry {
                properties: properties.clone(),
                loaded_at: Instant::now(),
            },
        );

        Ok(properties)
    }

    /// Drop the cached entry; called by any mutation to that manager's
    /// property assignments.
    pub fn invalidate(&self, manager_id: &ManagerId) {
        let mut entries = self.entries.write().expect("property cache lock poisoned");
        entries.remove(manager_id);
    }
}
