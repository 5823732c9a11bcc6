use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::RegistryError;
use crate::identity::models::{normalize_id, ExternalAccountId, IdentityRecord};
use crate::identity::store::{IdentityMap, RegistryStore};

/// Owner of the local user id -> external account id mapping.
///
/// Every mutation is applied to a copy, persisted, then committed while
/// holding the lock, so concurrent commands cannot lose each other's
/// writes and a failed save leaves the registry untouched.
pub struct IdentityRegistry {
    store: Arc<dyn RegistryStore>,
    entries: Mutex<IdentityMap>,
}

impl IdentityRegistry {
    pub fn load(store: Arc<dyn RegistryStore>) -> Result<Self, RegistryError> {
        let entries = store.load()?;
        Ok(Self {
            store,
            entries: Mutex::new(entries),
        })
    }

    pub async fn get(&self, local_user_id: &str) -> Option<String> {
        self.entries.lock().await.get(local_user_id).cloned()
    }

    /// Assign `external_account_id` to `local_user_id`.
    ///
    /// Fails with `DuplicateIdentity` when another user already holds the
    /// id (compared case-insensitively). Re-submitting for the same user
    /// overwrites.
    pub async fn set(
        &self,
        local_user_id: &str,
        external_account_id: &ExternalAccountId,
    ) -> Result<(), RegistryError> {
        let mut entries = self.entries.lock().await;
        self.assign(&mut entries, local_user_id, external_account_id)?;

        info!("Identity set for user {}", local_user_id);
        Ok(())
    }

    /// First-time submission: the user must not have an id yet
    pub async fn register(
        &self,
        local_user_id: &str,
        external_account_id: &ExternalAccountId,
    ) -> Result<(), RegistryError> {
        let mut entries = self.entries.lock().await;
        if entries.contains_key(local_user_id) {
            return Err(RegistryError::AlreadyRegistered(local_user_id.to_string()));
        }
        self.assign(&mut entries, local_user_id, external_account_id)?;

        info!("Identity registered for user {}", local_user_id);
        Ok(())
    }

    /// Edit flow: the user must already have an id
    pub async fn update(
        &self,
        local_user_id: &str,
        external_account_id: &ExternalAccountId,
    ) -> Result<(), RegistryError> {
        let mut entries = self.entries.lock().await;
        if !entries.contains_key(local_user_id) {
            return Err(RegistryError::NotFound(local_user_id.to_string()));
        }
        self.assign(&mut entries, local_user_id, external_account_id)?;

        info!("Identity updated for user {}", local_user_id);
        Ok(())
    }

    /// Remove a user's id, returning it
    pub async fn remove(&self, local_user_id: &str) -> Result<String, RegistryError> {
        let mut entries = self.entries.lock().await;
        if !entries.contains_key(local_user_id) {
            return Err(RegistryError::NotFound(local_user_id.to_string()));
        }

        let mut next = entries.clone();
        let removed = next.remove(local_user_id).unwrap_or_default();
        self.persist(&mut entries, next)?;

        info!("Identity removed for user {}", local_user_id);
        Ok(removed)
    }

    pub async fn list(&self) -> Vec<IdentityRecord> {
        self.entries
            .lock()
            .await
            .iter()
            .map(|(local_user_id, external_account_id)| IdentityRecord {
                local_user_id: local_user_id.clone(),
                external_account_id: external_account_id.clone(),
            })
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_registered(&self, local_user_id: &str) -> bool {
        self.entries.lock().await.contains_key(local_user_id)
    }

    /// Point-in-time copy for a distribution run
    pub async fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot::new(self.entries.lock().await.clone())
    }

    fn assign(
        &self,
        entries: &mut IdentityMap,
        local_user_id: &str,
        external_account_id: &ExternalAccountId,
    ) -> Result<(), RegistryError> {
        Self::ensure_unclaimed(entries, local_user_id, external_account_id)?;

        let mut next = entries.clone();
        next.insert(local_user_id.to_string(), external_account_id.as_str().to_string());
        self.persist(entries, next)
    }

    fn persist(&self, entries: &mut IdentityMap, next: IdentityMap) -> Result<(), RegistryError> {
        self.store.save(&next)?;
        *entries = next;
        Ok(())
    }

    fn ensure_unclaimed(
        entries: &IdentityMap,
        local_user_id: &str,
        external_account_id: &ExternalAccountId,
    ) -> Result<(), RegistryError> {
        let wanted = external_account_id.normalized();
        let claimed = entries
            .iter()
            .any(|(owner, id)| owner != local_user_id && normalize_id(id) == wanted);

        if claimed {
            return Err(RegistryError::DuplicateIdentity(
                external_account_id.as_str().to_string(),
            ));
        }
        Ok(())
    }
}

/// Registered user for a normalized external id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredUser {
    pub local_user_id: String,
    /// Id exactly as the user submitted it
    pub external_account_id: String,
}

/// Immutable registry copy used while distributing
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    entries: IdentityMap,
}

impl RegistrySnapshot {
    pub fn new(entries: IdentityMap) -> Self {
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// normalized external id -> registered user.
    /// On a collision the first entry (by user id) wins.
    pub fn reverse_index(&self) -> HashMap<String, RegisteredUser> {
        let mut index: HashMap<String, RegisteredUser> = HashMap::with_capacity(self.entries.len());
        for (local_user_id, external_account_id) in &self.entries {
            let key = normalize_id(external_account_id);
            if let Some(existing) = index.get(&key) {
                warn!(
                    "External id {} claimed by both {} and {}, keeping {}",
                    external_account_id,
                    existing.local_user_id,
                    local_user_id,
                    existing.local_user_id
                );
                continue;
            }
            index.insert(
                key,
                RegisteredUser {
                    local_user_id: local_user_id.clone(),
                    external_account_id: external_account_id.clone(),
                },
            );
        }
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::store::MemoryStore;

    fn id(seed: char) -> ExternalAccountId {
        ExternalAccountId::parse(&seed.to_string().repeat(32)).unwrap()
    }

    fn registry() -> (IdentityRegistry, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let registry = IdentityRegistry::load(store.clone()).unwrap();
        (registry, store)
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let (registry, store) = registry();
        registry.set("u1", &id('a')).await.unwrap();

        assert_eq!(registry.get("u1").await, Some("a".repeat(32)));
        assert_eq!(registry.get("u2").await, None);
        assert_eq!(store.stored().get("u1"), Some(&"a".repeat(32)));
    }

    #[tokio::test]
    async fn test_duplicate_rejected_for_other_user() {
        let (registry, _) = registry();
        registry.set("u1", &id('a')).await.unwrap();

        let err = registry.set("u2", &id('a')).await.unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateIdentity(_)));

        // differing only in case is still the same account
        let upper = ExternalAccountId::parse(&"A".repeat(32)).unwrap();
        assert!(registry.set("u2", &upper).await.is_err());
        assert_eq!(registry.get("u2").await, None);
    }

    #[tokio::test]
    async fn test_same_user_overwrites() {
        let (registry, _) = registry();
        registry.set("u1", &id('a')).await.unwrap();
        registry.set("u1", &id('a')).await.unwrap();
        registry.set("u1", &id('b')).await.unwrap();

        assert_eq!(registry.get("u1").await, Some("b".repeat(32)));
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_list_counts_distinct_sets() {
        let (registry, _) = registry();
        for (n, seed) in ['a', 'b', 'c', 'd', 'e'].iter().enumerate() {
            registry.set(&format!("u{}", n), &id(*seed)).await.unwrap();
        }
        assert_eq!(registry.list().await.len(), 5);
    }

    #[tokio::test]
    async fn test_remove() {
        let (registry, store) = registry();
        registry.set("u1", &id('a')).await.unwrap();

        assert_eq!(registry.remove("u1").await.unwrap(), "a".repeat(32));
        assert!(store.stored().is_empty());
        assert!(matches!(
            registry.remove("u1").await,
            Err(RegistryError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_register_and_update_preconditions() {
        let (registry, _) = registry();

        assert!(matches!(
            registry.update("u1", &id('a')).await,
            Err(RegistryError::NotFound(_))
        ));
        registry.register("u1", &id('a')).await.unwrap();
        assert!(matches!(
            registry.register("u1", &id('b')).await,
            Err(RegistryError::AlreadyRegistered(_))
        ));
        registry.update("u1", &id('b')).await.unwrap();
        assert_eq!(registry.get("u1").await, Some("b".repeat(32)));
    }

    #[tokio::test]
    async fn test_failed_save_leaves_registry_unchanged() {
        let (registry, store) = registry();
        registry.set("u1", &id('a')).await.unwrap();

        store.fail_writes(true);
        assert!(registry.set("u2", &id('b')).await.is_err());
        assert!(registry.remove("u1").await.is_err());

        assert_eq!(registry.get("u2").await, None);
        assert_eq!(registry.get("u1").await, Some("a".repeat(32)));
    }

    #[tokio::test]
    async fn test_concurrent_sets_are_all_kept() {
        let (registry, store) = registry();
        let registry = Arc::new(registry);
        let seeds: Vec<char> = ('a'..='p').collect();

        let mut handles = Vec::new();
        for (n, seed) in seeds.iter().copied().enumerate() {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                registry.set(&format!("u{}", n), &id(seed)).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(store.stored().len(), seeds.len());
    }

    #[tokio::test]
    async fn test_reverse_index_normalizes() {
        let mut map = IdentityMap::new();
        map.insert("u1".to_string(), "AbCd".repeat(8));
        let snapshot = RegistrySnapshot::new(map);

        let index = snapshot.reverse_index();
        let user = index.get(&"abcd".repeat(8)).unwrap();
        assert_eq!(user.local_user_id, "u1");
        assert_eq!(user.external_account_id, "AbCd".repeat(8));
    }

    #[tokio::test]
    async fn test_reverse_index_collision_keeps_first() {
        let mut map = IdentityMap::new();
        map.insert("u1".to_string(), "a".repeat(32));
        map.insert("u2".to_string(), "A".repeat(32));

        let index = RegistrySnapshot::new(map).reverse_index();
        assert_eq!(index.len(), 1);
        assert_eq!(index[&"a".repeat(32)].local_user_id, "u1");
    }
}
