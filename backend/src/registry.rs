use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::models::{EntityKind, EntityRef, Id, UserId};
use crate::store::{AdSearchStore, AdStore, StoreError, Stores};

/// Resolves the owner of an entity of one kind.
#[async_trait]
pub trait EntityLookup: Send + Sync {
    async fn owner_of(&self, id: Id) -> Result<Option<UserId>, StoreError>;
}

struct AdLookup(Arc<dyn AdStore>);

#[async_trait]
impl EntityLookup for AdLookup {
    async fn owner_of(&self, id: Id) -> Result<Option<UserId>, StoreError> {
        Ok(self
            .0
            .get(id)
            .await?
            .filter(|ad| !ad.is_deleted())
            .map(|ad| ad.user))
    }
}

struct AdSearchLookup(Arc<dyn AdSearchStore>);

#[async_trait]
impl EntityLookup for AdSearchLookup {
    async fn owner_of(&self, id: Id) -> Result<Option<UserId>, StoreError> {
        Ok(self.0.get(id).await?.map(|search| search.user))
    }
}

/// Dispatch table from [`EntityKind`] to its lookup.
pub struct EntityRegistry {
    lookups: HashMap<EntityKind, Arc<dyn EntityLookup>>,
}

impl EntityRegistry {
    pub fn new(stores: &Stores) -> Self {
        let mut lookups: HashMap<EntityKind, Arc<dyn EntityLookup>> = HashMap::new();
        lookups.insert(EntityKind::Ad, Arc::new(AdLookup(stores.ads.clone())));
        lookups.insert(
            EntityKind::AdSearch,
            Arc::new(AdSearchLookup(stores.searches.clone())),
        );
        Self { lookups }
    }

    /// Owner of `target`, `None` when it does not exist or its kind is unregistered.
    pub async fn owner_of(&self, target: EntityRef) -> Result<Option<UserId>, StoreError> {
        match self.lookups.get(&target.kind) {
            Some(lookup) => lookup.owner_of(target.id).await,
            None => Ok(None),
        }
    }
}
