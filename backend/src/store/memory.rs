use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{
    AdContactStore, AdPictureStore, AdSearchResultStore, AdSearchStore, AdStore, StoreError,
};
use crate::filter::{AdFilter, PageWindow};
use crate::models::{
    Ad, AdContact, AdPicture, AdSearch, AdSearchResult, EntityKind, EntityRef, Id, NewAd,
    NewAdContact, NewAdPicture, NewAdSearch, UserId,
};

/// Rows keyed by id, ids handed out from 1.
struct Table<T> {
    next_id: Id,
    rows: BTreeMap<Id, T>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            next_id: 1,
            rows: BTreeMap::new(),
        }
    }
}

impl<T: Clone> Table<T> {
    fn allocate(&mut self) -> Id {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn replace(&mut self, id: Id, row: T) -> Result<(), StoreError> {
        match self.rows.get_mut(&id) {
            Some(slot) => {
                *slot = row;
                Ok(())
            }
            None => Err(StoreError::Missing(id)),
        }
    }

    fn remove(&mut self, id: Id) -> Result<(), StoreError> {
        self.rows
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::Missing(id))
    }
}

#[derive(Default)]
pub struct MemoryAdStore {
    table: RwLock<Table<Ad>>,
}

#[async_trait]
impl AdStore for MemoryAdStore {
    async fn insert(&self, ad: NewAd) -> Result<Ad, StoreError> {
        let mut table = self.table.write().await;
        if table.rows.values().any(|row| row.slug == ad.slug) {
            return Err(StoreError::Conflict(format!("slug {} already used", ad.slug)));
        }
        let now = Utc::now();
        let id = table.allocate();
        let row = Ad {
            id,
            user: ad.user,
            slug: ad.slug,
            description: ad.description,
            user_entered_address: ad.user_entered_address,
            address: ad.address,
            location: ad.location,
            visible: ad.visible,
            create_date: now,
            update_date: now,
            delete_date: None,
        };
        table.rows.insert(id, row.clone());
        Ok(row)
    }

    async fn get(&self, id: Id) -> Result<Option<Ad>, StoreError> {
        Ok(self.table.read().await.rows.get(&id).cloned())
    }

    async fn get_owned(&self, owner: UserId, id: Id) -> Result<Option<Ad>, StoreError> {
        let table = self.table.read().await;
        Ok(table.rows.get(&id).filter(|ad| ad.user == owner).cloned())
    }

    async fn update(&self, ad: &Ad) -> Result<(), StoreError> {
        let mut table = self.table.write().await;
        if table
            .rows
            .values()
            .any(|row| row.id != ad.id && row.slug == ad.slug)
        {
            return Err(StoreError::Conflict(format!("slug {} already used", ad.slug)));
        }
        table.replace(ad.id, ad.clone())
    }

    async fn filter(
        &self,
        filter: &AdFilter,
        window: Option<PageWindow>,
    ) -> Result<Vec<Ad>, StoreError> {
        let table = self.table.read().await;
        let mut ads: Vec<Ad> = table
            .rows
            .values()
            .filter(|ad| filter.matches(ad))
            .cloned()
            .collect();
        ads.sort_by(|a, b| filter.compare(a, b));
        Ok(match window {
            Some(window) => ads
                .into_iter()
                .skip(window.offset)
                .take(window.limit)
                .collect(),
            None => ads,
        })
    }

    async fn count(&self, filter: &AdFilter) -> Result<usize, StoreError> {
        let table = self.table.read().await;
        Ok(table.rows.values().filter(|ad| filter.matches(ad)).count())
    }

    async fn slug_taken(&self, slug: &str, except: Option<Id>) -> Result<bool, StoreError> {
        let table = self.table.read().await;
        Ok(table
            .rows
            .values()
            .any(|ad| ad.slug == slug && Some(ad.id) != except))
    }
}

#[derive(Default)]
pub struct MemoryAdSearchStore {
    table: RwLock<Table<AdSearch>>,
}

#[async_trait]
impl AdSearchStore for MemoryAdSearchStore {
    async fn insert(&self, search: NewAdSearch) -> Result<AdSearch, StoreError> {
        let mut table = self.table.write().await;
        let id = table.allocate();
        let row = AdSearch {
            id,
            user: search.user,
            search: search.search,
            content_type: search.content_type,
            public: search.public,
            create_date: Utc::now(),
        };
        table.rows.insert(id, row.clone());
        Ok(row)
    }

    async fn get(&self, id: Id) -> Result<Option<AdSearch>, StoreError> {
        Ok(self.table.read().await.rows.get(&id).cloned())
    }

    async fn get_owned(&self, owner: UserId, id: Id) -> Result<Option<AdSearch>, StoreError> {
        let table = self.table.read().await;
        Ok(table.rows.get(&id).filter(|s| s.user == owner).cloned())
    }

    async fn update(&self, search: &AdSearch) -> Result<(), StoreError> {
        self.table
            .write()
            .await
            .replace(search.id, search.clone())
    }

    async fn delete(&self, id: Id) -> Result<(), StoreError> {
        self.table.write().await.remove(id)
    }

    async fn public_for(&self, kind: EntityKind) -> Result<Vec<AdSearch>, StoreError> {
        let table = self.table.read().await;
        Ok(table
            .rows
            .values()
            .filter(|s| s.public && s.content_type == kind)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct MemoryAdSearchResultStore {
    table: RwLock<Table<AdSearchResult>>,
}

#[async_trait]
impl AdSearchResultStore for MemoryAdSearchResultStore {
    async fn insert(&self, ad_search: Id, target: EntityRef) -> Result<AdSearchResult, StoreError> {
        let mut table = self.table.write().await;
        if table
            .rows
            .values()
            .any(|r| r.ad_search == ad_search && r.target == target)
        {
            return Err(StoreError::Conflict(format!(
                "search {} already matched {:?} {}",
                ad_search, target.kind, target.id
            )));
        }
        let id = table.allocate();
        let row = AdSearchResult {
            id,
            ad_search,
            target,
            contacted: false,
        };
        table.rows.insert(id, row.clone());
        Ok(row)
    }

    async fn get(&self, id: Id) -> Result<Option<AdSearchResult>, StoreError> {
        Ok(self.table.read().await.rows.get(&id).cloned())
    }

    async fn find(
        &self,
        ad_search: Id,
        target: EntityRef,
    ) -> Result<Option<AdSearchResult>, StoreError> {
        let table = self.table.read().await;
        Ok(table
            .rows
            .values()
            .find(|r| r.ad_search == ad_search && r.target == target)
            .cloned())
    }

    async fn for_target(&self, target: EntityRef) -> Result<Vec<AdSearchResult>, StoreError> {
        let table = self.table.read().await;
        Ok(table
            .rows
            .values()
            .filter(|r| r.target == target)
            .cloned()
            .collect())
    }

    async fn for_search(&self, ad_search: Id) -> Result<Vec<AdSearchResult>, StoreError> {
        let table = self.table.read().await;
        Ok(table
            .rows
            .values()
            .filter(|r| r.ad_search == ad_search)
            .cloned()
            .collect())
    }

    async fn update(&self, result: &AdSearchResult) -> Result<(), StoreError> {
        self.table
            .write()
            .await
            .replace(result.id, result.clone())
    }

    async fn delete(&self, id: Id) -> Result<(), StoreError> {
        self.table.write().await.remove(id)
    }

    async fn delete_for_search(&self, ad_search: Id) -> Result<usize, StoreError> {
        let mut table = self.table.write().await;
        let before = table.rows.len();
        table.rows.retain(|_, r| r.ad_search != ad_search);
        Ok(before - table.rows.len())
    }
}

#[derive(Default)]
pub struct MemoryAdContactStore {
    table: RwLock<Table<AdContact>>,
}

#[async_trait]
impl AdContactStore for MemoryAdContactStore {
    async fn insert(&self, contact: NewAdContact) -> Result<AdContact, StoreError> {
        let mut table = self.table.write().await;
        let id = table.allocate();
        let row = AdContact {
            id,
            user: contact.user,
            target: contact.target,
            message: contact.message,
            create_date: Utc::now(),
        };
        table.rows.insert(id, row.clone());
        Ok(row)
    }

    async fn for_target(&self, target: EntityRef) -> Result<Vec<AdContact>, StoreError> {
        let table = self.table.read().await;
        Ok(table
            .rows
            .values()
            .filter(|c| c.target == target)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct MemoryAdPictureStore {
    table: RwLock<Table<AdPicture>>,
}

#[async_trait]
impl AdPictureStore for MemoryAdPictureStore {
    async fn insert(&self, picture: NewAdPicture) -> Result<AdPicture, StoreError> {
        let mut table = self.table.write().await;
        let id = table.allocate();
        let row = AdPicture {
            id,
            target: picture.target,
            image: picture.image,
            title: picture.title,
        };
        table.rows.insert(id, row.clone());
        Ok(row)
    }

    async fn for_target(&self, target: EntityRef) -> Result<Vec<AdPicture>, StoreError> {
        let table = self.table.read().await;
        Ok(table
            .rows
            .values()
            .filter(|p| p.target == target)
            .cloned()
            .collect())
    }

    async fn update(&self, picture: &AdPicture) -> Result<(), StoreError> {
        self.table
            .write()
            .await
            .replace(picture.id, picture.clone())
    }

    async fn delete(&self, id: Id) -> Result<(), StoreError> {
        self.table.write().await.remove(id)
    }
}
