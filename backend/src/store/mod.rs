//! Storage contracts for every entity.
//!
//! The service only sequences reads and writes; atomicity of a single call is
//! the store's job. `get_owned` style lookups return `None` both when the row
//! is missing and when it belongs to someone else.

mod memory;

use std::sync::Arc;

use async_trait::async_trait;

use crate::filter::{AdFilter, PageWindow};
use crate::models::{
    Ad, AdContact, AdPicture, AdSearch, AdSearchResult, EntityKind, EntityRef, Id, NewAd,
    NewAdContact, NewAdPicture, NewAdSearch, UserId,
};

pub use memory::{
    MemoryAdContactStore, MemoryAdPictureStore, MemoryAdSearchResultStore, MemoryAdSearchStore,
    MemoryAdStore,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record {0} does not exist")]
    Missing(Id),
    #[error("conflict: {0}")]
    Conflict(String),
}

#[async_trait]
pub trait AdStore: Send + Sync {
    async fn insert(&self, ad: NewAd) -> Result<Ad, StoreError>;
    async fn get(&self, id: Id) -> Result<Option<Ad>, StoreError>;
    async fn get_owned(&self, owner: UserId, id: Id) -> Result<Option<Ad>, StoreError>;
    async fn update(&self, ad: &Ad) -> Result<(), StoreError>;
    /// Matching ads in filter order, then windowed.
    async fn filter(&self, filter: &AdFilter, window: Option<PageWindow>)
        -> Result<Vec<Ad>, StoreError>;
    async fn count(&self, filter: &AdFilter) -> Result<usize, StoreError>;
    async fn slug_taken(&self, slug: &str, except: Option<Id>) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait AdSearchStore: Send + Sync {
    async fn insert(&self, search: NewAdSearch) -> Result<AdSearch, StoreError>;
    async fn get(&self, id: Id) -> Result<Option<AdSearch>, StoreError>;
    async fn get_owned(&self, owner: UserId, id: Id) -> Result<Option<AdSearch>, StoreError>;
    async fn update(&self, search: &AdSearch) -> Result<(), StoreError>;
    async fn delete(&self, id: Id) -> Result<(), StoreError>;
    async fn public_for(&self, kind: EntityKind) -> Result<Vec<AdSearch>, StoreError>;
}

#[async_trait]
pub trait AdSearchResultStore: Send + Sync {
    async fn insert(&self, ad_search: Id, target: EntityRef) -> Result<AdSearchResult, StoreError>;
    async fn get(&self, id: Id) -> Result<Option<AdSearchResult>, StoreError>;
    async fn find(&self, ad_search: Id, target: EntityRef)
        -> Result<Option<AdSearchResult>, StoreError>;
    async fn for_target(&self, target: EntityRef) -> Result<Vec<AdSearchResult>, StoreError>;
    async fn for_search(&self, ad_search: Id) -> Result<Vec<AdSearchResult>, StoreError>;
    async fn update(&self, result: &AdSearchResult) -> Result<(), StoreError>;
    async fn delete(&self, id: Id) -> Result<(), StoreError>;
    async fn delete_for_search(&self, ad_search: Id) -> Result<usize, StoreError>;
}

#[async_trait]
pub trait AdContactStore: Send + Sync {
    async fn insert(&self, contact: NewAdContact) -> Result<AdContact, StoreError>;
    async fn for_target(&self, target: EntityRef) -> Result<Vec<AdContact>, StoreError>;
}

#[async_trait]
pub trait AdPictureStore: Send + Sync {
    async fn insert(&self, picture: NewAdPicture) -> Result<AdPicture, StoreError>;
    async fn for_target(&self, target: EntityRef) -> Result<Vec<AdPicture>, StoreError>;
    async fn update(&self, picture: &AdPicture) -> Result<(), StoreError>;
    async fn delete(&self, id: Id) -> Result<(), StoreError>;
}

/// One handle per entity store.
#[derive(Clone)]
pub struct Stores {
    pub ads: Arc<dyn AdStore>,
    pub searches: Arc<dyn AdSearchStore>,
    pub results: Arc<dyn AdSearchResultStore>,
    pub contacts: Arc<dyn AdContactStore>,
    pub pictures: Arc<dyn AdPictureStore>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            ads: Arc::new(MemoryAdStore::default()),
            searches: Arc::new(MemoryAdSearchStore::default()),
            results: Arc::new(MemoryAdSearchResultStore::default()),
            contacts: Arc::new(MemoryAdContactStore::default()),
            pictures: Arc::new(MemoryAdPictureStore::default()),
        }
    }
}
