//! Keeps `AdSearchResult` rows in line with public saved searches.
//!
//! A row exists for every (public search, listed ad) pair where the ad
//! satisfies the search and belongs to someone else. Contacted rows are
//! never removed here.

use std::collections::HashSet;

use log::info;

use crate::filter::AdFilter;
use crate::models::{Ad, AdSearch, EntityKind, EntityRef, Id};
use crate::store::{StoreError, Stores};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MatchSummary {
    pub added: usize,
    pub removed: usize,
}

async fn record(stores: &Stores, ad_search: Id, target: EntityRef) -> Result<bool, StoreError> {
    match stores.results.insert(ad_search, target).await {
        Ok(_) => Ok(true),
        // Already recorded by a concurrent request.
        Err(StoreError::Conflict(_)) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Re-evaluates every public ad search against `ad`.
pub async fn refresh_for_ad(stores: &Stores, ad: &Ad) -> Result<MatchSummary, StoreError> {
    let target = ad.entity_ref();
    let mut summary = MatchSummary::default();

    for search in stores.searches.public_for(EntityKind::Ad).await? {
        let matches =
            search.user != ad.user && AdFilter::from_search_string(&search.search).matches(ad);
        match (matches, stores.results.find(search.id, target).await?) {
            (true, None) => {
                if record(stores, search.id, target).await? {
                    summary.added += 1;
                }
            }
            (false, Some(result)) if !result.contacted => {
                stores.results.delete(result.id).await?;
                summary.removed += 1;
            }
            _ => {}
        }
    }

    info!(
        "Ad {} matching refreshed: {} added, {} removed",
        ad.id, summary.added, summary.removed
    );
    Ok(summary)
}

/// Re-evaluates `search` against every listed ad. Private searches are left alone.
pub async fn refresh_for_search(
    stores: &Stores,
    search: &AdSearch,
) -> Result<MatchSummary, StoreError> {
    let mut summary = MatchSummary::default();
    if !search.public || search.content_type != EntityKind::Ad {
        return Ok(summary);
    }

    let filter = AdFilter::from_search_string(&search.search);
    let matching: HashSet<Id> = stores
        .ads
        .filter(&filter, None)
        .await?
        .into_iter()
        .filter(|ad| ad.user != search.user)
        .map(|ad| ad.id)
        .collect();

    let existing = stores.results.for_search(search.id).await?;
    for result in &existing {
        if result.target.kind == EntityKind::Ad
            && !result.contacted
            && !matching.contains(&result.target.id)
        {
            stores.results.delete(result.id).await?;
            summary.removed += 1;
        }
    }

    let known: HashSet<EntityRef> = existing.iter().map(|r| r.target).collect();
    for id in matching {
        let target = EntityRef::ad(id);
        if !known.contains(&target) && record(stores, search.id, target).await? {
            summary.added += 1;
        }
    }

    info!(
        "Search {} matching refreshed: {} added, {} removed",
        search.id, summary.added, summary.removed
    );
    Ok(summary)
}
