use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Store-assigned identifier shared by every entity.
pub type Id = i64;

/// Authenticated account reference, taken from the token subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kinds of entity that pictures, contacts and search results can point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Ad,
    AdSearch,
}

/// Tagged reference to an entity of any registered kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    pub kind: EntityKind,
    pub id: Id,
}

impl EntityRef {
    pub fn ad(id: Id) -> Self {
        Self { kind: EntityKind::Ad, id }
    }

    pub fn ad_search(id: Id) -> Self {
        Self { kind: EntityKind::AdSearch, id }
    }
}

/// WGS84 coordinates in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub lng: f64,
    pub lat: f64,
}

impl Point {
    const EARTH_RADIUS_KM: f64 = 6371.0;

    pub fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }

    /// Great-circle distance in kilometres (haversine).
    pub fn distance_km(&self, other: &Point) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let dlat = lat2 - lat1;
        let dlng = (other.lng - self.lng).to_radians();
        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
        2.0 * Self::EARTH_RADIUS_KM * a.sqrt().asin()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ad {
    pub id: Id,
    pub user: UserId,
    pub slug: String,
    pub description: Option<String>,
    pub user_entered_address: String,
    pub address: serde_json::Value,
    pub location: Point,
    pub visible: bool,
    pub create_date: DateTime<Utc>,
    pub update_date: DateTime<Utc>,
    pub delete_date: Option<DateTime<Utc>>,
}

impl Ad {
    /// Listed in searches: visible and not soft-deleted.
    pub fn is_listed(&self) -> bool {
        self.visible && self.delete_date.is_none()
    }

    pub fn is_deleted(&self) -> bool {
        self.delete_date.is_some()
    }

    pub fn entity_ref(&self) -> EntityRef {
        EntityRef::ad(self.id)
    }
}

/// Ad values before the store assigns an id.
#[derive(Debug, Clone)]
pub struct NewAd {
    pub user: UserId,
    pub slug: String,
    pub description: Option<String>,
    pub user_entered_address: String,
    pub address: serde_json::Value,
    pub location: Point,
    pub visible: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdSearch {
    pub id: Id,
    pub user: UserId,
    pub search: String,
    pub content_type: EntityKind,
    pub public: bool,
    pub create_date: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAdSearch {
    pub user: UserId,
    pub search: String,
    pub content_type: EntityKind,
    pub public: bool,
}

/// Evidence that `target` satisfies the saved search `ad_search`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdSearchResult {
    pub id: Id,
    pub ad_search: Id,
    pub target: EntityRef,
    pub contacted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdContact {
    pub id: Id,
    pub user: UserId,
    pub target: EntityRef,
    pub message: String,
    pub create_date: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAdContact {
    pub user: UserId,
    pub target: EntityRef,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdPicture {
    pub id: Id,
    pub target: EntityRef,
    #[serde(skip)]
    pub image: Vec<u8>,
    pub title: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewAdPicture {
    pub target: EntityRef,
    pub image: Vec<u8>,
    pub title: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_between_paris_landmarks() {
        let opera = Point::new(2.3319, 48.8720);
        let notre_dame = Point::new(2.3499, 48.8530);
        let d = opera.distance_km(&notre_dame);
        assert!(d > 2.0 && d < 3.0, "unexpected distance {}", d);
        assert_eq!(opera.distance_km(&opera), 0.0);
    }

    #[test]
    fn test_entity_ref_constructors() {
        assert_eq!(EntityRef::ad(3).kind, EntityKind::Ad);
        assert_eq!(EntityRef::ad_search(3).kind, EntityKind::AdSearch);
        assert_ne!(EntityRef::ad(3), EntityRef::ad_search(3));
    }
}
