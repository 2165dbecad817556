use std::cmp::Ordering;
use std::collections::HashSet;

use chrono::NaiveDate;
use log::debug;
use serde::de::{value, DeserializeOwned};
use serde::Serialize;
use url::form_urlencoded;

use crate::models::{Ad, Point};
use crate::store::{AdStore, StoreError};

/// Pagination parameter. Never part of a filter or of a saved search.
pub const PAGE_PARAM: &str = "page";

const DEFAULT_RADIUS_KM: f64 = 10.0;
const MAX_RADIUS_KM: f64 = 500.0;
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Ordered multi-map of decoded query parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    pairs: Vec<(String, String)>,
}

impl QueryParams {
    pub fn parse(raw: &str) -> Self {
        form_urlencoded::parse(raw.as_bytes()).into_owned().collect()
    }

    pub fn encode(&self) -> String {
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(&self.pairs)
            .finish()
    }

    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((key.into(), value.into()));
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// First value for `key`.
    pub fn get<'a>(&'a self, key: &'a str) -> Option<&'a str> {
        self.get_all(key).next()
    }

    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.pairs
            .iter()
            .filter(move |(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn without(&self, key: &str) -> Self {
        self.pairs
            .iter()
            .filter(|(k, _)| k != key)
            .cloned()
            .collect()
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    /// Deserializes the pairs into `T`. The first value wins for a repeated
    /// key, as with [`QueryParams::get`].
    pub fn deserialize_as<T: DeserializeOwned>(&self) -> Result<T, value::Error> {
        let mut seen = HashSet::new();
        let pairs = self
            .pairs
            .iter()
            .filter(|(k, _)| seen.insert(k.as_str()))
            .map(|(k, v)| (k.as_str(), v.as_str()));
        T::deserialize(value::MapDeserializer::new(pairs))
    }
}

impl FromIterator<(String, String)> for QueryParams {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            pairs: iter.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Newest,
    Oldest,
    RecentlyUpdated,
    LeastRecentlyUpdated,
}

impl SortOrder {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "-create_date" => Some(Self::Newest),
            "create_date" => Some(Self::Oldest),
            "-update_date" => Some(Self::RecentlyUpdated),
            "update_date" => Some(Self::LeastRecentlyUpdated),
            _ => None,
        }
    }

    fn as_param(&self) -> &'static str {
        match self {
            Self::Newest => "-create_date",
            Self::Oldest => "create_date",
            Self::RecentlyUpdated => "-update_date",
            Self::LeastRecentlyUpdated => "update_date",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoRadius {
    pub center: Point,
    pub radius_km: f64,
}

/// Validated filter over ads. `Default` is the unconstrained filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdFilter {
    /// Lowercased words that must all appear in the description.
    pub words: Vec<String>,
    /// Lowercased fragment of the entered address.
    pub address: Option<String>,
    pub near: Option<GeoRadius>,
    pub created_after: Option<NaiveDate>,
    pub created_before: Option<NaiveDate>,
    pub order: SortOrder,
}

impl AdFilter {
    pub fn from_params(params: &QueryParams) -> Self {
        let mut filter = AdFilter::default();

        for value in params.get_all("q") {
            filter
                .words
                .extend(value.split_whitespace().map(str::to_lowercase));
        }

        filter.address = params
            .get("address")
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_lowercase);

        filter.near = parse_radius(params);
        filter.created_after = params.get("created_after").and_then(parse_date);
        filter.created_before = params.get("created_before").and_then(parse_date);
        filter.order = params
            .get("o")
            .and_then(SortOrder::parse)
            .unwrap_or_default();

        debug!("Built filter {:?} from {} parameters", filter, params.len());
        filter
    }

    /// Decodes a saved search string.
    pub fn from_search_string(search: &str) -> Self {
        Self::from_params(&QueryParams::parse(search))
    }

    /// Canonical parameters; `from_params(&f.to_params()) == f`.
    pub fn to_params(&self) -> QueryParams {
        let mut params = QueryParams::default();
        if !self.words.is_empty() {
            params.push("q", self.words.join(" "));
        }
        if let Some(address) = &self.address {
            params.push("address", address.clone());
        }
        if let Some(near) = &self.near {
            params.push("lat", near.center.lat.to_string());
            params.push("lng", near.center.lng.to_string());
            params.push("radius", near.radius_km.to_string());
        }
        if let Some(date) = self.created_after {
            params.push("created_after", date.format(DATE_FORMAT).to_string());
        }
        if let Some(date) = self.created_before {
            params.push("created_before", date.format(DATE_FORMAT).to_string());
        }
        if self.order != SortOrder::default() {
            params.push("o", self.order.as_param());
        }
        params
    }

    pub fn matches(&self, ad: &Ad) -> bool {
        if !ad.is_listed() {
            return false;
        }
        if !self.words.is_empty() {
            let description = ad.description.as_deref().unwrap_or_default().to_lowercase();
            if !self.words.iter().all(|w| description.contains(w.as_str())) {
                return false;
            }
        }
        if let Some(address) = &self.address {
            if !ad.user_entered_address.to_lowercase().contains(address.as_str()) {
                return false;
            }
        }
        if let Some(near) = &self.near {
            if ad.location.distance_km(&near.center) > near.radius_km {
                return false;
            }
        }
        let created = ad.create_date.date_naive();
        if self.created_after.is_some_and(|d| created < d) {
            return false;
        }
        if self.created_before.is_some_and(|d| created > d) {
            return false;
        }
        true
    }

    /// Result ordering; ids break ties so equal timestamps stay deterministic.
    pub fn compare(&self, a: &Ad, b: &Ad) -> Ordering {
        match self.order {
            SortOrder::Newest => b.create_date.cmp(&a.create_date).then(b.id.cmp(&a.id)),
            SortOrder::Oldest => a.create_date.cmp(&b.create_date).then(a.id.cmp(&b.id)),
            SortOrder::RecentlyUpdated => {
                b.update_date.cmp(&a.update_date).then(b.id.cmp(&a.id))
            }
            SortOrder::LeastRecentlyUpdated => {
                a.update_date.cmp(&b.update_date).then(a.id.cmp(&b.id))
            }
        }
    }
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).ok()
}

fn parse_float(value: Option<&str>) -> Option<f64> {
    value
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
}

fn parse_radius(params: &QueryParams) -> Option<GeoRadius> {
    let lat = parse_float(params.get("lat")).filter(|lat| (-90.0..=90.0).contains(lat))?;
    let lng = parse_float(params.get("lng")).filter(|lng| (-180.0..=180.0).contains(lng))?;
    let radius_km = parse_float(params.get("radius"))
        .filter(|r| *r > 0.0 && *r <= MAX_RADIUS_KM)
        .unwrap_or(DEFAULT_RADIUS_KM);
    Some(GeoRadius {
        center: Point::new(lng, lat),
        radius_km,
    })
}

/// Requested 1-based page number, 1 when absent or malformed.
pub fn requested_page(params: &QueryParams) -> usize {
    params
        .get(PAGE_PARAM)
        .and_then(|p| p.trim().parse::<usize>().ok())
        .filter(|p| *p >= 1)
        .unwrap_or(1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageWindow {
    pub offset: usize,
    pub limit: usize,
}

/// One page of filtered ads plus the overall count.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResults {
    pub ads: Vec<Ad>,
    pub total: usize,
    pub page: usize,
    pub per_page: usize,
    pub num_pages: usize,
}

/// Runs `filter` and returns page `page` (clamped to the last page).
pub async fn search(
    store: &dyn AdStore,
    filter: &AdFilter,
    page: usize,
    per_page: usize,
) -> Result<SearchResults, StoreError> {
    let per_page = per_page.max(1);
    let total = store.count(filter).await?;
    let num_pages = total.div_ceil(per_page).max(1);
    let page = page.clamp(1, num_pages);
    let window = PageWindow {
        offset: (page - 1) * per_page,
        limit: per_page,
    };
    let ads = store.filter(filter, Some(window)).await?;
    Ok(SearchResults {
        ads,
        total,
        page,
        per_page,
        num_pages,
    })
}

/// The `count` most recent listed ads.
pub async fn latest(store: &dyn AdStore, count: usize) -> Result<Vec<Ad>, StoreError> {
    store
        .filter(
            &AdFilter::default(),
            Some(PageWindow {
                offset: 0,
                limit: count,
            }),
        )
        .await
}
