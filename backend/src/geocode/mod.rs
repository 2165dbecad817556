use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::config::AppConfig;
use crate::models::Point;

#[derive(Debug, thiserror::Error)]
pub enum GeocodeError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("geocoder answered {0}")]
    Status(String),
    #[error("no match for address {0:?}")]
    NoMatch(String),
}

/// Structured address plus its point.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoInfo {
    pub address: serde_json::Value,
    pub location: Point,
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, address: &str) -> Result<GeoInfo, GeocodeError>;
}

/// Installs the fixed geocoder when `bypass_geocode` is set.
pub fn from_config(config: &AppConfig) -> Result<Box<dyn Geocoder>, GeocodeError> {
    if config.bypass_geocode {
        warn!("Geocoding bypassed, every ad will be located at the fixed address");
        return Ok(Box::new(FixedGeocoder));
    }
    Ok(Box::new(HttpGeocoder::new(
        &config.geocoder_url,
        config.geocoder_api_key.clone(),
    )?))
}

pub struct HttpGeocoder {
    client: Client,
    url: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    results: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    geometry: GeometryLocation,
}

#[derive(Debug, Deserialize)]
struct GeometryLocation {
    location: LatLng,
}

#[derive(Debug, Deserialize)]
struct LatLng {
    lat: f64,
    lng: f64,
}

impl HttpGeocoder {
    pub fn new(url: &str, api_key: Option<String>) -> Result<Self, GeocodeError> {
        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            client,
            url: url.to_string(),
            api_key,
        })
    }
}

#[async_trait]
impl Geocoder for HttpGeocoder {
    async fn geocode(&self, address: &str) -> Result<GeoInfo, GeocodeError> {
        // The provider only accepts ASCII addresses.
        let ascii: String = address.chars().filter(char::is_ascii).collect();
        let mut query = vec![("address", ascii.as_str()), ("sensor", "false")];
        if let Some(key) = &self.api_key {
            query.push(("key", key.as_str()));
        }

        debug!("Geocoding {:?}", ascii);
        let response: GeocodeResponse = self
            .client
            .get(&self.url)
            .query(&query)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        match response.status.as_str() {
            "OK" => {}
            "ZERO_RESULTS" => return Err(GeocodeError::NoMatch(address.to_string())),
            other => return Err(GeocodeError::Status(other.to_string())),
        }
        let first = response
            .results
            .first()
            .ok_or_else(|| GeocodeError::NoMatch(address.to_string()))?;
        let geometry: Geometry = serde_json::from_value(first.clone())
            .map_err(|_| GeocodeError::NoMatch(address.to_string()))?;

        Ok(GeoInfo {
            address: serde_json::Value::Array(response.results),
            location: Point::new(geometry.geometry.location.lng, geometry.geometry.location.lat),
        })
    }
}

/// Answers every lookup with 1 Rue de la Paix, Paris.
pub struct FixedGeocoder;

impl FixedGeocoder {
    pub fn location() -> Point {
        Point::new(2.330378, 48.868356)
    }

    pub fn address() -> serde_json::Value {
        json!([{
            "geometry": {
                "location": {"lat": 48.868356, "lng": 2.330378},
                "viewport": {
                    "northeast": {"lat": 48.8697049802915, "lng": 2.331726980291502},
                    "southwest": {"lat": 48.8670070197085, "lng": 2.329029019708498}
                },
                "location_type": "ROOFTOP"
            },
            "address_components": [
                {"long_name": "1", "short_name": "1", "types": ["street_number"]},
                {"long_name": "Rue de la Paix", "short_name": "Rue de la Paix", "types": ["route"]},
                {"long_name": "2nd arrondissement of Paris", "short_name": "2nd arrondissement of Paris", "types": ["sublocality", "political"]},
                {"long_name": "Paris", "short_name": "Paris", "types": ["locality", "political"]},
                {"long_name": "Paris", "short_name": "75", "types": ["administrative_area_level_2", "political"]},
                {"long_name": "Île-de-France", "short_name": "IdF", "types": ["administrative_area_level_1", "political"]},
                {"long_name": "France", "short_name": "FR", "types": ["country", "political"]},
                {"long_name": "75002", "short_name": "75002", "types": ["postal_code"]}
            ],
            "formatted_address": "1 Rue de la Paix, 75002 Paris, France",
            "types": ["street_address"]
        }])
    }
}

#[async_trait]
impl Geocoder for FixedGeocoder {
    async fn geocode(&self, _address: &str) -> Result<GeoInfo, GeocodeError> {
        Ok(GeoInfo {
            address: Self::address(),
            location: Self::location(),
        })
    }
}
