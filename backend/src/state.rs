use std::sync::Arc;

use crate::config::AppConfig;
use crate::geocode::{self, GeocodeError, Geocoder};
use crate::notify::Notifier;
use crate::registry::EntityRegistry;
use crate::store::Stores;

/// Everything a controller needs, cloned into each request.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub stores: Stores,
    pub registry: Arc<EntityRegistry>,
    pub geocoder: Arc<dyn Geocoder>,
    pub notifier: Arc<dyn Notifier>,
}

impl AppState {
    /// Wires the geocoder selected by the configuration.
    pub fn new(
        config: AppConfig,
        stores: Stores,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self, GeocodeError> {
        let geocoder: Arc<dyn Geocoder> = Arc::from(geocode::from_config(&config)?);
        Ok(Self {
            config: Arc::new(config),
            registry: Arc::new(EntityRegistry::new(&stores)),
            stores,
            geocoder,
            notifier,
        })
    }

    pub fn with_geocoder(mut self, geocoder: Arc<dyn Geocoder>) -> Self {
        self.geocoder = geocoder;
        self
    }
}
