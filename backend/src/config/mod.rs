use config::{Config, ConfigError, Environment};
use dotenv::dotenv;
use serde::Deserialize;

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub port: u16,
    pub jwt_secret: String,
    /// Store a fixed address and point instead of calling the geocoder.
    pub bypass_geocode: bool,
    pub geocoder_url: String,
    pub geocoder_api_key: Option<String>,
    /// Ads shown on the search landing page.
    pub home_ads_count: usize,
    pub paginate_by: usize,
    pub site_name: String,
    pub operator_email: String,
    /// Where account-level actions send the user back to.
    pub account_url: String,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenv().ok(); // Load .env file if present
        Config::builder()
            .set_default("port", 8000)?
            .set_default("bypass_geocode", false)?
            .set_default(
                "geocoder_url",
                "https://maps.googleapis.com/maps/api/geocode/json",
            )?
            .set_default("home_ads_count", 10)?
            .set_default("paginate_by", 14)?
            .set_default("site_name", "geoads")?
            .set_default("operator_email", "contact@localhost")?
            .set_default("account_url", "/accounts/profile/")?
            .add_source(Environment::default().try_parsing(true))
            .build()?
            .try_deserialize()
    }
}
