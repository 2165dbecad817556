use std::net::SocketAddr;
use std::sync::Arc;

use geoads_backend::config::AppConfig;
use geoads_backend::notify::{self, LogMailer};
use geoads_backend::routes;
use geoads_backend::state::AppState;
use geoads_backend::store::Stores;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();

    let config = AppConfig::load()?;
    log::info!(
        "Loaded config: port={} bypass_geocode={} paginate_by={}",
        config.port,
        config.bypass_geocode,
        config.paginate_by
    );

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));

    let (notifier, rx) = notify::queue();
    let mailer = LogMailer::new(config.site_name.clone(), config.operator_email.clone());
    let delivery = notify::spawn_delivery(rx, Arc::new(mailer));

    let state = AppState::new(config, Stores::in_memory(), Arc::new(notifier))?;
    let app = routes::router(state);

    log::info!("Starting server on {}", addr);
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app.into_make_service()).await?;

    delivery.abort();
    Ok(())
}
