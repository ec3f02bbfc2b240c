//! Curricula Service - Course Recommendations over HTTP
//!
//! Port: 5000 (CURRICULA__SERVER__PORT)

use actix_web::{middleware::Logger, web, App, HttpServer};
use curricula_core::{init_logging, load_dotenv, CurriculaConfig};
use curricula_engine::server::{configure_routes, AppState};
use curricula_engine::RecommenderService;
use std::sync::Arc;
use tracing::{error, info};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    let config_path = std::env::var("CURRICULA_CONFIG").ok();
    let config = CurriculaConfig::load(config_path.as_deref())?;
    config.validate()?;
    init_logging(&config.logging)?;

    info!(
        "Starting Curricula Service on {}:{}",
        config.server.host, config.server.port
    );

    // Keep serving; every route but health answers 503 until models exist
    let state = match RecommenderService::load(&config) {
        Ok(service) => AppState::loaded(Arc::new(service)),
        Err(e) => {
            error!(error = %format!("{:#}", e), "Failed to load models");
            AppState::unavailable(format!("{:#}", e))
        }
    };
    let state = web::Data::new(state);

    let mut server = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .configure(configure_routes)
            .wrap(Logger::default())
    });
    if let Some(workers) = config.server.workers {
        server = server.workers(workers);
    }

    server
        .bind((config.server.host.as_str(), config.server.port))?
        .run()
        .await?;

    Ok(())
}
