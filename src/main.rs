use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{http::header, middleware::Logger, web, App, HttpServer};

use taskforge::auth::AuthMiddleware;
use taskforge::config::{Config, StorageBackend};
use taskforge::routes::{self, health};
use taskforge::store::{postgres, MemoryStore, PgStore};
use taskforge::AppServices;

fn cors(origins: &[String]) -> Cors {
    origins
        .iter()
        .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
        .allowed_methods(vec!["GET", "POST", "PUT", "DELETE"])
        .allowed_headers(vec![header::AUTHORIZATION, header::ACCEPT, header::CONTENT_TYPE])
        .supports_credentials()
        .max_age(3600)
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let config = Config::from_env().map_err(|e| {
        log::error!("Invalid configuration: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e)
    })?;

    let services = match config.storage {
        StorageBackend::Postgres => {
            let pool = postgres::connect_with_retry(&config)
                .await
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
            let store = PgStore::new(pool);
            store
                .migrate()
                .await
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
            AppServices::new(Arc::new(store), &config)
        }
        StorageBackend::Memory => {
            log::warn!("Using in-memory storage; data is lost on shutdown");
            AppServices::new(Arc::new(MemoryStore::new()), &config)
        }
    };

    log::info!("Starting TaskForge server at {}", config.server_url());

    let origins = config.cors_allowed_origins.clone();
    HttpServer::new(move || {
        App::new()
            .wrap(cors(&origins))
            .wrap(Logger::default())
            .app_data(services.auth.clone())
            .app_data(services.tasks.clone())
            .service(health::health)
            .service(
                web::scope("/api")
                    .wrap(AuthMiddleware::new(services.tokens.clone()))
                    .configure(routes::config),
            )
    })
    .bind((config.server_host.as_str(), config.server_port))?
    .run()
    .await
}
