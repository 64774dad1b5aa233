use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod config;
mod error;
mod routes;
mod schemas;
mod session;
mod settlement;
mod state;
mod storage;
mod summary;

use config::{AppConfig, DataLocation};
use state::AppState;
use storage::{FileStore, KeyValueStore, MemoryStore};

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("oneanddone=info,actix_web=info")),
        )
        .init();
}

fn cors(allowed_origin: Option<&str>) -> Cors {
    match allowed_origin {
        Some(origin) => Cors::default()
            .allowed_origin(origin)
            .allow_any_method()
            .allow_any_header(),
        None => Cors::permissive(),
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    init_logging();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!(error = %err, "invalid configuration");
            std::process::exit(1);
        }
    };

    let store: Box<dyn KeyValueStore> = match &config.data {
        DataLocation::Memory => {
            info!("keeping session data in memory only");
            Box::new(MemoryStore::new())
        }
        DataLocation::File(path) => {
            let store = FileStore::new(path);
            info!(path = %store.path().display(), "using session file");
            Box::new(store)
        }
    };
    let state = match AppState::load(store) {
        Ok(state) => web::Data::new(state),
        Err(err) => {
            error!(error = %err, "failed to load stored session");
            std::process::exit(1);
        }
    };

    info!(host = %config.host, port = config.port, "starting One&Done server");
    let allowed_origin = config.allowed_origin.clone();
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(cors(allowed_origin.as_deref()))
            .app_data(state.clone())
            .configure(routes::configure)
    })
    .bind((config.host.as_str(), config.port))?
    .run()
    .await
}
