// src/main.rs

use std::io;
use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{http, middleware::Logger, web, App, HttpServer};
use env_logger::Env;
use log::{error, info, warn};

use taskbuddy::app_state::AppState;
use taskbuddy::auth::Authentication;
use taskbuddy::config::Config;
use taskbuddy::error::Error;
use taskbuddy::routes;
use taskbuddy::store::{DocumentStore, MemoryStore, MongoStore};

fn to_io(e: Error) -> io::Error {
    io::Error::new(io::ErrorKind::Other, e.to_string())
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = Config::from_env().map_err(|e| {
        error!("{}", e);
        to_io(e)
    })?;

    let store: Arc<dyn DocumentStore> = match &config.mongo_uri {
        Some(uri) => Arc::new(
            MongoStore::init(uri, &config.database_name)
                .await
                .map_err(to_io)?,
        ),
        None => {
            warn!("MONGO_URI not set; using the in-memory store, data is lost on exit");
            Arc::new(MemoryStore::new())
        }
    };
    let state = AppState::new(store);

    info!("Server running at http://{}", config.bind_addr);
    info!("Allowed CORS Origin: {}", config.frontend_origin);

    let frontend_origin = config.frontend_origin.clone();
    let jwt_secret = config.jwt_secret.clone();
    HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&frontend_origin)
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .allowed_headers(vec![
                http::header::CONTENT_TYPE,
                http::header::ACCEPT,
                http::header::AUTHORIZATION,
            ])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .wrap(Authentication::new(jwt_secret.clone()))
            .wrap(cors)
            .wrap(Logger::default())
            .app_data(web::Data::new(state.clone()))
            .configure(routes)
    })
    .bind(&config.bind_addr)?
    .run()
    .await
}
