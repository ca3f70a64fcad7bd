mod config;
mod intake;
mod model;
mod routes;

use actix_web::middleware::Logger;
use actix_web::{web, App, HttpServer};
use config::{AppConfig, LoggingConfig};
use intake::IntakePipeline;
use model::{Classifier, RandomClassifier};
use routes::{configure_routes, cors_policy};
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::io::{self, Write};
use std::sync::Arc;

#[actix_web::main]
async fn main() -> io::Result<()> {
    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            init_logging(&LoggingConfig::default())?;
            log::error!("Failed to load configuration: {}", e);
            return Err(io::Error::new(io::ErrorKind::InvalidInput, e.to_string()));
        }
    };
    init_logging(&config.logging)?;

    let classifier: Arc<dyn Classifier> = Arc::new(RandomClassifier::new(config.classifier.seed));
    if config.classifier.seed.is_some() {
        log::info!("Classifier seeded for reproducible results");
    }

    let pipeline = IntakePipeline::new(&config.intake, classifier)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;
    let pipeline = web::Data::new(pipeline);

    log::info!(
        "Upload limit {} bytes, max dimension {}px, formats {:?}",
        config.intake.max_upload_bytes,
        config.intake.max_dimension,
        config.intake.allowed_formats
    );

    let bind_address = config.bind_address();
    let cors_origins = config.server.cors_origins.clone();
    log::info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(cors_policy(&cors_origins))
            .app_data(pipeline.clone())
            .configure(configure_routes)
    })
    .bind(&bind_address)?
    .run()
    .await
}

fn init_logging(logging: &LoggingConfig) -> io::Result<()> {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::new().default_filter_or("info"));

    if let Some(path) = &logging.file {
        builder.target(env_logger::Target::Pipe(Box::new(StderrAndFile::open(path)?)));
    }

    builder
        .try_init()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))
}

/// Log sink that mirrors every record to stderr and the configured file.
struct StderrAndFile {
    file: File,
}

impl StderrAndFile {
    fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file })
    }
}

impl Write for StderrAndFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        self.file.flush()
    }
}
