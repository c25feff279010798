//! Herbwise personalization service
//!
//! Port: 8082

use actix_web::{App, HttpServer};
use anyhow::Context;
use herbwise_core::{init_logging, load_dotenv, ConfigLoader, LogConfig, ServiceConfig};
use herbwise_personalization::http::{configure_routes, SERVICE_NAME};
use herbwise_personalization::PersonalizationConfig;
use tracing::info;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    let log_config = LogConfig::from_env()
        .context("invalid logging configuration")?
        .with_service_name(SERVICE_NAME);
    init_logging(&log_config).context("failed to initialize logging")?;

    let service_config = ServiceConfig::from_env().context("failed to load service config")?;
    service_config
        .validate()
        .context("invalid service configuration")?;

    let personalization_config = PersonalizationConfig::from_env()
        .context("failed to load personalization config")?;
    personalization_config
        .validate()
        .context("invalid personalization configuration")?;

    info!(
        host = %service_config.host,
        port = service_config.port,
        workers = service_config.workers,
        default_limit = personalization_config.default_limit,
        max_limit = personalization_config.max_limit,
        "Starting personalization service"
    );

    HttpServer::new(|| App::new().configure(configure_routes))
        .workers(service_config.workers)
        .client_request_timeout(service_config.request_timeout)
        .bind((service_config.host.as_str(), service_config.port))
        .with_context(|| {
            format!(
                "failed to bind {}:{}",
                service_config.host, service_config.port
            )
        })?
        .run()
        .await
        .context("HTTP server error")?;

    Ok(())
}
