use std::sync::Arc;

use actix_cors::Cors;
use actix_web::middleware::Logger;
use actix_web::{web, App, HttpServer};

use ble_escpos::radio::BtleRadio;
use ble_escpos::{routes, AppConfig, DeviceConnector, PrintSession, RetryScheduler};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::from_env()?;
    log::debug!("{:?}", config);

    let radio = Arc::new(BtleRadio::new().await?);
    let connector = DeviceConnector::new(radio, config.identity.clone(), config.connect_timeout);
    let session = Arc::new(PrintSession::new(connector));

    let scheduler = RetryScheduler::new(session.clone(), config.retry_backoff);
    let shutdown = scheduler.token();
    let retry = scheduler.spawn();

    let data = web::Data::from(session.clone());
    let server = HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .app_data(routes::json_config())
            .wrap(Logger::default())
            .wrap(Cors::permissive())
            .configure(routes::configure::<BtleRadio>)
    })
    .bind((config.bind_address.as_str(), config.port))?;

    log::info!("Server running on http://{}:{}", config.bind_address, config.port);
    log::info!("  Status:  GET  /api/status");
    log::info!("  Print:   POST /api/print/text | /api/print/qr | /api/print/barcode");

    // resolves after ctrl-c once in-flight requests are done
    server.run().await?;

    shutdown.cancel();
    if let Err(e) = retry.await {
        log::warn!("retry task ended abnormally: {}", e);
    }
    session.connector().disconnect().await;

    Ok(())
}
