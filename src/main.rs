use std::sync::Arc;
use std::thread::JoinHandle;

use actix_web::middleware::NormalizePath;
use actix_web::web::Data;
use actix_web::{App, HttpServer};
use dotenvy::dotenv;

mod api;
mod config;
mod db;
mod docs;
mod error;
mod model;
mod reader;
mod routes;
mod scheduler;
mod service;
mod store;
mod utils;

use config::Config;
use db::init_db;

use crate::docs::ApiDoc;
use crate::reader::ingest::{UidSink, scan_channel, spawn_scan_consumer};
use crate::reader::poller::CardReaderPoller;
use crate::scheduler::DailyScheduler;
use crate::service::attendance::AttendanceService;
use crate::service::calendar::HolidayCalendar;
use crate::service::catch_up::run_startup_catch_up;
use crate::service::reconciler::DailyReconciler;
use crate::service::resolver::EnrollmentResolver;
use crate::store::Stores;
use crate::utils::clock::{Clock, SystemClock};
use crate::utils::keyed_lock::KeyedLocks;
use crate::utils::shutdown::Shutdown;
use tracing::{info, warn};
use tracing_appender::rolling;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = Config::from_env()?;

    // Rolling daily log
    let file_appender = rolling::daily(&config.log_dir, "fichajes.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_max_level(config.log_level)
        .with_ansi(false)
        .with_target(false)
        .with_level(true)
        .with_thread_names(true)
        .init();

    info!(addr = %config.server_addr, "Server starting...");

    let pool = init_db(&config.database_url).await?;
    let stores = Stores::mysql(pool);

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let locks = Arc::new(KeyedLocks::new());
    let calendar = Arc::new(HolidayCalendar::new(stores.holidays.clone()));
    let resolver = Arc::new(EnrollmentResolver::new(
        stores.enrollments.clone(),
        config.enrollment_cache_ttl,
    ));
    let service = Arc::new(AttendanceService::new(
        stores.attendance.clone(),
        resolver,
        clock.clone(),
        locks.clone(),
    ));
    let reconciler = Arc::new(DailyReconciler::new(
        stores.attendance.clone(),
        stores.enrollments.clone(),
        calendar,
        clock,
        locks,
    ));

    // before the reader can deliver anything
    run_startup_catch_up(&reconciler, &config.holidays_file, &config.vacations_file).await;

    let shutdown = Shutdown::new();
    let (sink, scans, last_uid) = scan_channel();
    let _reader = start_reader(&config, sink, shutdown.clone())?;
    let consumer = spawn_scan_consumer(scans, service.clone(), shutdown.clone());
    let scheduler = DailyScheduler::new(
        reconciler.clone(),
        config.reconcile_at,
        config.holidays_file.clone(),
        config.vacations_file.clone(),
    )
    .spawn(shutdown.clone());

    let server_addr = config.server_addr.clone();
    let holidays = stores.holidays.clone();

    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .wrap(NormalizePath::trim())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}") // ← wildcard {_:.*} to match JS/CSS files
                    .url("/api-doc/openapi.json", ApiDoc::openapi()),
            )
            .app_data(Data::from(service.clone()))
            .app_data(Data::from(reconciler.clone()))
            .app_data(Data::from(holidays.clone()))
            .app_data(Data::new(last_uid.clone()))
            .configure(|cfg| routes::configure(cfg, &config))
    })
    .bind(server_addr)?
    .run()
    .await?;

    shutdown.trigger();
    if let Err(e) = consumer.await {
        warn!(error = %e, "Scan consumer ended abnormally");
    }
    if let Err(e) = scheduler.await {
        warn!(error = %e, "Daily scheduler ended abnormally");
    }
    info!("Server stopped");
    Ok(())
}

/// Starts the poller thread; without the `pcsc` feature it idles on [`NoReader`].
///
/// [`NoReader`]: crate::reader::NoReader
fn start_reader(
    config: &Config,
    sink: UidSink,
    shutdown: Shutdown,
) -> std::io::Result<Option<JoinHandle<()>>> {
    if !config.reader_enabled {
        info!("Card reader disabled by configuration");
        return Ok(None);
    }

    #[cfg(feature = "pcsc")]
    let reader = crate::reader::pcsc::PcscReader::new();
    #[cfg(not(feature = "pcsc"))]
    let reader = {
        warn!("Built without the pcsc feature, no card reader backend");
        crate::reader::NoReader
    };

    CardReaderPoller::new(reader, sink, shutdown).spawn().map(Some)
}
