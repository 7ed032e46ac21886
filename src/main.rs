use dotenvy::dotenv;
use gatewave_service::config::AppConfig;
use gatewave_service::{build_checkout, build_server, create_pool, run_migrations};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let config = AppConfig::from_env().expect("Invalid configuration");

    let pool = create_pool(&config.database_url);
    run_migrations(&pool);

    // Background sweep: reclaim capacity held by abandoned pending orders.
    let sweeper = build_checkout(&pool, &config);
    let sweep_interval = config.sweep_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        ticker.tick().await; // the first tick completes immediately
        loop {
            ticker.tick().await;
            match sweeper.expire_abandoned().await {
                Ok(0) => {}
                Ok(reclaimed) => {
                    log::info!("sweep: reclaimed {reclaimed} abandoned pending order(s)")
                }
                Err(e) => log::error!("sweep failed: {e}"),
            }
        }
    });

    log::info!("Starting server at http://{}:{}", config.host, config.port);

    build_server(pool, &config)?.await
}
