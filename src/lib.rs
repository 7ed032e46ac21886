pub mod application;
pub mod config;
pub mod db;
pub mod domain;
pub mod errors;
pub mod handlers;
pub mod infrastructure;
pub mod scanner;
pub mod schema;

use std::sync::Arc;

use actix_web::{middleware::Logger, web, App, HttpServer};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use application::checkout::{CheckoutConfig, CheckoutOrchestrator};
use application::redemption::RedemptionService;
use application::retry::RetryPolicy;
use config::AppConfig;
use domain::ports::PaymentGateway;
use infrastructure::order_repo::DieselOrderRepository;
use infrastructure::payment::HttpPaymentGateway;
use infrastructure::redemption_store::DieselRedemptionStore;

pub use db::{create_pool, DbPool};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

pub type AppCheckout = CheckoutOrchestrator<DieselOrderRepository>;
pub type AppRedemption = RedemptionService<DieselRedemptionStore>;

/// Run any pending Diesel migrations against the pool's database.
pub fn run_migrations(pool: &DbPool) {
    let mut conn = pool.get().expect("Failed to get DB connection for migrations");
    conn.run_pending_migrations(MIGRATIONS)
        .expect("Failed to run database migrations");
}

pub fn build_checkout(pool: &DbPool, config: &AppConfig) -> AppCheckout {
    let gateway: Arc<dyn PaymentGateway> = Arc::new(HttpPaymentGateway::new(
        config.payment_base_url.clone(),
        config.payment_secret_key.clone(),
        config.min_charge_minor,
    ));
    CheckoutOrchestrator::new(
        DieselOrderRepository::new(pool.clone()),
        gateway,
        RetryPolicy::default(),
        CheckoutConfig {
            currency: config.currency.clone(),
            pending_ttl: config.pending_order_ttl,
        },
    )
}

pub fn build_redemption(pool: &DbPool, config: &AppConfig) -> AppRedemption {
    RedemptionService::new(
        DieselRedemptionStore::new(pool.clone()),
        RetryPolicy::default(),
        config.gate_token.clone(),
    )
}

/// Build and return an actix-web `Server` bound to the configured host:port.
///
/// The caller is responsible for `.await`-ing (or `tokio::spawn`-ing) the
/// returned server.
pub fn build_server(
    pool: DbPool,
    config: &AppConfig,
) -> std::io::Result<actix_web::dev::Server> {
    let checkout = build_checkout(&pool, config);
    let redemption = build_redemption(&pool, config);
    let host = config.host.clone();
    let port = config.port;

    Ok(HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(pool.clone()))
            .app_data(web::Data::new(checkout.clone()))
            .app_data(web::Data::new(redemption.clone()))
            .wrap(Logger::default())
            .service(web::scope("/events").route(
                "/{id}/availability",
                web::get().to(handlers::availability::event_availability),
            ))
            .service(
                web::resource("/checkout")
                    .route(web::post().to(handlers::checkout::create_checkout)),
            )
            .service(
                web::scope("/orders")
                    .route("/{id}", web::get().to(handlers::checkout::get_order)),
            )
            .service(
                web::scope("/payments")
                    .route("/webhook", web::post().to(handlers::payments::payment_webhook)),
            )
            .service(
                web::scope("/admin")
                    .route("/verify-ticket", web::post().to(handlers::verify::verify_ticket)),
            )
            .service(
                SwaggerUi::new("/docs/{_:.*}")
                    .url("/api-docs/openapi.json", handlers::ApiDoc::openapi()),
            )
    })
    .bind((host, port))?
    .run())
}
