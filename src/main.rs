use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};

use flexpass_membership_service::auth::TokenSettings;
use flexpass_membership_service::clients::notifications::NotificationClient;
use flexpass_membership_service::config::AppConfig;
use flexpass_membership_service::configure_api;
use flexpass_membership_service::database::Database;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = AppConfig::from_env().map_err(|err| {
        log::error!("Invalid configuration: {err}");
        std::io::Error::new(std::io::ErrorKind::InvalidInput, err.to_string())
    })?;
    let bind_address = config.bind_address();

    let db = Database::connect(&config.database_url, config.db_max_connections)
        .await
        .map_err(|err| {
            log::error!("Failed to initialize database: {err:?}");
            std::io::Error::new(std::io::ErrorKind::Other, err)
        })?;

    match db.seed_reward_catalog().await {
        Ok(0) => log::info!("Reward catalog up to date"),
        Ok(inserted) => log::info!("Seeded {inserted} reward catalog entries"),
        Err(err) => log::error!("Failed to seed reward catalog: {err:?}"),
    }

    let notifier = NotificationClient::new(config.notification_service_url.clone());
    if !notifier.is_enabled() {
        log::warn!("NOTIFICATION_SERVICE_URL not set, reward notifications disabled");
    }

    let db_data = web::Data::new(db);
    let token_data = web::Data::new(TokenSettings::new(
        config.jwt_secret.clone(),
        config.jwt_expiration_hours,
    ));
    let notifier_data = web::Data::new(notifier);

    log::info!("🚀 Starting FlexPass Membership Service on {}", bind_address);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(db_data.clone())
            .app_data(token_data.clone())
            .app_data(notifier_data.clone())
            .wrap(cors)
            .wrap(Logger::default())
            .configure(configure_api)
    })
    .bind(&bind_address)?
    .run()
    .await
}
