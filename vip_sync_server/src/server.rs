use std::time::Duration;

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use infinitepay_tools::InfinitePayApi;
use log::*;
use tokio::sync::watch;
use vip_sync_engine::{EntitlementApi, LinkingApi, OrderFlowApi, OutboxApi, SqliteDatabase};

use crate::{
    config::{ServerConfig, ServerOptions},
    errors::ServerError,
    infinitepay_routes::{CheckoutFormRoute, CheckoutRoute, InfinitepayWebhookRoute},
    maintenance_worker::{start_maintenance_worker, MaintenanceSettings},
    middleware::ApiKeyMiddlewareFactory,
    routes::{bot_interactions, bot_ping, health, AckEventRoute, ApplyVipRoute, BotEventsRoute, RemoveVipRoute, VipStatusRoute},
    steam_openid::SteamOpenId,
    steam_routes::{SteamCallbackRoute, SteamLinkFormRoute, SteamLinkRoute},
};

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(format!("Could not connect to the database. {e}")))?;
    if config.migrate_on_startup {
        db.run_migrations().await.map_err(|e| ServerError::InitializeError(format!("Migrations failed. {e}")))?;
        info!("💾️ Database migrations are up to date");
    }
    let registry = config.registry.clone();
    let settings = MaintenanceSettings::from_config(&config);
    let srv = create_server_instance(config, db.clone())?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = start_maintenance_worker(db, registry, settings, shutdown_rx);
    let result = srv.await.map_err(|e| ServerError::Unspecified(e.to_string()));
    shutdown_tx.send(true).ok();
    if let Err(e) = worker.await {
        warn!("🕰️ The maintenance worker did not stop cleanly. {e}");
    }
    result
}

pub fn create_server_instance(config: ServerConfig, db: SqliteDatabase) -> Result<Server, ServerError> {
    let provider = InfinitePayApi::new(config.infinitepay.clone())
        .map_err(|e| ServerError::InitializeError(format!("Could not create the payment provider client. {e}")))?;
    let verifier = SteamOpenId::new(&config.base_url)
        .map_err(|e| ServerError::InitializeError(format!("Could not create the Steam OpenID client. {e}")))?;
    let options = ServerOptions::from_config(&config);
    let registry = config.registry.clone();
    let session_ttl = config.link_session_ttl;
    let bot_api_key = config.bot_api_key.clone();
    let plugin_api_token = config.plugin_api_token.clone();
    let webhook_secret = config.webhook_secret.clone();
    let srv = HttpServer::new(move || {
        let orders_api = OrderFlowApi::new(db.clone(), registry.clone());
        let entitlements_api = EntitlementApi::new(db.clone(), registry.clone());
        let outbox_api = OutboxApi::new(db.clone());
        let linking_api = LinkingApi::new(db.clone(), registry.clone(), session_ttl);
        let payments_scope = web::scope("/payments")
            .service(CheckoutRoute::<SqliteDatabase, InfinitePayApi>::new())
            .service(CheckoutFormRoute::<SqliteDatabase, InfinitePayApi>::new());
        let webhooks_scope = web::scope("/webhooks")
            .wrap(ApiKeyMiddlewareFactory::optional("x-webhook-secret", webhook_secret.clone()))
            .service(InfinitepayWebhookRoute::<SqliteDatabase>::new());
        let auth_scope = web::scope("/auth")
            .service(SteamLinkRoute::<SqliteDatabase, SteamOpenId>::new())
            .service(SteamLinkFormRoute::<SqliteDatabase, SteamOpenId>::new())
            .service(SteamCallbackRoute::<SqliteDatabase, SteamOpenId>::new());
        let bot_scope = web::scope("/bot")
            .wrap(ApiKeyMiddlewareFactory::required("x-api-key", bot_api_key.clone(), true))
            .service(BotEventsRoute::<SqliteDatabase>::new())
            .service(AckEventRoute::<SqliteDatabase>::new())
            .service(bot_ping)
            .service(bot_interactions);
        let plugin_scope = web::scope("/plugin")
            .wrap(ApiKeyMiddlewareFactory::required("x-api-token", plugin_api_token.clone(), false))
            .service(VipStatusRoute::<SqliteDatabase>::new())
            .service(ApplyVipRoute::<SqliteDatabase>::new())
            .service(RemoveVipRoute::<SqliteDatabase>::new());
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("vss::access_log"))
            .app_data(web::Data::new(orders_api))
            .app_data(web::Data::new(entitlements_api))
            .app_data(web::Data::new(outbox_api))
            .app_data(web::Data::new(linking_api))
            .app_data(web::Data::new(provider.clone()))
            .app_data(web::Data::new(verifier.clone()))
            .app_data(web::Data::new(options.clone()))
            .service(health)
            .service(payments_scope)
            .service(webhooks_scope)
            .service(auth_scope)
            .service(bot_scope)
            .service(plugin_scope)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}
