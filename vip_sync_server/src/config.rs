use std::env;

use chrono::Duration;
use infinitepay_tools::InfinitePayConfig;
use log::*;
use vip_sync_engine::db_types::{ServerRegistry, VipTier};
use vss_common::{parse_boolean_flag, Price, Secret};

const DEFAULT_VSS_HOST: &str = "127.0.0.1";
const DEFAULT_VSS_PORT: u16 = 8360;
const DEFAULT_VSS_DATABASE_URL: &str = "sqlite://data/vip_sync.db";
const DEFAULT_VSS_SERVERS: &str = "server1,server2";
const DEFAULT_VIP_PRICE_CENTS: i64 = 2990;
const DEFAULT_VIP_PLUS_PRICE_CENTS: i64 = 4990;
const DEFAULT_SWEEP_INTERVAL: std::time::Duration = std::time::Duration::from_secs(60);
const DEFAULT_LINK_SESSION_TTL: Duration = Duration::minutes(15);
const DEFAULT_OUTBOX_RETENTION: Duration = Duration::days(30);

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// The public base URL of this deployment, e.g. `https://vip.example.com`. Used to build the
    /// payment webhook URL and the Steam OpenID return URL, so it must be reachable from outside.
    pub base_url: String,
    pub database_url: String,
    /// The closed set of game servers this deployment manages. Requests naming any other server
    /// are rejected.
    pub registry: ServerRegistry,
    /// The static key the Discord bot presents on `/bot` endpoints. When no key is configured,
    /// every request on the scope is rejected.
    pub bot_api_key: Secret<String>,
    /// The static token the game-server plugins present on `/plugin` endpoints. Falls back to the
    /// bot key when not set separately.
    pub plugin_api_token: Secret<String>,
    /// When set, incoming payment webhooks must carry this value in `x-webhook-secret`. When
    /// unset, the check is skipped.
    pub webhook_secret: Option<Secret<String>>,
    pub prices: PriceTable,
    /// How often the maintenance worker runs the expiry sweep and housekeeping jobs.
    pub sweep_interval: std::time::Duration,
    /// How long a Steam linking session stays valid before it can no longer be consumed.
    pub link_session_ttl: Duration,
    /// How long acknowledged outbox events are kept before being purged.
    pub outbox_retention: Duration,
    pub migrate_on_startup: bool,
    /// Payment provider configuration
    pub infinitepay: InfinitePayConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_VSS_HOST.to_string(),
            port: DEFAULT_VSS_PORT,
            base_url: format!("http://{DEFAULT_VSS_HOST}:{DEFAULT_VSS_PORT}"),
            database_url: DEFAULT_VSS_DATABASE_URL.to_string(),
            registry: ServerRegistry::from_csv(DEFAULT_VSS_SERVERS),
            bot_api_key: Secret::default(),
            plugin_api_token: Secret::default(),
            webhook_secret: None,
            prices: PriceTable::default(),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            link_session_ttl: DEFAULT_LINK_SESSION_TTL,
            outbox_retention: DEFAULT_OUTBOX_RETENTION,
            migrate_on_startup: true,
            infinitepay: InfinitePayConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, base_url: format!("http://{host}:{port}"), ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("VSS_HOST").ok().unwrap_or_else(|| DEFAULT_VSS_HOST.into());
        let port = env::var("VSS_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for VSS_PORT. {e} Using the default, {DEFAULT_VSS_PORT}, instead."
                    );
                    DEFAULT_VSS_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_VSS_PORT);
        let base_url = env::var("VSS_BASE_URL").ok().map(|s| s.trim_end_matches('/').to_string()).unwrap_or_else(|| {
            warn!(
                "🪛️ VSS_BASE_URL is not set. Falling back to http://{host}:{port}. Payment webhooks and Steam logins \
                 will not reach this server unless that URL is publicly routable."
            );
            format!("http://{host}:{port}")
        });
        let database_url = env::var("VSS_DATABASE_URL").ok().unwrap_or_else(|| {
            info!("🪛️ VSS_DATABASE_URL is not set. Using the default, {DEFAULT_VSS_DATABASE_URL}.");
            DEFAULT_VSS_DATABASE_URL.to_string()
        });
        let registry = configure_registry();
        let bot_api_key = env::var("VSS_BOT_API_KEY").map(|s| s.trim().to_string()).ok().unwrap_or_else(|| {
            error!("🪛️ VSS_BOT_API_KEY is not set. All bot endpoints will reject requests until it is configured.");
            String::default()
        });
        let plugin_api_token =
            env::var("VSS_PLUGIN_API_TOKEN").map(|s| s.trim().to_string()).ok().unwrap_or_else(|| {
                info!("🪛️ VSS_PLUGIN_API_TOKEN is not set. The plugin endpoints will accept the bot API key.");
                bot_api_key.clone()
            });
        let webhook_secret = match env::var("VSS_WEBHOOK_SECRET") {
            Ok(s) if !s.trim().is_empty() => Some(Secret::new(s.trim().to_string())),
            _ => {
                warn!(
                    "🪛️ VSS_WEBHOOK_SECRET is not set. Incoming payment webhooks will NOT be authenticated. Set it \
                     to the shared secret configured with the payment provider."
                );
                None
            },
        };
        let prices = PriceTable::from_env_or_default();
        let sweep_interval = env::var("VSS_SWEEP_INTERVAL_SECS")
            .map_err(|_| info!("🪛️ VSS_SWEEP_INTERVAL_SECS is not set. Using the default value of 60s."))
            .and_then(|s| {
                s.parse::<u64>()
                    .map(std::time::Duration::from_secs)
                    .map_err(|e| warn!("🪛️ Invalid configuration value for VSS_SWEEP_INTERVAL_SECS. {e}"))
            })
            .ok()
            .unwrap_or(DEFAULT_SWEEP_INTERVAL);
        let link_session_ttl = env::var("VSS_LINK_SESSION_TTL_MINS")
            .map_err(|_| {
                info!(
                    "🪛️ VSS_LINK_SESSION_TTL_MINS is not set. Using the default value of {} mins.",
                    DEFAULT_LINK_SESSION_TTL.num_minutes()
                )
            })
            .and_then(|s| {
                s.parse::<i64>()
                    .map(Duration::minutes)
                    .map_err(|e| warn!("🪛️ Invalid configuration value for VSS_LINK_SESSION_TTL_MINS. {e}"))
            })
            .ok()
            .unwrap_or(DEFAULT_LINK_SESSION_TTL);
        let outbox_retention = env::var("VSS_OUTBOX_RETENTION_DAYS")
            .map_err(|_| {
                info!(
                    "🪛️ VSS_OUTBOX_RETENTION_DAYS is not set. Using the default value of {} days.",
                    DEFAULT_OUTBOX_RETENTION.num_days()
                )
            })
            .and_then(|s| {
                s.parse::<i64>()
                    .map(Duration::days)
                    .map_err(|e| warn!("🪛️ Invalid configuration value for VSS_OUTBOX_RETENTION_DAYS. {e}"))
            })
            .ok()
            .unwrap_or(DEFAULT_OUTBOX_RETENTION);
        let migrate_on_startup = parse_boolean_flag(env::var("VSS_MIGRATE_ON_STARTUP").ok(), true);
        let infinitepay = InfinitePayConfig::new_from_env_or_default();
        Self {
            host,
            port,
            base_url,
            database_url,
            registry,
            bot_api_key: Secret::new(bot_api_key),
            plugin_api_token: Secret::new(plugin_api_token),
            webhook_secret,
            prices,
            sweep_interval,
            link_session_ttl,
            outbox_retention,
            migrate_on_startup,
            infinitepay,
        }
    }
}

fn configure_registry() -> ServerRegistry {
    let registry = env::var("VSS_SERVERS")
        .map(|s| ServerRegistry::from_csv(&s))
        .map_err(|_| {
            info!("🪛️ VSS_SERVERS is not set. Using the default registry, [{DEFAULT_VSS_SERVERS}].");
        })
        .ok()
        .unwrap_or_else(|| ServerRegistry::from_csv(DEFAULT_VSS_SERVERS));
    if registry.is_empty() {
        warn!(
            "🚨️ The server registry is empty. The server will run, but every checkout, status and linking request \
             will be rejected. Set VSS_SERVERS to a comma-separated list of server ids."
        );
    } else {
        info!("🪛️ Managing VIP entitlements for servers {registry}");
    }
    registry
}

/// The per-tier checkout prices, in BRL.
#[derive(Clone, Copy, Debug)]
pub struct PriceTable {
    pub vip: Price,
    pub vip_plus: Price,
}

impl Default for PriceTable {
    fn default() -> Self {
        Self { vip: Price::from_cents(DEFAULT_VIP_PRICE_CENTS), vip_plus: Price::from_cents(DEFAULT_VIP_PLUS_PRICE_CENTS) }
    }
}

impl PriceTable {
    pub fn from_env_or_default() -> Self {
        let vip = price_from_env("VSS_VIP_PRICE", Price::from_cents(DEFAULT_VIP_PRICE_CENTS));
        let vip_plus = price_from_env("VSS_VIP_PLUS_PRICE", Price::from_cents(DEFAULT_VIP_PLUS_PRICE_CENTS));
        Self { vip, vip_plus }
    }

    pub fn price_for(&self, tier: VipTier) -> Price {
        match tier {
            VipTier::Vip => self.vip,
            VipTier::VipPlus => self.vip_plus,
        }
    }
}

fn price_from_env(var: &str, default: Price) -> Price {
    env::var(var)
        .map_err(|_| info!("🪛️ {var} is not set. Using the default price of {default}."))
        .and_then(|s| s.parse::<Price>().map_err(|e| warn!("🪛️ Invalid price in {var}. {e}")))
        .ok()
        .unwrap_or(default)
}

/// A subset of the server configuration that gets passed to request handlers. We keep this as
/// small as possible and exclude secrets, to avoid passing sensitive information around the
/// system.
#[derive(Clone, Debug)]
pub struct ServerOptions {
    pub base_url: String,
    pub prices: PriceTable,
}

impl ServerOptions {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self { base_url: config.base_url.clone(), prices: config.prices }
    }

    /// The URL the payment provider posts status updates to.
    pub fn webhook_url(&self) -> String {
        format!("{}/webhooks/infinitepay", self.base_url)
    }

    /// The page the player lands on after completing payment, unless the checkout request
    /// supplies its own.
    pub fn default_redirect_url(&self) -> String {
        format!("{}/payment/success", self.base_url)
    }

    /// The URL Steam redirects back to after a login, carrying the OpenID assertion.
    pub fn steam_return_url(&self, session_id: &str) -> String {
        format!("{}/auth/steam/callback?sessionId={session_id}", self.base_url)
    }
}
