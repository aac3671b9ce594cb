use std::sync::Arc;

use chrono::Utc;
use log::*;
use tokio::{sync::watch, task::JoinHandle, time::MissedTickBehavior};
use vip_sync_engine::{db_types::ServerRegistry, LinkingApi, OrderFlowApi, OutboxApi, SqliteDatabase};

use crate::config::ServerConfig;

/// The knobs the maintenance worker needs from the server configuration.
#[derive(Clone, Copy, Debug)]
pub struct MaintenanceSettings {
    pub interval: std::time::Duration,
    pub session_ttl: chrono::Duration,
    pub outbox_retention: chrono::Duration,
}

impl MaintenanceSettings {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            interval: config.sweep_interval,
            session_ttl: config.link_session_ttl,
            outbox_retention: config.outbox_retention,
        }
    }
}

struct MaintenanceJobs {
    orders: OrderFlowApi<SqliteDatabase>,
    linking: LinkingApi<SqliteDatabase>,
    outbox: OutboxApi<SqliteDatabase>,
    outbox_retention: chrono::Duration,
}

/// Starts the maintenance worker.
///
/// Every tick runs the VIP expiry sweep, prunes stale linking sessions and purges acknowledged
/// outbox events past their retention window. A run that outlasts the interval makes the next
/// tick a no-op instead of stacking a second run. The worker stops once `shutdown` flips to
/// true, letting any in-flight run finish first.
pub fn start_maintenance_worker(
    db: SqliteDatabase,
    registry: ServerRegistry,
    settings: MaintenanceSettings,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(settings.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let jobs = Arc::new(MaintenanceJobs {
            orders: OrderFlowApi::new(db.clone(), registry.clone()),
            linking: LinkingApi::new(db.clone(), registry, settings.session_ttl),
            outbox: OutboxApi::new(db),
            outbox_retention: settings.outbox_retention,
        });
        let running = Arc::new(tokio::sync::Mutex::new(()));
        info!("🕰️ Maintenance worker started, running every {:?}", settings.interval);
        loop {
            tokio::select! {
                _ = timer.tick() => {},
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                },
            }
            match Arc::clone(&running).try_lock_owned() {
                Ok(guard) => {
                    let jobs = Arc::clone(&jobs);
                    tokio::spawn(async move {
                        let _guard = guard;
                        run_maintenance(&jobs).await;
                    });
                },
                Err(_) => {
                    warn!("🕰️ The previous maintenance run has not finished. Skipping this tick.");
                },
            }
        }
        // Let an in-flight run finish before reporting the worker stopped
        let _guard = running.lock().await;
        info!("🕰️ Maintenance worker stopped");
    })
}

async fn run_maintenance(jobs: &MaintenanceJobs) {
    trace!("🕰️ Running maintenance jobs");
    let result = jobs.orders.expire_sweep(Utc::now()).await;
    if result.demoted_count() > 0 {
        info!("🕰️ {} lapsed VIP grant(s) demoted", result.demoted_count());
    }
    for (server_id, error) in &result.failures {
        error!("🕰️ Expiry sweep failed on {server_id}: {error}");
    }
    match jobs.linking.prune().await {
        Ok(0) => {},
        Ok(n) => debug!("🕰️ Pruned {n} stale linking session(s)"),
        Err(e) => error!("🕰️ Error pruning linking sessions: {e}"),
    }
    match jobs.outbox.purge_processed(jobs.outbox_retention).await {
        Ok(0) => {},
        Ok(n) => debug!("🕰️ Purged {n} acknowledged event(s) past the retention window"),
        Err(e) => error!("🕰️ Error purging the outbox: {e}"),
    }
}
