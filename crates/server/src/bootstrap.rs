use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::Mutex;
use tracing::{info, warn};

use intake_chat::{BotApiTransport, SessionRouter, TransportSink};
use intake_core::config::AppConfig;
use intake_store::{AccessRegistry, HttpRecordStore, StoreCatalog, StoreVault};

use crate::reconcile::{Reconciler, SharedSnapshot};
use crate::session::SessionService;

pub type Sessions =
    SessionService<StoreCatalog<HttpRecordStore>, StoreVault<HttpRecordStore>, BotApiTransport>;

/// Fully wired runtime. Construction performs the one-time registry load but
/// starts no loops; main decides what runs.
pub struct Application {
    pub config: AppConfig,
    pub registry: Arc<AccessRegistry>,
    pub transport: Arc<BotApiTransport>,
    pub sessions: Arc<Sessions>,
    pub reconciler: Arc<Reconciler<StoreVault<HttpRecordStore>, TransportSink<BotApiTransport>>>,
    pub router: SessionRouter,
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application> {
    let store = Arc::new(
        HttpRecordStore::new(&config.store).context("failed to build the record store client")?,
    );
    let transport = Arc::new(
        BotApiTransport::new(&config.chat).context("failed to build the chat transport")?,
    );

    let registry = Arc::new(AccessRegistry::load(store.as_ref(), &config.store.users_table).await);
    if registry.is_empty() {
        // Not fatal: the health endpoint reports it and a restart reloads.
        warn!(
            event_name = "system.bootstrap.empty_registry",
            correlation_id = "bootstrap",
            "no accounts loaded, every chat identity will be denied"
        );
    }

    let catalog = Arc::new(StoreCatalog::new(Arc::clone(&store), &config.store.products_table));
    let vault = Arc::new(StoreVault::new(Arc::clone(&store), &config.store));
    let snapshot: SharedSnapshot = Arc::new(Mutex::new(Default::default()));

    let sessions = Arc::new(SessionService::new(
        Arc::clone(&registry),
        catalog,
        Arc::clone(&vault),
        Arc::clone(&transport),
        Arc::clone(&snapshot),
        config.chat.admin_chat_id.clone(),
    ));

    let sink = Arc::new(TransportSink::new(Arc::clone(&transport)));
    let reconciler = Arc::new(Reconciler::new(
        vault,
        sink,
        snapshot,
        Duration::from_secs(config.reconcile.interval_secs),
    ));

    info!(
        event_name = "system.bootstrap.complete",
        correlation_id = "bootstrap",
        accounts = registry.len(),
        "application wired"
    );

    Ok(Application {
        config,
        registry,
        transport,
        sessions,
        reconciler,
        router: SessionRouter::new(),
    })
}
