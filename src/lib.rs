pub mod config;
pub mod error;
pub mod identity;
pub mod notify;
pub mod rest;
pub mod storage;
pub mod tasks;

use std::sync::Arc;

use anyhow::Result;
use config::DaemonConfig;
use identity::Identity;
use notify::Notifier;
use storage::Storage;
use tasks::{TaskEngine, TaskStorage};

/// Shared application state passed to every REST handler.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<DaemonConfig>,
    pub storage: Arc<Storage>,
    pub identity: Identity,
    pub engine: TaskEngine,
    pub notifier: Notifier,
    pub started_at: std::time::Instant,
}

impl AppContext {
    /// Wire storage, identity, the task engine, and the notifier together.
    pub async fn init(config: Arc<DaemonConfig>) -> Result<Self> {
        let storage = Arc::new(
            Storage::new_with_slow_query(
                &config.data_dir,
                config.observability.slow_query_threshold_ms,
            )
            .await?,
        );
        Ok(Self::assemble(config, storage))
    }

    /// Same wiring over an already-open store (in-memory in tests).
    pub fn assemble(config: Arc<DaemonConfig>, storage: Arc<Storage>) -> Self {
        let notifier = notify::spawn(config.notify.clone());
        let identity = Identity::new(storage.clone(), config.clone(), notifier.clone());
        let task_storage = Arc::new(TaskStorage::new(storage.pool()));
        let engine = TaskEngine::new(task_storage, storage.clone(), notifier.clone());

        Self {
            config,
            storage,
            identity,
            engine,
            notifier,
            started_at: std::time::Instant::now(),
        }
    }
}
