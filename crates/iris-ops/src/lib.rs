//! Operational helpers: logging, session journaling, journal export.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use iris_types::{config::OpsConfig, events::SessionEvent, IrisError, Result};
use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

pub fn init_tracing(config: &OpsConfig) -> Result<()> {
    let filter = EnvFilter::try_new(config.log_level.clone())
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|err| IrisError::Ops(format!("failed to create log filter: {err}")))?;

    fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|err| IrisError::Ops(format!("tracing init error: {err}")))?;
    Ok(())
}

/// In-memory journal of everything a session did, exportable for replay.
#[derive(Clone, Default)]
pub struct SessionJournal {
    events: Arc<Mutex<Vec<SessionEvent>>>,
}

impl SessionJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, event: SessionEvent) {
        self.events.lock().await.push(event);
    }

    pub async fn snapshot(&self) -> Vec<SessionEvent> {
        self.events.lock().await.clone()
    }

    /// Write the journal as pretty JSON under the given directory, named by
    /// export time. Returns the path written.
    pub async fn export<P: AsRef<Path>>(&self, dir: P) -> Result<PathBuf> {
        let dir = ensure_journal_dir(dir.as_ref())?;
        let events = self.snapshot().await;
        let stamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
        let path = dir.join(format!("session_{stamp}.json"));
        let doc = serde_json::to_vec_pretty(&events)
            .map_err(|err| IrisError::Ops(format!("failed to serialize journal: {err}")))?;
        std::fs::write(&path, doc)
            .map_err(|err| IrisError::Ops(format!("failed to write journal: {err}")))?;
        info!("Journal exported to {:?}", path);
        Ok(path)
    }
}

pub fn ensure_journal_dir(path: &Path) -> Result<PathBuf> {
    let dir = PathBuf::from(path);
    std::fs::create_dir_all(&dir)
        .map_err(|err| IrisError::Ops(format!("failed to create journal dir: {err}")))?;
    Ok(dir)
}
