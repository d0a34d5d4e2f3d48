use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use anyhow::Context;
use serde::Deserialize;
use tracing::info;

use crate::config::Settings;
use crate::db;
use crate::engine::LessonEngine;
use crate::gateway::Gateway;
use crate::remote::{HttpRemote, OfflineRemote, RemoteStore};
use crate::tags::TagStore;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

/// Everything bound to one open workspace.
pub struct Session {
    pub workspace: PathBuf,
    pub engine: LessonEngine,
    pub tags: TagStore,
}

pub struct AppState {
    pub settings: Settings,
    session: RwLock<Option<Arc<Session>>>,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            session: RwLock::new(None),
        }
    }

    pub fn session(&self) -> Option<Arc<Session>> {
        self.session.read().ok().and_then(|s| s.clone())
    }

    /// Opens (or creates) the workspace database and replaces the current session.
    pub fn open_workspace(&self, path: &Path) -> anyhow::Result<Arc<Session>> {
        let conn = db::open_db(path)?;
        let remote_settings = self.settings.remote();
        let remote: Arc<dyn RemoteStore> = match remote_settings.url.as_deref() {
            Some(url) => Arc::new(HttpRemote::new(url, remote_settings.timeout)?),
            None => Arc::new(OfflineRemote),
        };
        let gateway = Arc::new(Gateway::new(conn, remote, remote_settings.timeout));
        info!(
            workspace = %path.display(),
            remote = %gateway.remote_description(),
            "workspace opened"
        );

        let session = Arc::new(Session {
            workspace: path.to_path_buf(),
            engine: LessonEngine::new(gateway.clone(), self.settings.bootstrap_dir().cloned()),
            tags: TagStore::new(gateway),
        });
        let mut slot = self
            .session
            .write()
            .map_err(|_| anyhow::anyhow!("session lock poisoned"))
            .context("replace workspace session")?;
        *slot = Some(session.clone());
        Ok(session)
    }
}
