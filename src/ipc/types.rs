use std::path::PathBuf;

use serde::Deserialize;

use crate::catalog::Catalog;
use crate::session::Session;
use crate::store::Store;
use crate::sync::SyncConfig;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub store: Option<Store>,
    pub catalog: Option<Catalog>,
    pub session: Option<Session>,
    pub sync: SyncConfig,
}
