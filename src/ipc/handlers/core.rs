use serde_json::json;
use std::path::PathBuf;
use tracing::info;

use crate::delta;
use crate::ipc::error::{err, ok};
use crate::ipc::types::{AppState, Request};
use crate::store::Store;

fn handle_health(state: &mut AppState, req: &Request) -> serde_json::Value {
    ok(
        &req.id,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "workspacePath": state.workspace.as_ref().map(|p| p.to_string_lossy().to_string()),
            "syncConfigured": state.sync.is_configured(),
        }),
    )
}

fn handle_workspace_select(state: &mut AppState, req: &Request) -> serde_json::Value {
    let path = req
        .params
        .get("path")
        .and_then(|v| v.as_str())
        .map(PathBuf::from);
    let Some(path) = path else {
        return err(&req.id, "bad_params", "missing params.path", None);
    };

    let store = match Store::open(&path) {
        Ok(s) => s,
        Err(e) => return err(&req.id, "db_open_failed", format!("{e:?}"), None),
    };

    // Startup merge: seed + persisted delta (legacy dumps are migrated and
    // rediffed inside load_delta).
    let loaded = store.load_delta();
    let catalog = delta::apply(&loaded);
    info!(
        servers = catalog.servers.len(),
        evaluations = catalog.evaluations.len(),
        "workspace opened"
    );

    state.workspace = Some(path.clone());
    state.store = Some(store);
    state.session = None;
    let summary = json!({
        "workspacePath": path.to_string_lossy(),
        "servers": catalog.servers.len(),
        "questions": catalog.questions.len(),
        "evaluations": catalog.evaluations.len(),
    });
    state.catalog = Some(catalog);
    ok(&req.id, summary)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "health" => Some(handle_health(state, req)),
        "workspace.select" => Some(handle_workspace_select(state, req)),
        _ => None,
    }
}
