use crate::catalog::{Catalog, EvalFilter};
use crate::delta;
use crate::ipc::types::AppState;
use crate::sync;

/// Single mutation path for every catalog change: re-diff against the seed,
/// save the delta locally, fire the remote mirror, then swap the new catalog
/// into memory. A failed local save is reported but never blocks the
/// in-memory update.
pub fn commit(state: &mut AppState, catalog: Catalog) -> bool {
    let extracted = delta::extract(&catalog);
    let saved = state
        .store
        .as_ref()
        .map(|store| store.save_delta(&extracted))
        .unwrap_or(false);
    sync::spawn_push(&state.sync, &catalog);
    state.catalog = Some(catalog);
    saved
}

pub fn param_str<'a>(params: &'a serde_json::Value, key: &str) -> Option<&'a str> {
    params.get(key).and_then(|v| v.as_str())
}

/// Evaluation ids are strings today but were epoch-millis numbers in older
/// clients; accept both on the wire.
pub fn param_id(params: &serde_json::Value, key: &str) -> Option<String> {
    match params.get(key) {
        Some(serde_json::Value::String(s)) => Some(s.clone()),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

pub fn filter_from(params: &serde_json::Value) -> EvalFilter {
    EvalFilter {
        server: param_str(params, "server")
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        project: param_str(params, "project")
            .filter(|s| !s.is_empty())
            .map(str::to_string),
    }
}
