use std::path::PathBuf;

use serde_json::json;

use crate::codec;
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{commit, filter_from, param_str};
use crate::ipc::types::{AppState, Request};
use crate::migrate;
use crate::sync;

/// Inline text, or a path the UI already wrote the upload to.
fn read_payload(req: &Request) -> Result<String, serde_json::Value> {
    if let Some(text) = param_str(&req.params, "text") {
        return Ok(text.to_string());
    }
    let Some(path) = param_str(&req.params, "path") else {
        return Err(err(&req.id, "bad_params", "missing text or path", None));
    };
    std::fs::read_to_string(path).map_err(|e| {
        err(
            &req.id,
            "io_failed",
            e.to_string(),
            Some(json!({ "path": path })),
        )
    })
}

fn handle_export_csv(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(catalog) = state.catalog.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let filter = filter_from(&req.params);
    let rows = catalog
        .evaluations
        .iter()
        .filter(|e| filter.matches(e))
        .count();
    if rows == 0 {
        return err(&req.id, "no_data", "No hay datos para exportar", None);
    }
    let csv = codec::export_csv(catalog, &filter);

    if let Some(out_path) = param_str(&req.params, "outPath") {
        let out = PathBuf::from(out_path);
        if let Some(parent) = out.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                return err(
                    &req.id,
                    "io_failed",
                    e.to_string(),
                    Some(json!({ "path": out_path })),
                );
            }
        }
        if let Err(e) = std::fs::write(&out, csv) {
            return err(
                &req.id,
                "io_failed",
                e.to_string(),
                Some(json!({ "path": out_path })),
            );
        }
        return ok(&req.id, json!({ "path": out_path, "rows": rows }));
    }
    ok(&req.id, json!({ "csv": csv, "rows": rows }))
}

fn handle_import_csv(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(catalog) = state.catalog.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let text = match read_payload(req) {
        Ok(t) => t,
        Err(resp) => return resp,
    };
    // Parse the whole file before touching anything; a bad row imports
    // nothing.
    let imported = match codec::import_csv(&text) {
        Ok(rows) => rows,
        Err(e) => return err(&req.id, "validation_failed", e.to_string(), None),
    };
    let count = imported.len();
    let mut next = catalog.clone();
    next.evaluations.extend(imported);
    let saved = commit(state, next);
    ok(&req.id, json!({ "imported": count, "saved": saved }))
}

fn handle_backup_export(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(catalog) = state.catalog.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let doc = codec::export_backup(catalog);
    let timestamp = doc
        .get("timestamp")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    if let Some(out_path) = param_str(&req.params, "outPath") {
        let text = match serde_json::to_string_pretty(&doc) {
            Ok(t) => t,
            Err(e) => return err(&req.id, "io_failed", e.to_string(), None),
        };
        if let Err(e) = std::fs::write(out_path, text) {
            return err(
                &req.id,
                "io_failed",
                e.to_string(),
                Some(json!({ "path": out_path })),
            );
        }
        return ok(&req.id, json!({ "path": out_path, "timestamp": timestamp }));
    }
    ok(&req.id, json!({ "backup": doc, "timestamp": timestamp }))
}

/// Destructive: a successful import replaces the whole catalog, so the
/// caller has to send an explicit confirmation.
fn handle_backup_import(state: &mut AppState, req: &Request) -> serde_json::Value {
    if state.catalog.is_none() {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    }
    let confirmed = req
        .params
        .get("confirm")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    if !confirmed {
        return err(
            &req.id,
            "confirm_required",
            "La importación reemplaza todos los datos actuales; confirme la operación.",
            None,
        );
    }

    let text = match read_payload(req) {
        Ok(t) => t,
        Err(resp) => return resp,
    };
    let raw: serde_json::Value = match serde_json::from_str(&text) {
        Ok(v) => v,
        Err(e) => {
            return err(
                &req.id,
                "validation_failed",
                format!("JSON inválido: {e}"),
                None,
            )
        }
    };
    let restored = match codec::import_backup(&raw) {
        Ok(r) => r,
        Err(e) => return err(&req.id, "validation_failed", e.to_string(), None),
    };

    let saved = commit(state, restored.catalog);
    ok(
        &req.id,
        json!({ "saved": saved, "warnings": restored.warnings }),
    )
}

/// Deliberate, synchronous push so the caller gets a real outcome; the
/// automatic mirroring after each mutation stays fire-and-forget.
fn handle_sync_push(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(catalog) = state.catalog.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let outcome = sync::push_snapshot(&state.sync, catalog);
    let mut result = json!({ "status": outcome.as_str() });
    if let sync::SyncOutcome::Failed(reason) = &outcome {
        result["error"] = json!(reason);
    }
    ok(&req.id, result)
}

fn handle_sync_pull(state: &mut AppState, req: &Request) -> serde_json::Value {
    if state.catalog.is_none() {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    }
    let Some(raw) = sync::pull_snapshot(&state.sync) else {
        return ok(&req.id, json!({ "found": false }));
    };
    let apply = req
        .params
        .get("apply")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    if !apply {
        return ok(&req.id, json!({ "found": true, "applied": false, "data": raw }));
    }
    let catalog = migrate::normalize(&raw);
    let saved = commit(state, catalog);
    ok(
        &req.id,
        json!({ "found": true, "applied": true, "saved": saved }),
    )
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "export.csv" => Some(handle_export_csv(state, req)),
        "import.csv" => Some(handle_import_csv(state, req)),
        "backup.export" => Some(handle_backup_export(state, req)),
        "backup.import" => Some(handle_backup_import(state, req)),
        "sync.push" => Some(handle_sync_push(state, req)),
        "sync.pull" => Some(handle_sync_pull(state, req)),
        _ => None,
    }
}
