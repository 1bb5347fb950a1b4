use serde_json::json;

use crate::catalog::{Catalog, CatalogError};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{commit, param_str};
use crate::ipc::types::{AppState, Request};

fn validation_err(id: &str, e: &CatalogError) -> serde_json::Value {
    err(id, "validation_failed", e.to_string(), None)
}

fn handle_catalog_get(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(catalog) = state.catalog.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    ok(&req.id, json!({ "catalog": catalog }))
}

/// Wholesale replacement from the admin UI. The payload must already be in
/// canonical shape; storage-side legacy migration does not apply here.
fn handle_catalog_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    if state.catalog.is_none() {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    }
    let Some(raw) = req.params.get("catalog") else {
        return err(&req.id, "bad_params", "missing params.catalog", None);
    };
    let catalog: Catalog = match serde_json::from_value(raw.clone()) {
        Ok(c) => c,
        Err(e) => return err(&req.id, "bad_params", format!("invalid catalog: {e}"), None),
    };
    let saved = commit(state, catalog);
    ok(&req.id, json!({ "saved": saved }))
}

fn handle_servers_add(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(catalog) = state.catalog.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(name) = param_str(&req.params, "name") else {
        return err(&req.id, "bad_params", "missing name", None);
    };
    let next = match catalog.add_server(name) {
        Ok(c) => c,
        Err(e) => return validation_err(&req.id, &e),
    };
    let servers = next.servers.clone();
    let saved = commit(state, next);
    ok(&req.id, json!({ "saved": saved, "servers": servers }))
}

fn handle_servers_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(catalog) = state.catalog.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(name) = param_str(&req.params, "name") else {
        return err(&req.id, "bad_params", "missing name", None);
    };
    let next = match catalog.delete_server(name) {
        Ok(c) => c,
        Err(e) => return validation_err(&req.id, &e),
    };
    let servers = next.servers.clone();
    let saved = commit(state, next);
    ok(&req.id, json!({ "saved": saved, "servers": servers }))
}

fn handle_projects_add(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(catalog) = state.catalog.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let (Some(server), Some(name)) = (
        param_str(&req.params, "server"),
        param_str(&req.params, "name"),
    ) else {
        return err(&req.id, "bad_params", "missing server or name", None);
    };
    let next = match catalog.add_project(server, name) {
        Ok(c) => c,
        Err(e) => return validation_err(&req.id, &e),
    };
    let projects = next.projects_for(server).to_vec();
    let saved = commit(state, next);
    ok(&req.id, json!({ "saved": saved, "projects": projects }))
}

fn handle_projects_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(catalog) = state.catalog.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let (Some(server), Some(name)) = (
        param_str(&req.params, "server"),
        param_str(&req.params, "name"),
    ) else {
        return err(&req.id, "bad_params", "missing server or name", None);
    };
    let next = match catalog.delete_project(server, name) {
        Ok(c) => c,
        Err(e) => return validation_err(&req.id, &e),
    };
    let projects = next.projects_for(server).to_vec();
    let saved = commit(state, next);
    ok(&req.id, json!({ "saved": saved, "projects": projects }))
}

fn handle_rooms_add(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(catalog) = state.catalog.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let (Some(server), Some(project), Some(name)) = (
        param_str(&req.params, "server"),
        param_str(&req.params, "project"),
        param_str(&req.params, "name"),
    ) else {
        return err(&req.id, "bad_params", "missing server, project or name", None);
    };
    let next = match catalog.add_room(server, project, name) {
        Ok(c) => c,
        Err(e) => return validation_err(&req.id, &e),
    };
    let rooms = next.rooms_for(server, project).to_vec();
    let saved = commit(state, next);
    ok(&req.id, json!({ "saved": saved, "rooms": rooms }))
}

fn handle_rooms_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(catalog) = state.catalog.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let (Some(server), Some(project), Some(name)) = (
        param_str(&req.params, "server"),
        param_str(&req.params, "project"),
        param_str(&req.params, "name"),
    ) else {
        return err(&req.id, "bad_params", "missing server, project or name", None);
    };
    let next = match catalog.delete_room(server, project, name) {
        Ok(c) => c,
        Err(e) => return validation_err(&req.id, &e),
    };
    let rooms = next.rooms_for(server, project).to_vec();
    let saved = commit(state, next);
    ok(&req.id, json!({ "saved": saved, "rooms": rooms }))
}

fn handle_teammates_add(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(catalog) = state.catalog.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let (Some(server), Some(project), Some(room), Some(name)) = (
        param_str(&req.params, "server"),
        param_str(&req.params, "project"),
        param_str(&req.params, "room"),
        param_str(&req.params, "name"),
    ) else {
        return err(
            &req.id,
            "bad_params",
            "missing server, project, room or name",
            None,
        );
    };
    let next = match catalog.add_teammate(server, project, room, name) {
        Ok(c) => c,
        Err(e) => return validation_err(&req.id, &e),
    };
    let teammates = next.teammates_for(server, project, room).to_vec();
    let saved = commit(state, next);
    ok(&req.id, json!({ "saved": saved, "teammates": teammates }))
}

fn handle_teammates_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(catalog) = state.catalog.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let (Some(server), Some(project), Some(room), Some(name)) = (
        param_str(&req.params, "server"),
        param_str(&req.params, "project"),
        param_str(&req.params, "room"),
        param_str(&req.params, "name"),
    ) else {
        return err(
            &req.id,
            "bad_params",
            "missing server, project, room or name",
            None,
        );
    };
    let next = match catalog.delete_teammate(server, project, room, name) {
        Ok(c) => c,
        Err(e) => return validation_err(&req.id, &e),
    };
    let teammates = next.teammates_for(server, project, room).to_vec();
    let saved = commit(state, next);
    ok(&req.id, json!({ "saved": saved, "teammates": teammates }))
}

fn handle_questions_add(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(catalog) = state.catalog.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(text) = param_str(&req.params, "text") else {
        return err(&req.id, "bad_params", "missing text", None);
    };
    let next = match catalog.add_question(text) {
        Ok(c) => c,
        Err(e) => return validation_err(&req.id, &e),
    };
    let questions = next.questions.clone();
    let saved = commit(state, next);
    ok(&req.id, json!({ "saved": saved, "questions": questions }))
}

fn handle_questions_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(catalog) = state.catalog.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(index) = req.params.get("index").and_then(|v| v.as_u64()) else {
        return err(&req.id, "bad_params", "missing index", None);
    };
    let next = match catalog.delete_question(index as usize) {
        Ok(c) => c,
        Err(e) => return validation_err(&req.id, &e),
    };
    let questions = next.questions.clone();
    let saved = commit(state, next);
    ok(&req.id, json!({ "saved": saved, "questions": questions }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "catalog.get" => Some(handle_catalog_get(state, req)),
        "catalog.update" => Some(handle_catalog_update(state, req)),
        "servers.add" => Some(handle_servers_add(state, req)),
        "servers.delete" => Some(handle_servers_delete(state, req)),
        "projects.add" => Some(handle_projects_add(state, req)),
        "projects.delete" => Some(handle_projects_delete(state, req)),
        "rooms.add" => Some(handle_rooms_add(state, req)),
        "rooms.delete" => Some(handle_rooms_delete(state, req)),
        "teammates.add" => Some(handle_teammates_add(state, req)),
        "teammates.delete" => Some(handle_teammates_delete(state, req)),
        "questions.add" => Some(handle_questions_add(state, req)),
        "questions.delete" => Some(handle_questions_delete(state, req)),
        _ => None,
    }
}
