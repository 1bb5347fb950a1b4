use serde_json::json;

use crate::catalog::{NUMERIC_QUESTIONS, SCORE_MAX, SCORE_MIN};
use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{commit, filter_from, param_id, param_str};
use crate::ipc::types::{AppState, Request};

fn handle_list(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(catalog) = state.catalog.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let filter = filter_from(&req.params);
    let filtered: Vec<_> = catalog
        .evaluations
        .iter()
        .filter(|e| filter.matches(e))
        .collect();
    ok(
        &req.id,
        json!({ "evaluations": filtered, "total": filtered.len() }),
    )
}

/// Admin edit of a single record; the only mutation path besides the wizard
/// append. Only the fields present in the request are patched.
fn handle_update(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(catalog) = state.catalog.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(id) = param_id(&req.params, "id") else {
        return err(&req.id, "bad_params", "missing id", None);
    };
    let Some(pos) = catalog.evaluations.iter().position(|e| e.id == id) else {
        return err(&req.id, "not_found", "evaluation not found", None);
    };

    let mut next = catalog.clone();
    {
        let eval = &mut next.evaluations[pos];
        for (field, slot) in [
            ("username", &mut eval.username),
            ("email", &mut eval.email),
            ("server", &mut eval.server),
            ("project", &mut eval.project),
            ("room", &mut eval.room),
            ("teammate", &mut eval.teammate),
            ("date", &mut eval.date),
        ] {
            if let Some(value) = param_str(&req.params, field) {
                *slot = value.to_string();
            }
        }
        if req.params.get("answers").is_some() {
            match super::session::parse_answers(&req.params) {
                Ok(answers) => {
                    for (index, answer) in &answers {
                        if *index < NUMERIC_QUESTIONS {
                            let in_range = answer
                                .trim()
                                .parse::<i64>()
                                .map(|v| (SCORE_MIN..=SCORE_MAX).contains(&v))
                                .unwrap_or(false);
                            if !in_range {
                                return err(
                                    &req.id,
                                    "validation_failed",
                                    format!(
                                        "La puntuación de la pregunta {} debe ser un número entre {} y {}.",
                                        index, SCORE_MIN, SCORE_MAX
                                    ),
                                    None,
                                );
                            }
                        }
                    }
                    eval.answers = answers;
                }
                Err(msg) => return err(&req.id, "bad_params", msg, None),
            }
        }
    }

    let saved = commit(state, next);
    ok(&req.id, json!({ "saved": saved }))
}

fn handle_delete(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(catalog) = state.catalog.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(id) = param_id(&req.params, "id") else {
        return err(&req.id, "bad_params", "missing id", None);
    };
    let Some(pos) = catalog.evaluations.iter().position(|e| e.id == id) else {
        return err(&req.id, "not_found", "evaluation not found", None);
    };

    let mut next = catalog.clone();
    next.evaluations.remove(pos);
    let remaining = next.evaluations.len();
    let saved = commit(state, next);
    ok(&req.id, json!({ "saved": saved, "remaining": remaining }))
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "evaluations.list" => Some(handle_list(state, req)),
        "evaluations.update" => Some(handle_update(state, req)),
        "evaluations.delete" => Some(handle_delete(state, req)),
        _ => None,
    }
}
