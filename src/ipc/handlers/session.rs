use std::collections::BTreeMap;

use serde_json::json;

use crate::ipc::error::{err, ok};
use crate::ipc::helpers::{commit, param_str};
use crate::ipc::types::{AppState, Request};
use crate::session::{FieldError, Session, Step, STEP_COUNT};

fn step_info(step: Step) -> serde_json::Value {
    json!({ "step": step.index(), "stepName": step.name(), "totalSteps": STEP_COUNT })
}

fn field_errors(id: &str, errors: &[FieldError]) -> serde_json::Value {
    err(
        id,
        "validation_failed",
        "hay campos con errores",
        Some(json!({ "fields": errors })),
    )
}

fn handle_start(state: &mut AppState, req: &Request) -> serde_json::Value {
    if state.catalog.is_none() {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    }
    let session = Session::new();
    let info = step_info(session.step());
    state.session = Some(session);
    ok(&req.id, info)
}

fn handle_options(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(catalog) = state.catalog.as_ref() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(session) = state.session.as_ref() else {
        return err(&req.id, "no_session", "start a session first", None);
    };
    let mut info = step_info(session.step());
    info["options"] = json!(session.options(catalog));
    if session.step() == Step::Questions {
        info["questions"] = json!(catalog.questions);
    }
    ok(&req.id, info)
}

pub(crate) fn parse_answers(params: &serde_json::Value) -> Result<BTreeMap<usize, String>, String> {
    let Some(obj) = params.get("answers").and_then(|v| v.as_object()) else {
        return Err("missing params.answers".to_string());
    };
    let mut answers = BTreeMap::new();
    for (key, value) in obj {
        let index: usize = key
            .parse()
            .map_err(|_| format!("bad answer index: {key}"))?;
        let Some(text) = value.as_str() else {
            return Err(format!("answer {key} must be a string"));
        };
        answers.insert(index, text.to_string());
    }
    Ok(answers)
}

fn handle_submit(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(catalog) = state.catalog.as_ref().cloned() else {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    };
    let Some(session) = state.session.as_mut() else {
        return err(&req.id, "no_session", "start a session first", None);
    };

    match session.step() {
        Step::Identity => {
            let username = param_str(&req.params, "username").unwrap_or("");
            let email = param_str(&req.params, "email").unwrap_or("");
            match session.submit_identity(username, email) {
                Ok(()) => ok(&req.id, step_info(session.step())),
                Err(errors) => field_errors(&req.id, &errors),
            }
        }
        Step::Server | Step::Project | Step::Room | Step::Teammate => {
            let value = param_str(&req.params, "value").unwrap_or("");
            match session.submit_choice(&catalog, value) {
                Ok(()) => ok(&req.id, step_info(session.step())),
                Err(errors) => field_errors(&req.id, &errors),
            }
        }
        Step::Questions => {
            let answers = match parse_answers(&req.params) {
                Ok(a) => a,
                Err(msg) => return err(&req.id, "bad_params", msg, None),
            };
            match session.submit_answers(&catalog, &answers) {
                Ok(evaluation) => {
                    let mut info = step_info(session.step());
                    let evaluation_id = evaluation.id.clone();
                    let mut next = catalog;
                    next.evaluations.push(evaluation);
                    let saved = commit(state, next);
                    info["saved"] = json!(saved);
                    info["evaluationId"] = json!(evaluation_id);
                    ok(&req.id, info)
                }
                Err(errors) => field_errors(&req.id, &errors),
            }
        }
    }
}

fn handle_back(state: &mut AppState, req: &Request) -> serde_json::Value {
    let Some(session) = state.session.as_mut() else {
        return err(&req.id, "no_session", "start a session first", None);
    };
    session.back();
    ok(&req.id, step_info(session.step()))
}

fn handle_reset(state: &mut AppState, req: &Request) -> serde_json::Value {
    if state.catalog.is_none() {
        return err(&req.id, "no_workspace", "select a workspace first", None);
    }
    let session = Session::new();
    let info = step_info(session.step());
    state.session = Some(session);
    ok(&req.id, info)
}

pub fn try_handle(state: &mut AppState, req: &Request) -> Option<serde_json::Value> {
    match req.method.as_str() {
        "session.start" => Some(handle_start(state, req)),
        "session.options" => Some(handle_options(state, req)),
        "session.submit" => Some(handle_submit(state, req)),
        "session.back" => Some(handle_back(state, req)),
        "session.reset" => Some(handle_reset(state, req)),
        _ => None,
    }
}
