use serde_json::json;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

fn spawn_sidecar() -> (Child, ChildStdin, BufReader<ChildStdout>) {
    let exe = env!("CARGO_BIN_EXE_eval360d");
    let mut child = Command::new(exe)
        .env_remove("EVAL360_API_URL")
        .env_remove("EVAL360_API_KEY")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn eval360d");
    let stdin = child.stdin.take().expect("child stdin");
    let stdout = child.stdout.take().expect("child stdout");
    (child, stdin, BufReader::new(stdout))
}

fn request(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let payload = json!({
        "id": id,
        "method": method,
        "params": params,
    });
    writeln!(stdin, "{}", payload).expect("write request");
    stdin.flush().expect("flush request");

    let mut line = String::new();
    reader.read_line(&mut line).expect("read response line");
    assert!(!line.trim().is_empty(), "empty response for {}", method);
    let value: serde_json::Value = serde_json::from_str(line.trim()).expect("parse response json");
    assert_eq!(value.get("id").and_then(|v| v.as_str()), Some(id));
    value
}

fn request_ok(
    stdin: &mut ChildStdin,
    reader: &mut BufReader<ChildStdout>,
    id: &str,
    method: &str,
    params: serde_json::Value,
) -> serde_json::Value {
    let value = request(stdin, reader, id, method, params);
    assert!(
        value.get("ok").and_then(|v| v.as_bool()).unwrap_or(false),
        "{} failed: {}",
        method,
        value
    );
    value.get("result").cloned().unwrap_or_else(|| json!({}))
}

#[test]
fn admin_edits_survive_workspace_reopen() {
    let workspace = temp_dir("eval360-delta");
    let path = workspace.to_string_lossy().to_string();

    {
        let (_child, mut stdin, mut reader) = spawn_sidecar();
        request_ok(
            &mut stdin,
            &mut reader,
            "1",
            "workspace.select",
            json!({ "path": path }),
        );
        request_ok(
            &mut stdin,
            &mut reader,
            "2",
            "servers.add",
            json!({ "name": "NUEVO" }),
        );
        request_ok(
            &mut stdin,
            &mut reader,
            "3",
            "servers.delete",
            json!({ "name": "LABORATORIOS" }),
        );
        request_ok(
            &mut stdin,
            &mut reader,
            "4",
            "questions.add",
            json!({ "text": "¿Comentarios adicionales?" }),
        );
    }

    // Fresh process, same workspace: seed + persisted delta must rebuild the
    // same catalog.
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "5",
        "workspace.select",
        json!({ "path": path }),
    );
    let result = request_ok(&mut stdin, &mut reader, "6", "catalog.get", json!({}));
    let catalog = result.get("catalog").expect("catalog");

    assert_eq!(
        catalog.get("servers").cloned(),
        Some(json!(["RPSOFT", "6TO PY INNOVACION", "NUEVO"]))
    );
    // Deleting a server cascades: no level still references LABORATORIOS.
    assert!(catalog.pointer("/projects/LABORATORIOS").is_none());
    assert!(catalog.pointer("/rooms/LABORATORIOS").is_none());
    assert!(catalog.pointer("/teammates/LABORATORIOS").is_none());
    // The custom question is appended after the seed block.
    let questions = catalog
        .get("questions")
        .and_then(|v| v.as_array())
        .expect("questions");
    assert_eq!(questions.len(), 12);
    assert_eq!(questions[11], json!("¿Comentarios adicionales?"));
}

#[test]
fn duplicate_names_are_rejected_case_insensitively() {
    let workspace = temp_dir("eval360-dup");
    let (_child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );
    let resp = request(
        &mut stdin,
        &mut reader,
        "2",
        "servers.add",
        json!({ "name": "rpsoft" }),
    );
    assert_eq!(resp.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        resp.pointer("/error/code").and_then(|v| v.as_str()),
        Some("validation_failed")
    );
}

#[test]
fn deleting_a_seed_question_does_not_persist() {
    // The delta has no deleted-questions set, so removing a seed question
    // only lasts until the next load.
    let workspace = temp_dir("eval360-seedq");
    let path = workspace.to_string_lossy().to_string();

    {
        let (_child, mut stdin, mut reader) = spawn_sidecar();
        request_ok(
            &mut stdin,
            &mut reader,
            "1",
            "workspace.select",
            json!({ "path": path }),
        );
        let result = request_ok(
            &mut stdin,
            &mut reader,
            "2",
            "questions.delete",
            json!({ "index": 0 }),
        );
        let questions = result.get("questions").and_then(|v| v.as_array()).unwrap();
        assert_eq!(questions.len(), 10);
    }

    let (_child, mut stdin, mut reader) = spawn_sidecar();
    request_ok(
        &mut stdin,
        &mut reader,
        "3",
        "workspace.select",
        json!({ "path": path }),
    );
    let result = request_ok(&mut stdin, &mut reader, "4", "catalog.get", json!({}));
    let questions = result
        .pointer("/catalog/questions")
        .and_then(|v| v.as_array())
        .expect("questions");
    assert_eq!(questions.len(), 11);
}
