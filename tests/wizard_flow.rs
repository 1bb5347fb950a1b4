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

fn all_answers(count: usize) -> serde_json::Value {
    let mut map = serde_json::Map::new();
    for index in 0..count {
        map.insert(index.to_string(), json!("15"));
    }
    serde_json::Value::Object(map)
}

#[test]
fn full_wizard_run_excludes_self_and_evaluated_teammates() {
    let workspace = temp_dir("eval360-wizard");
    let (_child, mut stdin, mut reader) = spawn_sidecar();

    request_ok(
        &mut stdin,
        &mut reader,
        "1",
        "workspace.select",
        json!({ "path": workspace.to_string_lossy() }),
    );

    // The seed RV3 project has no rooms yet; stock one through the admin
    // surface.
    request_ok(
        &mut stdin,
        &mut reader,
        "2",
        "rooms.add",
        json!({ "server": "RPSOFT", "project": "RV3", "name": "Sala 1" }),
    );
    for (i, name) in ["Ana", "Beto"].iter().enumerate() {
        request_ok(
            &mut stdin,
            &mut reader,
            &format!("3-{i}"),
            "teammates.add",
            json!({ "server": "RPSOFT", "project": "RV3", "room": "Sala 1", "name": name }),
        );
    }

    let start = request_ok(&mut stdin, &mut reader, "4", "session.start", json!({}));
    assert_eq!(start.get("step").and_then(|v| v.as_u64()), Some(0));

    // Bad email stops the identity step.
    let bad = request(
        &mut stdin,
        &mut reader,
        "5",
        "session.submit",
        json!({ "username": "ana", "email": "not-an-email" }),
    );
    assert_eq!(bad.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        bad.pointer("/error/code").and_then(|v| v.as_str()),
        Some("validation_failed")
    );

    request_ok(
        &mut stdin,
        &mut reader,
        "6",
        "session.submit",
        json!({ "username": "ana", "email": "ana@example.com" }),
    );
    let servers = request_ok(&mut stdin, &mut reader, "7", "session.options", json!({}));
    assert!(servers
        .pointer("/options")
        .and_then(|v| v.as_array())
        .map(|a| a.iter().any(|s| s == "RPSOFT"))
        .unwrap_or(false));

    request_ok(
        &mut stdin,
        &mut reader,
        "8",
        "session.submit",
        json!({ "value": "RPSOFT" }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "9",
        "session.submit",
        json!({ "value": "RV3" }),
    );
    request_ok(
        &mut stdin,
        &mut reader,
        "10",
        "session.submit",
        json!({ "value": "Sala 1" }),
    );

    // "ana" is filtered out of her own room, case-insensitively.
    let teammates = request_ok(&mut stdin, &mut reader, "11", "session.options", json!({}));
    assert_eq!(
        teammates.pointer("/options").cloned(),
        Some(json!(["Beto"]))
    );

    request_ok(
        &mut stdin,
        &mut reader,
        "12",
        "session.submit",
        json!({ "value": "Beto" }),
    );

    // An out-of-range score is rejected.
    let mut answers = all_answers(11);
    answers["0"] = json!("25");
    let rejected = request(
        &mut stdin,
        &mut reader,
        "13",
        "session.submit",
        json!({ "answers": answers }),
    );
    assert_eq!(rejected.get("ok").and_then(|v| v.as_bool()), Some(false));
    assert_eq!(
        rejected
            .pointer("/error/details/fields/0/field")
            .and_then(|v| v.as_str()),
        Some("question_0")
    );

    let submitted = request_ok(
        &mut stdin,
        &mut reader,
        "14",
        "session.submit",
        json!({ "answers": all_answers(11) }),
    );
    assert_eq!(submitted.get("saved").and_then(|v| v.as_bool()), Some(true));
    assert!(submitted.get("evaluationId").is_some());
    // Back on the teammate step for the next evaluation, with Beto used up.
    assert_eq!(submitted.get("step").and_then(|v| v.as_u64()), Some(4));
    let after = request_ok(&mut stdin, &mut reader, "15", "session.options", json!({}));
    assert_eq!(after.pointer("/options").cloned(), Some(json!([])));

    let listed = request_ok(
        &mut stdin,
        &mut reader,
        "16",
        "evaluations.list",
        json!({ "server": "RPSOFT" }),
    );
    assert_eq!(listed.get("total").and_then(|v| v.as_u64()), Some(1));
    assert_eq!(
        listed.pointer("/evaluations/0/teammate").and_then(|v| v.as_str()),
        Some("Beto")
    );
    assert_eq!(
        listed.pointer("/evaluations/0/username").and_then(|v| v.as_str()),
        Some("ana")
    );
}
