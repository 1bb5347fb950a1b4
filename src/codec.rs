use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde_json::json;
use thiserror::Error;
use tracing::warn;

use crate::catalog::{
    new_evaluation_id, now_iso, Catalog, EvalFilter, Evaluation, ProjectMap, RoomMap, TeammateMap,
};
use crate::migrate::{RoomsNode, TeammatesNode};

/// Byte-order mark so spreadsheet apps pick up UTF-8.
const BOM: char = '\u{feff}';

/// Fixed leading columns; everything after maps positionally to question
/// indices.
const CSV_FIXED_HEADERS: [&str; 4] = ["Fecha", "Servidor", "Proyecto", "Compañero Evaluado"];

/// The es-ES rendering the exports have always used.
const CSV_DATE_FORMAT: &str = "%d/%m/%Y, %H:%M:%S";

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("CSV inválido: {0}")]
    Csv(String),
    #[error("copia de seguridad inválida: {0}")]
    Backup(String),
}

fn csv_cell(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

/// Quote-aware comma splitter; handles embedded commas and doubled quotes.
fn parse_csv_record(line: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut buf = String::new();
    let mut in_quotes = false;
    let chars: Vec<char> = line.chars().collect();
    let mut i = 0usize;
    while i < chars.len() {
        let ch = chars[i];
        if ch == '"' {
            if in_quotes && i + 1 < chars.len() && chars[i + 1] == '"' {
                buf.push('"');
                i += 2;
                continue;
            }
            in_quotes = !in_quotes;
            i += 1;
            continue;
        }
        if ch == ',' && !in_quotes {
            out.push(buf);
            buf = String::new();
            i += 1;
            continue;
        }
        buf.push(ch);
        i += 1;
    }
    out.push(buf);
    out
}

fn csv_date(iso: &str) -> String {
    match DateTime::parse_from_rfc3339(iso) {
        Ok(dt) => dt.format(CSV_DATE_FORMAT).to_string(),
        Err(_) => iso.to_string(),
    }
}

fn parse_csv_date(cell: &str) -> String {
    if let Ok(naive) = NaiveDateTime::parse_from_str(cell.trim(), CSV_DATE_FORMAT) {
        return Utc
            .from_utc_datetime(&naive)
            .to_rfc3339_opts(SecondsFormat::Millis, true);
    }
    if DateTime::parse_from_rfc3339(cell.trim()).is_ok() {
        return cell.trim().to_string();
    }
    now_iso()
}

/// One row per evaluation, every cell quoted, answers pulled by question
/// index. `filter` narrows by server and/or project.
pub fn export_csv(catalog: &Catalog, filter: &EvalFilter) -> String {
    let mut header: Vec<String> = CSV_FIXED_HEADERS.iter().map(|h| csv_cell(h)).collect();
    header.extend(catalog.questions.iter().map(|q| csv_cell(q)));

    let mut lines = vec![header.join(",")];
    for eval in catalog.evaluations.iter().filter(|e| filter.matches(e)) {
        let mut row = vec![
            csv_cell(&csv_date(&eval.date)),
            csv_cell(&eval.server),
            csv_cell(&eval.project),
            csv_cell(&eval.teammate),
        ];
        for index in 0..catalog.questions.len() {
            let answer = eval.answers.get(&index).map(String::as_str).unwrap_or("");
            row.push(csv_cell(answer));
        }
        lines.push(row.join(","));
    }

    format!("{}{}", BOM, lines.join("\n"))
}

/// Parse rows exported by `export_csv` (or hand-edited in a spreadsheet)
/// back into fresh evaluation records: new ids, empty username/email/room.
/// Any structural problem aborts the whole import.
pub fn import_csv(text: &str) -> Result<Vec<Evaluation>, CodecError> {
    let text = text.strip_prefix(BOM).unwrap_or(text);
    let mut lines = text
        .lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty());

    let Some((_, header_line)) = lines.next() else {
        return Err(CodecError::Csv("el archivo está vacío".to_string()));
    };
    let header = parse_csv_record(header_line);
    if header.len() < CSV_FIXED_HEADERS.len() {
        return Err(CodecError::Csv(format!(
            "el encabezado tiene {} columnas, se esperaban al menos {}",
            header.len(),
            CSV_FIXED_HEADERS.len()
        )));
    }
    let question_count = header.len() - CSV_FIXED_HEADERS.len();

    let mut imported: Vec<Evaluation> = Vec::new();
    for (line_no, line) in lines {
        let fields = parse_csv_record(line);
        if fields.len() < CSV_FIXED_HEADERS.len() {
            return Err(CodecError::Csv(format!(
                "línea {}: {} columnas, se esperaban al menos {}",
                line_no + 1,
                fields.len(),
                CSV_FIXED_HEADERS.len()
            )));
        }

        let mut answers: BTreeMap<usize, String> = BTreeMap::new();
        for index in 0..question_count {
            if let Some(cell) = fields.get(CSV_FIXED_HEADERS.len() + index) {
                if !cell.is_empty() {
                    answers.insert(index, cell.clone());
                }
            }
        }

        imported.push(Evaluation {
            id: new_evaluation_id(),
            username: String::new(),
            email: String::new(),
            server: fields[1].clone(),
            project: fields[2].clone(),
            room: String::new(),
            teammate: fields[3].clone(),
            answers,
            date: parse_csv_date(&fields[0]),
        });
    }

    Ok(imported)
}

/// Full snapshot of the catalog with a provenance timestamp.
pub fn export_backup(catalog: &Catalog) -> serde_json::Value {
    json!({
        "timestamp": now_iso(),
        "servers": catalog.servers,
        "projects": catalog.projects,
        "rooms": catalog.rooms,
        "teammates": catalog.teammates,
        "questions": catalog.questions,
        "evaluations": catalog.evaluations,
    })
}

#[derive(Debug)]
pub struct BackupImport {
    pub catalog: Catalog,
    pub warnings: Vec<String>,
}

fn require_sequence(raw: &serde_json::Value, field: &str) -> Result<(), CodecError> {
    match raw.get(field) {
        Some(v) if v.is_array() => Ok(()),
        _ => Err(CodecError::Backup(format!(
            "el campo '{field}' falta o no es una lista"
        ))),
    }
}

fn decode_field<T: serde::de::DeserializeOwned>(
    raw: &serde_json::Value,
    field: &str,
) -> Result<T, CodecError> {
    serde_json::from_value(raw.get(field).cloned().unwrap_or(serde_json::Value::Null))
        .map_err(|e| CodecError::Backup(format!("campo '{field}': {e}")))
}

/// Validate and decode a JSON backup. The resulting catalog REPLACES the
/// live one entirely; callers must confirm before applying it. Legacy flat
/// rooms/teammates shapes inside old backups are normalized on the way in.
pub fn import_backup(raw: &serde_json::Value) -> Result<BackupImport, CodecError> {
    if !raw.is_object() {
        return Err(CodecError::Backup("el documento no es un objeto JSON".to_string()));
    }

    require_sequence(raw, "servers")?;
    if !raw.get("projects").map(|v| v.is_object()).unwrap_or(false) {
        return Err(CodecError::Backup(
            "el campo 'projects' falta o no es un objeto".to_string(),
        ));
    }
    require_sequence(raw, "questions")?;
    require_sequence(raw, "evaluations")?;

    let servers: Vec<String> = decode_field(raw, "servers")?;
    let projects: ProjectMap = decode_field(raw, "projects")?;
    let questions: Vec<String> = decode_field(raw, "questions")?;
    let evaluations: Vec<Evaluation> = decode_field(raw, "evaluations")?;

    let mut warnings: Vec<String> = Vec::new();

    let rooms: RoomMap = match raw.get("rooms") {
        None | Some(serde_json::Value::Null) => {
            warnings.push("el respaldo no incluye 'rooms'; se asumen salas vacías".to_string());
            RoomMap::new()
        }
        Some(v) => {
            let nodes: BTreeMap<String, RoomsNode> = serde_json::from_value(v.clone())
                .map_err(|e| CodecError::Backup(format!("campo 'rooms': {e}")))?;
            nodes
                .into_iter()
                .map(|(server, node)| (server, node.into_by_project()))
                .collect()
        }
    };

    let teammates: TeammateMap = match raw.get("teammates") {
        None | Some(serde_json::Value::Null) => {
            warnings
                .push("el respaldo no incluye 'teammates'; se asumen listas vacías".to_string());
            TeammateMap::new()
        }
        Some(v) => {
            let nodes: BTreeMap<String, BTreeMap<String, TeammatesNode>> =
                serde_json::from_value(v.clone())
                    .map_err(|e| CodecError::Backup(format!("campo 'teammates': {e}")))?;
            nodes
                .into_iter()
                .map(|(server, by_project)| {
                    (
                        server,
                        by_project
                            .into_iter()
                            .map(|(project, node)| (project, node.into_by_room()))
                            .collect(),
                    )
                })
                .collect()
        }
    };

    for warning in &warnings {
        warn!("{warning}");
    }

    Ok(BackupImport {
        catalog: Catalog {
            servers,
            projects,
            rooms,
            teammates,
            questions,
            evaluations,
        },
        warnings,
    })
}
