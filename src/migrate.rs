use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::catalog::{
    Catalog, Evaluation, ProjectMap, RoomMap, TeammateMap, GENERAL_PROJECT, GENERAL_ROOM,
};
use crate::delta::Delta;
use crate::seed;

/// Tag carried by the modern persisted document so it can be told apart from
/// legacy full-catalog dumps without shape sniffing.
pub const DELTA_FORMAT: &str = "eval360-delta-v1";

#[derive(Debug, Serialize, Deserialize)]
struct DeltaDoc {
    format: String,
    #[serde(flatten)]
    delta: Delta,
}

#[derive(Debug)]
pub enum Persisted {
    /// Modern document: a delta against the seed.
    Delta(Delta),
    /// Anything else: a legacy full-catalog dump, already normalized.
    Legacy(Catalog),
}

pub fn encode_delta(delta: &Delta) -> serde_json::Value {
    serde_json::to_value(DeltaDoc {
        format: DELTA_FORMAT.to_string(),
        delta: delta.clone(),
    })
    .unwrap_or_else(|e| {
        warn!("delta serialization failed: {e}");
        serde_json::json!({ "format": DELTA_FORMAT })
    })
}

pub fn decode_persisted(raw: &serde_json::Value) -> Persisted {
    if raw.get("format").and_then(|v| v.as_str()) == Some(DELTA_FORMAT) {
        match serde_json::from_value::<DeltaDoc>(raw.clone()) {
            Ok(doc) => return Persisted::Delta(doc.delta),
            Err(e) => {
                warn!("tagged delta document failed to decode, treating as legacy: {e}");
            }
        }
    }
    Persisted::Legacy(normalize(raw))
}

/// `rooms[server]` has appeared in two shapes over the app's lifetime: a flat
/// list of room names, or a map keyed by project.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum RoomsNode {
    Flat(Vec<String>),
    ByProject(BTreeMap<String, Vec<String>>),
}

impl RoomsNode {
    pub fn into_by_project(self) -> BTreeMap<String, Vec<String>> {
        match self {
            RoomsNode::Flat(rooms) => BTreeMap::from([(GENERAL_PROJECT.to_string(), rooms)]),
            RoomsNode::ByProject(map) => map,
        }
    }
}

/// Same story for `teammates[server][project]`: a flat name list, or a map
/// keyed by room.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum TeammatesNode {
    Flat(Vec<String>),
    ByRoom(BTreeMap<String, Vec<String>>),
}

impl TeammatesNode {
    pub fn into_by_room(self) -> BTreeMap<String, Vec<String>> {
        match self {
            TeammatesNode::Flat(members) => {
                BTreeMap::from([(GENERAL_ROOM.to_string(), members)])
            }
            TeammatesNode::ByRoom(map) => map,
        }
    }
}

/// Per-scope uniqueness holds no matter what the input looked like: repeats
/// keep their first occurrence, compared case-insensitively.
fn dedup_ci(list: Vec<String>) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    let mut out: Vec<String> = Vec::new();
    for name in list {
        let key = name.to_lowercase();
        if !seen.contains(&key) {
            seen.push(key);
            out.push(name);
        }
    }
    out
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawCatalog {
    servers: Option<Vec<String>>,
    projects: Option<BTreeMap<String, Vec<String>>>,
    rooms: Option<BTreeMap<String, RoomsNode>>,
    teammates: Option<BTreeMap<String, BTreeMap<String, TeammatesNode>>>,
    questions: Option<Vec<String>>,
    evaluations: Option<Vec<Evaluation>>,
}

/// Normalize a possibly-legacy persisted structure into a canonical catalog.
///
/// Merge rules mirror what the web client has always done on load: `servers`
/// and `questions` replace the seed wholesale when present, `projects` and
/// `teammates` replace per-server entries, `rooms` merge per-project keys
/// into the seed's per-server entry. Anything malformed falls back to the
/// seed; this never fails.
pub fn normalize(raw: &serde_json::Value) -> Catalog {
    let parsed: RawCatalog = match serde_json::from_value(raw.clone()) {
        Ok(v) => v,
        Err(e) => {
            warn!("persisted data is malformed, falling back to seed: {e}");
            return seed::catalog().clone();
        }
    };
    let seed = seed::catalog();

    let servers = parsed
        .servers
        .map(dedup_ci)
        .unwrap_or_else(|| seed.servers.clone());

    let mut projects: ProjectMap = seed.projects.clone();
    if let Some(entries) = parsed.projects {
        for (server, list) in entries {
            projects.insert(server, dedup_ci(list));
        }
    }

    let mut rooms: RoomMap = seed.rooms.clone();
    if let Some(entries) = parsed.rooms {
        for (server, node) in entries {
            let merged = rooms.entry(server).or_default();
            for (project, list) in node.into_by_project() {
                merged.insert(project, dedup_ci(list));
            }
        }
    }

    let mut teammates: TeammateMap = seed.teammates.clone();
    if let Some(entries) = parsed.teammates {
        for (server, by_project) in entries {
            let normalized: BTreeMap<String, BTreeMap<String, Vec<String>>> = by_project
                .into_iter()
                .map(|(project, node)| {
                    let by_room = node
                        .into_by_room()
                        .into_iter()
                        .map(|(room, members)| (room, dedup_ci(members)))
                        .collect();
                    (project, by_room)
                })
                .collect();
            teammates.insert(server, normalized);
        }
    }

    let questions = parsed.questions.unwrap_or_else(|| seed.questions.clone());
    let evaluations = parsed.evaluations.unwrap_or_default();

    Catalog {
        servers,
        projects,
        rooms,
        teammates,
        questions,
        evaluations,
    }
}
