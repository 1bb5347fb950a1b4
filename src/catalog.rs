use std::collections::BTreeMap;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Project key legacy flat room lists are nested under.
pub const GENERAL_PROJECT: &str = "GENERAL";
/// Room key legacy flat teammate lists are nested under.
pub const GENERAL_ROOM: &str = "SALA GENERAL";

/// The first N questions take integer scores; everything after is free text.
/// Structural assumption of the evaluation form, not per-question config.
pub const NUMERIC_QUESTIONS: usize = 11;
pub const SCORE_MIN: i64 = 0;
pub const SCORE_MAX: i64 = 20;

pub type ProjectMap = BTreeMap<String, Vec<String>>;
pub type RoomMap = BTreeMap<String, BTreeMap<String, Vec<String>>>;
pub type TeammateMap = BTreeMap<String, BTreeMap<String, BTreeMap<String, Vec<String>>>>;

/// Full reference+user hierarchy. Owned by the session controller and
/// replaced wholesale on every mutation; never edited in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Catalog {
    pub servers: Vec<String>,
    pub projects: ProjectMap,
    pub rooms: RoomMap,
    pub teammates: TeammateMap,
    pub questions: Vec<String>,
    pub evaluations: Vec<Evaluation>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Evaluation {
    #[serde(deserialize_with = "id_from_number_or_string")]
    pub id: String,
    pub username: String,
    pub email: String,
    pub server: String,
    pub project: String,
    pub room: String,
    pub teammate: String,
    pub answers: BTreeMap<usize, String>,
    pub date: String,
}

/// Older persisted evaluations carry epoch-millis ids; keep their decimal
/// string form so they stay stable across reloads.
fn id_from_number_or_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum IdRepr {
        Num(i64),
        Text(String),
    }
    Ok(match IdRepr::deserialize(deserializer)? {
        IdRepr::Num(n) => n.to_string(),
        IdRepr::Text(s) => s,
    })
}

/// UUIDv7: unique and time-ordered, so ids created in rapid succession
/// stay distinct and sort by creation time.
pub fn new_evaluation_id() -> String {
    Uuid::now_v7().to_string()
}

/// ISO-8601 with millisecond precision, matching the format the web client
/// has always written (`Date.toISOString()`).
pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[derive(Debug, Error, PartialEq)]
pub enum CatalogError {
    #[error("el nombre no puede estar vacío")]
    EmptyName,
    #[error("\"{0}\" ya existe en este nivel")]
    Duplicate(String),
    #[error("\"{0}\" no existe")]
    NotFound(String),
}

pub fn eq_ci(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

fn contains_ci(list: &[String], name: &str) -> bool {
    list.iter().any(|x| eq_ci(x, name))
}

fn position_ci(list: &[String], name: &str) -> Option<usize> {
    list.iter().position(|x| eq_ci(x, name))
}

fn remove_key_ci<V>(map: &mut BTreeMap<String, V>, key: &str) {
    let hits: Vec<String> = map
        .keys()
        .filter(|k| eq_ci(k, key))
        .cloned()
        .collect();
    for k in hits {
        map.remove(&k);
    }
}

impl Catalog {
    pub fn projects_for(&self, server: &str) -> &[String] {
        self.projects.get(server).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn rooms_for(&self, server: &str, project: &str) -> &[String] {
        self.rooms
            .get(server)
            .and_then(|m| m.get(project))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn teammates_for(&self, server: &str, project: &str, room: &str) -> &[String] {
        self.teammates
            .get(server)
            .and_then(|m| m.get(project))
            .and_then(|m| m.get(room))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn add_server(&self, name: &str) -> Result<Catalog, CatalogError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CatalogError::EmptyName);
        }
        if contains_ci(&self.servers, name) {
            return Err(CatalogError::Duplicate(name.to_string()));
        }
        let mut next = self.clone();
        next.servers.push(name.to_string());
        Ok(next)
    }

    /// Removing a server drops its projects, rooms and teammates too, so the
    /// reconstructed catalog never holds entries under a dead server.
    pub fn delete_server(&self, name: &str) -> Result<Catalog, CatalogError> {
        let Some(pos) = position_ci(&self.servers, name) else {
            return Err(CatalogError::NotFound(name.to_string()));
        };
        let mut next = self.clone();
        let removed = next.servers.remove(pos);
        remove_key_ci(&mut next.projects, &removed);
        remove_key_ci(&mut next.rooms, &removed);
        remove_key_ci(&mut next.teammates, &removed);
        Ok(next)
    }

    pub fn add_project(&self, server: &str, name: &str) -> Result<Catalog, CatalogError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CatalogError::EmptyName);
        }
        if !contains_ci(&self.servers, server) {
            return Err(CatalogError::NotFound(server.to_string()));
        }
        if contains_ci(self.projects_for(server), name) {
            return Err(CatalogError::Duplicate(name.to_string()));
        }
        let mut next = self.clone();
        next.projects
            .entry(server.to_string())
            .or_default()
            .push(name.to_string());
        Ok(next)
    }

    pub fn delete_project(&self, server: &str, name: &str) -> Result<Catalog, CatalogError> {
        let list = self.projects_for(server);
        let Some(pos) = position_ci(list, name) else {
            return Err(CatalogError::NotFound(name.to_string()));
        };
        let mut next = self.clone();
        let removed = next
            .projects
            .get_mut(server)
            .map(|l| l.remove(pos))
            .unwrap_or_default();
        if let Some(by_project) = next.rooms.get_mut(server) {
            remove_key_ci(by_project, &removed);
        }
        if let Some(by_project) = next.teammates.get_mut(server) {
            remove_key_ci(by_project, &removed);
        }
        Ok(next)
    }

    pub fn add_room(
        &self,
        server: &str,
        project: &str,
        name: &str,
    ) -> Result<Catalog, CatalogError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CatalogError::EmptyName);
        }
        if !contains_ci(&self.servers, server) {
            return Err(CatalogError::NotFound(server.to_string()));
        }
        if contains_ci(self.rooms_for(server, project), name) {
            return Err(CatalogError::Duplicate(name.to_string()));
        }
        let mut next = self.clone();
        next.rooms
            .entry(server.to_string())
            .or_default()
            .entry(project.to_string())
            .or_default()
            .push(name.to_string());
        Ok(next)
    }

    pub fn delete_room(
        &self,
        server: &str,
        project: &str,
        name: &str,
    ) -> Result<Catalog, CatalogError> {
        let list = self.rooms_for(server, project);
        let Some(pos) = position_ci(list, name) else {
            return Err(CatalogError::NotFound(name.to_string()));
        };
        let mut next = self.clone();
        let mut removed = String::new();
        if let Some(by_project) = next.rooms.get_mut(server) {
            if let Some(rooms) = by_project.get_mut(project) {
                removed = rooms.remove(pos);
                // A project key with no rooms left disappears from the map.
                if rooms.is_empty() {
                    by_project.remove(project);
                }
            }
        }
        if let Some(by_room) = next
            .teammates
            .get_mut(server)
            .and_then(|m| m.get_mut(project))
        {
            remove_key_ci(by_room, &removed);
        }
        Ok(next)
    }

    pub fn add_teammate(
        &self,
        server: &str,
        project: &str,
        room: &str,
        name: &str,
    ) -> Result<Catalog, CatalogError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CatalogError::EmptyName);
        }
        if !contains_ci(&self.servers, server) {
            return Err(CatalogError::NotFound(server.to_string()));
        }
        if contains_ci(self.teammates_for(server, project, room), name) {
            return Err(CatalogError::Duplicate(name.to_string()));
        }
        let mut next = self.clone();
        next.teammates
            .entry(server.to_string())
            .or_default()
            .entry(project.to_string())
            .or_default()
            .entry(room.to_string())
            .or_default()
            .push(name.to_string());
        Ok(next)
    }

    pub fn delete_teammate(
        &self,
        server: &str,
        project: &str,
        room: &str,
        name: &str,
    ) -> Result<Catalog, CatalogError> {
        let list = self.teammates_for(server, project, room);
        let Some(pos) = position_ci(list, name) else {
            return Err(CatalogError::NotFound(name.to_string()));
        };
        let mut next = self.clone();
        if let Some(names) = next
            .teammates
            .get_mut(server)
            .and_then(|m| m.get_mut(project))
            .and_then(|m| m.get_mut(room))
        {
            names.remove(pos);
        }
        Ok(next)
    }

    pub fn add_question(&self, text: &str) -> Result<Catalog, CatalogError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(CatalogError::EmptyName);
        }
        let mut next = self.clone();
        next.questions.push(text.to_string());
        Ok(next)
    }

    pub fn delete_question(&self, index: usize) -> Result<Catalog, CatalogError> {
        if index >= self.questions.len() {
            return Err(CatalogError::NotFound(format!("pregunta {}", index)));
        }
        let mut next = self.clone();
        next.questions.remove(index);
        Ok(next)
    }
}

/// Server/project pre-filter shared by the evaluations listing and the CSV
/// export.
#[derive(Debug, Clone, Default)]
pub struct EvalFilter {
    pub server: Option<String>,
    pub project: Option<String>,
}

impl EvalFilter {
    pub fn matches(&self, eval: &Evaluation) -> bool {
        if let Some(server) = &self.server {
            if &eval.server != server {
                return false;
            }
        }
        if let Some(project) = &self.project {
            if &eval.project != project {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seed;

    #[test]
    fn add_server_rejects_case_insensitive_duplicate() {
        let cat = seed::catalog().clone();
        let err = cat.add_server("rpsoft").unwrap_err();
        assert_eq!(err, CatalogError::Duplicate("rpsoft".to_string()));
    }

    #[test]
    fn delete_server_cascades_all_levels() {
        let cat = seed::catalog().clone();
        let next = cat.delete_server("RPSOFT").expect("delete");
        assert!(!next.servers.iter().any(|s| s == "RPSOFT"));
        assert!(!next.projects.contains_key("RPSOFT"));
        assert!(!next.rooms.contains_key("RPSOFT"));
        assert!(!next.teammates.contains_key("RPSOFT"));
    }

    #[test]
    fn delete_project_cascades_rooms_and_teammates() {
        let cat = seed::catalog().clone();
        let next = cat.delete_project("RPSOFT", "RV3").expect("delete");
        assert!(!next.projects_for("RPSOFT").iter().any(|p| p == "RV3"));
        assert!(next.teammates_for("RPSOFT", "RV3", GENERAL_ROOM).is_empty());
    }

    #[test]
    fn delete_last_room_drops_project_key() {
        let cat = seed::catalog().clone();
        let next = cat
            .delete_room("RPSOFT", GENERAL_PROJECT, GENERAL_ROOM)
            .expect("delete");
        assert!(!next
            .rooms
            .get("RPSOFT")
            .map(|m| m.contains_key(GENERAL_PROJECT))
            .unwrap_or(false));
    }

    #[test]
    fn legacy_numeric_ids_become_strings() {
        let eval: Evaluation = serde_json::from_value(serde_json::json!({
            "id": 1700000000000_i64,
            "server": "RPSOFT",
            "answers": { "0": "15" }
        }))
        .expect("decode");
        assert_eq!(eval.id, "1700000000000");
        assert_eq!(eval.answers.get(&0).map(String::as_str), Some("15"));
        assert!(eval.username.is_empty());
    }
}
