use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::catalog::{Catalog, Evaluation, ProjectMap, RoomMap, TeammateMap};
use crate::seed;

/// Minimal record of user changes relative to the seed catalog. Absent keys
/// and empty sets mean "no change at this node"; evaluations are always
/// carried in full because they have no seed counterpart.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Delta {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub added_servers: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub deleted_servers: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub added_projects: ProjectMap,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub deleted_projects: ProjectMap,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub added_rooms: RoomMap,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub deleted_rooms: RoomMap,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub added_teammates: TeammateMap,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub deleted_teammates: TeammateMap,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub custom_questions: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub evaluations: Vec<Evaluation>,
}

fn diff(live: &[String], base: &[String]) -> Vec<String> {
    live.iter()
        .filter(|name| !base.contains(name))
        .cloned()
        .collect()
}

fn list_of<'a>(map: &'a ProjectMap, key: &str) -> &'a [String] {
    map.get(key).map(Vec::as_slice).unwrap_or(&[])
}

fn in_list(map: &ProjectMap, key: &str, name: &str) -> bool {
    list_of(map, key).iter().any(|x| x == name)
}

/// Set difference per hierarchy level against the seed. Nodes whose parent
/// is already deleted are skipped; the apply-side cascade covers them.
pub fn extract(catalog: &Catalog) -> Delta {
    let seed = seed::catalog();
    let mut delta = Delta {
        added_servers: diff(&catalog.servers, &seed.servers),
        deleted_servers: diff(&seed.servers, &catalog.servers),
        evaluations: catalog.evaluations.clone(),
        ..Delta::default()
    };

    for (server, projects) in &catalog.projects {
        let added = diff(projects, list_of(&seed.projects, server));
        if !added.is_empty() {
            delta.added_projects.insert(server.clone(), added);
        }
    }
    for (server, projects) in &seed.projects {
        if !catalog.servers.contains(server) {
            continue;
        }
        let deleted = diff(projects, list_of(&catalog.projects, server));
        if !deleted.is_empty() {
            delta.deleted_projects.insert(server.clone(), deleted);
        }
    }

    for (server, by_project) in &catalog.rooms {
        for (project, rooms) in by_project {
            let base = seed
                .rooms
                .get(server)
                .and_then(|m| m.get(project))
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            let added = diff(rooms, base);
            if !added.is_empty() {
                delta
                    .added_rooms
                    .entry(server.clone())
                    .or_default()
                    .insert(project.clone(), added);
            }
        }
    }
    for (server, by_project) in &seed.rooms {
        if !catalog.servers.contains(server) {
            continue;
        }
        for (project, rooms) in by_project {
            if in_list(&delta.deleted_projects, server, project) {
                continue;
            }
            let live = catalog
                .rooms
                .get(server)
                .and_then(|m| m.get(project))
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            let deleted = diff(rooms, live);
            if !deleted.is_empty() {
                delta
                    .deleted_rooms
                    .entry(server.clone())
                    .or_default()
                    .insert(project.clone(), deleted);
            }
        }
    }

    for (server, by_project) in &catalog.teammates {
        for (project, by_room) in by_project {
            for (room, members) in by_room {
                let base = seed
                    .teammates
                    .get(server)
                    .and_then(|m| m.get(project))
                    .and_then(|m| m.get(room))
                    .map(Vec::as_slice)
                    .unwrap_or(&[]);
                let added = diff(members, base);
                if !added.is_empty() {
                    delta
                        .added_teammates
                        .entry(server.clone())
                        .or_default()
                        .entry(project.clone())
                        .or_default()
                        .insert(room.clone(), added);
                }
            }
        }
    }
    for (server, by_project) in &seed.teammates {
        if !catalog.servers.contains(server) {
            continue;
        }
        for (project, by_room) in by_project {
            if in_list(&delta.deleted_projects, server, project) {
                continue;
            }
            for (room, members) in by_room {
                let room_deleted = delta
                    .deleted_rooms
                    .get(server)
                    .map(|m| in_list(m, project, room))
                    .unwrap_or(false);
                if room_deleted {
                    continue;
                }
                let live = catalog
                    .teammates
                    .get(server)
                    .and_then(|m| m.get(project))
                    .and_then(|m| m.get(room))
                    .map(Vec::as_slice)
                    .unwrap_or(&[]);
                let deleted = diff(members, live);
                if !deleted.is_empty() {
                    delta
                        .deleted_teammates
                        .entry(server.clone())
                        .or_default()
                        .entry(project.clone())
                        .or_default()
                        .insert(room.clone(), deleted);
                }
            }
        }
    }

    // Exact string match against the seed; a renamed seed question therefore
    // shows up as a custom question and the seed text resurfaces on reload.
    delta.custom_questions = catalog
        .questions
        .iter()
        .filter(|q| !seed.questions.contains(q))
        .cloned()
        .collect();

    delta
}

fn push_unique(list: &mut Vec<String>, name: &str) {
    if !list.iter().any(|x| x == name) {
        list.push(name.to_string());
    }
}

fn remove_names(list: &mut Vec<String>, names: &[String]) {
    list.retain(|x| !names.contains(x));
}

/// Rebuild a full catalog from the seed plus a delta. Deletions run before
/// additions at every level, in fixed order (servers, projects, rooms,
/// teammates), so delete-then-re-add nets out to "present, appended at end".
pub fn apply(delta: &Delta) -> Catalog {
    let mut catalog = seed::catalog().clone();

    remove_names(&mut catalog.servers, &delta.deleted_servers);
    for server in &delta.deleted_servers {
        catalog.projects.remove(server);
        catalog.rooms.remove(server);
        catalog.teammates.remove(server);
    }
    for server in &delta.added_servers {
        push_unique(&mut catalog.servers, server);
    }

    for (server, deleted) in &delta.deleted_projects {
        if let Some(list) = catalog.projects.get_mut(server) {
            remove_names(list, deleted);
        }
        for project in deleted {
            if let Some(by_project) = catalog.rooms.get_mut(server) {
                by_project.remove(project);
            }
            if let Some(by_project) = catalog.teammates.get_mut(server) {
                by_project.remove(project);
            }
        }
    }
    for (server, added) in &delta.added_projects {
        let list = catalog.projects.entry(server.clone()).or_default();
        for project in added {
            push_unique(list, project);
        }
    }

    for (server, by_project) in &delta.deleted_rooms {
        for (project, deleted) in by_project {
            let mut emptied = false;
            if let Some(rooms) = catalog
                .rooms
                .get_mut(server)
                .and_then(|m| m.get_mut(project))
            {
                remove_names(rooms, deleted);
                emptied = rooms.is_empty();
            }
            if emptied {
                if let Some(m) = catalog.rooms.get_mut(server) {
                    m.remove(project);
                }
            }
            for room in deleted {
                if let Some(by_room) = catalog
                    .teammates
                    .get_mut(server)
                    .and_then(|m| m.get_mut(project))
                {
                    by_room.remove(room);
                }
            }
        }
    }
    for (server, by_project) in &delta.added_rooms {
        for (project, added) in by_project {
            let list = catalog
                .rooms
                .entry(server.clone())
                .or_default()
                .entry(project.clone())
                .or_default();
            for room in added {
                push_unique(list, room);
            }
        }
    }

    for (server, by_project) in &delta.deleted_teammates {
        for (project, by_room) in by_project {
            for (room, deleted) in by_room {
                if let Some(members) = catalog
                    .teammates
                    .get_mut(server)
                    .and_then(|m| m.get_mut(project))
                    .and_then(|m| m.get_mut(room))
                {
                    remove_names(members, deleted);
                }
            }
        }
    }
    for (server, by_project) in &delta.added_teammates {
        for (project, by_room) in by_project {
            for (room, added) in by_room {
                let list = catalog
                    .teammates
                    .entry(server.clone())
                    .or_default()
                    .entry(project.clone())
                    .or_default()
                    .entry(room.clone())
                    .or_default();
                for member in added {
                    push_unique(list, member);
                }
            }
        }
    }

    for question in &delta.custom_questions {
        catalog.questions.push(question.clone());
    }

    catalog.evaluations = delta.evaluations.clone();
    catalog
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{GENERAL_PROJECT, GENERAL_ROOM};

    #[test]
    fn extract_records_server_add_and_delete() {
        let cat = seed::catalog()
            .delete_server("LABORATORIOS")
            .and_then(|c| c.add_server("NUEVO"))
            .expect("edit");
        let delta = extract(&cat);
        assert_eq!(delta.added_servers, ["NUEVO".to_string()]);
        assert_eq!(delta.deleted_servers, ["LABORATORIOS".to_string()]);
        assert!(delta.added_projects.is_empty());
        assert!(delta.deleted_projects.is_empty());
    }

    #[test]
    fn apply_runs_deletions_before_additions() {
        let delta = Delta {
            added_servers: vec!["LABORATORIOS".to_string()],
            deleted_servers: vec!["LABORATORIOS".to_string()],
            ..Delta::default()
        };
        let cat = apply(&delta);
        // Net effect: present, re-appended at the end.
        assert_eq!(
            cat.servers,
            ["RPSOFT", "6TO PY INNOVACION", "LABORATORIOS"]
        );
    }

    #[test]
    fn apply_creates_containers_for_unknown_parents() {
        let mut delta = Delta::default();
        delta.added_servers.push("NUEVO".to_string());
        delta
            .added_teammates
            .entry("NUEVO".to_string())
            .or_default()
            .entry("PROYECTO Z".to_string())
            .or_default()
            .insert("SALA Z".to_string(), vec!["Zoe".to_string()]);
        let cat = apply(&delta);
        assert_eq!(
            cat.teammates_for("NUEVO", "PROYECTO Z", "SALA Z"),
            ["Zoe".to_string()]
        );
    }

    #[test]
    fn server_deletion_cascades_in_reconstruction() {
        let delta = Delta {
            deleted_servers: vec!["RPSOFT".to_string()],
            ..Delta::default()
        };
        let cat = apply(&delta);
        assert!(!cat.projects.contains_key("RPSOFT"));
        assert!(!cat.rooms.contains_key("RPSOFT"));
        assert!(!cat.teammates.contains_key("RPSOFT"));
    }

    #[test]
    fn round_trip_reproduces_edited_catalog() {
        let cat = seed::catalog()
            .add_server("NUEVO")
            .and_then(|c| c.add_project("NUEVO", "PILOTO"))
            .and_then(|c| c.add_room("NUEVO", "PILOTO", "SALA 1"))
            .and_then(|c| c.add_teammate("NUEVO", "PILOTO", "SALA 1", "Zoe"))
            .and_then(|c| c.delete_teammate("RPSOFT", "RV3", GENERAL_ROOM, "María García"))
            .and_then(|c| c.delete_room("RPSOFT", GENERAL_PROJECT, GENERAL_ROOM))
            .and_then(|c| c.add_question("¿Comentarios adicionales?"))
            .expect("edit");
        let rebuilt = apply(&extract(&cat));
        assert_eq!(rebuilt, cat);
    }

    #[test]
    fn custom_questions_keep_encounter_order() {
        let cat = seed::catalog()
            .add_question("¿Pregunta A?")
            .and_then(|c| c.add_question("¿Pregunta B?"))
            .expect("edit");
        let delta = extract(&cat);
        assert_eq!(
            delta.custom_questions,
            ["¿Pregunta A?".to_string(), "¿Pregunta B?".to_string()]
        );
    }

    #[test]
    fn evaluations_pass_through_untouched() {
        let mut cat = seed::catalog().clone();
        cat.evaluations.push(Evaluation {
            id: "x".to_string(),
            server: "RPSOFT".to_string(),
            ..Evaluation::default()
        });
        let delta = extract(&cat);
        assert_eq!(delta.evaluations.len(), 1);
        assert_eq!(apply(&delta).evaluations, cat.evaluations);
    }
}
