use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::catalog::{Catalog, ProjectMap, RoomMap, TeammateMap, GENERAL_PROJECT, GENERAL_ROOM};

/// Reference data shipped with the application. Never mutated at runtime;
/// the delta engine diffs every live catalog against this baseline.
pub fn catalog() -> &'static Catalog {
    static SEED: OnceLock<Catalog> = OnceLock::new();
    SEED.get_or_init(build)
}

fn names(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn build() -> Catalog {
    let servers = names(&["RPSOFT", "6TO PY INNOVACION", "LABORATORIOS"]);

    let mut projects = ProjectMap::new();
    projects.insert(
        "RPSOFT".to_string(),
        names(&[
            "RV3",
            "AV1",
            "API-REST-GHL",
            "CRM-URBANY v1",
            "CRM-URBANY v2",
            "PHP - INTEGRACION",
            "PROYECTO X",
        ]),
    );
    projects.insert(
        "6TO PY INNOVACION".to_string(),
        names(&["PROYECTO INNOVACION 1", "PROYECTO INNOVACION 2"]),
    );
    projects.insert(
        "LABORATORIOS".to_string(),
        names(&["LABORATORIO A", "LABORATORIO B"]),
    );

    let mut rooms = RoomMap::new();
    rooms.insert(
        "RPSOFT".to_string(),
        BTreeMap::from([(GENERAL_PROJECT.to_string(), names(&[GENERAL_ROOM]))]),
    );
    rooms.insert("6TO PY INNOVACION".to_string(), BTreeMap::new());
    rooms.insert("LABORATORIOS".to_string(), BTreeMap::new());

    let mut teammates = TeammateMap::new();
    teammates.insert(
        "RPSOFT".to_string(),
        project_teammates(&[
            ("RV3", &["Juan Pérez", "María García", "Carlos López"]),
            ("AV1", &["Ana Martínez", "Pedro Rodríguez"]),
            ("API-REST-GHL", &["Laura Sánchez", "Diego Torres"]),
            ("CRM-URBANY v1", &["Sofia Ramírez", "Miguel González"]),
            ("CRM-URBANY v2", &["Elena Fernández", "Javier Ruiz"]),
            ("PHP - INTEGRACION", &["Carmen Díaz", "Roberto Morales"]),
            ("PROYECTO X", &["Isabel Jiménez", "Fernando Castro"]),
        ]),
    );
    teammates.insert(
        "6TO PY INNOVACION".to_string(),
        project_teammates(&[
            ("PROYECTO INNOVACION 1", &["Compañero 1", "Compañero 2"]),
            ("PROYECTO INNOVACION 2", &["Compañero 3", "Compañero 4"]),
        ]),
    );
    teammates.insert(
        "LABORATORIOS".to_string(),
        project_teammates(&[
            ("LABORATORIO A", &["Investigador 1", "Investigador 2"]),
            ("LABORATORIO B", &["Investigador 3", "Investigador 4"]),
        ]),
    );

    let questions = names(&[
        "¿Con qué frecuencia llega a tiempo a reuniones o dailys?",
        "¿Avisa con anticipación cuando falta?",
        "¿Se refiere a compañeros de forma respetuosa?",
        "¿Participa activamente (micrófono/chat)?",
        "¿Explica ideas de manera comprensible?",
        "¿Entrega tareas en plazo?",
        "¿Mantiene calidad constante?",
        "¿Comunica retrasos o bloqueos?",
        "¿Interactúa en Discord/canales?",
        "¿Se muestra comprometido?",
        "¿Ayuda a compañeros?",
    ]);

    Catalog {
        servers,
        projects,
        rooms,
        teammates,
        questions,
        evaluations: Vec::new(),
    }
}

// Seed teammate lists predate per-room grouping; canonically they live under
// the general room.
fn project_teammates(entries: &[(&str, &[&str])]) -> BTreeMap<String, BTreeMap<String, Vec<String>>> {
    entries
        .iter()
        .map(|(project, members)| {
            (
                project.to_string(),
                BTreeMap::from([(GENERAL_ROOM.to_string(), names(members))]),
            )
        })
        .collect()
}
