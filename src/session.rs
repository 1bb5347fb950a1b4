use std::collections::BTreeMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::catalog::{
    eq_ci, new_evaluation_id, now_iso, Catalog, Evaluation, NUMERIC_QUESTIONS, SCORE_MAX,
    SCORE_MIN,
};

const MSG_REQUIRED: &str = "Esta pregunta es obligatoria.";
const MSG_USERNAME_REQUIRED: &str = "El nombre de usuario es obligatorio.";
const MSG_EMAIL_REQUIRED: &str = "El correo electrónico es obligatorio.";
const MSG_EMAIL_INVALID: &str = "Por favor, ingrese un correo electrónico válido.";
const MSG_INVALID_OPTION: &str = "Opción no válida.";

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Step {
    #[default]
    Identity,
    Server,
    Project,
    Room,
    Teammate,
    Questions,
}

pub const STEP_COUNT: usize = 6;

impl Step {
    pub fn index(self) -> usize {
        match self {
            Step::Identity => 0,
            Step::Server => 1,
            Step::Project => 2,
            Step::Room => 3,
            Step::Teammate => 4,
            Step::Questions => 5,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Step::Identity => "identity",
            Step::Server => "server",
            Step::Project => "project",
            Step::Room => "room",
            Step::Teammate => "teammate",
            Step::Questions => "questions",
        }
    }

    fn prev(self) -> Step {
        match self {
            Step::Identity | Step::Server => Step::Identity,
            Step::Project => Step::Server,
            Step::Room => Step::Project,
            Step::Teammate => Step::Room,
            Step::Questions => Step::Teammate,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> FieldError {
        FieldError {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// One respondent walking the wizard. The catalog itself lives elsewhere;
/// the session only keeps the collected fields, the current step, and which
/// teammates were already evaluated this sitting.
#[derive(Debug, Clone, Default)]
pub struct Session {
    step: Step,
    username: String,
    email: String,
    server: String,
    project: String,
    room: String,
    teammate: String,
    evaluated: Vec<String>,
}

impl Session {
    pub fn new() -> Session {
        Session::default()
    }

    pub fn step(&self) -> Step {
        self.step
    }

    /// Option list for the current step. Identity and Questions have no
    /// choices; select steps read the live catalog.
    pub fn options(&self, catalog: &Catalog) -> Vec<String> {
        match self.step {
            Step::Identity | Step::Questions => Vec::new(),
            Step::Server => catalog.servers.clone(),
            Step::Project => catalog.projects_for(&self.server).to_vec(),
            Step::Room => catalog.rooms_for(&self.server, &self.project).to_vec(),
            Step::Teammate => self.available_teammates(catalog),
        }
    }

    /// Teammates still eligible this sitting: everyone in the chosen room
    /// except the respondent and anyone already evaluated, compared
    /// case-insensitively.
    fn available_teammates(&self, catalog: &Catalog) -> Vec<String> {
        catalog
            .teammates_for(&self.server, &self.project, &self.room)
            .iter()
            .filter(|name| !eq_ci(name, &self.username))
            .filter(|name| !self.evaluated.iter().any(|done| eq_ci(done, name)))
            .cloned()
            .collect()
    }

    pub fn back(&mut self) {
        self.step = self.step.prev();
    }

    pub fn submit_identity(
        &mut self,
        username: &str,
        email: &str,
    ) -> Result<(), Vec<FieldError>> {
        let username = username.trim();
        let email = email.trim();
        let mut errors = Vec::new();
        if username.is_empty() {
            errors.push(FieldError::new("username", MSG_USERNAME_REQUIRED));
        }
        if email.is_empty() {
            errors.push(FieldError::new("email", MSG_EMAIL_REQUIRED));
        } else if !email_re().is_match(email) {
            errors.push(FieldError::new("email", MSG_EMAIL_INVALID));
        }
        if !errors.is_empty() {
            return Err(errors);
        }
        self.username = username.to_string();
        self.email = email.to_string();
        self.step = Step::Server;
        Ok(())
    }

    /// Submit the value for the current select step. Picking a new parent
    /// clears every selection below it.
    pub fn submit_choice(
        &mut self,
        catalog: &Catalog,
        value: &str,
    ) -> Result<(), Vec<FieldError>> {
        let field = self.step.name();
        let value = value.trim();
        if value.is_empty() {
            return Err(vec![FieldError::new(field, MSG_REQUIRED)]);
        }
        if !self.options(catalog).iter().any(|opt| opt == value) {
            return Err(vec![FieldError::new(field, MSG_INVALID_OPTION)]);
        }
        match self.step {
            Step::Server => {
                self.server = value.to_string();
                self.project.clear();
                self.room.clear();
                self.teammate.clear();
                self.step = Step::Project;
            }
            Step::Project => {
                self.project = value.to_string();
                self.room.clear();
                self.teammate.clear();
                self.step = Step::Room;
            }
            Step::Room => {
                self.room = value.to_string();
                self.teammate.clear();
                self.step = Step::Teammate;
            }
            Step::Teammate => {
                self.teammate = value.to_string();
                self.step = Step::Questions;
            }
            Step::Identity | Step::Questions => {
                return Err(vec![FieldError::new(field, MSG_INVALID_OPTION)]);
            }
        }
        Ok(())
    }

    /// Submit the answer sheet. Every question is required; the leading
    /// numeric block must hold integer scores within range. On success the
    /// evaluation is returned and the wizard rewinds to the teammate step so
    /// the respondent can evaluate another peer.
    pub fn submit_answers(
        &mut self,
        catalog: &Catalog,
        answers: &BTreeMap<usize, String>,
    ) -> Result<Evaluation, Vec<FieldError>> {
        let mut errors = Vec::new();
        for (index, _question) in catalog.questions.iter().enumerate() {
            let field = format!("question_{index}");
            let Some(answer) = answers.get(&index).map(|a| a.trim()) else {
                errors.push(FieldError::new(field, MSG_REQUIRED));
                continue;
            };
            if answer.is_empty() {
                errors.push(FieldError::new(field, MSG_REQUIRED));
                continue;
            }
            if index < NUMERIC_QUESTIONS {
                match answer.parse::<i64>() {
                    Ok(score) if (SCORE_MIN..=SCORE_MAX).contains(&score) => {}
                    _ => errors.push(FieldError::new(
                        field,
                        format!(
                            "La puntuación debe ser un número entre {SCORE_MIN} y {SCORE_MAX}."
                        ),
                    )),
                }
            }
        }
        if !errors.is_empty() {
            return Err(errors);
        }

        let evaluation = Evaluation {
            id: new_evaluation_id(),
            username: self.username.clone(),
            email: self.email.clone(),
            server: self.server.clone(),
            project: self.project.clone(),
            room: self.room.clone(),
            teammate: self.teammate.clone(),
            answers: answers
                .iter()
                .map(|(k, v)| (*k, v.trim().to_string()))
                .collect(),
            date: now_iso(),
        };

        self.evaluated.push(self.teammate.to_lowercase());
        self.teammate.clear();
        self.step = Step::Teammate;
        Ok(evaluation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seed;

    fn room_session(catalog: &Catalog, username: &str) -> Session {
        let mut session = Session::new();
        session
            .submit_identity(username, &format!("{username}@example.com"))
            .expect("identity");
        session.submit_choice(catalog, "RPSOFT").expect("server");
        session.submit_choice(catalog, "RV3").expect("project");
        session.submit_choice(catalog, "Sala 1").expect("room");
        session
    }

    fn catalog_with_room() -> Catalog {
        seed::catalog()
            .add_room("RPSOFT", "RV3", "Sala 1")
            .and_then(|c| c.add_teammate("RPSOFT", "RV3", "Sala 1", "Ana"))
            .and_then(|c| c.add_teammate("RPSOFT", "RV3", "Sala 1", "Beto"))
            .expect("build")
    }

    #[test]
    fn identity_step_validates_email_format() {
        let mut session = Session::new();
        let errors = session.submit_identity("ana", "not-an-email").unwrap_err();
        assert_eq!(errors[0].field, "email");
        assert_eq!(errors[0].message, MSG_EMAIL_INVALID);
        assert_eq!(session.step(), Step::Identity);
    }

    #[test]
    fn respondent_is_excluded_case_insensitively() {
        let catalog = catalog_with_room();
        let session = room_session(&catalog, "ana");
        assert_eq!(session.options(&catalog), ["Beto".to_string()]);
    }

    #[test]
    fn evaluated_teammates_drop_out_of_the_options() {
        let catalog = catalog_with_room();
        let mut session = room_session(&catalog, "carla");
        session.submit_choice(&catalog, "Ana").expect("teammate");

        let mut answers = BTreeMap::new();
        for index in 0..catalog.questions.len() {
            answers.insert(index, "15".to_string());
        }
        let eval = session.submit_answers(&catalog, &answers).expect("submit");
        assert_eq!(eval.teammate, "Ana");
        assert_eq!(session.step(), Step::Teammate);
        assert_eq!(session.options(&catalog), ["Beto".to_string()]);
    }

    #[test]
    fn out_of_range_scores_are_rejected() {
        let catalog = catalog_with_room();
        let mut session = room_session(&catalog, "carla");
        session.submit_choice(&catalog, "Ana").expect("teammate");

        let mut answers = BTreeMap::new();
        for index in 0..catalog.questions.len() {
            answers.insert(index, "15".to_string());
        }
        answers.insert(0, "25".to_string());
        let errors = session.submit_answers(&catalog, &answers).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "question_0");
    }

    #[test]
    fn missing_answers_report_per_question() {
        let catalog = catalog_with_room();
        let mut session = room_session(&catalog, "carla");
        session.submit_choice(&catalog, "Ana").expect("teammate");

        let errors = session
            .submit_answers(&catalog, &BTreeMap::new())
            .unwrap_err();
        assert_eq!(errors.len(), catalog.questions.len());
        assert!(errors.iter().all(|e| e.message == MSG_REQUIRED));
    }

    #[test]
    fn picking_a_server_clears_selections_below_it() {
        let catalog = catalog_with_room();
        let mut session = room_session(&catalog, "carla");
        session.back();
        session.back();
        assert_eq!(session.step(), Step::Project);
        session.back();
        assert_eq!(session.step(), Step::Server);
        session
            .submit_choice(&catalog, "LABORATORIOS")
            .expect("server");
        assert_eq!(session.step(), Step::Project);
        assert_eq!(
            session.options(&catalog),
            ["LABORATORIO A".to_string(), "LABORATORIO B".to_string()]
        );
    }

    #[test]
    fn choices_outside_the_option_list_are_rejected() {
        let catalog = catalog_with_room();
        let mut session = Session::new();
        session.submit_identity("ana", "ana@example.com").expect("identity");
        let errors = session.submit_choice(&catalog, "NO-EXISTE").unwrap_err();
        assert_eq!(errors[0].field, "server");
        assert_eq!(errors[0].message, MSG_INVALID_OPTION);
    }
}
