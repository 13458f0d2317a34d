//! In-memory fakes for the core ports, used by this crate's unit tests and,
//! behind the `testing` feature, by downstream integration tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::domain::{
    classify_document_type, ChatMessage, Doctor, Patient, Report, ShareSession,
};
use crate::ports::{LanguageModel, PortError, PortResult, RecordStore};

/// A `RecordStore` over plain in-memory maps.
#[derive(Default)]
pub struct FakeStore {
    patients: Mutex<HashMap<Uuid, Patient>>,
    doctors: Mutex<HashMap<Uuid, Doctor>>,
    reports: Mutex<Vec<Report>>,
    sessions: Mutex<HashMap<Uuid, ShareSession>>,
    messages: Mutex<Vec<ChatMessage>>,
    fail_next_flip: AtomicBool,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_patient(&self, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.patients.lock().unwrap().insert(
            id,
            Patient {
                id,
                name: name.to_string(),
                email: format!("{}@example.test", id),
            },
        );
        id
    }

    pub fn add_doctor(&self, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.doctors.lock().unwrap().insert(
            id,
            Doctor {
                id,
                name: name.to_string(),
                email: format!("{}@example.test", id),
            },
        );
        id
    }

    pub fn add_report(
        &self,
        patient_id: Uuid,
        text: &str,
        structured: Option<serde_json::Value>,
    ) -> Uuid {
        let id = Uuid::new_v4();
        self.reports.lock().unwrap().push(Report {
            id,
            patient_id,
            filename: format!("{}.pdf", id),
            storage_path: format!("medical-reports/{}.pdf", id),
            text_content: text.to_string(),
            structured,
            doc_type: classify_document_type(text),
            created_at: Utc::now(),
        });
        id
    }

    pub fn add_session(&self, patient_id: Uuid, doctor_id: Uuid, delta: Duration) -> Uuid {
        let id = Uuid::new_v4();
        let now = Utc::now();
        self.sessions.lock().unwrap().insert(
            id,
            ShareSession {
                id,
                patient_id,
                doctor_id,
                report_id: None,
                created_at: now,
                expires_at: now + delta,
                active: true,
            },
        );
        id
    }

    pub fn add_session_expiring_in(&self, delta: Duration) -> Uuid {
        self.add_session(Uuid::new_v4(), Uuid::new_v4(), delta)
    }

    pub fn session(&self, share_id: Uuid) -> ShareSession {
        self.sessions.lock().unwrap()[&share_id].clone()
    }

    pub fn deactivate_session(&self, share_id: Uuid) {
        self.sessions
            .lock()
            .unwrap()
            .get_mut(&share_id)
            .unwrap()
            .active = false;
    }

    pub fn fail_next_flip(&self) {
        self.fail_next_flip.store(true, Ordering::SeqCst);
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        self.messages.lock().unwrap().clone()
    }

    pub fn reports(&self) -> Vec<Report> {
        self.reports.lock().unwrap().clone()
    }
}

#[async_trait]
impl RecordStore for FakeStore {
    async fn get_patient(&self, patient_id: Uuid) -> PortResult<Patient> {
        self.patients
            .lock()
            .unwrap()
            .get(&patient_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Patient {} not found", patient_id)))
    }

    async fn get_doctor(&self, doctor_id: Uuid) -> PortResult<Doctor> {
        self.doctors
            .lock()
            .unwrap()
            .get(&doctor_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Doctor {} not found", doctor_id)))
    }

    async fn insert_report(&self, report: Report) -> PortResult<Report> {
        self.reports.lock().unwrap().push(report.clone());
        Ok(report)
    }

    async fn get_report(&self, report_id: Uuid) -> PortResult<Report> {
        self.reports
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == report_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Report {} not found", report_id)))
    }

    async fn get_reports_for_patient(&self, patient_id: Uuid) -> PortResult<Vec<Report>> {
        Ok(self
            .reports
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.patient_id == patient_id)
            .cloned()
            .collect())
    }

    async fn insert_session(&self, session: ShareSession) -> PortResult<ShareSession> {
        self.sessions
            .lock()
            .unwrap()
            .insert(session.id, session.clone());
        Ok(session)
    }

    async fn get_session(&self, share_id: Uuid) -> PortResult<ShareSession> {
        self.sessions
            .lock()
            .unwrap()
            .get(&share_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Session {} not found", share_id)))
    }

    async fn set_session_active(&self, share_id: Uuid, active: bool) -> PortResult<()> {
        if self.fail_next_flip.swap(false, Ordering::SeqCst) {
            return Err(PortError::Unexpected("simulated write failure".into()));
        }
        if let Some(session) = self.sessions.lock().unwrap().get_mut(&share_id) {
            session.active = active;
        }
        Ok(())
    }

    async fn insert_chat_message(&self, message: ChatMessage) -> PortResult<()> {
        self.messages.lock().unwrap().push(message);
        Ok(())
    }

    async fn get_chat_history(&self, share_id: Uuid) -> PortResult<Vec<ChatMessage>> {
        Ok(self
            .messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.share_id == share_id)
            .cloned()
            .collect())
    }
}

/// A `LanguageModel` that replays a fixed script and records every prompt.
pub struct ScriptedModel {
    replies: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new(replies: Vec<&str>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(String::from).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompt(&self, index: usize) -> String {
        self.prompts.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, prompt: &str) -> PortResult<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| PortError::Unexpected("scripted model exhausted".into()))
    }
}
