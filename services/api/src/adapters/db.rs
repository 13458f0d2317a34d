//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `RecordStore` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use healthbot_core::domain::{
    ChatMessage, Doctor, DocumentKind, Patient, Report, Sender, ShareSession,
};
use healthbot_core::ports::{PortError, PortResult, RecordStore};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `RecordStore` port.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Creates a new `PgStore`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn not_found(e: sqlx::Error, entity: &str, id: Uuid) -> PortError {
    match e {
        sqlx::Error::RowNotFound => PortError::NotFound(format!("{} {} not found", entity, id)),
        _ => PortError::Unexpected(e.to_string()),
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct PersonRecord {
    id: Uuid,
    name: String,
    email: String,
}

impl PersonRecord {
    fn to_patient(self) -> Patient {
        Patient {
            id: self.id,
            name: self.name,
            email: self.email,
        }
    }

    fn to_doctor(self) -> Doctor {
        Doctor {
            id: self.id,
            name: self.name,
            email: self.email,
        }
    }
}

#[derive(FromRow)]
struct ReportRecord {
    id: Uuid,
    patient_id: Uuid,
    filename: String,
    storage_path: String,
    text_content: String,
    structured: Option<serde_json::Value>,
    doc_type: String,
    created_at: DateTime<Utc>,
}

impl ReportRecord {
    fn to_domain(self) -> Report {
        Report {
            id: self.id,
            patient_id: self.patient_id,
            filename: self.filename,
            storage_path: self.storage_path,
            text_content: self.text_content,
            structured: self.structured,
            doc_type: DocumentKind::from_str(&self.doc_type),
            created_at: self.created_at,
        }
    }
}

#[derive(FromRow)]
struct SessionRecord {
    id: Uuid,
    patient_id: Uuid,
    doctor_id: Uuid,
    report_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    is_active: bool,
}

impl SessionRecord {
    fn to_domain(self) -> ShareSession {
        ShareSession {
            id: self.id,
            patient_id: self.patient_id,
            doctor_id: self.doctor_id,
            report_id: self.report_id,
            created_at: self.created_at,
            expires_at: self.expires_at,
            active: self.is_active,
        }
    }
}

#[derive(FromRow)]
struct ChatMessageRecord {
    id: Uuid,
    share_id: Uuid,
    sender: String,
    message: String,
    created_at: DateTime<Utc>,
}

impl ChatMessageRecord {
    fn to_domain(self) -> ChatMessage {
        ChatMessage {
            id: self.id,
            share_id: self.share_id,
            sender: if self.sender == "doctor" {
                Sender::Doctor
            } else {
                Sender::Bot
            },
            message: self.message,
            created_at: self.created_at,
        }
    }
}

//=========================================================================================
// `RecordStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl RecordStore for PgStore {
    async fn get_patient(&self, patient_id: Uuid) -> PortResult<Patient> {
        let record = sqlx::query_as::<_, PersonRecord>(
            "SELECT id, name, email FROM patients WHERE id = $1",
        )
        .bind(patient_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found(e, "Patient", patient_id))?;
        Ok(record.to_patient())
    }

    async fn get_doctor(&self, doctor_id: Uuid) -> PortResult<Doctor> {
        let record = sqlx::query_as::<_, PersonRecord>(
            "SELECT id, name, email FROM doctors WHERE id = $1",
        )
        .bind(doctor_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found(e, "Doctor", doctor_id))?;
        Ok(record.to_doctor())
    }

    async fn insert_report(&self, report: Report) -> PortResult<Report> {
        let record = sqlx::query_as::<_, ReportRecord>(
            "INSERT INTO reports (id, patient_id, filename, storage_path, text_content, structured, doc_type, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             RETURNING id, patient_id, filename, storage_path, text_content, structured, doc_type, created_at",
        )
        .bind(report.id)
        .bind(report.patient_id)
        .bind(&report.filename)
        .bind(&report.storage_path)
        .bind(&report.text_content)
        .bind(&report.structured)
        .bind(report.doc_type.as_str())
        .bind(report.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn get_report(&self, report_id: Uuid) -> PortResult<Report> {
        let record = sqlx::query_as::<_, ReportRecord>(
            "SELECT id, patient_id, filename, storage_path, text_content, structured, doc_type, created_at \
             FROM reports WHERE id = $1",
        )
        .bind(report_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found(e, "Report", report_id))?;
        Ok(record.to_domain())
    }

    async fn get_reports_for_patient(&self, patient_id: Uuid) -> PortResult<Vec<Report>> {
        let records = sqlx::query_as::<_, ReportRecord>(
            "SELECT id, patient_id, filename, storage_path, text_content, structured, doc_type, created_at \
             FROM reports WHERE patient_id = $1 ORDER BY created_at ASC",
        )
        .bind(patient_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn insert_session(&self, session: ShareSession) -> PortResult<ShareSession> {
        let record = sqlx::query_as::<_, SessionRecord>(
            "INSERT INTO share_sessions (id, patient_id, doctor_id, report_id, created_at, expires_at, is_active) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING id, patient_id, doctor_id, report_id, created_at, expires_at, is_active",
        )
        .bind(session.id)
        .bind(session.patient_id)
        .bind(session.doctor_id)
        .bind(session.report_id)
        .bind(session.created_at)
        .bind(session.expires_at)
        .bind(session.active)
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(record.to_domain())
    }

    async fn get_session(&self, share_id: Uuid) -> PortResult<ShareSession> {
        let record = sqlx::query_as::<_, SessionRecord>(
            "SELECT id, patient_id, doctor_id, report_id, created_at, expires_at, is_active \
             FROM share_sessions WHERE id = $1",
        )
        .bind(share_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| not_found(e, "Session", share_id))?;
        Ok(record.to_domain())
    }

    async fn set_session_active(&self, share_id: Uuid, active: bool) -> PortResult<()> {
        sqlx::query("UPDATE share_sessions SET is_active = $1 WHERE id = $2")
            .bind(active)
            .bind(share_id)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn insert_chat_message(&self, message: ChatMessage) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO chat_messages (id, share_id, sender, message, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(message.id)
        .bind(message.share_id)
        .bind(message.sender.as_str())
        .bind(&message.message)
        .bind(message.created_at)
        .execute(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(())
    }

    async fn get_chat_history(&self, share_id: Uuid) -> PortResult<Vec<ChatMessage>> {
        let records = sqlx::query_as::<_, ChatMessageRecord>(
            "SELECT id, share_id, sender, message, created_at \
             FROM chat_messages WHERE share_id = $1 ORDER BY created_at ASC",
        )
        .bind(share_id)
        .fetch_all(&self.pool)
        .await
        .map_err(unexpected)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }
}
