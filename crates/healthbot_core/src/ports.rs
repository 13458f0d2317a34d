//! crates/healthbot_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the
//! core to be independent of specific external implementations like databases
//! or model APIs.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{ChatMessage, Doctor, Patient, Report, ShareSession};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// The repository boundary over patient records, reports, share sessions,
/// and the chat transcript. Concrete adapters decide the storage backend.
#[async_trait]
pub trait RecordStore: Send + Sync {
    // --- Patients and Doctors ---
    async fn get_patient(&self, patient_id: Uuid) -> PortResult<Patient>;

    async fn get_doctor(&self, doctor_id: Uuid) -> PortResult<Doctor>;

    // --- Reports ---
    async fn insert_report(&self, report: Report) -> PortResult<Report>;

    async fn get_report(&self, report_id: Uuid) -> PortResult<Report>;

    /// All reports owned by a patient, ordered by creation time ascending.
    async fn get_reports_for_patient(&self, patient_id: Uuid) -> PortResult<Vec<Report>>;

    // --- Share Sessions ---
    async fn insert_session(&self, session: ShareSession) -> PortResult<ShareSession>;

    async fn get_session(&self, share_id: Uuid) -> PortResult<ShareSession>;

    /// Flips the stored active flag. Idempotent; concurrent flips of the same
    /// row are last-write-wins.
    async fn set_session_active(&self, share_id: Uuid, active: bool) -> PortResult<()>;

    // --- Chat Transcript ---
    async fn insert_chat_message(&self, message: ChatMessage) -> PortResult<()>;

    /// Full transcript for a share session, ordered by creation time ascending.
    async fn get_chat_history(&self, share_id: Uuid) -> PortResult<Vec<ChatMessage>>;
}

/// A stateless prompt-in, completion-out language model. No retries.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, prompt: &str) -> PortResult<String>;
}

/// Turns raw uploaded file bytes into text.
///
/// Callers are expected to recover an `Err` into a diagnostic placeholder
/// string rather than abort the surrounding upload.
#[async_trait]
pub trait DocumentTextExtractor: Send + Sync {
    async fn extract_text(&self, data: &[u8], content_type: &str) -> PortResult<String>;
}
