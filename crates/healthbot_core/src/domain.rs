//! crates/healthbot_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format,
//! except where a field is itself a JSON document (structured extractions).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A patient who owns medical reports.
#[derive(Debug, Clone)]
pub struct Patient {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

/// A doctor who can be granted time-boxed access to a patient's reports.
#[derive(Debug, Clone)]
pub struct Doctor {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

/// Coarse classification of an uploaded medical document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    DischargeSummary,
    Prescription,
    LabReport,
    Bill,
    Unknown,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::DischargeSummary => "discharge_summary",
            DocumentKind::Prescription => "prescription",
            DocumentKind::LabReport => "lab_report",
            DocumentKind::Bill => "bill",
            DocumentKind::Unknown => "unknown",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "discharge_summary" => DocumentKind::DischargeSummary,
            "prescription" => DocumentKind::Prescription,
            "lab_report" => DocumentKind::LabReport,
            "bill" => DocumentKind::Bill,
            _ => DocumentKind::Unknown,
        }
    }
}

/// Keyword heuristic for classifying extracted report text.
pub fn classify_document_type(text: &str) -> DocumentKind {
    let t = text.to_lowercase();
    if t.contains("discharge") || t.contains("admission") {
        DocumentKind::DischargeSummary
    } else if t.contains("prescription") || t.contains("rx") {
        DocumentKind::Prescription
    } else if t.contains("laboratory") || t.contains("hemoglobin") || t.contains("report") {
        DocumentKind::LabReport
    } else if t.contains("invoice") || t.contains("bill") || t.contains("amount") {
        DocumentKind::Bill
    } else {
        DocumentKind::Unknown
    }
}

/// A single uploaded medical report. Immutable once written.
#[derive(Debug, Clone)]
pub struct Report {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub filename: String,
    pub storage_path: String,
    /// Full text recovered by the document extractor (or a diagnostic
    /// placeholder when extraction failed).
    pub text_content: String,
    /// Structured clinical extraction, when the model produced parseable JSON.
    pub structured: Option<serde_json::Value>,
    pub doc_type: DocumentKind,
    pub created_at: DateTime<Utc>,
}

/// A time-boxed grant linking a patient's records to a requesting doctor.
///
/// The `id` is the opaque share token handed to the doctor out-of-band.
#[derive(Debug, Clone)]
pub struct ShareSession {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub doctor_id: Uuid,
    /// When present, the share covers only this report; otherwise all of the
    /// patient's reports.
    pub report_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub active: bool,
}

impl ShareSession {
    /// A session is usable iff it is still flagged active AND the wall clock
    /// has not passed its expiry. The time check is authoritative; the flag
    /// only caches past expiry observations.
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.active && now < self.expires_at
    }
}

/// Who authored a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    Doctor,
    Bot,
}

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sender::Doctor => "doctor",
            Sender::Bot => "bot",
        }
    }
}

/// One entry in a share session's doctor/bot transcript. Append-only.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub share_id: Uuid,
    pub sender: Sender,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// Structured brief shown to the doctor when a chat window opens.
#[derive(Debug, Clone, Serialize)]
pub struct PatientSummary {
    /// Year -> merged structured fields across that year's reports.
    pub merged_yearwise: serde_json::Value,
    pub doc_type: DocumentKind,
    pub latest_report_at: Option<DateTime<Utc>>,
    pub report_count: usize,
}
