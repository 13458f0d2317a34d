pub mod answer;
pub mod conflict;
pub mod domain;
pub mod ports;
pub mod share;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use answer::{merge_yearwise, TieredAnswerEngine, INSUFFICIENT_SENTINEL, NO_DATA_MESSAGE};
pub use conflict::{ConflictReport, MedicineConflictChecker};
pub use domain::{
    classify_document_type, ChatMessage, Doctor, DocumentKind, Patient, PatientSummary, Report,
    Sender, ShareSession,
};
pub use ports::{DocumentTextExtractor, LanguageModel, PortError, PortResult, RecordStore};
pub use share::{ShareSessionManager, DEFAULT_VALIDITY_MINUTES};
