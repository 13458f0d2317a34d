//! crates/healthbot_core/src/conflict.rs
//!
//! Medicine conflict checking: extract medicine names from a session's
//! report text, then ask the model for an interaction analysis. Nothing is
//! cached; every call re-extracts.

use std::sync::Arc;

use crate::domain::ShareSession;
use crate::ports::{LanguageModel, PortError, PortResult, RecordStore};

const EXTRACT_MEDS_PROMPT_TEMPLATE: &str = r#"Extract all medicine names from the following report.
Return ONLY a JSON array of strings. No markdown, no backticks.

{data}"#;

const CONFLICT_PROMPT_TEMPLATE: &str = r#"Check for drug-drug interactions among these medicines:
{data}

List:
- Interactions
- Risks
- Warnings
- Disclaimer

Write clearly for doctors."#;

/// The outcome of a conflict check: the medicines found and the analysis.
#[derive(Debug, Clone)]
pub struct ConflictReport {
    pub medicines: Vec<String>,
    pub analysis: String,
}

/// Extracts a medicine list from a session's reports and analyses it.
#[derive(Clone)]
pub struct MedicineConflictChecker {
    store: Arc<dyn RecordStore>,
    model: Arc<dyn LanguageModel>,
}

impl MedicineConflictChecker {
    pub fn new(store: Arc<dyn RecordStore>, model: Arc<dyn LanguageModel>) -> Self {
        Self { store, model }
    }

    /// Runs the two-step check for a validated session.
    ///
    /// Fails with `NotFound` when the session covers no reports. The
    /// extraction reply is expected to be a JSON array of strings; anything
    /// unparseable becomes a single-element list holding the raw reply.
    pub async fn check(&self, session: &ShareSession) -> PortResult<ConflictReport> {
        let reports = match session.report_id {
            Some(report_id) => vec![self.store.get_report(report_id).await?],
            None => self.store.get_reports_for_patient(session.patient_id).await?,
        };
        if reports.is_empty() {
            return Err(PortError::NotFound(format!(
                "No reports found for patient {}",
                session.patient_id
            )));
        }

        let text: Vec<&str> = reports.iter().map(|r| r.text_content.as_str()).collect();
        let extract_prompt =
            EXTRACT_MEDS_PROMPT_TEMPLATE.replace("{data}", &text.join("\n\n---\n\n"));
        let raw = self.model.complete(&extract_prompt).await?;
        let medicines = parse_medicine_list(&raw);

        let conflict_prompt = CONFLICT_PROMPT_TEMPLATE.replace("{data}", &medicines.join(", "));
        let analysis = self.model.complete(&conflict_prompt).await?;

        Ok(ConflictReport { medicines, analysis })
    }
}

/// Parses the extraction reply into a medicine list. Never fails: a reply
/// that is not a JSON array of strings is returned as a one-element list.
fn parse_medicine_list(raw: &str) -> Vec<String> {
    let cleaned = raw
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    match serde_json::from_str::<Vec<String>>(cleaned) {
        Ok(list) => list,
        Err(_) => vec![raw.trim().to_string()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeStore, ScriptedModel};
    use chrono::{Duration, Utc};
    use uuid::Uuid;

    fn session_for(patient_id: Uuid) -> ShareSession {
        let now = Utc::now();
        ShareSession {
            id: Uuid::new_v4(),
            patient_id,
            doctor_id: Uuid::new_v4(),
            report_id: None,
            created_at: now,
            expires_at: now + Duration::minutes(15),
            active: true,
        }
    }

    #[tokio::test]
    async fn extracts_list_then_analyses_it() {
        let store = Arc::new(FakeStore::new());
        let patient = store.add_patient("Asha");
        store.add_report(patient, "Rx: warfarin, aspirin", None);
        let model = Arc::new(ScriptedModel::new(vec![
            r#"["warfarin", "aspirin"]"#,
            "Warfarin + aspirin raises bleeding risk. Disclaimer: verify dosing.",
        ]));

        let checker = MedicineConflictChecker::new(store, model.clone());
        let result = checker.check(&session_for(patient)).await.unwrap();

        assert_eq!(result.medicines, vec!["warfarin", "aspirin"]);
        assert!(result.analysis.contains("bleeding risk"));
        assert!(model.prompt(1).contains("warfarin, aspirin"));
    }

    #[tokio::test]
    async fn non_json_reply_becomes_single_element_list() {
        let store = Arc::new(FakeStore::new());
        let patient = store.add_patient("Asha");
        store.add_report(patient, "Rx: metformin", None);
        let model = Arc::new(ScriptedModel::new(vec![
            "The report mentions metformin only.",
            "No interactions for a single medicine.",
        ]));

        let checker = MedicineConflictChecker::new(store, model);
        let result = checker.check(&session_for(patient)).await.unwrap();

        assert_eq!(result.medicines, vec!["The report mentions metformin only."]);
    }

    #[test]
    fn fenced_json_is_unwrapped() {
        assert_eq!(
            parse_medicine_list("```json\n[\"ibuprofen\"]\n```"),
            vec!["ibuprofen"]
        );
        assert_eq!(
            parse_medicine_list("```\n[\"warfarin\", \"aspirin\"]\n```"),
            vec!["warfarin", "aspirin"]
        );
    }

    #[tokio::test]
    async fn empty_scope_is_not_found() {
        let store = Arc::new(FakeStore::new());
        let patient = store.add_patient("Asha");
        let model = Arc::new(ScriptedModel::new(vec![]));

        let checker = MedicineConflictChecker::new(store, model.clone());
        let err = checker.check(&session_for(patient)).await.unwrap_err();

        assert!(matches!(err, PortError::NotFound(_)));
        assert_eq!(model.call_count(), 0);
    }
}
