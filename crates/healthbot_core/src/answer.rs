//! crates/healthbot_core/src/answer.rs
//!
//! The tiered answer engine: answers a doctor's free-text question about a
//! patient by cascading across data granularities, cheapest first.
//!
//! Tier 1 asks over a merged year-wise aggregate of all structured
//! extractions, tier 2 over the per-document structured JSON list, tier 3
//! over the raw extracted text. Tiers 1 and 2 fall through when the model
//! replies with the `INSUFFICIENT` sentinel; tier 3 is terminal and always
//! produces a best-effort answer.

use std::sync::Arc;

use chrono::Datelike;
use serde_json::{Map, Value};

use crate::domain::{DocumentKind, PatientSummary, Report, ShareSession};
use crate::ports::{LanguageModel, PortResult, RecordStore};

/// Exact marker a tier-1/2 model reply must contain to trigger cascading.
pub const INSUFFICIENT_SENTINEL: &str = "INSUFFICIENT";

/// Fixed reply when the share covers no report data at all.
pub const NO_DATA_MESSAGE: &str = "No data available in the patient's records.";

const AGGREGATE_PROMPT_TEMPLATE: &str = r#"You are a medical assistant helping a doctor review a patient's history.
Using ONLY the year-wise JSON patient history below, answer the question if possible.

JSON:
{data}

Question: {question}

Guidelines:
- Answer ONLY from the JSON above. Never fabricate values that are not present.
- Do NOT provide a final diagnosis.
- If the JSON does NOT contain the answer, reply with the EXACT string: "INSUFFICIENT"."#;

const STRUCTURED_PROMPT_TEMPLATE: &str = r#"You are a medical assistant helping a doctor review a patient's history.
Using ONLY this list of structured medical extractions, one per document:

{data}

Question: {question}

Guidelines:
- Answer ONLY from the data above. Never fabricate values that are not present.
- Do NOT provide a final diagnosis.
- If the answer is still not found, reply with the EXACT string: "INSUFFICIENT"."#;

const RAW_TEXT_PROMPT_TEMPLATE: &str = r#"You are a medical assistant helping a doctor review a patient's records.
Use the raw extracted report text below to answer the question.

REPORT TEXT:
{data}

Question: {question}

Guidelines:
- Ground your answer in the report text; do not invent findings.
- Do NOT provide a final diagnosis.
- If the text is unclear, reason it through anyway and clearly note your uncertainty
  rather than refusing to answer."#;

const OPENING_PROMPT_TEMPLATE: &str = r#"Convert this medical summary into a short 3-5 line doctor-friendly brief.

Summary Data:
{data}

Output: a concise natural-language explanation, plain text, no markdown."#;

/// Answers questions over a validated share session's report data.
#[derive(Clone)]
pub struct TieredAnswerEngine {
    store: Arc<dyn RecordStore>,
    model: Arc<dyn LanguageModel>,
}

impl TieredAnswerEngine {
    pub fn new(store: Arc<dyn RecordStore>, model: Arc<dyn LanguageModel>) -> Self {
        Self { store, model }
    }

    /// Resolves the reports a session grants access to: the single named
    /// report when the share was scoped, otherwise all of the patient's.
    pub async fn scoped_reports(&self, session: &ShareSession) -> PortResult<Vec<Report>> {
        match session.report_id {
            Some(report_id) => Ok(vec![self.store.get_report(report_id).await?]),
            None => self.store.get_reports_for_patient(session.patient_id).await,
        }
    }

    /// Answers `question` from the least-granular data source that suffices.
    ///
    /// Short-circuits with [`NO_DATA_MESSAGE`] — without any model call —
    /// when the session covers no reports at all. A tier with no data to
    /// offer is skipped the same way an insufficient reply would skip it.
    pub async fn answer(&self, session: &ShareSession, question: &str) -> PortResult<String> {
        let reports = self.scoped_reports(session).await?;
        if reports.is_empty() {
            return Ok(NO_DATA_MESSAGE.to_string());
        }

        // Tier 1: merged year-wise aggregate.
        let merged = merge_yearwise(&reports);
        if merged.as_object().is_some_and(|m| !m.is_empty()) {
            let prompt = fill(AGGREGATE_PROMPT_TEMPLATE, &to_pretty(&merged), question);
            let reply = self.model.complete(&prompt).await?;
            if !is_insufficient(&reply) {
                return Ok(reply);
            }
        }

        // Tier 2: per-document structured extractions.
        let structured: Vec<&Value> = reports.iter().filter_map(|r| r.structured.as_ref()).collect();
        if !structured.is_empty() {
            let listing = serde_json::to_string_pretty(&structured).unwrap_or_default();
            let prompt = fill(STRUCTURED_PROMPT_TEMPLATE, &listing, question);
            let reply = self.model.complete(&prompt).await?;
            if !is_insufficient(&reply) {
                return Ok(reply);
            }
        }

        // Tier 3: raw extracted text. Terminal; never cascades further.
        let texts: Vec<&str> = reports.iter().map(|r| r.text_content.as_str()).collect();
        let prompt = fill(RAW_TEXT_PROMPT_TEMPLATE, &texts.join("\n\n---\n\n"), question);
        self.model.complete(&prompt).await
    }

    /// Builds the structured brief for the chat-opening view.
    pub async fn summary(&self, session: &ShareSession) -> PortResult<PatientSummary> {
        let reports = self.scoped_reports(session).await?;
        let doc_type = reports
            .last()
            .map(|r| r.doc_type)
            .unwrap_or(DocumentKind::Unknown);
        Ok(PatientSummary {
            merged_yearwise: merge_yearwise(&reports),
            doc_type,
            latest_report_at: reports.last().map(|r| r.created_at),
            report_count: reports.len(),
        })
    }

    /// Turns a [`PatientSummary`] into a short natural-language greeting.
    pub async fn opening_message(&self, summary: &PatientSummary) -> PortResult<String> {
        if summary.report_count == 0 {
            return Ok(NO_DATA_MESSAGE.to_string());
        }
        let data = serde_json::to_string_pretty(summary)
            .unwrap_or_else(|_| "{}".to_string());
        let prompt = OPENING_PROMPT_TEMPLATE.replace("{data}", &data);
        self.model.complete(&prompt).await
    }
}

/// Merges all structured extractions into a year-keyed aggregate.
///
/// Reports are expected in creation order; within a year, a later report's
/// fields overwrite an earlier report's on key collision (merge semantics,
/// not append).
pub fn merge_yearwise(reports: &[Report]) -> Value {
    let mut years: Map<String, Value> = Map::new();
    for report in reports {
        let Some(Value::Object(fields)) = &report.structured else {
            continue;
        };
        let year = report.created_at.year().to_string();
        let entry = years
            .entry(year)
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(merged) = entry {
            for (key, value) in fields {
                merged.insert(key.clone(), value.clone());
            }
        }
    }
    Value::Object(years)
}

fn is_insufficient(reply: &str) -> bool {
    reply.to_uppercase().contains(INSUFFICIENT_SENTINEL)
}

fn fill(template: &str, data: &str, question: &str) -> String {
    template.replace("{data}", data).replace("{question}", question)
}

fn to_pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeStore, ScriptedModel};
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::json;
    use uuid::Uuid;

    fn engine(store: Arc<FakeStore>, model: Arc<ScriptedModel>) -> TieredAnswerEngine {
        TieredAnswerEngine::new(store, model)
    }

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
    async fn zero_reports_short_circuits_without_model_call() {
        let store = Arc::new(FakeStore::new());
        let patient = store.add_patient("Asha");
        let model = Arc::new(ScriptedModel::new(vec![]));

        let answer = engine(store, model.clone())
            .answer(&session_for(patient), "Any history of anemia?")
            .await
            .unwrap();

        assert_eq!(answer, NO_DATA_MESSAGE);
        assert_eq!(model.call_count(), 0);
    }

    #[tokio::test]
    async fn tier_one_answer_stops_the_cascade() {
        let store = Arc::new(FakeStore::new());
        let patient = store.add_patient("Asha");
        store.add_report(patient, "hb 13.2", Some(json!({"hemoglobin": "13.2"})));
        let model = Arc::new(ScriptedModel::new(vec!["Hemoglobin was 13.2 g/dL."]));

        let answer = engine(store, model.clone())
            .answer(&session_for(patient), "What was the hemoglobin?")
            .await
            .unwrap();

        assert_eq!(answer, "Hemoglobin was 13.2 g/dL.");
        assert_eq!(model.call_count(), 1);
    }

    #[tokio::test]
    async fn sentinel_cascades_to_tier_two() {
        let store = Arc::new(FakeStore::new());
        let patient = store.add_patient("Asha");
        store.add_report(patient, "hb 13.2", Some(json!({"hemoglobin": "13.2"})));
        // Lowercase on purpose; the sentinel check is case-insensitive.
        let model = Arc::new(ScriptedModel::new(vec![
            "insufficient",
            "Found it in the lab report.",
        ]));

        let answer = engine(store, model.clone())
            .answer(&session_for(patient), "What was the creatinine?")
            .await
            .unwrap();

        assert_eq!(answer, "Found it in the lab report.");
        assert_eq!(model.call_count(), 2);
    }

    #[tokio::test]
    async fn double_sentinel_falls_back_to_raw_text() {
        let store = Arc::new(FakeStore::new());
        let patient = store.add_patient("Asha");
        store.add_report(patient, "creatinine 0.9 mg/dL", Some(json!({"hemoglobin": "13.2"})));
        let model = Arc::new(ScriptedModel::new(vec![
            "INSUFFICIENT",
            "INSUFFICIENT",
            "Creatinine was 0.9 mg/dL per the raw report.",
        ]));

        let answer = engine(store, model.clone())
            .answer(&session_for(patient), "What was the creatinine?")
            .await
            .unwrap();

        assert_eq!(answer, "Creatinine was 0.9 mg/dL per the raw report.");
        assert_eq!(model.call_count(), 3);
        assert!(model.prompt(2).contains("creatinine 0.9 mg/dL"));
    }

    #[tokio::test]
    async fn reports_without_structured_data_go_straight_to_raw_text() {
        let store = Arc::new(FakeStore::new());
        let patient = store.add_patient("Asha");
        store.add_report(patient, "plain OCR text only", None);
        let model = Arc::new(ScriptedModel::new(vec!["Best-effort answer."]));

        let answer = engine(store, model.clone())
            .answer(&session_for(patient), "Anything notable?")
            .await
            .unwrap();

        assert_eq!(answer, "Best-effort answer.");
        assert_eq!(model.call_count(), 1);
        assert!(model.prompt(0).contains("plain OCR text only"));
    }

    #[tokio::test]
    async fn scoped_share_only_sees_its_report() {
        let store = Arc::new(FakeStore::new());
        let patient = store.add_patient("Asha");
        store.add_report(patient, "first report text", None);
        let second = store.add_report(patient, "second report text", None);
        let model = Arc::new(ScriptedModel::new(vec!["ok"]));

        let mut session = session_for(patient);
        session.report_id = Some(second);

        engine(store, model.clone())
            .answer(&session, "Anything notable?")
            .await
            .unwrap();

        assert!(model.prompt(0).contains("second report text"));
        assert!(!model.prompt(0).contains("first report text"));
    }

    #[test]
    fn merge_is_yearwise_and_later_fields_win() {
        let patient = Uuid::new_v4();
        let mk = |year: i32, month: u32, structured: Value| Report {
            id: Uuid::new_v4(),
            patient_id: patient,
            filename: "r.pdf".into(),
            storage_path: "r.pdf".into(),
            text_content: String::new(),
            structured: Some(structured),
            doc_type: DocumentKind::LabReport,
            created_at: Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).unwrap(),
        };

        let merged = merge_yearwise(&[
            mk(2023, 1, json!({"hemoglobin": "11.0", "notes": "mild anemia"})),
            mk(2023, 9, json!({"hemoglobin": "13.2"})),
            mk(2024, 3, json!({"hemoglobin": "13.5"})),
        ]);

        assert_eq!(merged["2023"]["hemoglobin"], "13.2");
        assert_eq!(merged["2023"]["notes"], "mild anemia");
        assert_eq!(merged["2024"]["hemoglobin"], "13.5");
    }

    #[tokio::test]
    async fn opening_message_skips_model_when_summary_is_empty() {
        let store = Arc::new(FakeStore::new());
        let model = Arc::new(ScriptedModel::new(vec![]));
        let summary = PatientSummary {
            merged_yearwise: json!({}),
            doc_type: DocumentKind::Unknown,
            latest_report_at: None,
            report_count: 0,
        };

        let text = engine(store, model.clone())
            .opening_message(&summary)
            .await
            .unwrap();

        assert_eq!(text, NO_DATA_MESSAGE);
        assert_eq!(model.call_count(), 0);
    }
}
