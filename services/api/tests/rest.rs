//! Router-level tests driving the real routes with in-memory fakes.

use std::sync::Arc;

use api_lib::config::Config;
use api_lib::web::{router, state::AppState};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header::CONTENT_TYPE, Request, StatusCode};
use chrono::Duration;
use healthbot_core::ports::{DocumentTextExtractor, PortError, PortResult};
use healthbot_core::testing::{FakeStore, ScriptedModel};
use healthbot_core::{Sender, NO_DATA_MESSAGE};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

/// An extractor that either echoes canned text or fails.
struct FakeExtractor {
    reply: Result<String, String>,
}

#[async_trait]
impl DocumentTextExtractor for FakeExtractor {
    async fn extract_text(&self, _data: &[u8], _content_type: &str) -> PortResult<String> {
        match &self.reply {
            Ok(text) => Ok(text.clone()),
            Err(msg) => Err(PortError::Unexpected(msg.clone())),
        }
    }
}

fn test_config() -> Arc<Config> {
    Arc::new(Config {
        bind_address: "127.0.0.1:0".parse().unwrap(),
        database_url: String::new(),
        log_level: tracing::Level::INFO,
        openai_api_key: None,
        chat_model: "test".to_string(),
        vision_model: "test".to_string(),
        share_validity_minutes: 15,
        allowed_origin: "http://localhost:3000".to_string(),
    })
}

fn app(
    store: Arc<FakeStore>,
    model: Arc<ScriptedModel>,
    extractor: FakeExtractor,
) -> axum::Router {
    let state = Arc::new(AppState::new(
        test_config(),
        store,
        Arc::new(extractor),
        model,
    ));
    router(state)
}

fn ok_extractor() -> FakeExtractor {
    FakeExtractor {
        reply: Ok("laboratory report: hemoglobin 13.2".to_string()),
    }
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn json_post(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn ask_appends_exactly_two_transcript_rows_in_order() {
    let store = Arc::new(FakeStore::new());
    let patient = store.add_patient("Asha");
    store.add_report(patient, "hb 13.2", Some(json!({"hemoglobin": "13.2"})));
    let share_id = store.add_session(patient, Uuid::new_v4(), Duration::minutes(15));
    let model = Arc::new(ScriptedModel::new(vec!["Hemoglobin was 13.2 g/dL."]));
    let app = app(store.clone(), model, ok_extractor());

    let response = app
        .oneshot(json_post(
            &format!("/doctor/chat/{}", share_id),
            json!({"question": "What was the hemoglobin?"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["answer"], "Hemoglobin was 13.2 g/dL.");

    let messages = store.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].sender, Sender::Doctor);
    assert_eq!(messages[0].message, "What was the hemoglobin?");
    assert_eq!(messages[1].sender, Sender::Bot);
    assert_eq!(messages[1].message, "Hemoglobin was 13.2 g/dL.");
}

#[tokio::test]
async fn expired_session_is_denied_across_chat_routes() {
    let store = Arc::new(FakeStore::new());
    let share_id = store.add_session_expiring_in(Duration::minutes(-1));
    let model = Arc::new(ScriptedModel::new(vec![]));
    let app = app(store, model, ok_extractor());

    let ask = app
        .clone()
        .oneshot(json_post(
            &format!("/doctor/chat/{}", share_id),
            json!({"question": "anything"}),
        ))
        .await
        .unwrap();
    assert_eq!(ask.status(), StatusCode::FORBIDDEN);

    let open = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/doctor/chat/open/{}", share_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(open.status(), StatusCode::FORBIDDEN);

    let conflicts = app
        .oneshot(json_post(
            "/rag/medicine-conflicts",
            json!({"share_id": share_id}),
        ))
        .await
        .unwrap();
    assert_eq!(conflicts.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn share_session_lookup_is_404_when_unknown_and_200_when_live() {
    let store = Arc::new(FakeStore::new());
    let share_id = store.add_session_expiring_in(Duration::minutes(10));
    let model = Arc::new(ScriptedModel::new(vec![]));
    let app = app(store.clone(), model, ok_extractor());

    let missing = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(format!("/share/session/{}", Uuid::new_v4()))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    let live = app
        .oneshot(
            Request::builder()
                .uri(format!("/share/session/{}", share_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(live.status(), StatusCode::OK);
    let body = body_json(live).await;
    assert_eq!(body["share_id"], share_id.to_string());
    assert_eq!(
        body["patient_id"],
        store.session(share_id).patient_id.to_string()
    );
}

#[tokio::test]
async fn create_share_names_the_missing_entity() {
    let store = Arc::new(FakeStore::new());
    let patient = store.add_patient("Asha");
    let model = Arc::new(ScriptedModel::new(vec![]));
    let app = app(store, model, ok_extractor());

    let unknown_doctor = Uuid::new_v4();
    let response = app
        .oneshot(json_post(
            &format!("/share/patient/{}", patient),
            json!({"doctor_id": unknown_doctor}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("Doctor"));
}

#[tokio::test]
async fn create_share_returns_token_and_expiry() {
    let store = Arc::new(FakeStore::new());
    let patient = store.add_patient("Asha");
    let doctor = store.add_doctor("Dr. Rao");
    let model = Arc::new(ScriptedModel::new(vec![]));
    let app = app(store, model, ok_extractor());

    let response = app
        .oneshot(json_post(
            &format!("/share/patient/{}", patient),
            json!({"doctor_id": doctor}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert!(body["share_id"].as_str().is_some());
    assert!(body["valid_till"].as_str().is_some());
}

#[tokio::test]
async fn ask_with_zero_reports_answers_without_model_calls() {
    let store = Arc::new(FakeStore::new());
    let patient = store.add_patient("Asha");
    let doctor = store.add_doctor("Dr. Rao");
    let share_id = store.add_session(patient, doctor, Duration::minutes(15));
    let model = Arc::new(ScriptedModel::new(vec![]));
    let app = app(store, model.clone(), ok_extractor());

    let response = app
        .oneshot(json_post(
            &format!("/doctor/chat/{}", share_id),
            json!({"question": "anything at all"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["answer"], NO_DATA_MESSAGE);
    assert_eq!(model.call_count(), 0);
}

#[tokio::test]
async fn upload_survives_extraction_failure_with_diagnostic_text() {
    let store = Arc::new(FakeStore::new());
    let patient = store.add_patient("Asha");
    let model = Arc::new(ScriptedModel::new(vec![r#"{"diagnosis": "unreadable"}"#]));
    let failing = FakeExtractor {
        reply: Err("scanner produced garbage".to_string()),
    };
    let app = app(store.clone(), model, failing);

    let boundary = "test-boundary";
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"scan.png\"\r\nContent-Type: image/png\r\n\r\nnot-a-real-png\r\n--{b}--\r\n",
        b = boundary
    );
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/reports/{}", patient))
                .header(
                    CONTENT_TYPE,
                    format!("multipart/form-data; boundary={}", boundary),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let reports = store.reports();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].text_content.contains("Extraction failed"));
    assert!(reports[0].text_content.contains("scanner produced garbage"));
}

#[tokio::test]
async fn upload_classifies_and_structures_the_report() {
    let store = Arc::new(FakeStore::new());
    let patient = store.add_patient("Asha");
    let model = Arc::new(ScriptedModel::new(vec![
        r#"{"diagnosis": "mild anemia", "patient_name": "Asha"}"#,
    ]));
    let app = app(store.clone(), model, ok_extractor());

    let boundary = "test-boundary";
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"lab.txt\"\r\nContent-Type: text/plain\r\n\r\nlab text\r\n--{b}--\r\n",
        b = boundary
    );
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/reports/{}", patient))
                .header(
                    CONTENT_TYPE,
                    format!("multipart/form-data; boundary={}", boundary),
                )
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let response_body = body_json(response).await;
    assert_eq!(response_body["doc_type"], "lab_report");

    let reports = store.reports();
    assert_eq!(reports[0].structured.as_ref().unwrap()["diagnosis"], "mild anemia");
}

#[tokio::test]
async fn open_chat_returns_summary_greeting_and_history() {
    let store = Arc::new(FakeStore::new());
    let patient = store.add_patient("Asha");
    store.add_report(patient, "hb 13.2", Some(json!({"hemoglobin": "13.2"})));
    let share_id = store.add_session(patient, Uuid::new_v4(), Duration::minutes(15));
    let model = Arc::new(ScriptedModel::new(vec![
        "Latest labs show hemoglobin at 13.2; no other findings on file.",
    ]));
    let app = app(store, model, ok_extractor());

    let response = app
        .oneshot(
            Request::builder()
                .uri(format!("/doctor/chat/open/{}", share_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["message"], "Chat opened");
    assert!(body["opening_text"].as_str().unwrap().contains("13.2"));
    assert_eq!(body["summary"]["report_count"], 1);
    assert!(body["history"].as_array().unwrap().is_empty());
}
