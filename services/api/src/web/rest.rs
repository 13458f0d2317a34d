//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::state::AppState;
use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::{DateTime, Duration, Utc};
use healthbot_core::domain::{
    classify_document_type, ChatMessage, Report, Sender, ShareSession,
};
use healthbot_core::ports::PortError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

const STRUCTURE_PROMPT_TEMPLATE: &str = r#"Convert the medical text below into structured JSON.

Required fields:
- patient_name
- doctor_name
- visit_date
- diagnosis
- recommended_treatments (list)
- cost_estimates (list)
- notes

Return ONLY JSON. No markdown, no backticks.

Text:
{data}"#;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        upload_report_handler,
        create_share_handler,
        get_share_session_handler,
        open_chat_handler,
        ask_handler,
        medicine_conflicts_handler,
    ),
    components(
        schemas(
            UploadReportResponse,
            ShareRequest,
            ShareResponse,
            ShareSessionResponse,
            OpenChatResponse,
            ChatMessageDto,
            AskRequest,
            AskResponse,
            MedConflictRequest,
            MedConflictResponse,
        )
    ),
    tags(
        (name = "Healthbot API", description = "API endpoints for report upload, share sessions, and doctor chat.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

/// The response payload sent after successfully uploading a report.
#[derive(Serialize, ToSchema)]
pub struct UploadReportResponse {
    report_id: Uuid,
    doc_type: String,
}

/// Request body for creating a share session.
#[derive(Deserialize, ToSchema)]
pub struct ShareRequest {
    pub doctor_id: Uuid,
    /// Narrows the share to one report; omitted means all of the patient's reports.
    pub report_id: Option<Uuid>,
}

/// The response payload for a freshly created share session.
#[derive(Serialize, ToSchema)]
pub struct ShareResponse {
    share_id: Uuid,
    valid_till: DateTime<Utc>,
}

/// Who a share session links, returned when the token is still valid.
#[derive(Serialize, ToSchema)]
pub struct ShareSessionResponse {
    share_id: Uuid,
    patient_id: Uuid,
    doctor_id: Uuid,
}

/// One transcript entry as exposed over the API.
#[derive(Serialize, ToSchema)]
pub struct ChatMessageDto {
    sender: String,
    message: String,
    created_at: DateTime<Utc>,
}

impl From<ChatMessage> for ChatMessageDto {
    fn from(m: ChatMessage) -> Self {
        Self {
            sender: m.sender.as_str().to_string(),
            message: m.message,
            created_at: m.created_at,
        }
    }
}

/// The payload returned when a doctor opens the chat window.
#[derive(Serialize, ToSchema)]
pub struct OpenChatResponse {
    message: String,
    #[schema(value_type = Object)]
    summary: serde_json::Value,
    opening_text: String,
    history: Vec<ChatMessageDto>,
}

/// Request body for asking a question within a share session.
#[derive(Deserialize, ToSchema)]
pub struct AskRequest {
    pub question: String,
}

/// The answer produced by the tiered cascade.
#[derive(Serialize, ToSchema)]
pub struct AskResponse {
    answer: String,
}

/// Request body for the medicine conflict check.
#[derive(Deserialize, ToSchema)]
pub struct MedConflictRequest {
    pub share_id: Uuid,
}

/// Extracted medicines and their interaction analysis.
#[derive(Serialize, ToSchema)]
pub struct MedConflictResponse {
    extracted_medicines: Vec<String>,
    conflict_analysis: String,
}

//=========================================================================================
// Error Mapping Helpers
//=========================================================================================

/// Maps a port error onto an HTTP response: not-found errors name the missing
/// entity, anything else becomes an opaque 500.
fn port_error(e: PortError) -> (StatusCode, String) {
    match e {
        PortError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
        PortError::Unexpected(msg) => {
            error!("unexpected port error: {}", msg);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            )
        }
    }
}

const SESSION_DENIED: &str = "Session expired or invalid";

/// Validates a share token, mapping the soft-fail outcome to a 403.
async fn require_session(
    app_state: &AppState,
    share_id: Uuid,
) -> Result<ShareSession, (StatusCode, String)> {
    app_state
        .sessions
        .validate(share_id)
        .await
        .map_err(port_error)?
        .ok_or((StatusCode::FORBIDDEN, SESSION_DENIED.to_string()))
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Upload a medical report for a patient.
///
/// Accepts a multipart/form-data request with a single file part. The file is
/// run through text extraction, classified, and structured via the model; an
/// extraction failure degrades to a diagnostic placeholder instead of failing
/// the upload.
#[utoipa::path(
    post,
    path = "/reports/{patient_id}",
    request_body(content_type = "multipart/form-data", description = "The report file to upload."),
    responses(
        (status = 201, description = "Report stored successfully", body = UploadReportResponse),
        (status = 400, description = "Bad request (e.g., missing file part)"),
        (status = 404, description = "Patient not found"),
        (status = 500, description = "Internal server error")
    ),
    params(
        ("patient_id" = Uuid, Path, description = "The patient who owns the report.")
    )
)]
pub async fn upload_report_handler(
    State(app_state): State<Arc<AppState>>,
    Path(patient_id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    app_state
        .store
        .get_patient(patient_id)
        .await
        .map_err(port_error)?;

    let (filename, content_type, data) = if let Some(field) =
        multipart.next_field().await.map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                format!("Failed to read multipart data: {}", e),
            )
        })? {
        let filename = field.file_name().unwrap_or("untitled").to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let data = field.bytes().await.map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                format!("Failed to read file bytes: {}", e),
            )
        })?;
        (filename, content_type, data)
    } else {
        return Err((
            StatusCode::BAD_REQUEST,
            "Multipart form must include a file".to_string(),
        ));
    };

    // Extraction failure never aborts an upload; the report is stored with a
    // diagnostic placeholder as its text.
    let text_content = match app_state.extractor.extract_text(&data, &content_type).await {
        Ok(text) if !text.trim().is_empty() => text,
        Ok(_) => "Extraction returned no usable text.".to_string(),
        Err(e) => {
            error!(%patient_id, error = %e, "document text extraction failed");
            format!("Extraction failed: {}", e)
        }
    };

    let doc_type = classify_document_type(&text_content);
    let structured = extract_structured(&app_state, &text_content).await;

    let report_id = Uuid::new_v4();
    let report = Report {
        id: report_id,
        patient_id,
        storage_path: format!("medical-reports/{}_{}", report_id, filename),
        filename,
        text_content,
        structured,
        doc_type,
        created_at: Utc::now(),
    };
    let stored = app_state
        .store
        .insert_report(report)
        .await
        .map_err(port_error)?;

    Ok((
        StatusCode::CREATED,
        Json(UploadReportResponse {
            report_id: stored.id,
            doc_type: stored.doc_type.as_str().to_string(),
        }),
    ))
}

/// Asks the model for a structured JSON extraction of the report text.
///
/// Soft-fails both ways: a model error yields `None` and a reply that is not
/// valid JSON is preserved as a raw-output fallback object.
async fn extract_structured(app_state: &AppState, text: &str) -> Option<serde_json::Value> {
    let prompt = STRUCTURE_PROMPT_TEMPLATE.replace("{data}", text);
    let raw = match app_state.model.complete(&prompt).await {
        Ok(raw) => raw,
        Err(e) => {
            error!(error = %e, "structured extraction model call failed");
            return None;
        }
    };
    let cleaned = raw
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    match serde_json::from_str::<serde_json::Value>(cleaned) {
        Ok(value) => Some(value),
        Err(_) => Some(serde_json::json!({
            "raw_output": raw,
            "parse_error": true,
        })),
    }
}

/// Create a time-boxed share session granting a doctor access to a patient's records.
#[utoipa::path(
    post,
    path = "/share/patient/{patient_id}",
    request_body = ShareRequest,
    responses(
        (status = 201, description = "Share session created", body = ShareResponse),
        (status = 404, description = "Patient, doctor, or report not found"),
        (status = 500, description = "Internal server error")
    ),
    params(
        ("patient_id" = Uuid, Path, description = "The patient whose records are shared.")
    )
)]
pub async fn create_share_handler(
    State(app_state): State<Arc<AppState>>,
    Path(patient_id): Path<Uuid>,
    Json(payload): Json<ShareRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let session = app_state
        .sessions
        .create(
            patient_id,
            payload.doctor_id,
            payload.report_id,
            Duration::minutes(app_state.config.share_validity_minutes),
        )
        .await
        .map_err(port_error)?;

    Ok((
        StatusCode::CREATED,
        Json(ShareResponse {
            share_id: session.id,
            valid_till: session.expires_at,
        }),
    ))
}

/// Look up who a still-valid share session links.
#[utoipa::path(
    get,
    path = "/share/session/{share_id}",
    responses(
        (status = 200, description = "Session is valid", body = ShareSessionResponse),
        (status = 404, description = "Invalid or expired share session")
    ),
    params(
        ("share_id" = Uuid, Path, description = "The share token.")
    )
)]
pub async fn get_share_session_handler(
    State(app_state): State<Arc<AppState>>,
    Path(share_id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let session = app_state
        .sessions
        .validate(share_id)
        .await
        .map_err(port_error)?
        .ok_or((
            StatusCode::NOT_FOUND,
            "Invalid or expired share session".to_string(),
        ))?;

    Ok(Json(ShareSessionResponse {
        share_id,
        patient_id: session.patient_id,
        doctor_id: session.doctor_id,
    }))
}

/// Doctor opens the chat window for a share session.
#[utoipa::path(
    get,
    path = "/doctor/chat/open/{share_id}",
    responses(
        (status = 200, description = "Chat opened", body = OpenChatResponse),
        (status = 403, description = "Session expired or invalid"),
        (status = 500, description = "Internal server error")
    ),
    params(
        ("share_id" = Uuid, Path, description = "The share token.")
    )
)]
pub async fn open_chat_handler(
    State(app_state): State<Arc<AppState>>,
    Path(share_id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let session = require_session(&app_state, share_id).await?;

    let summary = app_state
        .answers
        .summary(&session)
        .await
        .map_err(port_error)?;
    let opening_text = app_state
        .answers
        .opening_message(&summary)
        .await
        .map_err(port_error)?;
    let history = app_state
        .store
        .get_chat_history(share_id)
        .await
        .map_err(port_error)?;

    Ok(Json(OpenChatResponse {
        message: "Chat opened".to_string(),
        summary: serde_json::to_value(&summary).unwrap_or_default(),
        opening_text,
        history: history.into_iter().map(ChatMessageDto::from).collect(),
    }))
}

/// Doctor asks a question; answered by the tiered cascade.
///
/// On success the question and the answer are appended to the transcript as
/// two ordered rows. Transcript-append failures are logged but never mask a
/// successfully produced answer.
#[utoipa::path(
    post,
    path = "/doctor/chat/{share_id}",
    request_body = AskRequest,
    responses(
        (status = 200, description = "Answer produced", body = AskResponse),
        (status = 403, description = "Session expired or invalid"),
        (status = 500, description = "Internal server error")
    ),
    params(
        ("share_id" = Uuid, Path, description = "The share token.")
    )
)]
pub async fn ask_handler(
    State(app_state): State<Arc<AppState>>,
    Path(share_id): Path<Uuid>,
    Json(payload): Json<AskRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let session = require_session(&app_state, share_id).await?;

    let answer = app_state
        .answers
        .answer(&session, &payload.question)
        .await
        .map_err(port_error)?;

    append_transcript(&app_state, share_id, Sender::Doctor, &payload.question).await;
    append_transcript(&app_state, share_id, Sender::Bot, &answer).await;

    Ok(Json(AskResponse { answer }))
}

/// Best-effort transcript append. A failed write is logged server-side only.
async fn append_transcript(app_state: &AppState, share_id: Uuid, sender: Sender, text: &str) {
    let message = ChatMessage {
        id: Uuid::new_v4(),
        share_id,
        sender,
        message: text.to_string(),
        created_at: Utc::now(),
    };
    if let Err(e) = app_state.store.insert_chat_message(message).await {
        error!(%share_id, sender = sender.as_str(), error = %e, "chat history insert failed");
    }
}

/// Extract medicines from the session's reports and analyse interactions.
#[utoipa::path(
    post,
    path = "/rag/medicine-conflicts",
    request_body = MedConflictRequest,
    responses(
        (status = 200, description = "Conflict analysis produced", body = MedConflictResponse),
        (status = 403, description = "Session expired or invalid"),
        (status = 404, description = "No reports found for the session"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn medicine_conflicts_handler(
    State(app_state): State<Arc<AppState>>,
    Json(payload): Json<MedConflictRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let session = require_session(&app_state, payload.share_id).await?;

    let result = app_state
        .conflicts
        .check(&session)
        .await
        .map_err(port_error)?;

    Ok(Json(MedConflictResponse {
        extracted_medicines: result.medicines,
        conflict_analysis: result.analysis,
    }))
}
