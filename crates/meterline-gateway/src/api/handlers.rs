use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use meterline_core::error::MeterError;
use meterline_core::{kinds, LiveDataItem, UsageEvent, UsageStats};

use crate::api::ApiResult;
use crate::app_state::AppState;
use crate::collab::Document;
use crate::live::FeedEntry;

// ============================================================================
// Request/Response Types
// ============================================================================

fn default_user() -> String {
    "default".to_string()
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default = "default_user")]
    pub user_id: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub response: Value,
    pub session_id: String,
    pub message_id: String,
    pub timestamp: DateTime<Utc>,
    pub billing: UsageEvent,
}

#[derive(Debug, Serialize)]
pub struct ReportResponse {
    pub report: Value,
    pub billing: UsageEvent,
}

#[derive(Debug, Deserialize)]
pub struct UploadFile {
    pub filename: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    pub files: Vec<UploadFile>,
}

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    #[serde(default = "default_user")]
    pub user_id: String,
    #[serde(default)]
    pub file_type: Option<String>,
    #[serde(default)]
    pub source_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProcessedFile {
    pub filename: String,
    pub file_type: String,
    pub size: usize,
    pub processed_at: DateTime<Utc>,
    pub indexed: bool,
    pub credits_used: i64,
}

#[derive(Debug, Serialize)]
pub struct SkippedFile {
    pub filename: String,
    pub code: &'static str,
    pub reason: String,
    /// Credits already debited for this file (collaborator failed after billing).
    pub credits_used: i64,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub files: Vec<ProcessedFile>,
    pub skipped: Vec<SkippedFile>,
}

#[derive(Debug, Deserialize)]
pub struct UserQuery {
    #[serde(default = "default_user")]
    pub user_id: String,
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub message: String,
    pub item: LiveDataItem,
    pub billing: UsageEvent,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct LiveRefreshResponse {
    pub items: Vec<LiveDataItem>,
    pub count: usize,
    pub billing: UsageEvent,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ResearchLiveResponse {
    pub message: String,
    pub items_added: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ChatHistoryResponse {
    pub session_id: String,
    pub history: Vec<Value>,
}

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub user_id: String,
    pub usage_stats: Option<UsageStats>,
    pub agent_stats: Option<Value>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct CostResponse {
    pub kind: String,
    pub credits: i64,
}

fn preview(text: &str) -> String {
    let head: String = text.chars().take(50).collect();
    format!("{head}...")
}

fn non_empty(field: &str, v: &str) -> ApiResult<()> {
    if v.trim().is_empty() {
        return Err(MeterError::BadRequest(format!("{field} must not be empty")).into());
    }
    Ok(())
}

// ============================================================================
// Health
// ============================================================================

/// GET /api/health
pub async fn health(State(app): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now(),
        "version": env!("CARGO_PKG_VERSION"),
        "services": {
            "metering": app.metering_opt().is_some(),
            "research_agent": app.has_agent(),
            "live_data": app.live().has_agent(),
        }
    }))
}

// ============================================================================
// Billable actions
// ============================================================================

/// POST /api/chat - bills `question`
pub async fn chat(State(app): State<AppState>, Json(req): Json<ChatRequest>) -> ApiResult<Json<ChatResponse>> {
    non_empty("message", &req.message)?;
    let metering = app.metering()?;
    let agent = app.agent()?;

    let session_id = req.session_id.unwrap_or_else(|| Uuid::new_v4().to_string());
    let billing = metering
        .track_usage(&req.user_id, kinds::QUESTION, &format!("Question: {}", preview(&req.message)))
        .await?;

    let response = agent.chat(&session_id, &req.user_id, &req.message).await?;
    Ok(Json(ChatResponse {
        response,
        session_id,
        message_id: Uuid::new_v4().to_string(),
        timestamp: Utc::now(),
        billing,
    }))
}

/// POST /api/research - bills `report`
pub async fn research(State(app): State<AppState>, Json(req): Json<ChatRequest>) -> ApiResult<Json<ReportResponse>> {
    non_empty("message", &req.message)?;
    let metering = app.metering()?;
    let agent = app.agent()?;

    let billing = metering
        .track_usage(&req.user_id, kinds::REPORT, &format!("Research report: {}", preview(&req.message)))
        .await?;

    let report = agent.generate_report(&req.user_id, &req.message).await?;
    Ok(Json(ReportResponse { report, billing }))
}

/// POST /api/upload - bills `file_upload` per file
pub async fn upload(
    State(app): State<AppState>,
    Query(q): Query<UploadQuery>,
    Json(req): Json<UploadRequest>,
) -> ApiResult<Json<UploadResponse>> {
    let source_type = q.file_type.clone().unwrap_or_else(|| "general".to_string());
    ingest_files(&app, &q.user_id, kinds::FILE_UPLOAD, "Uploaded file", &source_type, req.files).await
}

/// POST /api/research/upload - bills `research_file_upload` per file
pub async fn research_upload(
    State(app): State<AppState>,
    Query(q): Query<UploadQuery>,
    Json(req): Json<UploadRequest>,
) -> ApiResult<Json<UploadResponse>> {
    let source_type = q.source_type.clone().unwrap_or_else(|| "document".to_string());
    ingest_files(&app, &q.user_id, kinds::RESEARCH_FILE_UPLOAD, "Research file", &source_type, req.files).await
}

/// Debit then index each file in order. The first refused debit or
/// collaborator failure stops the batch; that file and the rest are reported
/// as skipped. A refused debit with nothing processed is returned as-is, a
/// collaborator failure never is, since its debit already went through.
async fn ingest_files(
    app: &AppState,
    user_id: &str,
    kind: &str,
    label: &str,
    source_type: &str,
    files: Vec<UploadFile>,
) -> ApiResult<Json<UploadResponse>> {
    if files.is_empty() {
        return Err(MeterError::BadRequest("files must not be empty".into()).into());
    }
    let metering = app.metering()?;
    let agent = app.agent()?;

    let mut processed = Vec::new();
    let mut skipped = Vec::new();
    let mut files = files.into_iter();

    while let Some(file) = files.next() {
        let billing = match metering
            .track_usage(user_id, kind, &format!("{label}: {}", file.filename))
            .await
        {
            Ok(ev) => ev,
            Err(e) if processed.is_empty() => return Err(e.into()),
            Err(e) => {
                skip_rest(&mut skipped, file.filename, 0, &e, files.by_ref());
                break;
            }
        };

        let size = file.content.len();
        let file_type = file
            .filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_string())
            .unwrap_or_default();
        let indexed = match agent
            .add_documents(
                vec![Document { filename: file.filename.clone(), content: file.content }],
                source_type,
            )
            .await
        {
            Ok(indexed) => indexed,
            Err(e) => {
                tracing::error!(user=%user_id, file=%file.filename, event=%billing.id, error=%e, "indexing failed after debit");
                skip_rest(&mut skipped, file.filename, billing.credits_used, &e, files.by_ref());
                break;
            }
        };

        processed.push(ProcessedFile {
            filename: file.filename,
            file_type,
            size,
            processed_at: Utc::now(),
            indexed,
            credits_used: billing.credits_used,
        });
    }

    Ok(Json(UploadResponse {
        message: format!("{} files processed successfully", processed.len()),
        files: processed,
        skipped,
    }))
}

fn skip_rest(
    skipped: &mut Vec<SkippedFile>,
    failed: String,
    credits_used: i64,
    err: &MeterError,
    rest: impl Iterator<Item = UploadFile>,
) {
    let code = err.client_code().as_str();
    let reason = err.to_string();
    skipped.push(SkippedFile { filename: failed, code, reason: reason.clone(), credits_used });
    skipped.extend(rest.map(|f| SkippedFile {
        filename: f.filename,
        code,
        reason: reason.clone(),
        credits_used: 0,
    }));
}

/// POST /api/live/ingest - bills `live_data`
pub async fn live_ingest(
    State(app): State<AppState>,
    Query(q): Query<UserQuery>,
    Json(entry): Json<FeedEntry>,
) -> ApiResult<Json<IngestResponse>> {
    non_empty("title", &entry.title)?;
    let metering = app.metering()?;

    let (item, billing) = app.live().ingest(&metering, &q.user_id, entry).await?;
    Ok(Json(IngestResponse {
        message: "Live item ingested".to_string(),
        item,
        billing,
        timestamp: Utc::now(),
    }))
}

/// GET /api/live - bills `live_data`, forwards the retained feed to the agent
pub async fn live_refresh(
    State(app): State<AppState>,
    Query(q): Query<UserQuery>,
) -> ApiResult<Json<LiveRefreshResponse>> {
    let metering = app.metering()?;
    let (items, billing) = app.live().refresh(&metering, &q.user_id).await?;
    Ok(Json(LiveRefreshResponse {
        count: items.len(),
        items,
        billing,
        timestamp: Utc::now(),
    }))
}

/// POST /api/research/live - unbilled
pub async fn research_live(State(app): State<AppState>) -> ApiResult<Json<ResearchLiveResponse>> {
    let items_added = app.live().push_to_agent().await?;
    Ok(Json(ResearchLiveResponse {
        message: "Research database updated with latest live data".to_string(),
        items_added,
        timestamp: Utc::now(),
    }))
}

// ============================================================================
// Read-only views
// ============================================================================

/// GET /api/chat/:session_id/history
pub async fn chat_history(
    State(app): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<ChatHistoryResponse>> {
    let history = app.agent()?.conversation_history(&session_id).await?;
    Ok(Json(ChatHistoryResponse { session_id, history }))
}

/// GET /api/agent/stats, GET /api/research/stats
pub async fn agent_stats(State(app): State<AppState>) -> ApiResult<Json<Value>> {
    Ok(Json(app.agent()?.stats()))
}

/// GET /api/usage/:user_id
pub async fn usage_stats(State(app): State<AppState>, Path(user_id): Path<String>) -> ApiResult<Json<UsageStats>> {
    let stats = app.metering()?.usage_stats(&user_id).await?;
    Ok(Json(stats))
}

/// GET /api/usage/:user_id/history
pub async fn usage_history(State(app): State<AppState>, Path(user_id): Path<String>) -> ApiResult<Json<Vec<UsageEvent>>> {
    let events = app.metering()?.history(&user_id).await?;
    Ok(Json(events))
}

/// GET /api/dashboard/:user_id - degrades to `null` sections when a service is absent
pub async fn dashboard(State(app): State<AppState>, Path(user_id): Path<String>) -> ApiResult<Json<DashboardResponse>> {
    let usage_stats = match app.metering_opt() {
        Some(m) => Some(m.usage_stats(&user_id).await?),
        None => None,
    };
    let agent_stats = app.agent().ok().map(|a| a.stats());

    Ok(Json(DashboardResponse {
        user_id,
        usage_stats,
        agent_stats,
        timestamp: Utc::now(),
    }))
}

/// GET /api/costs
pub async fn costs(State(app): State<AppState>) -> ApiResult<Json<Vec<CostResponse>>> {
    let metering = app.metering()?;
    let schedule = metering.schedule();
    let out = schedule
        .kinds()
        .into_iter()
        .map(|k| {
            Ok(CostResponse {
                kind: k.to_string(),
                credits: schedule.cost(k)?,
            })
        })
        .collect::<Result<Vec<_>, MeterError>>()?;
    Ok(Json(out))
}

/// GET /api/costs/:kind
pub async fn credit_cost(State(app): State<AppState>, Path(kind): Path<String>) -> ApiResult<Json<CostResponse>> {
    let credits = app.metering()?.credit_cost(&kind)?;
    Ok(Json(CostResponse { kind, credits }))
}
