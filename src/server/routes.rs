//! Request handlers.

use super::{ApiError, AppState, UserId};
use crate::error::QuarryError;
use crate::ingest::{IngestOutcome, PlaylistReport, SourceInput, Upload};
use crate::models::{
    ChunkPreview, Conversation, ConversationSummary, PreferencesPatch, Source, SourcePatch,
    SourceSummary, UserPreferences,
};
use crate::rag::ChatReply;
use crate::store::{KnowledgeStore, VectorIndexInfo};
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

type ApiResult<T> = Result<T, ApiError>;
type SharedState = State<Arc<AppState>>;

// === Request/Response Types ===

#[derive(Deserialize)]
pub struct VideoRequest {
    url: String,
}

#[derive(Deserialize)]
pub struct TextRequest {
    #[serde(default)]
    title: Option<String>,
    content: String,
    #[serde(default)]
    author: Option<String>,
}

/// Query string of a raw-body upload.
#[derive(Deserialize)]
pub struct UploadParams {
    file_name: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    author: Option<String>,
}

#[derive(Serialize)]
pub struct SourceDetail {
    #[serde(flatten)]
    source: Source,
    chunks: Vec<ChunkPreview>,
}

#[derive(Serialize)]
pub struct DeleteResponse {
    chunks_deleted: usize,
}

#[derive(Serialize)]
pub struct IndexStatus {
    index: Option<VectorIndexInfo>,
    chunk_count: usize,
}

#[derive(Deserialize)]
pub struct ChatRequest {
    message: String,
    #[serde(default)]
    conversation_id: Option<Uuid>,
}

#[derive(Deserialize)]
pub struct CreateConversationRequest {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    system_prompt: Option<String>,
}

/// An empty `system_prompt` clears the override.
#[derive(Deserialize)]
pub struct UpdateConversationRequest {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    system_prompt: Option<String>,
}

// === Handlers ===

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

pub async fn index_status(State(state): SharedState) -> ApiResult<Json<IndexStatus>> {
    let store = state.orchestrator.store();
    Ok(Json(IndexStatus {
        index: store.vector_index().await?,
        chunk_count: store.chunk_count().await?,
    }))
}

pub async fn list_sources(
    State(state): SharedState,
    _user: UserId,
) -> ApiResult<Json<Vec<SourceSummary>>> {
    Ok(Json(state.orchestrator.store().list_sources().await?))
}

pub async fn get_source(
    State(state): SharedState,
    _user: UserId,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<SourceDetail>> {
    let store = state.orchestrator.store();
    let source = store
        .get_source(id)
        .await?
        .ok_or_else(|| QuarryError::NotFound(format!("source {}", id)))?;
    let chunks = store.source_chunks(id).await?;
    Ok(Json(SourceDetail { source, chunks }))
}

pub async fn update_source(
    State(state): SharedState,
    _user: UserId,
    Path(id): Path<Uuid>,
    Json(patch): Json<SourcePatch>,
) -> ApiResult<Json<Source>> {
    Ok(Json(state.orchestrator.store().update_source(id, &patch).await?))
}

pub async fn delete_source(
    State(state): SharedState,
    _user: UserId,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<DeleteResponse>> {
    let chunks_deleted = state.orchestrator.store().delete_source(id).await?;
    Ok(Json(DeleteResponse { chunks_deleted }))
}

pub async fn import_video(
    State(state): SharedState,
    _user: UserId,
    Json(req): Json<VideoRequest>,
) -> ApiResult<(StatusCode, Json<IngestOutcome>)> {
    let outcome = state
        .orchestrator
        .ingestor()
        .ingest(SourceInput::Video { url: req.url })
        .await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

pub async fn import_playlist(
    State(state): SharedState,
    _user: UserId,
    Json(req): Json<VideoRequest>,
) -> ApiResult<Json<PlaylistReport>> {
    Ok(Json(state.orchestrator.ingestor().import_playlist(&req.url).await?))
}

pub async fn import_text(
    State(state): SharedState,
    _user: UserId,
    Json(req): Json<TextRequest>,
) -> ApiResult<(StatusCode, Json<IngestOutcome>)> {
    let outcome = state
        .orchestrator
        .ingestor()
        .ingest(SourceInput::Text {
            title: req.title,
            content: req.content,
            author: req.author,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

pub async fn import_document(
    State(state): SharedState,
    _user: UserId,
    Query(params): Query<UploadParams>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<IngestOutcome>)> {
    let upload = stage_upload(&state, &params.file_name, &headers, &body).await?;
    let outcome = state
        .orchestrator
        .ingestor()
        .ingest(SourceInput::Document {
            upload,
            title: params.title,
            author: params.author,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

pub async fn import_audio(
    State(state): SharedState,
    _user: UserId,
    Query(params): Query<UploadParams>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<IngestOutcome>)> {
    let upload = stage_upload(&state, &params.file_name, &headers, &body).await?;
    let outcome = state
        .orchestrator
        .ingestor()
        .ingest(SourceInput::Audio {
            upload,
            title: params.title,
            author: params.author,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(outcome)))
}

/// Write a request body to the temp directory. The returned guard deletes it.
async fn stage_upload(
    state: &AppState,
    file_name: &str,
    headers: &HeaderMap,
    body: &Bytes,
) -> ApiResult<Upload> {
    if body.is_empty() {
        return Err(QuarryError::Validation("Upload body is empty".to_string()).into());
    }

    let mime_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .filter(|m| m != "application/octet-stream");
    let extension = std::path::Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e))
        .unwrap_or_default();
    let path = state
        .orchestrator
        .temp_dir()
        .join(format!("{}{}", Uuid::new_v4(), extension));

    let upload = Upload::temporary(&path, file_name, mime_type);
    tokio::fs::write(&path, body).await.map_err(QuarryError::from)?;
    debug!("Staged upload {} ({} bytes)", file_name, body.len());
    Ok(upload)
}

pub async fn chat(
    State(state): SharedState,
    UserId(user_id): UserId,
    Json(req): Json<ChatRequest>,
) -> ApiResult<Json<ChatReply>> {
    let reply = state
        .orchestrator
        .chat()
        .send(&user_id, req.conversation_id, &req.message)
        .await?;
    Ok(Json(reply))
}

pub async fn list_conversations(
    State(state): SharedState,
    UserId(user_id): UserId,
) -> ApiResult<Json<Vec<ConversationSummary>>> {
    Ok(Json(state.orchestrator.chat().list_conversations(&user_id).await?))
}

pub async fn create_conversation(
    State(state): SharedState,
    UserId(user_id): UserId,
    Json(req): Json<CreateConversationRequest>,
) -> ApiResult<(StatusCode, Json<Conversation>)> {
    let conversation = state
        .orchestrator
        .chat()
        .create_conversation(&user_id, req.title.as_deref(), req.system_prompt.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(conversation)))
}

pub async fn get_conversation(
    State(state): SharedState,
    UserId(user_id): UserId,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Conversation>> {
    Ok(Json(state.orchestrator.chat().get_conversation(&user_id, id).await?))
}

pub async fn update_conversation(
    State(state): SharedState,
    UserId(user_id): UserId,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateConversationRequest>,
) -> ApiResult<Json<Conversation>> {
    let chat = state.orchestrator.chat();
    if let Some(title) = req.title.as_deref() {
        chat.rename_conversation(&user_id, id, title).await?;
    }
    if let Some(prompt) = req.system_prompt.as_deref() {
        chat.set_conversation_prompt(&user_id, id, Some(prompt)).await?;
    }
    Ok(Json(chat.get_conversation(&user_id, id).await?))
}

pub async fn delete_conversation(
    State(state): SharedState,
    UserId(user_id): UserId,
    Path(id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    state
        .orchestrator
        .chat()
        .delete_conversation(&user_id, id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_preferences(
    State(state): SharedState,
    UserId(user_id): UserId,
) -> ApiResult<Json<UserPreferences>> {
    Ok(Json(state.orchestrator.chat().get_preferences(&user_id).await?))
}

pub async fn update_preferences(
    State(state): SharedState,
    UserId(user_id): UserId,
    Json(patch): Json<PreferencesPatch>,
) -> ApiResult<Json<UserPreferences>> {
    Ok(Json(
        state
            .orchestrator
            .chat()
            .update_preferences(&user_id, patch)
            .await?,
    ))
}

#[cfg(test)]
mod tests {
    use crate::config::{Prompts, Settings};
    use crate::orchestrator::{Components, Orchestrator};
    use crate::server::{router, USER_ID_HEADER};
    use crate::testing::{
        indexed_store, MockEmbedder, MockExtractor, MockGenerator, MockTranscriber,
        MockTranscriptProvider,
    };
    use crate::transcription::AudioTranscript;
    use serde_json::{json, Value};
    use std::sync::Arc;

    async fn spawn_server(temp: &std::path::Path) -> String {
        let mut settings = Settings::default();
        settings.general.temp_dir = temp.to_string_lossy().into_owned();
        let components = Components {
            store: indexed_store(8).await,
            embedder: Arc::new(MockEmbedder::new(8)),
            generator: Arc::new(MockGenerator::new("Generated")),
            transcripts: Arc::new(MockTranscriptProvider::new()),
            extractor: Arc::new(MockExtractor::returning(
                "Extracted document text that is long enough to be indexed.",
            )),
            transcriber: Arc::new(MockTranscriber::returning(AudioTranscript::plain(""))),
        };
        let orchestrator =
            Orchestrator::with_components(settings, Prompts::default(), components).unwrap();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(orchestrator)).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_user_header_is_required() {
        let dir = tempfile::tempdir().unwrap();
        let base = spawn_server(dir.path()).await;
        let client = reqwest::Client::new();

        let health = client.get(format!("{}/health", base)).send().await.unwrap();
        assert_eq!(health.status(), 200);

        let sources = client.get(format!("{}/sources", base)).send().await.unwrap();
        assert_eq!(sources.status(), 401);
    }

    #[tokio::test]
    async fn test_text_import_and_source_listing() {
        let dir = tempfile::tempdir().unwrap();
        let base = spawn_server(dir.path()).await;
        let client = reqwest::Client::new();

        let created = client
            .post(format!("{}/sources/text", base))
            .header(USER_ID_HEADER, "alice")
            .json(&json!({"title": "Notes", "content": "Some notes worth keeping."}))
            .send()
            .await
            .unwrap();
        assert_eq!(created.status(), 201);
        let created: Value = created.json().await.unwrap();
        assert_eq!(created["chunk_count"], 1);

        let listed: Value = client
            .get(format!("{}/sources", base))
            .header(USER_ID_HEADER, "bob")
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(listed.as_array().unwrap().len(), 1);
        assert_eq!(listed[0]["title"], "Notes");
        assert_eq!(listed[0]["kind"], "text");

        let empty = client
            .post(format!("{}/sources/text", base))
            .header(USER_ID_HEADER, "alice")
            .json(&json!({"content": "   "}))
            .send()
            .await
            .unwrap();
        assert_eq!(empty.status(), 400);
    }

    #[tokio::test]
    async fn test_document_upload_is_removed_after_import() {
        let dir = tempfile::tempdir().unwrap();
        let base = spawn_server(dir.path()).await;
        let client = reqwest::Client::new();

        let response = client
            .post(format!("{}/sources/document?file_name=report.pdf&title=Report", base))
            .header(USER_ID_HEADER, "alice")
            .header("content-type", "application/pdf")
            .body(b"%PDF-1.4 stub".to_vec())
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 201);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

        let unsupported = client
            .post(format!("{}/sources/document?file_name=slides.pptx", base))
            .header(USER_ID_HEADER, "alice")
            .body(b"PK".to_vec())
            .send()
            .await
            .unwrap();
        assert_eq!(unsupported.status(), 422);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_conversations_are_scoped_to_user() {
        let dir = tempfile::tempdir().unwrap();
        let base = spawn_server(dir.path()).await;
        let client = reqwest::Client::new();

        let reply: Value = client
            .post(format!("{}/chat", base))
            .header(USER_ID_HEADER, "alice")
            .json(&json!({"message": "hello"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(reply["answer"], "Generated");
        let id = reply["conversation_id"].as_str().unwrap().to_string();

        let own = client
            .get(format!("{}/conversations/{}", base, id))
            .header(USER_ID_HEADER, "alice")
            .send()
            .await
            .unwrap();
        assert_eq!(own.status(), 200);

        let other = client
            .get(format!("{}/conversations/{}", base, id))
            .header(USER_ID_HEADER, "mallory")
            .send()
            .await
            .unwrap();
        assert_eq!(other.status(), 404);
    }
}
