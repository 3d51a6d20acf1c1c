use axum::Json;
use axum::body::Bytes;
use axum::extract::{Extension, Multipart, Path, Query, State};
use axum::response::IntoResponse;
use docent_core::{DocumentServiceError, UploadError, UploadedFile};
use docent_store::{DocumentFilter, User};
use uuid::Uuid;

use super::error::ApiError;
use super::server::AppState;

const UPLOAD_FIELD: &str = "file";

#[derive(serde::Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
}

#[derive(Debug, serde::Deserialize)]
pub(crate) struct PageQuery {
    pub page: Option<u64>,
}

#[derive(Debug, serde::Deserialize)]
pub(crate) struct ChatRequest {
    #[serde(default)]
    pub query: String,
}

#[derive(serde::Serialize)]
struct ChatResponse {
    response: String,
    query: String,
}

#[derive(Debug, Default, serde::Deserialize)]
pub(crate) struct AdminDocumentQuery {
    pub processed: Option<bool>,
    pub search: Option<String>,
}

pub(crate) async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        uptime_secs: state.started_at.elapsed().as_secs(),
    })
}

pub(crate) async fn list_documents_handler(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Query(query): Query<PageQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let page = state.documents.list(user.id, query.page.unwrap_or(1)).await?;
    Ok(Json(page))
}

pub(crate) async fn upload_handler(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut files = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("failed to read multipart field: {e}")))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_owned();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("failed to read {filename}: {e}")))?;
        if filename.is_empty() && bytes.is_empty() {
            continue;
        }
        files.push(UploadedFile {
            filename,
            bytes: bytes.to_vec(),
        });
    }

    tracing::info!(user_id = user.id, files = files.len(), "upload received");
    match state.documents.upload(user.id, files).await {
        Ok(report) => Ok(Json(report)),
        Err(e @ UploadError::NoFiles) => Err(ApiError::BadRequest(e.to_string())),
    }
}

pub(crate) async fn delete_document_handler(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    match state.documents.delete(user.id, id).await {
        Ok(report) => Ok(Json(report)),
        Err(e @ DocumentServiceError::NotFound(_)) => Err(ApiError::NotFound(e.to_string())),
        Err(DocumentServiceError::Store(e)) => Err(e.into()),
    }
}

/// The body is parsed by hand so malformed JSON gets the same error shape as
/// every other failure.
pub(crate) async fn chat_handler(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let request: ChatRequest = serde_json::from_slice(&body)
        .map_err(|_| ApiError::BadRequest("invalid JSON payload".into()))?;
    let query = request.query.trim();
    if query.is_empty() {
        return Err(ApiError::BadRequest("please enter a question".into()));
    }

    let response = state.rag.generate_response(query, user.id).await;
    Ok(Json(ChatResponse {
        response,
        query: query.to_owned(),
    }))
}

fn require_staff(user: &User) -> Result<(), ApiError> {
    if user.is_staff {
        Ok(())
    } else {
        tracing::warn!(user_id = user.id, "non-staff user requested an admin listing");
        Err(ApiError::Forbidden("staff access required"))
    }
}

pub(crate) async fn admin_users_handler(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<impl IntoResponse, ApiError> {
    require_staff(&user)?;
    Ok(Json(state.store.list_users().await?))
}

pub(crate) async fn admin_documents_handler(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Query(query): Query<AdminDocumentQuery>,
) -> Result<impl IntoResponse, ApiError> {
    require_staff(&user)?;
    let filter = DocumentFilter {
        processed: query.processed,
        search: query.search.filter(|s| !s.trim().is_empty()),
    };
    Ok(Json(state.store.list_all_documents(&filter).await?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_response_serializes() {
        let resp = HealthResponse {
            status: "ok",
            uptime_secs: 42,
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"status\":\"ok\""));
        assert!(json.contains("\"uptime_secs\":42"));
    }

    #[test]
    fn chat_request_defaults_missing_query() {
        let req: ChatRequest = serde_json::from_str("{}").unwrap();
        assert!(req.query.is_empty());
    }

    #[test]
    fn chat_request_rejects_non_string_query() {
        assert!(serde_json::from_str::<ChatRequest>(r#"{"query": 5}"#).is_err());
    }
}
