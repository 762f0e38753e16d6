use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::{
        multipart::MultipartRejection, rejection::JsonRejection, DefaultBodyLimit, Multipart,
        Path, State,
    },
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get},
    Json, Router,
};
use serde_json::json;
use tokio::signal;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{error, info};
use uuid::Uuid;

use crate::catalog::{Collection, Dataset, Document, KnowledgeBase, Workspace};
use crate::config::AppConfig;
use crate::engine::ContentEngine;
use crate::error::ContentError;
use crate::resources::{DatasetFields, NamedFields};
use crate::service::Upload;
use crate::storage::ByteStream;

pub const API_PREFIX: &str = "/api/v1";

type AppState = Arc<ContentEngine>;

pub struct HttpServer {
    engine: Arc<ContentEngine>,
    request_timeout: Duration,
    max_upload_bytes: usize,
}

impl HttpServer {
    pub fn new(engine: Arc<ContentEngine>, config: &AppConfig) -> Self {
        Self {
            engine,
            request_timeout: config.request_timeout,
            max_upload_bytes: config.max_upload_bytes,
        }
    }

    pub fn router(&self) -> Router {
        let api = Router::new()
            .route("/workspaces", get(list_workspaces).post(create_workspace))
            .route("/workspaces/{workspace_id}", delete(delete_workspace))
            .route(
                "/workspaces/{workspace_id}/knowledge-bases",
                get(list_knowledge_bases).post(create_knowledge_base),
            )
            .route(
                "/workspaces/{workspace_id}/datasets",
                get(list_datasets).post(create_dataset),
            )
            .route("/knowledge-bases/{kb_id}", delete(delete_knowledge_base))
            .route(
                "/knowledge-bases/{kb_id}/collections",
                get(list_collections).post(create_collection),
            )
            .route("/collections/{collection_id}", delete(delete_collection))
            .route(
                "/collections/{collection_id}/documents",
                get(list_documents).post(create_document),
            )
            .route("/documents/{document_id}/content", get(document_content))
            .route("/datasets/{dataset_id}/content", get(dataset_content));

        Router::new()
            .route("/health", get(health))
            .route("/health/ready", get(ready))
            .nest(API_PREFIX, api)
            .layer(DefaultBodyLimit::max(self.max_upload_bytes))
            .layer(TimeoutLayer::new(self.request_timeout))
            .layer(TraceLayer::new_for_http())
            .with_state(self.engine.clone())
    }

    pub async fn start(&self, addr: SocketAddr) -> Result<(), ContentError> {
        info!("Starting HTTP server on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("HTTP server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal, gracefully shutting down..."),
        Err(err) => error!("Unable to listen for shutdown signal: {}", err),
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn ready(State(engine): State<AppState>) -> Response {
    match engine.health_check().await {
        Ok(()) => Json(json!({ "status": "ready" })).into_response(),
        Err(e) => {
            error!("HTTP: Readiness check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable", "message": e.to_string() })),
            )
                .into_response()
        }
    }
}

fn json_body(
    body: Result<Json<NamedFields>, JsonRejection>,
) -> Result<NamedFields, ContentError> {
    body.map(|Json(fields)| fields)
        .map_err(|rejection| ContentError::validation(rejection.body_text()))
}

async fn create_workspace(
    State(engine): State<AppState>,
    body: Result<Json<NamedFields>, JsonRejection>,
) -> Result<(StatusCode, Json<Workspace>), ContentError> {
    let fields = json_body(body)?;
    info!("HTTP: Received create_workspace request for '{}'", fields.name);

    let workspace = engine.workspaces.create(None, fields, None).await?;
    Ok((StatusCode::CREATED, Json(workspace)))
}

async fn list_workspaces(
    State(engine): State<AppState>,
) -> Result<Json<Vec<Workspace>>, ContentError> {
    info!("HTTP: Received list_workspaces request");

    let workspaces = engine.workspaces.list(None).await?;
    info!("HTTP: Returning {} workspaces", workspaces.len());
    Ok(Json(workspaces))
}

async fn delete_workspace(
    State(engine): State<AppState>,
    Path(workspace_id): Path<Uuid>,
) -> Result<StatusCode, ContentError> {
    info!("HTTP: Received delete_workspace request for {}", workspace_id);

    engine.workspaces.delete(workspace_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn create_knowledge_base(
    State(engine): State<AppState>,
    Path(workspace_id): Path<Uuid>,
    body: Result<Json<NamedFields>, JsonRejection>,
) -> Result<(StatusCode, Json<KnowledgeBase>), ContentError> {
    let fields = json_body(body)?;
    info!(
        "HTTP: Received create_knowledge_base request for '{}' in workspace {}",
        fields.name, workspace_id
    );

    let knowledge_base = engine
        .knowledge_bases
        .create(Some(workspace_id), fields, None)
        .await?;
    Ok((StatusCode::CREATED, Json(knowledge_base)))
}

async fn list_knowledge_bases(
    State(engine): State<AppState>,
    Path(workspace_id): Path<Uuid>,
) -> Result<Json<Vec<KnowledgeBase>>, ContentError> {
    info!(
        "HTTP: Received list_knowledge_bases request for workspace {}",
        workspace_id
    );

    let knowledge_bases = engine.knowledge_bases.list(Some(workspace_id)).await?;
    Ok(Json(knowledge_bases))
}

async fn delete_knowledge_base(
    State(engine): State<AppState>,
    Path(kb_id): Path<Uuid>,
) -> Result<StatusCode, ContentError> {
    info!("HTTP: Received delete_knowledge_base request for {}", kb_id);

    engine.knowledge_bases.delete(kb_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn create_collection(
    State(engine): State<AppState>,
    Path(kb_id): Path<Uuid>,
    body: Result<Json<NamedFields>, JsonRejection>,
) -> Result<(StatusCode, Json<Collection>), ContentError> {
    let fields = json_body(body)?;
    info!(
        "HTTP: Received create_collection request for '{}' in knowledge base {}",
        fields.name, kb_id
    );

    let collection = engine.collections.create(Some(kb_id), fields, None).await?;
    Ok((StatusCode::CREATED, Json(collection)))
}

async fn list_collections(
    State(engine): State<AppState>,
    Path(kb_id): Path<Uuid>,
) -> Result<Json<Vec<Collection>>, ContentError> {
    info!(
        "HTTP: Received list_collections request for knowledge base {}",
        kb_id
    );

    let collections = engine.collections.list(Some(kb_id)).await?;
    Ok(Json(collections))
}

async fn delete_collection(
    State(engine): State<AppState>,
    Path(collection_id): Path<Uuid>,
) -> Result<StatusCode, ContentError> {
    info!(
        "HTTP: Received delete_collection request for {}",
        collection_id
    );

    engine.collections.delete(collection_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Multipart body of the upload endpoints: an optional `name` text field and
/// a `file` field. Unknown fields are ignored.
#[derive(Default)]
struct UploadForm {
    name: Option<String>,
    file: Option<Upload>,
}

fn multipart_body(
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Multipart, ContentError> {
    multipart.map_err(|rejection| ContentError::validation(rejection.body_text()))
}

async fn read_upload_form(mut multipart: Multipart) -> Result<UploadForm, ContentError> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart.next_field().await? {
        match field.name() {
            Some("file") => {
                let filename = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(str::to_string);
                let data = field.bytes().await?;
                form.file = Some(Upload {
                    filename,
                    content_type,
                    data,
                });
            }
            Some("name") => form.name = Some(field.text().await?),
            _ => {}
        }
    }

    Ok(form)
}

async fn create_document(
    State(engine): State<AppState>,
    Path(collection_id): Path<Uuid>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<Document>), ContentError> {
    engine.documents.require_parent(collection_id).await?;

    let form = read_upload_form(multipart_body(multipart)?).await?;
    let upload = form
        .file
        .ok_or_else(|| ContentError::validation("Multipart field 'file' is required"))?;
    info!(
        "HTTP: Received create_document request for collection {} ({} bytes)",
        collection_id,
        upload.data.len()
    );

    let document = engine
        .documents
        .create(Some(collection_id), (), Some(upload))
        .await?;
    Ok((StatusCode::CREATED, Json(document)))
}

async fn list_documents(
    State(engine): State<AppState>,
    Path(collection_id): Path<Uuid>,
) -> Result<Json<Vec<Document>>, ContentError> {
    info!(
        "HTTP: Received list_documents request for collection {}",
        collection_id
    );

    let documents = engine.documents.list(Some(collection_id)).await?;
    Ok(Json(documents))
}

async fn create_dataset(
    State(engine): State<AppState>,
    Path(workspace_id): Path<Uuid>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<Dataset>), ContentError> {
    engine.datasets.require_parent(workspace_id).await?;

    let form = read_upload_form(multipart_body(multipart)?).await?;
    let name = form
        .name
        .ok_or_else(|| ContentError::validation("Multipart field 'name' is required"))?;
    let upload = form
        .file
        .ok_or_else(|| ContentError::validation("Multipart field 'file' is required"))?;
    info!(
        "HTTP: Received create_dataset request for '{}' in workspace {}",
        name, workspace_id
    );

    let dataset = engine
        .datasets
        .create(Some(workspace_id), DatasetFields { name }, Some(upload))
        .await?;
    Ok((StatusCode::CREATED, Json(dataset)))
}

async fn list_datasets(
    State(engine): State<AppState>,
    Path(workspace_id): Path<Uuid>,
) -> Result<Json<Vec<Dataset>>, ContentError> {
    info!(
        "HTTP: Received list_datasets request for workspace {}",
        workspace_id
    );

    let datasets = engine.datasets.list(Some(workspace_id)).await?;
    Ok(Json(datasets))
}

async fn document_content(
    State(engine): State<AppState>,
    Path(document_id): Path<Uuid>,
) -> Result<Response, ContentError> {
    info!(
        "HTTP: Received document_content request for {}",
        document_id
    );

    let (document, stream) = engine.documents.open(document_id).await?;
    Ok(stream_response(
        stream,
        document.mime_type.as_deref(),
        &document.filename,
        document.size_bytes,
    ))
}

async fn dataset_content(
    State(engine): State<AppState>,
    Path(dataset_id): Path<Uuid>,
) -> Result<Response, ContentError> {
    info!("HTTP: Received dataset_content request for {}", dataset_id);

    let (dataset, stream) = engine.datasets.open(dataset_id).await?;
    Ok(stream_response(
        stream,
        dataset.mime_type.as_deref().or(Some("text/csv")),
        &dataset.filename,
        dataset.size_bytes,
    ))
}

fn stream_response(
    stream: ByteStream,
    mime_type: Option<&str>,
    filename: &str,
    size_bytes: i64,
) -> Response {
    let content_type = mime_type
        .and_then(|mime| HeaderValue::from_str(mime).ok())
        .unwrap_or_else(|| HeaderValue::from_static("application/octet-stream"));

    // Header values must be visible ASCII; anything else is replaced.
    let safe_name: String = filename
        .chars()
        .map(|c| {
            if (c.is_ascii_graphic() && c != '"' && c != '\\') || c == ' ' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", safe_name))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"));

    let mut response = Body::from_stream(stream).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, content_type);
    headers.insert(header::CONTENT_DISPOSITION, disposition);
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(size_bytes));
    response
}
