//! Catalog handlers: search, view, publish, edit, delete

use axum::{
    body::Bytes,
    extract::{Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use validator::Validate;

use crate::AppState;
use docshelf_common::{
    auth::{AuthContext, MaybeAuth},
    errors::{AppError, Result},
    format::format_bytes,
    ids::sha256_hex,
    metrics, pdf,
    store::DeleteMode,
    thumbnail::ThumbnailInfo,
    Document, DocumentPatch,
};

/// A document as shown to clients
#[derive(Debug, Serialize)]
pub struct DocumentView {
    #[serde(flatten)]
    pub document: Document,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_label: Option<String>,
}

impl From<Document> for DocumentView {
    fn from(document: Document) -> Self {
        let size_label = document.size.map(format_bytes);
        Self {
            document,
            size_label,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: Option<String>,
    pub count: usize,
    pub results: Vec<DocumentView>,
}

/// Search the catalog; admins also see documents pending deletion
pub async fn search(
    State(state): State<AppState>,
    auth: MaybeAuth,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>> {
    let results = state
        .library
        .documents
        .read()
        .await
        .search(params.q.as_deref(), auth.is_admin())?;

    Ok(Json(SearchResponse {
        query: params.q,
        count: results.len(),
        results: results.into_iter().map(DocumentView::from).collect(),
    }))
}

pub async fn get_document(
    State(state): State<AppState>,
    auth: MaybeAuth,
    Path(id): Path<String>,
) -> Result<Json<DocumentView>> {
    let document = state.library.documents.read().await.require(&id)?.clone();
    visible(&document, &auth)?;
    Ok(Json(document.into()))
}

/// Soft-deleted documents exist only for admins
fn visible(document: &Document, auth: &MaybeAuth) -> Result<()> {
    if document.is_soft_deleted() && !auth.is_admin() {
        return Err(AppError::document_not_found(&document.id));
    }
    Ok(())
}

/// Serve the stored PDF
pub async fn get_file(
    State(state): State<AppState>,
    auth: MaybeAuth,
    Path(id): Path<String>,
) -> Result<Response> {
    let path = {
        let store = state.library.documents.read().await;
        visible(store.require(&id)?, &auth)?;
        store.artifact_path(&id)
    };

    let bytes = read_artifact(&id, &path).await?;
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("inline; filename=\"{}\"", Document::filename_for(&id)),
            ),
        ],
        bytes,
    )
        .into_response())
}

pub async fn get_thumbnail(
    State(state): State<AppState>,
    auth: MaybeAuth,
    Path(id): Path<String>,
) -> Result<Response> {
    let path = {
        let store = state.library.documents.read().await;
        visible(store.require(&id)?, &auth)?;
        store.thumbnail_path(&id)
    };

    let bytes = read_artifact(&id, &path).await?;
    Ok(([(header::CONTENT_TYPE, "image/jpeg")], bytes).into_response())
}

async fn read_artifact(id: &str, path: &std::path::Path) -> Result<Bytes> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Bytes::from(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(AppError::NotFound {
            resource_type: "file".to_string(),
            id: id.to_string(),
        }),
        Err(e) => Err(e.into()),
    }
}

/// Uploaded file from the `doc` field
struct Upload {
    filename: Option<String>,
    bytes: Bytes,
}

#[derive(Serialize)]
pub struct PublishResponse {
    pub document: DocumentView,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<ThumbnailInfo>,
}

/// Publish a document.
///
/// Multipart form: an optional `doc` file plus metadata fields. With a file
/// the id may be omitted and is generated; without one, `id` is required.
pub async fn publish(
    State(state): State<AppState>,
    auth: AuthContext,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<PublishResponse>)> {
    let mut patch = DocumentPatch::default();
    let mut upload = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "doc" {
            let filename = field.file_name().map(str::to_string);
            let bytes = field.bytes().await.map_err(multipart_error)?;
            if !bytes.is_empty() {
                upload = Some(Upload { filename, bytes });
            }
            continue;
        }

        let value = field.text().await.map_err(multipart_error)?;
        let value = value.trim().to_string();
        if value.is_empty() {
            continue;
        }
        match name.as_str() {
            "id" => patch.id = value,
            "author" => patch.author = Some(value),
            "title" => patch.title = Some(value),
            "year" => patch.year = Some(value),
            "publisher" => patch.publisher = Some(value),
            "description" => patch.description = Some(value),
            other => tracing::debug!(field = other, "Ignoring unknown form field"),
        }
    }

    let Some(upload) = upload else {
        if patch.id.is_empty() {
            return Err(AppError::MissingField {
                field: "id".to_string(),
            });
        }
        let document = {
            let mut store = state.library.documents.write().await;
            let id = store.upsert(patch)?.id;
            store.check_missing(&id)?;
            store.require(&id)?.clone()
        };
        tracing::info!(
            id = %document.id,
            user = %auth.user_id,
            missing = document.flags.missing,
            "Metadata published"
        );
        return Ok((
            StatusCode::OK,
            Json(PublishResponse {
                document: document.into(),
                thumbnail: None,
            }),
        ));
    };

    let limit = state.config.server.max_upload_bytes;
    if upload.bytes.len() > limit {
        return Err(AppError::PayloadTooLarge {
            size: upload.bytes.len(),
            limit,
        });
    }
    let info = pdf::inspect(&upload.bytes)?;

    let (document, artifact, thumbnail_path) = {
        let mut store = state.library.documents.write().await;
        if patch.id.is_empty() {
            patch.id = store.new_id()?;
        }
        let id = patch.id.clone();
        patch.size = Some(upload.bytes.len() as u64);
        patch.content_hash = Some(sha256_hex(&upload.bytes));
        patch.original_filename = upload.filename;
        patch.pages = info.pages;
        patch.validate()?;

        let existed = store.get(&id).is_some();
        let artifact = store.write_artifact(&id, &upload.bytes)?;
        if let Err(e) = store.upsert(patch) {
            if !existed {
                store.discard_artifact(&id)?;
            }
            return Err(e);
        }
        store.check_missing(&id)?;
        store.check_duplicates()?;

        let document = store.require(&id)?.clone();
        (document, artifact, store.thumbnail_path(&id))
    };
    metrics::record_publish();
    tracing::info!(
        id = %document.id,
        user = %auth.user_id,
        size = document.size,
        duplicate = document.flags.duplicate,
        "Document published"
    );

    let thumbnail = if state.thumbnails.enabled() {
        match state.thumbnails.render(&artifact, &thumbnail_path).await {
            Ok(info) => Some(info),
            Err(e) => {
                tracing::warn!(id = %document.id, error = %e, "Thumbnail not rendered");
                None
            }
        }
    } else {
        None
    };

    Ok((
        StatusCode::CREATED,
        Json(PublishResponse {
            document: document.into(),
            thumbnail,
        }),
    ))
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> AppError {
    AppError::InvalidFormat {
        message: e.body_text(),
    }
}

/// Editable metadata
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateDocumentRequest {
    #[validate(length(max = 1000))]
    pub author: Option<String>,
    #[validate(length(max = 1000))]
    pub title: Option<String>,
    #[validate(length(max = 64))]
    pub year: Option<String>,
    #[validate(length(max = 1000))]
    pub publisher: Option<String>,
    #[validate(length(max = 20000))]
    pub description: Option<String>,
}

pub async fn update_document(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<String>,
    Json(request): Json<UpdateDocumentRequest>,
) -> Result<Json<DocumentView>> {
    request.validate()?;

    let document = {
        let mut store = state.library.documents.write().await;
        store.require(&id)?;
        store.upsert(DocumentPatch {
            author: request.author,
            title: request.title,
            year: request.year,
            publisher: request.publisher,
            description: request.description,
            ..DocumentPatch::new(id)
        })?
    };

    tracing::info!(id = %document.id, user = %auth.user_id, "Document edited");
    Ok(Json(document.into()))
}

#[derive(Serialize)]
pub struct DeleteResponse {
    pub id: String,
    pub mode: &'static str,
    pub title: Option<String>,
}

/// Admins remove the document and its file; other users mark it for removal
pub async fn delete_document(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>> {
    let mode = if auth.admin {
        DeleteMode::Hard
    } else {
        DeleteMode::Soft {
            requested_by: auth.email.clone(),
        }
    };
    let label = mode.label();

    let document = {
        let mut store = state.library.documents.write().await;
        let document = store.delete(&id, mode)?;
        store.check_duplicates()?;
        document
    };

    Ok(Json(DeleteResponse {
        id: document.id,
        mode: label,
        title: document.title,
    }))
}

pub async fn restore_document(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<String>,
) -> Result<Json<DocumentView>> {
    auth.require_admin()?;
    let document = state.library.documents.write().await.restore(&id)?;
    Ok(Json(document.into()))
}

#[derive(Serialize)]
pub struct DuplicatesResponse {
    pub count: usize,
    pub ids: Vec<String>,
}

/// Run the duplicate pass and report flagged ids
pub async fn duplicates(State(state): State<AppState>) -> Result<Json<DuplicatesResponse>> {
    let ids = state.library.documents.write().await.check_duplicates()?;
    Ok(Json(DuplicatesResponse {
        count: ids.len(),
        ids,
    }))
}

#[derive(Serialize)]
pub struct OrphansResponse {
    pub count: usize,
    pub files: Vec<String>,
}

pub async fn orphans(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<OrphansResponse>> {
    auth.require_admin()?;
    let files = state.library.documents.read().await.orphans()?;
    Ok(Json(OrphansResponse {
        count: files.len(),
        files,
    }))
}
