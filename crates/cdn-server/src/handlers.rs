//! Content handlers and the cache-aside read path

use crate::server::SharedState;
use crate::sink::RequestErrorSink;
use axum::{
    extract::{multipart::MultipartError, Extension, Multipart, Path, State},
    http::{header, HeaderName, StatusCode},
    response::{IntoResponse, Json, Response},
};
use cdn_db::{StoreError, StoredFile};
use serde::Serialize;
use std::fmt;
use tracing::{debug, info, info_span, warn, Instrument};

const X_CACHE: HeaderName = HeaderName::from_static("x-cache");
const CONTENT_TYPE_MARKER: &str = "image";

#[derive(Serialize)]
struct UploadResponse {
    hash: String,
}

pub async fn health() -> &'static str {
    "OK"
}

/// Serve a file: cache first, then the durable store with a background
/// write-back to the cache.
pub async fn get_file(
    State(state): State<SharedState>,
    Extension(sink): Extension<RequestErrorSink>,
    Path(hash): Path<String>,
) -> Response {
    let span = info_span!("get_file", file.hash = %hash);
    async move {
        if let Some(cache) = &state.cache {
            match cache.get_file(&hash).await {
                Ok(StoredFile {
                    content: Some(bytes),
                    ..
                }) if !bytes.is_empty() => {
                    debug!("Served from cache");
                    return content_response(bytes, "HIT");
                }
                Ok(_) => {
                    sink.record("cache.get_file", StoreError::KeyDoesNotExist(hash.clone()))
                        .await
                }
                Err(e) => sink.record("cache.get_file", e).await,
            }
        }

        let file = match state.durable.get_file(&hash).await {
            Ok(file) => file,
            Err(e) if e.is_miss() => {
                info!("File not found");
                return StatusCode::BAD_REQUEST.into_response();
            }
            Err(e) => {
                warn!(error = %e, "Failed to read file from durable store");
                return StatusCode::BAD_REQUEST.into_response();
            }
        };

        if let Some(cache) = state.cache.clone() {
            let cached = file.clone();
            sink.spawn("cache.add_file", async move { cache.add_file(&cached).await });
        }

        content_response(file.content.unwrap_or_default(), "MISS")
    }
    .instrument(span)
    .await
}

fn content_response(bytes: Vec<u8>, cache_status: &'static str) -> Response {
    (
        [
            (header::CONTENT_TYPE, CONTENT_TYPE_MARKER),
            (X_CACHE, cache_status),
        ],
        bytes,
    )
        .into_response()
}

/// List `{id_hash, filename}` for every stored file
pub async fn get_file_list(State(state): State<SharedState>) -> Response {
    let span = info_span!("get_file_list");
    async move {
        match state.durable.get_file_list().await {
            Ok(files) => Json(files).into_response(),
            Err(e) => {
                warn!(error = %e, "Failed to list files");
                StatusCode::BAD_REQUEST.into_response()
            }
        }
    }
    .instrument(span)
    .await
}

/// Store an upload under a freshly generated key
pub async fn post_file(State(state): State<SharedState>, multipart: Multipart) -> Response {
    let span = info_span!("post_file", file.hash = tracing::field::Empty);
    async move {
        let upload = match read_upload(multipart).await {
            Ok(upload) => upload,
            Err(e) => {
                warn!(error = %e, "Malformed upload");
                return StatusCode::BAD_REQUEST.into_response();
            }
        };

        let id = (state.new_key)();
        tracing::Span::current().record("file.hash", id.as_str());

        match state.durable.get_file(&id).await {
            Ok(_) => {
                warn!("Generated key already in use");
                return StatusCode::FORBIDDEN.into_response();
            }
            Err(e) if e.is_miss() => {}
            Err(e) => {
                warn!(error = %e, "Failed to check key");
                return StatusCode::BAD_REQUEST.into_response();
            }
        }

        let file = StoredFile::new(id.clone(), upload.filename, upload.content);
        match state.durable.add_file(&file).await {
            Ok(()) => {
                info!(filename = file.filename.as_deref().unwrap_or(""), "Stored file");
                Json(UploadResponse { hash: id }).into_response()
            }
            Err(StoreError::KeyAlreadyExists(_)) => {
                warn!("Generated key taken by a concurrent upload");
                StatusCode::FORBIDDEN.into_response()
            }
            Err(e) => {
                warn!(error = %e, "Failed to store file");
                StatusCode::BAD_REQUEST.into_response()
            }
        }
    }
    .instrument(span)
    .await
}

/// Remove a file. Always answers 200; failures only reach the logs.
pub async fn delete_file(
    State(state): State<SharedState>,
    Extension(sink): Extension<RequestErrorSink>,
    Path(hash): Path<String>,
) -> Response {
    let span = info_span!("delete_file", file.hash = %hash);
    async move {
        if let Some(cache) = state.cache.clone() {
            let key = hash.clone();
            sink.spawn("cache.remove_file", async move { cache.remove_file(&key).await });
        }

        if let Err(e) = state.durable.remove_file(&hash).await {
            warn!(error = %e, "Failed to remove file from durable store");
            sink.record("durable.remove_file", e).await;
        }

        (StatusCode::OK, "OK").into_response()
    }
    .instrument(span)
    .await
}

struct Upload {
    filename: String,
    content: Vec<u8>,
}

#[derive(Debug)]
enum UploadError {
    Multipart(MultipartError),
    MissingFile,
}

impl fmt::Display for UploadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UploadError::Multipart(err) => write!(f, "multipart error: {}", err),
            UploadError::MissingFile => write!(f, "missing form field: file"),
        }
    }
}

impl From<MultipartError> for UploadError {
    fn from(err: MultipartError) -> Self {
        UploadError::Multipart(err)
    }
}

/// Read the `filename` and `file` form fields. Without a `filename` field the
/// file part's own name is used.
async fn read_upload(mut multipart: Multipart) -> Result<Upload, UploadError> {
    let mut filename = None;
    let mut content = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("filename") => filename = Some(field.text().await?),
            Some("file") => {
                let part_name = field.file_name().map(str::to_string);
                content = Some(field.bytes().await?.to_vec());
                if filename.is_none() {
                    filename = part_name;
                }
            }
            _ => {}
        }
    }

    let content = content.ok_or(UploadError::MissingFile)?;
    Ok(Upload {
        filename: filename.unwrap_or_default(),
        content,
    })
}
