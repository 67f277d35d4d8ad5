//! Bucket, object, chunked-upload, and signed-URL HTTP handlers.
//!
//! Every handler here is a thin translation layer over
//! [`pgfront_storage::StorageService`]; none of them touch SQL or the
//! backend directly. Authenticated routes scope access through the
//! caller's resolved [`Identity`]; the signed-download route bypasses
//! identity entirely, since the token itself is the authorization.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, Extension, Path, State};
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;
use pgfront_storage::{ChunkedUploadOptions, StorageBackendKind};
use uuid::Uuid;

use crate::app::state::ApiState;
use crate::http::auth::{extract_identity, AuthContext};
use crate::http::errors::ApiError;
use pgfront_api_models::{
    BucketCreateRequest, BucketView, ChunkedUploadInitRequest, ChunkedUploadSessionView, ObjectView, SignedUrlResponse,
};

fn query_param<'a>(uri: &'a Uri, key: &str) -> Option<&'a str> {
    let query = uri.query()?;
    for pair in query.split('&') {
        if let Some(value) = pair.strip_prefix(key).and_then(|rest| rest.strip_prefix('=')) {
            return Some(value);
        }
    }
    None
}

/// `GET /storage/buckets` — list every bucket visible to the caller.
pub(crate) async fn list_buckets(State(state): State<Arc<ApiState>>, Extension(context): Extension<AuthContext>) -> Result<Response, ApiError> {
    let identity = extract_identity(context)?;
    let buckets = state.storage.list_buckets(&identity).await?;
    let views: Vec<BucketView> = buckets.iter().map(BucketView::from).collect();
    Ok((StatusCode::OK, Json(views)).into_response())
}

/// `POST /storage/buckets` — create a new bucket.
pub(crate) async fn create_bucket(
    State(state): State<Arc<ApiState>>,
    Extension(context): Extension<AuthContext>,
    Json(request): Json<BucketCreateRequest>,
) -> Result<Response, ApiError> {
    let identity = extract_identity(context)?;
    let bucket = state
        .storage
        .create_bucket(&identity, &request.id, request.public, &request.allowed_mime_types, request.max_file_size)
        .await?;
    Ok((StatusCode::CREATED, Json(BucketView::from(&bucket))).into_response())
}

/// `PUT /storage/buckets/{b}` — declare a bucket, creating it if absent.
///
/// The storage engine exposes no partial-update operation for bucket
/// policy, so `PUT` is treated as a declarative create: a bucket that
/// already exists at this id is reported as a conflict, same as `POST`.
pub(crate) async fn put_bucket(
    State(state): State<Arc<ApiState>>,
    Path(bucket_id): Path<String>,
    Extension(context): Extension<AuthContext>,
    Json(request): Json<BucketCreateRequest>,
) -> Result<Response, ApiError> {
    let identity = extract_identity(context)?;
    let bucket = state
        .storage
        .create_bucket(&identity, &bucket_id, request.public, &request.allowed_mime_types, request.max_file_size)
        .await?;
    Ok((StatusCode::OK, Json(BucketView::from(&bucket))).into_response())
}

/// `DELETE /storage/buckets/{b}`.
pub(crate) async fn delete_bucket(
    State(state): State<Arc<ApiState>>,
    Path(bucket_id): Path<String>,
    Extension(context): Extension<AuthContext>,
) -> Result<Response, ApiError> {
    let identity = extract_identity(context)?;
    state.storage.delete_bucket(&identity, &bucket_id).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

fn content_type(headers: &HeaderMap) -> Option<&str> {
    headers.get(axum::http::header::CONTENT_TYPE).and_then(|value| value.to_str().ok())
}

/// `POST`/`PUT /storage/{b}/{*path}` — upload (or overwrite) an object in a
/// single call.
pub(crate) async fn put_object(
    State(state): State<Arc<ApiState>>,
    Path((bucket, path)): Path<(String, String)>,
    Extension(context): Extension<AuthContext>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let identity = extract_identity(context)?;
    let mime_type = content_type(&headers);
    let object = state.storage.put_object(&identity, &bucket, &path, &body, mime_type).await?;
    Ok((StatusCode::CREATED, Json(ObjectView::from(&object))).into_response())
}

/// `GET /storage/{b}/{*path}` — stream an object's bytes.
///
/// Access to this route is still gated by RLS-authenticated identity;
/// anonymous, token-bearing access goes through
/// [`download_signed`] instead.
pub(crate) async fn get_object(
    State(state): State<Arc<ApiState>>,
    Path((bucket, path)): Path<(String, String)>,
    Extension(context): Extension<AuthContext>,
) -> Result<Response, ApiError> {
    extract_identity(context)?;
    let bytes = state.storage.get_object_bytes(&bucket, &path).await?;
    Ok((StatusCode::OK, bytes).into_response())
}

/// `HEAD /storage/{b}/{*path}` — report an object's size without its body.
///
/// The storage engine exposes no metadata-only lookup, so this fetches
/// the full object and discards the body; acceptable for the small,
/// infrequent `HEAD` path but not a substitute for a real metadata query.
pub(crate) async fn head_object(
    State(state): State<Arc<ApiState>>,
    Path((bucket, path)): Path<(String, String)>,
    Extension(context): Extension<AuthContext>,
) -> Result<Response, ApiError> {
    extract_identity(context)?;
    let bytes = state.storage.get_object_bytes(&bucket, &path).await?;
    let mut response = StatusCode::OK.into_response();
    response
        .headers_mut()
        .insert(axum::http::header::CONTENT_LENGTH, bytes.len().into());
    Ok(response)
}

/// `DELETE /storage/{b}/{*path}`.
pub(crate) async fn delete_object(
    State(state): State<Arc<ApiState>>,
    Path((bucket, path)): Path<(String, String)>,
    Extension(context): Extension<AuthContext>,
) -> Result<Response, ApiError> {
    let identity = extract_identity(context)?;
    state.storage.delete_object(&identity, &bucket, &path).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// `POST /storage/sign/{b}/{*path}?method=GET` — issue a signed URL.
pub(crate) async fn sign_object(
    State(state): State<Arc<ApiState>>,
    Path((bucket, path)): Path<(String, String)>,
    Extension(context): Extension<AuthContext>,
    uri: Uri,
) -> Result<Response, ApiError> {
    extract_identity(context)?;
    let method = query_param(&uri, "method").unwrap_or("GET").to_uppercase();
    let signed_url = state.storage.issue_signed_url(&bucket, &path, &method).await?;
    Ok((
        StatusCode::OK,
        Json(SignedUrlResponse {
            signed_url,
            expires_in: 3600,
        }),
    )
        .into_response())
}

/// `GET /storage/object?token=…` — signed, RLS-bypassing download.
///
/// Rate-limited by client IP; requires the request method to match the
/// method the token was issued for.
pub(crate) async fn download_signed(
    State(state): State<Arc<ApiState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    uri: Uri,
) -> Result<Response, ApiError> {
    let token = query_param(&uri, "token").ok_or_else(|| ApiError::bad_request("missing 'token' query parameter"))?;
    let (bucket, path) = state.storage.authorize_signed_request(token, "GET", addr.ip()).await?;
    let bytes = state.storage.get_object_bytes(&bucket, &path).await?;

    let filename = path.rsplit('/').next().unwrap_or(&path);
    let mut response = (StatusCode::OK, bytes).into_response();
    response.headers_mut().insert(
        axum::http::header::CONTENT_DISPOSITION,
        axum::http::HeaderValue::from_str(&format!("attachment; filename=\"{filename}\"")).unwrap_or_else(|_| axum::http::HeaderValue::from_static("attachment")),
    );
    Ok(response)
}

/// `POST /storage/{b}/chunked/init`.
pub(crate) async fn init_upload(
    State(state): State<Arc<ApiState>>,
    Path(bucket): Path<String>,
    Extension(context): Extension<AuthContext>,
    Json(request): Json<ChunkedUploadInitRequest>,
) -> Result<Response, ApiError> {
    let identity = extract_identity(context)?;
    let session = state
        .storage
        .init_upload(
            &identity,
            &bucket,
            &request.path,
            request.total_size,
            request.chunk_size,
            StorageBackendKind::Local,
            ChunkedUploadOptions { ttl: chrono::Duration::hours(24) },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(ChunkedUploadSessionView::from(&session))).into_response())
}

/// `PUT /storage/{b}/chunked/{id}/{idx}` — upload a single part.
pub(crate) async fn upload_chunk(
    State(state): State<Arc<ApiState>>,
    Path((_bucket, session_id, index)): Path<(String, Uuid, i32)>,
    Extension(context): Extension<AuthContext>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let identity = extract_identity(context)?;
    let session = state.storage.upload_chunk(&identity, session_id, index, &body).await?;
    Ok((StatusCode::OK, Json(ChunkedUploadSessionView::from(&session))).into_response())
}

/// `GET /storage/{b}/chunked/{id}` — current session progress.
pub(crate) async fn chunked_status(
    State(state): State<Arc<ApiState>>,
    Path((_bucket, session_id)): Path<(String, Uuid)>,
    Extension(context): Extension<AuthContext>,
) -> Result<Response, ApiError> {
    let identity = extract_identity(context)?;
    let session = state.storage.session_status(&identity, session_id).await?;
    Ok((StatusCode::OK, Json(ChunkedUploadSessionView::from(&session))).into_response())
}

/// `POST /storage/{b}/chunked/{id}/complete`.
pub(crate) async fn complete_upload(
    State(state): State<Arc<ApiState>>,
    Path((_bucket, session_id)): Path<(String, Uuid)>,
    Extension(context): Extension<AuthContext>,
) -> Result<Response, ApiError> {
    let identity = extract_identity(context)?;
    let object = state.storage.complete_upload(&identity, session_id).await?;
    Ok((StatusCode::OK, Json(ObjectView::from(&object))).into_response())
}

/// `DELETE /storage/{b}/chunked/{id}` — abort.
pub(crate) async fn abort_upload(
    State(state): State<Arc<ApiState>>,
    Path((_bucket, session_id)): Path<(String, Uuid)>,
    Extension(context): Extension<AuthContext>,
) -> Result<Response, ApiError> {
    let identity = extract_identity(context)?;
    state.storage.abort_upload(&identity, session_id).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_param_reads_token() {
        let uri: Uri = "/storage/object?token=abc.def&other=1".parse().unwrap();
        assert_eq!(query_param(&uri, "token"), Some("abc.def"));
        assert_eq!(query_param(&uri, "missing"), None);
    }

    #[test]
    fn query_param_defaults_method_when_absent() {
        let uri: Uri = "/storage/sign/pics/a.bin".parse().unwrap();
        assert_eq!(query_param(&uri, "method"), None);
    }
}
