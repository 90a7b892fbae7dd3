//! KV endpoints: `PUT|GET|DELETE /v1/:tenant/:key`.

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::put,
    Router,
};
use tessera_core::{EntryKey, TenantId, TesseraError};

use crate::error::{ApiError, ApiResult};
use crate::service::KvService;
use crate::state::AppState;

fn parse_path(tenant: String, key: String) -> ApiResult<(TenantId, EntryKey)> {
    Ok((TenantId::new(tenant)?, EntryKey::new(key)?))
}

/// Quota rejections carry the window length as a retry hint.
fn to_api_error(service: &KvService, err: TesseraError) -> ApiError {
    let is_quota = matches!(err, TesseraError::QuotaExceeded { .. });
    let api = ApiError::from(err);
    if is_quota {
        api.with_retry_after(service.limiter().window().as_secs().max(1))
    } else {
        api
    }
}

/// PUT /v1/:tenant/:key - store a JSON value
pub async fn put_entry(
    State(service): State<KvService>,
    Path((tenant, key)): Path<(String, String)>,
    body: Result<Bytes, BytesRejection>,
) -> ApiResult<StatusCode> {
    let (tenant, key) = parse_path(tenant, key)?;
    // Bodies over the transport limit are reported like any other oversized payload.
    let body = body.map_err(|e| ApiError::invalid_payload(e.body_text()))?;
    service
        .put(&tenant, &key, body.to_vec())
        .await
        .map_err(|e| to_api_error(&service, e))?;
    Ok(StatusCode::OK)
}

/// GET /v1/:tenant/:key - read the stored value
pub async fn get_entry(
    State(service): State<KvService>,
    Path((tenant, key)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    let (tenant, key) = parse_path(tenant, key)?;
    let value = service
        .get(&tenant, &key)
        .await
        .map_err(|e| to_api_error(&service, e))?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        value,
    ))
}

/// DELETE /v1/:tenant/:key - remove from both layers
pub async fn delete_entry(
    State(service): State<KvService>,
    Path((tenant, key)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    let (tenant, key) = parse_path(tenant, key)?;
    service
        .delete(&tenant, &key)
        .await
        .map_err(|e| to_api_error(&service, e))?;
    Ok(StatusCode::OK)
}

/// Create the KV router, mounted under `/v1`.
pub fn create_router() -> Router<AppState> {
    Router::new().route(
        "/:tenant/:key",
        put(put_entry).get(get_entry).delete(delete_entry),
    )
}
