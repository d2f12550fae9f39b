//! Caller identity
//!
//! End-user authentication happens upstream; the gateway in front of this
//! service forwards the authenticated tenant and actor as trusted headers.
//! Internal endpoints (the reaper) are protected by the shared worker secret.

use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Response},
};
use reclaim_core::AppError;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::constants::{ACTOR_HEADER, TENANT_HEADER};
use crate::error::HttpAppError;
use crate::state::AppState;

/// Tenant and actor of the current request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TenantContext {
    pub tenant_id: Uuid,
    pub actor_id: Uuid,
}

fn header_uuid(parts: &Parts, name: &str) -> Result<Uuid, HttpAppError> {
    let value = parts
        .headers
        .get(name)
        .ok_or_else(|| HttpAppError(AppError::Unauthorized(format!("Missing {} header", name))))?;

    value
        .to_str()
        .ok()
        .and_then(|v| Uuid::parse_str(v.trim()).ok())
        .ok_or_else(|| HttpAppError(AppError::Unauthorized(format!("Invalid {} header", name))))
}

// Extracted from parts so it composes with Multipart.
impl<S> FromRequestParts<S> for TenantContext
where
    S: Send + Sync,
{
    type Rejection = HttpAppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(TenantContext {
            tenant_id: header_uuid(parts, TENANT_HEADER)?,
            actor_id: header_uuid(parts, ACTOR_HEADER)?,
        })
    }
}

fn secure_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Require `Authorization: Bearer <worker secret>` on internal routes.
pub async fn internal_auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let auth_header = match request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
    {
        Some(h) => h,
        None => {
            tracing::warn!(path = %request.uri().path(), "Internal request without credentials");
            return HttpAppError(AppError::Unauthorized(
                "Missing authorization header".to_string(),
            ))
            .into_response();
        }
    };

    let Some(token) = auth_header.strip_prefix("Bearer ") else {
        return HttpAppError(AppError::Unauthorized(
            "Invalid authorization header format".to_string(),
        ))
        .into_response();
    };

    if !secure_compare(token, &state.security.internal_secret) {
        tracing::warn!(path = %request.uri().path(), "Internal request with invalid token");
        return HttpAppError(AppError::Unauthorized("Invalid token".to_string())).into_response();
    }

    next.run(request).await
}
