//! Tenant request boundary.
//!
//! Every protected request passes through [`tenant_boundary`]: the Bearer
//! credential is verified, a fresh [`TenantContext`] is populated from the
//! verified claims and placed in the request extensions, and the context is
//! cleared when the downstream future finishes or is dropped. Handlers read
//! the identity through the [`Tenant`] extractor; no handler accepts a tenant
//! id from the path, query, or body.

use std::sync::Arc;

use axum::extract::{FromRequestParts, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use inmo_core::error::CoreError;
use inmo_core::tenant::{TenantContext, TenantIdentity, TenantScope};

use crate::auth::jwt::TokenCodec;
use crate::error::AppError;

/// Verify the credential, scope the tenant context, run the handler.
///
/// Mount with `axum::middleware::from_fn_with_state(codec, tenant_boundary)`.
pub async fn tenant_boundary(
    State(codec): State<Arc<TokenCodec>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(request.headers())?;
    let claims = codec.verify(token)?;

    let scope = TenantScope::enter(claims.identity())?;
    request.extensions_mut().insert(scope.context());
    tracing::debug!(
        tenant_id = claims.tenant_id,
        user_id = claims.sub,
        role = %claims.role,
        "Tenant context established"
    );

    let response = next.run(request).await;
    drop(scope);
    Ok(response)
}

fn bearer_token(headers: &HeaderMap) -> Result<&str, CoreError> {
    let header = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| CoreError::InvalidCredential("Missing Authorization header".into()))?;

    header.strip_prefix("Bearer ").ok_or_else(|| {
        CoreError::InvalidCredential(
            "Invalid Authorization format. Expected: Bearer <token>".into(),
        )
    })
}

// ---------------------------------------------------------------------------
// Extractor
// ---------------------------------------------------------------------------

/// The verified identity of the current request.
///
/// ```ignore
/// async fn my_handler(Tenant(me): Tenant) -> AppResult<Json<()>> {
///     tracing::info!(tenant_id = me.tenant_id, "handling request");
///     Ok(Json(()))
/// }
/// ```
///
/// Used on a route without the boundary it fails with `NoTenantContext`,
/// which surfaces as a 500.
#[derive(Debug, Clone)]
pub struct Tenant(pub TenantIdentity);

impl<S: Send + Sync> FromRequestParts<S> for Tenant {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let context = parts
            .extensions
            .get::<Arc<TenantContext>>()
            .ok_or(CoreError::NoTenantContext)?;
        Ok(Tenant(context.current()?))
    }
}
