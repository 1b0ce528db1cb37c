//! Request-scoped tenant identity.
//!
//! Every inbound request gets its own [`TenantContext`], populated once from
//! a verified credential and cleared when the request ends. The context is
//! passed explicitly (request extensions, function arguments) and never lives
//! in a process-wide or thread-local slot, so reused runtime workers cannot
//! observe another request's tenant.
//!
//! [`TenantScope`] ties the clear to a drop guard: whether the handler
//! returns, fails, panics, or its future is dropped by a timeout, the
//! context is emptied exactly once on the way out.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;

use crate::error::CoreError;
use crate::types::DbId;

/// Identity established by a verified credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TenantIdentity {
    pub tenant_id: DbId,
    pub user_id: DbId,
    pub role: String,
}

/// Holder of the authenticated tenant for one in-flight request.
#[derive(Debug, Default)]
pub struct TenantContext {
    slot: Mutex<Option<TenantIdentity>>,
}

impl TenantContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the identity for the current request.
    ///
    /// Fails with [`CoreError::ContextAlreadySet`] if an identity is already
    /// present; a second population means the boundary ran twice.
    pub fn set(&self, identity: TenantIdentity) -> Result<(), CoreError> {
        let mut slot = self.lock();
        if slot.is_some() {
            return Err(CoreError::ContextAlreadySet);
        }
        *slot = Some(identity);
        Ok(())
    }

    /// Read the identity installed for this request.
    ///
    /// Absence is a programming error and surfaces as
    /// [`CoreError::NoTenantContext`]; callers must not fall back to a
    /// default tenant.
    pub fn current(&self) -> Result<TenantIdentity, CoreError> {
        self.lock().clone().ok_or(CoreError::NoTenantContext)
    }

    /// Remove the identity. Idempotent.
    pub fn clear(&self) {
        self.lock().take();
    }

    /// Whether an identity is currently installed.
    pub fn is_set(&self) -> bool {
        self.lock().is_some()
    }

    fn lock(&self) -> MutexGuard<'_, Option<TenantIdentity>> {
        // The slot holds plain data, so a panic while it was held cannot
        // leave it half-written.
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Drop guard owning one request's [`TenantContext`].
#[derive(Debug)]
pub struct TenantScope {
    context: Arc<TenantContext>,
}

impl TenantScope {
    /// Create a fresh context populated with `identity`.
    pub fn enter(identity: TenantIdentity) -> Result<Self, CoreError> {
        let context = Arc::new(TenantContext::new());
        context.set(identity)?;
        Ok(Self { context })
    }

    /// Shared handle to the scoped context, for passing down the call chain.
    pub fn context(&self) -> Arc<TenantContext> {
        Arc::clone(&self.context)
    }
}

impl Drop for TenantScope {
    fn drop(&mut self) {
        self.context.clear();
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn identity(tenant_id: DbId) -> TenantIdentity {
        TenantIdentity {
            tenant_id,
            user_id: 10,
            role: "AGENTE".to_string(),
        }
    }

    #[test]
    fn empty_context_has_no_tenant() {
        let ctx = TenantContext::new();
        assert_matches!(ctx.current(), Err(CoreError::NoTenantContext));
    }

    #[test]
    fn set_then_current_returns_identity() {
        let ctx = TenantContext::new();
        ctx.set(identity(3)).unwrap();
        assert_eq!(ctx.current().unwrap().tenant_id, 3);
    }

    #[test]
    fn second_set_without_clear_fails() {
        let ctx = TenantContext::new();
        ctx.set(identity(3)).unwrap();
        assert_matches!(ctx.set(identity(4)), Err(CoreError::ContextAlreadySet));
        assert_eq!(ctx.current().unwrap().tenant_id, 3);
    }

    #[test]
    fn clear_is_idempotent_and_allows_reset() {
        let ctx = TenantContext::new();
        ctx.clear();
        ctx.set(identity(3)).unwrap();
        ctx.clear();
        ctx.clear();
        assert!(!ctx.is_set());
        ctx.set(identity(4)).unwrap();
        assert_eq!(ctx.current().unwrap().tenant_id, 4);
    }

    #[test]
    fn scope_clears_on_normal_exit() {
        let handle = {
            let scope = TenantScope::enter(identity(1)).unwrap();
            let handle = scope.context();
            assert_eq!(handle.current().unwrap().tenant_id, 1);
            handle
        };
        assert_matches!(handle.current(), Err(CoreError::NoTenantContext));
    }

    #[test]
    fn scope_clears_on_error_exit() {
        fn handler(ctx: &TenantContext) -> Result<(), CoreError> {
            ctx.current()?;
            Err(CoreError::Internal("boom".to_string()))
        }

        let scope = TenantScope::enter(identity(1)).unwrap();
        let handle = scope.context();
        let result = handler(&handle);
        drop(scope);

        assert!(result.is_err());
        assert_matches!(handle.current(), Err(CoreError::NoTenantContext));
    }

    #[test]
    fn scope_clears_on_panic() {
        let scope = TenantScope::enter(identity(1)).unwrap();
        let handle = scope.context();

        let outcome = std::panic::catch_unwind(move || {
            let _scope = scope;
            panic!("handler panicked");
        });

        assert!(outcome.is_err());
        assert_matches!(handle.current(), Err(CoreError::NoTenantContext));
    }

    #[test]
    fn scopes_do_not_share_state() {
        let a = TenantScope::enter(identity(1)).unwrap();
        let b = TenantScope::enter(identity(2)).unwrap();
        assert_eq!(a.context().current().unwrap().tenant_id, 1);
        assert_eq!(b.context().current().unwrap().tenant_id, 2);
        drop(a);
        assert_eq!(b.context().current().unwrap().tenant_id, 2);
    }
}
