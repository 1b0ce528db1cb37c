//! Policy resolution with built-in defaults.

use std::sync::Arc;

use inmo_core::notification::NotificationCategory;
use inmo_core::policy::{NotificationPolicy, PolicyUpdate};
use inmo_core::types::DbId;

use crate::error::EngineError;
use crate::store::PolicyStore;

/// Resolves the effective [`NotificationPolicy`] for a tenant and category.
#[derive(Clone)]
pub struct PolicyResolver {
    store: Arc<dyn PolicyStore>,
}

impl PolicyResolver {
    pub fn new(store: Arc<dyn PolicyStore>) -> Self {
        Self { store }
    }

    /// The stored policy when present and active, otherwise the default.
    ///
    /// The default is never persisted by a read.
    pub async fn resolve(
        &self,
        tenant_id: DbId,
        category: NotificationCategory,
    ) -> Result<NotificationPolicy, EngineError> {
        let stored = self.store.find(tenant_id, category).await?;
        Ok(stored
            .filter(|p| p.active)
            .unwrap_or_else(|| NotificationPolicy::default_for(tenant_id, category)))
    }

    /// The stored policy for the pair, active or not, without defaulting.
    pub async fn stored(
        &self,
        tenant_id: DbId,
        category: NotificationCategory,
    ) -> Result<Option<NotificationPolicy>, EngineError> {
        self.store.find(tenant_id, category).await
    }

    /// Create or merge the policy named by `update.category`.
    ///
    /// Only fields present in `update` change; a missing row starts from the
    /// default policy. Fails with `InvalidPolicy` before touching storage.
    pub async fn update(
        &self,
        tenant_id: DbId,
        update: &PolicyUpdate,
    ) -> Result<NotificationPolicy, EngineError> {
        let category = update.validate()?;
        let mut policy = self
            .store
            .find(tenant_id, category)
            .await?
            .unwrap_or_else(|| NotificationPolicy::default_for(tenant_id, category));
        policy.apply(update);

        let saved = self.store.upsert(&policy).await?;
        tracing::info!(
            tenant_id,
            category = %category,
            max_attempts = saved.max_attempts,
            active = saved.active,
            "Notification policy updated"
        );
        Ok(saved)
    }

    /// Every stored policy of the tenant, including inactive ones.
    pub async fn list(&self, tenant_id: DbId) -> Result<Vec<NotificationPolicy>, EngineError> {
        self.store.list(tenant_id).await
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use inmo_core::error::CoreError;

    use super::*;
    use crate::store::MemoryPolicyStore;

    fn resolver() -> PolicyResolver {
        PolicyResolver::new(Arc::new(MemoryPolicyStore::new()))
    }

    #[tokio::test]
    async fn missing_policy_resolves_to_default_without_persisting() {
        let resolver = resolver();
        let policy = resolver
            .resolve(1, NotificationCategory::PaymentDue)
            .await
            .unwrap();

        assert_eq!(
            policy,
            NotificationPolicy::default_for(1, NotificationCategory::PaymentDue)
        );
        assert!(resolver.list(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_merges_onto_existing_policy() {
        let resolver = resolver();
        let first = PolicyUpdate {
            max_attempts: Some(5),
            ..PolicyUpdate::for_category(NotificationCategory::PaymentDue)
        };
        resolver.update(1, &first).await.unwrap();

        let second = PolicyUpdate {
            whatsapp_enabled: Some(true),
            ..PolicyUpdate::for_category(NotificationCategory::PaymentDue)
        };
        let merged = resolver.update(1, &second).await.unwrap();

        assert_eq!(merged.max_attempts, 5);
        assert!(merged.whatsapp_enabled);
        assert!(merged.email_enabled);
    }

    #[tokio::test]
    async fn inactive_policy_falls_back_to_default() {
        let resolver = resolver();
        let update = PolicyUpdate {
            max_attempts: Some(9),
            active: Some(false),
            ..PolicyUpdate::for_category(NotificationCategory::ContractExpiry)
        };
        resolver.update(1, &update).await.unwrap();

        let policy = resolver
            .resolve(1, NotificationCategory::ContractExpiry)
            .await
            .unwrap();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(resolver.list(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn invalid_update_is_rejected_and_not_stored() {
        let resolver = resolver();
        let update = PolicyUpdate {
            max_attempts: Some(0),
            ..PolicyUpdate::for_category(NotificationCategory::PaymentDue)
        };

        assert_matches!(
            resolver.update(1, &update).await,
            Err(EngineError::Core(CoreError::InvalidPolicy(_)))
        );
        assert!(resolver.list(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn policies_are_isolated_per_tenant() {
        let resolver = resolver();
        let update = PolicyUpdate {
            max_attempts: Some(7),
            ..PolicyUpdate::for_category(NotificationCategory::PaymentDue)
        };
        resolver.update(1, &update).await.unwrap();

        let other = resolver
            .resolve(2, NotificationCategory::PaymentDue)
            .await
            .unwrap();
        assert_eq!(other.max_attempts, 3);
    }
}
