#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use inmo_core::notification::{
    CreateNotificationRequest, NotificationCategory, NotificationType,
};
use inmo_core::policy::PolicyUpdate;
use inmo_core::types::{DbId, Timestamp};
use inmo_notifications::{
    DispatchConfig, MemoryNotificationStore, MemoryPolicyStore, NotificationEngine,
    OutboundMessage, PolicyResolver, SendError, Sender,
};

/// Sender that replays a script of results, then succeeds.
#[derive(Default)]
pub struct ScriptedSender {
    script: Mutex<VecDeque<Result<(), SendError>>>,
    delay: Option<Duration>,
    calls: AtomicUsize,
    /// Destinations that always fail regardless of the script.
    failing: Vec<String>,
}

impl ScriptedSender {
    pub fn succeeding() -> Self {
        Self::default()
    }

    pub fn with_script(results: Vec<Result<(), SendError>>) -> Self {
        Self {
            script: Mutex::new(results.into()),
            ..Self::default()
        }
    }

    pub fn failing_n(n: usize) -> Self {
        Self::with_script(
            (0..n)
                .map(|i| Err(SendError::Transport(format!("smtp refused #{}", i + 1))))
                .collect(),
        )
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn failing_for(destination: &str) -> Self {
        Self {
            failing: vec![destination.to_string()],
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Sender for ScriptedSender {
    async fn send(&self, message: &OutboundMessage) -> Result<(), SendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.contains(&message.destination) {
            return Err(SendError::Transport("mailbox unavailable".to_string()));
        }
        self.script.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }
}

/// Engine over fresh in-memory stores.
pub struct Harness {
    pub engine: Arc<NotificationEngine>,
    pub store: Arc<MemoryNotificationStore>,
    pub sender: Arc<ScriptedSender>,
}

pub fn harness(sender: ScriptedSender) -> Harness {
    harness_with_config(sender, DispatchConfig::default())
}

pub fn harness_with_config(sender: ScriptedSender, config: DispatchConfig) -> Harness {
    let store = Arc::new(MemoryNotificationStore::new());
    let sender = Arc::new(sender);
    let policies = PolicyResolver::new(Arc::new(MemoryPolicyStore::new()));
    let engine = Arc::new(NotificationEngine::new(
        store.clone(),
        policies,
        sender.clone(),
        config,
    ));
    Harness {
        engine,
        store,
        sender,
    }
}

/// A valid email payment reminder for person 7 about contract `reference_id`.
pub fn request(reference_id: DbId) -> CreateNotificationRequest {
    CreateNotificationRequest {
        person_id: Some(7),
        notification_type: Some(NotificationType::Email),
        category: Some(NotificationCategory::PaymentDue),
        destination: Some("ana@example.com".to_string()),
        subject: Some("Recordatorio de pago".to_string()),
        body: Some("Su pago vence pronto".to_string()),
        reference_type: Some("CONTRATO".to_string()),
        reference_id: Some(reference_id),
        scheduled_at: None,
    }
}

pub fn scheduled(reference_id: DbId, at: Timestamp) -> CreateNotificationRequest {
    CreateNotificationRequest {
        scheduled_at: Some(at),
        ..request(reference_id)
    }
}

pub async fn set_max_attempts(engine: &NotificationEngine, tenant_id: DbId, max_attempts: i32) {
    let update = PolicyUpdate {
        max_attempts: Some(max_attempts),
        ..PolicyUpdate::for_category(NotificationCategory::PaymentDue)
    };
    engine
        .policies()
        .update(tenant_id, &update)
        .await
        .expect("policy update should succeed");
}
