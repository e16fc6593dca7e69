use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Post-commit side effects. Events are dispatched after the owning
/// transaction commits; a lost or failed event never rolls an order back.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum AppEvent {
    OrderCreated {
        order_id: Uuid,
        user_id: Uuid,
        total: i64,
    },
    OrderStatusChanged {
        order_id: Uuid,
        status: String,
        order_user_id: Uuid,
    },
    OrderCancelled {
        order_id: Uuid,
        order_user_id: Uuid,
    },
}

impl AppEvent {
    fn user_id(&self) -> Uuid {
        match self {
            AppEvent::OrderCreated { user_id, .. } => *user_id,
            AppEvent::OrderStatusChanged { order_user_id, .. } => *order_user_id,
            AppEvent::OrderCancelled { order_user_id, .. } => *order_user_id,
        }
    }
}

#[derive(Clone)]
pub struct EventBus {
    tx: mpsc::UnboundedSender<AppEvent>,
}

impl EventBus {
    /// Spawn the worker draining the channel. The worker stands in for the
    /// notification and cache-invalidation collaborators: it forwards the
    /// event and signals the per-user order-cache invalidation.
    pub fn start() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<AppEvent>();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let user_id = event.user_id();
                match serde_json::to_string(&event) {
                    Ok(payload) => tracing::info!(%user_id, payload, "event dispatched"),
                    Err(err) => tracing::warn!(error = %err, "event serialization failed"),
                }
                tracing::debug!(%user_id, "order cache invalidated");
            }
        });
        Self { tx }
    }

    pub fn emit(&self, event: AppEvent) {
        if self.tx.send(event).is_err() {
            tracing::warn!("event worker is gone, dropping event");
        }
    }
}
