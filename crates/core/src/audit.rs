//! Audit trail for checkout transitions.
//!
//! The flow engine emits one [`AuditEvent`] per attempted transition when a
//! sink is attached. The runtime forwards them to `tracing`; tests collect them
//! in memory.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::conversation::ConversationKey;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditCategory {
    Flow,
    Classification,
    Persistence,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Applied,
    Rejected,
}

/// Who emitted the event and for which turn.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditContext {
    pub conversation: Option<ConversationKey>,
    pub correlation_id: String,
    pub actor: String,
}

impl AuditContext {
    pub fn new(
        conversation: Option<ConversationKey>,
        correlation_id: impl Into<String>,
        actor: impl Into<String>,
    ) -> Self {
        Self { conversation, correlation_id: correlation_id.into(), actor: actor.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: String,
    pub event_type: String,
    pub category: AuditCategory,
    pub outcome: AuditOutcome,
    pub context: AuditContext,
    pub details: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        context: &AuditContext,
        event_type: impl Into<String>,
        category: AuditCategory,
        outcome: AuditOutcome,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            event_type: event_type.into(),
            category,
            outcome,
            context: context.clone(),
            details: BTreeMap::new(),
            occurred_at,
        }
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<String>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    pub fn detail(&self, key: &str) -> Option<&str> {
        self.details.get(key).map(String::as_str)
    }

    /// `from -> to` for applied transitions, empty otherwise.
    pub fn transition_label(&self) -> String {
        match (self.detail("from"), self.detail("to")) {
            (Some(from), Some(to)) => format!("{from} -> {to}"),
            _ => String::new(),
        }
    }
}

pub trait AuditSink: Send + Sync {
    fn emit(&self, event: AuditEvent);
}

/// Keeps every event; for tests and the local chat session.
#[derive(Clone, Default)]
pub struct InMemoryAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl InMemoryAuditSink {
    pub fn events(&self) -> Vec<AuditEvent> {
        let events = self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        events.clone()
    }

    pub fn count(&self, outcome: AuditOutcome) -> usize {
        self.events().iter().filter(|event| event.outcome == outcome).count()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn emit(&self, event: AuditEvent) {
        let mut events = self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        events.push(event);
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        let conversation =
            event.context.conversation.as_ref().map(ToString::to_string).unwrap_or_default();
        match event.outcome {
            AuditOutcome::Applied => tracing::debug!(
                event_name = %event.event_type,
                correlation_id = %event.context.correlation_id,
                conversation = %conversation,
                transition = %event.transition_label(),
                "checkout transition"
            ),
            AuditOutcome::Rejected => tracing::debug!(
                event_name = %event.event_type,
                correlation_id = %event.context.correlation_id,
                conversation = %conversation,
                details = ?event.details,
                "checkout transition rejected"
            ),
        }
    }
}
