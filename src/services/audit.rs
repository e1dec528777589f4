//! Audit trail plumbing. Services record through [`AuditSink`]; a failed
//! append is logged and swallowed so the audit path can never fail the
//! operation being audited. Reading the trail is an admin capability.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::AuthError;
use crate::models::{AuditEvent, AuditQuery, CapabilitySet};
use crate::store::AuditEventStore;

#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Appends an event, swallowing storage errors.
    async fn record(&self, event: AuditEvent);
}

#[derive(Clone)]
pub struct StoreAuditSink {
    store: Arc<dyn AuditEventStore>,
}

impl StoreAuditSink {
    pub fn new(store: Arc<dyn AuditEventStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl AuditSink for StoreAuditSink {
    async fn record(&self, event: AuditEvent) {
        let event_type = event.event_type_code.clone();
        if let Err(error) = self.store.append_event(&event).await {
            tracing::warn!(%error, event_type, "failed to append audit event");
        }
    }
}

/// Admin-only query surface over the audit trail.
#[derive(Clone)]
pub struct AuditService {
    store: Arc<dyn AuditEventStore>,
}

impl AuditService {
    pub fn new(store: Arc<dyn AuditEventStore>) -> Self {
        Self { store }
    }

    /// Returns a page of events plus the total match count. Requires the
    /// `security.audit.read` capability.
    pub async fn query(
        &self,
        caps: &CapabilitySet,
        query: &AuditQuery,
    ) -> Result<(Vec<AuditEvent>, i64), AuthError> {
        caps.require("security.audit.read")?;
        self.store.query_events(query).await
    }
}
