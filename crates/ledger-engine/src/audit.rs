//! The audit sink capability.
//!
//! After each committed ledger operation the engine emits one audit entry
//! describing who did what. The sink is injected at construction time and is
//! strictly best-effort: a sink failure is logged and swallowed, never
//! surfaced to the ledger caller.

/// A destination for audit entries.
pub trait AuditSink: Send + Sync {
    /// Record that `action` happened to the entity `entity_id` of
    /// `entity_type`, with a human-readable `details` string.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry could not be recorded. Callers treat
    /// this as non-fatal.
    fn log_action(
        &self,
        entity_type: &str,
        entity_id: &str,
        action: &str,
        details: &str,
    ) -> Result<(), AuditError>;
}

/// An audit sink failure.
#[derive(Debug, thiserror::Error)]
#[error("audit sink error: {0}")]
pub struct AuditError(pub String);

/// An audit sink that writes entries to the tracing subscriber.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn log_action(
        &self,
        entity_type: &str,
        entity_id: &str,
        action: &str,
        details: &str,
    ) -> Result<(), AuditError> {
        tracing::info!(entity_type, entity_id, action, details, "audit");
        Ok(())
    }
}

/// An audit sink that drops every entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn log_action(&self, _: &str, _: &str, _: &str, _: &str) -> Result<(), AuditError> {
        Ok(())
    }
}
