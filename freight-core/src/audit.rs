//! Audit sink
//!
//! Audit writing belongs to an external collaborator. The core only emits
//! [`AuditEntry`] values through [`AuditSink::log_action`], which must never
//! block or fail the calling workflow.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::context::OrgContext;

/// Audited entity kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    /// Load
    Load,
    /// Invoice
    Invoice,
    /// Dispatch leg
    DispatchLeg,
    /// Payable line
    LoadPayable,
    /// Contract lane
    ContractLane,
    /// Profile assignment
    ProfileAssignment,
}

/// Audited action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    /// Created
    Create,
    /// Fields changed
    Update,
    /// Deleted
    Delete,
    /// Status moved along its lifecycle
    StatusChange,
    /// Load promoted out of UNMAPPED
    Promote,
    /// Pay lines regenerated
    Recalculate,
}

/// One audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Organization
    pub org_id: Uuid,
    /// Entity kind
    pub entity_type: EntityType,
    /// Entity ID
    pub entity_id: Uuid,
    /// Action
    pub action: AuditAction,
    /// Acting user (nil for background jobs)
    pub performed_by: Uuid,
    /// Human-readable description
    pub description: String,
    /// Names of changed fields
    pub changed_fields: Vec<String>,
    /// Timestamp
    pub at: DateTime<Utc>,
}

impl AuditEntry {
    /// Build an entry stamped with the caller's org and user
    pub fn new(
        ctx: &OrgContext,
        entity_type: EntityType,
        entity_id: Uuid,
        action: AuditAction,
        description: impl Into<String>,
    ) -> Self {
        Self {
            org_id: ctx.org_id,
            entity_type,
            entity_id,
            action,
            performed_by: ctx.user_id,
            description: description.into(),
            changed_fields: Vec::new(),
            at: Utc::now(),
        }
    }

    /// Attach changed field names
    pub fn with_changed_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.changed_fields = fields.into_iter().map(Into::into).collect();
        self
    }
}

/// Fire-and-forget audit writer
pub trait AuditSink: Send + Sync {
    /// Record an action; must not block
    fn log_action(&self, entry: AuditEntry);
}

/// Writes entries to the `audit` tracing target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn log_action(&self, entry: AuditEntry) {
        tracing::info!(
            target: "audit",
            org_id = %entry.org_id,
            entity_type = ?entry.entity_type,
            entity_id = %entry.entity_id,
            action = ?entry.action,
            performed_by = %entry.performed_by,
            changed_fields = ?entry.changed_fields,
            "{}",
            entry.description
        );
    }
}

/// Hands entries to a background task through an unbounded mailbox
#[derive(Debug, Clone)]
pub struct ChannelAuditSink {
    sender: mpsc::UnboundedSender<AuditEntry>,
}

impl ChannelAuditSink {
    /// Spawn the drain task forwarding every entry to `downstream`.
    ///
    /// The task ends once every sender clone is dropped.
    pub fn spawn(downstream: Arc<dyn AuditSink>) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::unbounded_channel::<AuditEntry>();
        let handle = tokio::spawn(async move {
            while let Some(entry) = receiver.recv().await {
                downstream.log_action(entry);
            }
            tracing::debug!("Audit mailbox closed");
        });
        (Self { sender }, handle)
    }
}

impl AuditSink for ChannelAuditSink {
    fn log_action(&self, entry: AuditEntry) {
        if self.sender.send(entry).is_err() {
            tracing::warn!("Audit mailbox closed, entry dropped");
        }
    }
}

/// Keeps entries in memory
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditSink {
    /// Create empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of recorded entries
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().clone()
    }

    /// Entries with the given action
    pub fn with_action(&self, action: AuditAction) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .iter()
            .filter(|e| e.action == action)
            .cloned()
            .collect()
    }
}

impl AuditSink for MemoryAuditSink {
    fn log_action(&self, entry: AuditEntry) {
        self.entries.lock().push(entry);
    }
}
