// Clearance
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Audit logging for permission checks and override mutations

use crate::permission::PermissionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Audit event types
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AuditEventKind {
    /// Permission check performed
    PermissionCheck,
    /// Permissions attached to a user
    OverridesAssigned,
    /// Permissions detached from a user
    OverridesRevoked,
    /// Override set replaced wholesale
    OverridesSynced,
    /// All overrides of a user removed
    OverridesCleared,
}

/// Audit event entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique event ID
    pub id: String,

    /// Event type
    pub kind: AuditEventKind,

    /// Event timestamp
    pub timestamp: DateTime<Utc>,

    /// User the event concerns
    pub user_id: String,

    /// Permission ids touched by a mutation
    pub permission_ids: Vec<PermissionId>,

    /// Expression evaluated by a permission check
    pub expression: Option<String>,

    /// Outcome of a permission check
    pub allowed: Option<bool>,
}

impl AuditEvent {
    /// Create a new audit event
    pub fn new(kind: AuditEventKind, user_id: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            timestamp: Utc::now(),
            user_id: user_id.into(),
            permission_ids: Vec::new(),
            expression: None,
            allowed: None,
        }
    }

    /// Attach the permission ids a mutation touched
    pub fn with_permission_ids(mut self, permission_ids: Vec<PermissionId>) -> Self {
        self.permission_ids = permission_ids;
        self
    }

    /// Attach a check expression and its outcome
    pub fn with_decision(mut self, expression: impl Into<String>, allowed: bool) -> Self {
        self.expression = Some(expression.into());
        self.allowed = Some(allowed);
        self
    }
}

/// In-memory audit log with bounded capacity
///
/// Oldest events are dropped once the capacity is reached. Recording never
/// fails the calling operation.
#[derive(Debug)]
pub struct AuditLog {
    events: RwLock<Vec<AuditEvent>>,
    capacity: usize,
}

impl AuditLog {
    /// Create an audit log with the default capacity
    pub fn new() -> Self {
        Self::with_capacity(10_000)
    }

    /// Create an audit log holding at most `capacity` events
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: RwLock::new(Vec::new()),
            capacity,
        }
    }

    /// Record an event
    pub async fn record(&self, event: AuditEvent) {
        debug!(
            user_id = %event.user_id,
            kind = ?event.kind,
            "Audit event recorded"
        );

        let mut events = self.events.write().await;
        if events.len() >= self.capacity {
            events.remove(0);
        }
        events.push(event);
    }

    /// Most recent events, newest last
    pub async fn recent(&self, limit: usize) -> Vec<AuditEvent> {
        let events = self.events.read().await;
        let start = events.len().saturating_sub(limit);
        events[start..].to_vec()
    }

    /// Events concerning a single user, oldest first
    pub async fn for_user(&self, user_id: &str) -> Vec<AuditEvent> {
        let events = self.events.read().await;
        events.iter().filter(|event| event.user_id == user_id).cloned().collect()
    }

    /// Event counts grouped by kind
    pub async fn counts_by_kind(&self) -> HashMap<AuditEventKind, usize> {
        let events = self.events.read().await;
        let mut counts = HashMap::new();

        for event in events.iter() {
            *counts.entry(event.kind.clone()).or_insert(0) += 1;
        }

        counts
    }

    /// Total recorded events
    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    /// Check whether the log is empty
    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }
}

impl Default for AuditLog {
    fn default() -> Self {
        Self::new()
    }
}
