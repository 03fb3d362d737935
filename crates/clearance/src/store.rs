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

//! Storage collaborator contracts and in-memory implementations
//!
//! The resolver is storage-agnostic: role membership, the permission
//! catalogue and the per-user override links are reached through these
//! traits. The memory implementations back the test suite and small
//! embeddings; a relational store slots in behind the same contracts.

use crate::permission::{PermissionId, PermissionRecord, PermissionSet};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Role identifier
pub type RoleId = String;

/// Source of a user's roles and each role's own permission set
///
/// A role's set is expected to already be merged role-side over the
/// permission rows attached to it; this crate only consumes the result.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RoleSource: Send + Sync {
    /// Roles of a user, in assignment order
    async fn roles_of(&self, user_id: &str) -> Vec<RoleId>;

    /// Permission set of a single role; empty for unknown roles
    async fn role_permissions(&self, role_id: &str) -> PermissionSet;
}

/// Catalogue of stored permission records
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PermissionStore: Send + Sync {
    /// Find a permission by numeric id
    async fn find_by_id(&self, id: PermissionId) -> Option<PermissionRecord>;

    /// Find a permission by slug name
    async fn find_by_name(&self, name: &str) -> Option<PermissionRecord>;
}

/// Link table of permissions directly attached to users
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OverrideLink: Send + Sync {
    /// Permission ids attached to a user, in attachment order
    async fn attached(&self, user_id: &str) -> Vec<PermissionId>;

    /// Attach a permission to a user; attaching twice is a no-op
    async fn attach(&self, user_id: &str, permission_id: PermissionId);

    /// Detach a permission, returning whether a row was removed
    async fn detach(&self, user_id: &str, permission_id: PermissionId) -> bool;

    /// Detach every permission of a user, returning the removed count
    async fn detach_all(&self, user_id: &str) -> usize;

    /// Replace the user's attachments with exactly this set
    async fn replace_all(&self, user_id: &str, permission_ids: &[PermissionId]);
}

/// In-memory permission catalogue
#[derive(Debug, Default)]
pub struct MemoryPermissionStore {
    records: RwLock<HashMap<PermissionId, PermissionRecord>>,
}

impl MemoryPermissionStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a record
    pub fn insert(&self, record: PermissionRecord) {
        self.records.write().insert(record.id, record);
    }
}

#[async_trait]
impl PermissionStore for MemoryPermissionStore {
    async fn find_by_id(&self, id: PermissionId) -> Option<PermissionRecord> {
        self.records.read().get(&id).cloned()
    }

    async fn find_by_name(&self, name: &str) -> Option<PermissionRecord> {
        self.records.read().values().find(|record| record.name == name).cloned()
    }
}

/// In-memory role definitions and user-role assignments
#[derive(Debug, Default)]
pub struct MemoryRoleSource {
    roles: RwLock<HashMap<RoleId, PermissionSet>>,
    assignments: RwLock<HashMap<String, Vec<RoleId>>>,
}

impl MemoryRoleSource {
    /// Create an empty role source
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a role with its permission set
    pub fn define_role(&self, role_id: impl Into<RoleId>, permissions: PermissionSet) {
        self.roles.write().insert(role_id.into(), permissions);
    }

    /// Assign a role to a user; assigning twice is a no-op
    pub fn assign_role(&self, user_id: &str, role_id: impl Into<RoleId>) {
        let role_id = role_id.into();
        let mut assignments = self.assignments.write();
        let user_roles = assignments.entry(user_id.to_string()).or_default();

        if !user_roles.contains(&role_id) {
            user_roles.push(role_id);
        }
    }

    /// Remove a role from a user
    pub fn unassign_role(&self, user_id: &str, role_id: &str) {
        if let Some(user_roles) = self.assignments.write().get_mut(user_id) {
            user_roles.retain(|assigned| assigned != role_id);
        }
    }
}

#[async_trait]
impl RoleSource for MemoryRoleSource {
    async fn roles_of(&self, user_id: &str) -> Vec<RoleId> {
        self.assignments.read().get(user_id).cloned().unwrap_or_default()
    }

    async fn role_permissions(&self, role_id: &str) -> PermissionSet {
        self.roles.read().get(role_id).cloned().unwrap_or_default()
    }
}

/// A single override row linking a user to a permission
#[derive(Debug, Clone, PartialEq, Eq)]
struct Attachment {
    permission_id: PermissionId,
    attached_at: DateTime<Utc>,
}

/// In-memory override link table
#[derive(Debug, Default)]
pub struct MemoryOverrideLink {
    attachments: RwLock<HashMap<String, Vec<Attachment>>>,
}

impl MemoryOverrideLink {
    /// Create an empty link table
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OverrideLink for MemoryOverrideLink {
    async fn attached(&self, user_id: &str) -> Vec<PermissionId> {
        self.attachments
            .read()
            .get(user_id)
            .map(|rows| rows.iter().map(|row| row.permission_id).collect())
            .unwrap_or_default()
    }

    async fn attach(&self, user_id: &str, permission_id: PermissionId) {
        let mut attachments = self.attachments.write();
        let rows = attachments.entry(user_id.to_string()).or_default();

        if !rows.iter().any(|row| row.permission_id == permission_id) {
            rows.push(Attachment {
                permission_id,
                attached_at: Utc::now(),
            });
        }
    }

    async fn detach(&self, user_id: &str, permission_id: PermissionId) -> bool {
        let mut attachments = self.attachments.write();

        match attachments.get_mut(user_id) {
            Some(rows) => {
                let before = rows.len();
                rows.retain(|row| row.permission_id != permission_id);
                rows.len() < before
            }
            None => false,
        }
    }

    async fn detach_all(&self, user_id: &str) -> usize {
        self.attachments.write().remove(user_id).map(|rows| rows.len()).unwrap_or(0)
    }

    async fn replace_all(&self, user_id: &str, permission_ids: &[PermissionId]) {
        let mut attachments = self.attachments.write();
        let rows = attachments.entry(user_id.to_string()).or_default();

        // Keep timestamps of rows that survive, drop the rest, append new ones
        rows.retain(|row| permission_ids.contains(&row.permission_id));

        for &permission_id in permission_ids {
            if !rows.iter().any(|row| row.permission_id == permission_id) {
                rows.push(Attachment {
                    permission_id,
                    attached_at: Utc::now(),
                });
            }
        }
    }
}
