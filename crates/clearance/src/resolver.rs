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

//! Permission resolver coordinating roles, overrides, cache and decisions
//!
//! Composition root of the crate: one [`PermissionResolver`] holds the three
//! storage collaborators plus the cache and audit log, and exposes the
//! effective-set computation, the `can` decision query and the override
//! mutation operations. Every mutation invalidates the user's cache entries
//! before touching storage, so the next read recomputes from authoritative
//! state.

use crate::audit::{AuditEvent, AuditEventKind, AuditLog};
use crate::cache::{PermissionCache, merged_key, permissions_key};
use crate::decision::{self, Operator};
use crate::error::{AclError, AclResult};
use crate::merge;
use crate::permission::{PermissionId, PermissionRef, PermissionSet};
use crate::store::{OverrideLink, PermissionStore, RoleSource};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Resolver configuration
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// TTL of cached effective permission sets
    pub cache_ttl: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(300),
        }
    }
}

/// Per-element outcome of an assign operation
///
/// A reference that was already attached is reported rather than treated as
/// an error, matching attach idempotence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOutcome {
    /// A new attachment was created
    Attached(PermissionId),
    /// The permission was already attached, nothing was done
    AlreadyAttached(PermissionId),
}

impl AssignOutcome {
    /// The permission id the element resolved to
    pub fn permission_id(&self) -> PermissionId {
        match self {
            AssignOutcome::Attached(id) | AssignOutcome::AlreadyAttached(id) => *id,
        }
    }

    /// Whether this element created a new attachment
    pub fn newly_attached(&self) -> bool {
        matches!(self, AssignOutcome::Attached(_))
    }
}

/// Result of a sync operation: the set-diff that was applied
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Permission ids newly attached
    pub attached: Vec<PermissionId>,
    /// Permission ids detached
    pub detached: Vec<PermissionId>,
}

/// Permission resolver over injected storage collaborators
#[derive(Clone)]
pub struct PermissionResolver {
    roles: Arc<dyn RoleSource>,
    store: Arc<dyn PermissionStore>,
    overrides: Arc<dyn OverrideLink>,
    cache: Arc<PermissionCache>,
    audit: Arc<AuditLog>,
    config: ResolverConfig,
}

impl PermissionResolver {
    /// Create a resolver with default configuration
    pub fn new(roles: Arc<dyn RoleSource>, store: Arc<dyn PermissionStore>, overrides: Arc<dyn OverrideLink>) -> Self {
        Self {
            roles,
            store,
            overrides,
            cache: Arc::new(PermissionCache::new()),
            audit: Arc::new(AuditLog::new()),
            config: ResolverConfig::default(),
        }
    }

    /// Replace the configuration
    pub fn with_config(mut self, config: ResolverConfig) -> Self {
        self.config = config;
        self
    }

    /// Get the permission cache
    pub fn cache(&self) -> &Arc<PermissionCache> {
        &self.cache
    }

    /// Get the audit log
    pub fn audit(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    /// Compute the effective permission set of a user, with caching
    ///
    /// Union of all role sets, then user overrides applied on top. Cached
    /// under the user's permissions key until TTL expiry or invalidation.
    pub async fn effective_permissions(&self, user_id: &str) -> AclResult<PermissionSet> {
        let key = permissions_key(user_id);

        if let Some(cached) = self.cache.get(&key).await {
            debug!(user_id = %user_id, "Effective permissions retrieved from cache");
            return Ok(cached);
        }

        let role_ids = self.roles.roles_of(user_id).await;
        let mut role_sets = Vec::with_capacity(role_ids.len());
        for role_id in &role_ids {
            role_sets.push(self.roles.role_permissions(role_id).await);
        }

        let override_set = self.override_set(user_id).await?;
        let effective = merge::merge(&role_sets, &override_set);

        self.cache.insert(key, effective.clone(), self.config.cache_ttl).await;

        debug!(
            user_id = %user_id,
            role_count = %role_ids.len(),
            slug_count = %effective.len(),
            "Effective permissions computed and cached"
        );

        Ok(effective)
    }

    /// Check whether a user is granted an expression
    ///
    /// Default-deny: unknown slugs and clearances resolve to `false`, never
    /// an error. The merged set is cached separately from the recomputation
    /// path so repeated checks stay cheap.
    pub async fn can(&self, user_id: &str, expression: &str, operator: Option<Operator>) -> AclResult<bool> {
        let key = merged_key(user_id);

        let effective = match self.cache.get(&key).await {
            Some(cached) => cached,
            None => {
                let effective = self.effective_permissions(user_id).await?;
                self.cache.insert(key, effective.clone(), self.config.cache_ttl).await;
                effective
            }
        };

        let allowed = decision::check(&effective, expression, operator);

        self.audit.record(AuditEvent::new(AuditEventKind::PermissionCheck, user_id).with_decision(expression, allowed)).await;

        debug!(
            user_id = %user_id,
            expression = %expression,
            allowed = %allowed,
            "Permission check completed"
        );

        Ok(allowed)
    }

    /// Assign permissions directly to a user
    ///
    /// Each reference is resolved against the store; an unresolvable
    /// reference aborts the whole call with [`AclError::NotFound`].
    /// Already-attached permissions are skipped and reported per element.
    pub async fn assign_permissions(&self, user_id: &str, refs: &[PermissionRef]) -> AclResult<Vec<AssignOutcome>> {
        // Invalidate-then-mutate: stale entries must not outlive the change
        self.cache.invalidate_user(user_id).await;

        let mut current: HashSet<PermissionId> = self.overrides.attached(user_id).await.into_iter().collect();
        let mut outcomes = Vec::with_capacity(refs.len());

        for permission_ref in refs {
            let permission_id = self.resolve_ref(permission_ref).await?;

            if current.contains(&permission_id) {
                outcomes.push(AssignOutcome::AlreadyAttached(permission_id));
                continue;
            }

            self.overrides.attach(user_id, permission_id).await;
            current.insert(permission_id);
            outcomes.push(AssignOutcome::Attached(permission_id));
        }

        let attached: Vec<PermissionId> = outcomes.iter().filter(|outcome| outcome.newly_attached()).map(|outcome| outcome.permission_id()).collect();

        self.audit.record(AuditEvent::new(AuditEventKind::OverridesAssigned, user_id).with_permission_ids(attached.clone())).await;

        info!(
            user_id = %user_id,
            attached_count = %attached.len(),
            "Permission overrides assigned"
        );

        Ok(outcomes)
    }

    /// Revoke directly-assigned permissions from a user
    ///
    /// Detaching a permission that is not attached is a no-op, not an error;
    /// unresolvable references still fail the call.
    pub async fn revoke_permissions(&self, user_id: &str, refs: &[PermissionRef]) -> AclResult<bool> {
        self.cache.invalidate_user(user_id).await;

        let mut detached = Vec::new();
        for permission_ref in refs {
            let permission_id = self.resolve_ref(permission_ref).await?;

            if self.overrides.detach(user_id, permission_id).await {
                detached.push(permission_id);
            }
        }

        self.audit.record(AuditEvent::new(AuditEventKind::OverridesRevoked, user_id).with_permission_ids(detached.clone())).await;

        info!(
            user_id = %user_id,
            detached_count = %detached.len(),
            "Permission overrides revoked"
        );

        Ok(true)
    }

    /// Replace the user's override set with exactly the given permissions
    ///
    /// All references are resolved up front; any failure aborts the call
    /// before anything is touched. The replacement is applied as a set-diff
    /// against current attachments.
    pub async fn sync_permissions(&self, user_id: &str, refs: &[PermissionRef]) -> AclResult<SyncOutcome> {
        let mut desired = Vec::with_capacity(refs.len());
        let mut seen = HashSet::new();

        for permission_ref in refs {
            let permission_id = self.resolve_ref(permission_ref).await?;
            if seen.insert(permission_id) {
                desired.push(permission_id);
            }
        }

        self.cache.invalidate_user(user_id).await;

        let current: HashSet<PermissionId> = self.overrides.attached(user_id).await.into_iter().collect();
        let desired_set: HashSet<PermissionId> = desired.iter().copied().collect();

        let outcome = SyncOutcome {
            attached: desired.iter().copied().filter(|id| !current.contains(id)).collect(),
            detached: current.iter().copied().filter(|id| !desired_set.contains(id)).collect(),
        };

        self.overrides.replace_all(user_id, &desired).await;

        self.audit.record(AuditEvent::new(AuditEventKind::OverridesSynced, user_id).with_permission_ids(desired)).await;

        info!(
            user_id = %user_id,
            attached_count = %outcome.attached.len(),
            detached_count = %outcome.detached.len(),
            "Permission overrides synced"
        );

        Ok(outcome)
    }

    /// Remove every override of a user, returning the removed count
    pub async fn revoke_all_permissions(&self, user_id: &str) -> AclResult<usize> {
        self.cache.invalidate_user(user_id).await;

        let removed = self.overrides.detach_all(user_id).await;

        self.audit.record(AuditEvent::new(AuditEventKind::OverridesCleared, user_id)).await;

        info!(
            user_id = %user_id,
            removed_count = %removed,
            "All permission overrides removed"
        );

        Ok(removed)
    }

    /// Build the user's override permission set from attached rows
    ///
    /// Rows are applied in ascending id order, so when two override rows
    /// touch the same slug the highest id wins per clearance. Attachments
    /// whose record has since been deleted are skipped.
    async fn override_set(&self, user_id: &str) -> AclResult<PermissionSet> {
        let mut attached = self.overrides.attached(user_id).await;
        attached.sort_unstable();

        let mut override_set = PermissionSet::new();
        for permission_id in attached {
            match self.store.find_by_id(permission_id).await {
                Some(record) => override_set.override_with(&record.name, &record.clearances),
                None => {
                    warn!(
                        user_id = %user_id,
                        permission_id = %permission_id,
                        "Attached permission no longer exists, skipping"
                    );
                }
            }
        }

        Ok(override_set)
    }

    /// Resolve a permission reference to its stored id
    ///
    /// A name that parses as a pure integer is looked up by id, matching
    /// the string handling of the dynamic surface this replaces. A lookup
    /// miss is a hard error: it signals caller misconfiguration, not a
    /// denied permission.
    async fn resolve_ref(&self, permission_ref: &PermissionRef) -> AclResult<PermissionId> {
        match permission_ref {
            PermissionRef::ById(id) => match self.store.find_by_id(*id).await {
                Some(record) => Ok(record.id),
                None => Err(AclError::NotFound {
                    message: format!("permission id '{id}' does not exist"),
                }),
            },
            PermissionRef::ByName(name) => {
                if name.is_empty() {
                    return Err(AclError::InvalidArgument {
                        message: "empty permission reference".to_string(),
                    });
                }

                if let Ok(id) = name.parse::<PermissionId>() {
                    return match self.store.find_by_id(id).await {
                        Some(record) => Ok(record.id),
                        None => Err(AclError::NotFound {
                            message: format!("permission id '{id}' does not exist"),
                        }),
                    };
                }

                match self.store.find_by_name(name).await {
                    Some(record) => Ok(record.id),
                    None => Err(AclError::NotFound {
                        message: format!("permission name '{name}' does not exist"),
                    }),
                }
            }
            PermissionRef::Record(record) => Ok(record.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permission::{PermissionRecord, clearance_map};
    use crate::store::{MemoryOverrideLink, MemoryPermissionStore, MemoryRoleSource, MockOverrideLink, MockPermissionStore, MockRoleSource};

    struct Fixture {
        resolver: PermissionResolver,
        store: Arc<MemoryPermissionStore>,
        roles: Arc<MemoryRoleSource>,
        overrides: Arc<MemoryOverrideLink>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryPermissionStore::new());
        store.insert(PermissionRecord::new(10, "posts.edit", clearance_map([("delete", false)])));
        store.insert(PermissionRecord::new(11, "users.manage", clearance_map([("read", true)])));

        let roles = Arc::new(MemoryRoleSource::new());
        let mut editor = PermissionSet::new();
        editor.insert("posts.edit", clearance_map([("create", true), ("delete", false)]));
        roles.define_role("editor", editor);

        let mut moderator = PermissionSet::new();
        moderator.insert("posts.edit", clearance_map([("delete", true)]));
        roles.define_role("moderator", moderator);

        roles.assign_role("alice", "editor");
        roles.assign_role("alice", "moderator");

        let overrides = Arc::new(MemoryOverrideLink::new());

        let resolver = PermissionResolver::new(roles.clone(), store.clone(), overrides.clone());

        Fixture {
            resolver,
            store,
            roles,
            overrides,
        }
    }

    #[tokio::test]
    async fn test_roles_merge_most_permissive() {
        let fx = fixture();

        let effective = fx.resolver.effective_permissions("alice").await.unwrap();

        assert!(effective.allows("posts.edit", "create"));
        assert!(effective.allows("posts.edit", "delete"));
    }

    #[tokio::test]
    async fn test_override_revokes_role_grant() {
        let fx = fixture();

        fx.resolver.assign_permissions("alice", &[PermissionRef::ByName("posts.edit".to_string())]).await.unwrap();

        let effective = fx.resolver.effective_permissions("alice").await.unwrap();
        assert!(effective.allows("posts.edit", "create"));
        assert!(!effective.allows("posts.edit", "delete"));
    }

    #[tokio::test]
    async fn test_assign_unknown_name_is_not_found() {
        let fx = fixture();

        let err = fx.resolver.assign_permissions("alice", &[PermissionRef::ByName("ghost.slug".to_string())]).await.unwrap_err();

        assert!(matches!(err, AclError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_assign_is_idempotent() {
        let fx = fixture();
        let refs = [PermissionRef::ById(10)];

        let first = fx.resolver.assign_permissions("alice", &refs).await.unwrap();
        assert_eq!(first, vec![AssignOutcome::Attached(10)]);

        let second = fx.resolver.assign_permissions("alice", &refs).await.unwrap();
        assert_eq!(second, vec![AssignOutcome::AlreadyAttached(10)]);

        assert_eq!(fx.overrides.attached("alice").await, vec![10]);
    }

    #[tokio::test]
    async fn test_numeric_name_is_id_lookup() {
        let fx = fixture();

        let outcomes = fx.resolver.assign_permissions("alice", &[PermissionRef::ByName("11".to_string())]).await.unwrap();

        assert_eq!(outcomes, vec![AssignOutcome::Attached(11)]);
    }

    #[tokio::test]
    async fn test_record_ref_is_used_by_id_without_lookup() {
        let fx = fixture();
        let record = PermissionRecord::new(99, "local.only", clearance_map([("read", true)]));

        let outcomes = fx.resolver.assign_permissions("alice", &[PermissionRef::Record(record)]).await.unwrap();

        assert_eq!(outcomes, vec![AssignOutcome::Attached(99)]);
    }

    #[tokio::test]
    async fn test_dangling_attachment_is_skipped() {
        let fx = fixture();
        let record = PermissionRecord::new(99, "local.only", clearance_map([("read", true)]));
        fx.resolver.assign_permissions("alice", &[PermissionRef::Record(record)]).await.unwrap();

        // Record 99 was never stored, so the attachment dangles
        let effective = fx.resolver.effective_permissions("alice").await.unwrap();
        assert!(!effective.contains("local.only"));
    }

    #[tokio::test]
    async fn test_revoke_non_attached_is_noop() {
        let fx = fixture();

        let result = fx.resolver.revoke_permissions("alice", &[PermissionRef::ById(10)]).await.unwrap();

        assert!(result);
        assert!(fx.overrides.attached("alice").await.is_empty());
    }

    #[tokio::test]
    async fn test_sync_applies_set_diff() {
        let fx = fixture();
        fx.resolver.assign_permissions("alice", &[PermissionRef::ById(10)]).await.unwrap();

        let outcome = fx.resolver.sync_permissions("alice", &[PermissionRef::ById(10), PermissionRef::ById(11)]).await.unwrap();

        assert_eq!(outcome.attached, vec![11]);
        assert!(outcome.detached.is_empty());
        assert_eq!(fx.overrides.attached("alice").await, vec![10, 11]);
    }

    #[tokio::test]
    async fn test_sync_empty_clears_all() {
        let fx = fixture();
        fx.resolver.assign_permissions("alice", &[PermissionRef::ById(10), PermissionRef::ById(11)]).await.unwrap();

        let outcome = fx.resolver.sync_permissions("alice", &[]).await.unwrap();

        assert!(outcome.attached.is_empty());

        let mut detached = outcome.detached.clone();
        detached.sort_unstable();
        assert_eq!(detached, vec![10, 11]);

        assert!(fx.overrides.attached("alice").await.is_empty());
    }

    #[tokio::test]
    async fn test_sync_unresolvable_aborts_before_mutating() {
        let fx = fixture();
        fx.resolver.assign_permissions("alice", &[PermissionRef::ById(10)]).await.unwrap();

        let err = fx
            .resolver
            .sync_permissions("alice", &[PermissionRef::ById(11), PermissionRef::ByName("ghost.slug".to_string())])
            .await
            .unwrap_err();

        assert!(matches!(err, AclError::NotFound { .. }));
        assert_eq!(fx.overrides.attached("alice").await, vec![10]);
    }

    #[tokio::test]
    async fn test_revoke_all_returns_count() {
        let fx = fixture();
        fx.resolver.assign_permissions("alice", &[PermissionRef::ById(10), PermissionRef::ById(11)]).await.unwrap();

        assert_eq!(fx.resolver.revoke_all_permissions("alice").await.unwrap(), 2);
        assert_eq!(fx.resolver.revoke_all_permissions("alice").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_override_conflict_highest_id_wins() {
        let fx = fixture();
        fx.store.insert(PermissionRecord::new(20, "posts.edit", clearance_map([("delete", true)])));

        // Attachment order says 20 first, id order says 20 last
        fx.resolver.assign_permissions("bob", &[PermissionRef::ById(20), PermissionRef::ById(10)]).await.unwrap();
        fx.roles.assign_role("bob", "editor");

        let effective = fx.resolver.effective_permissions("bob").await.unwrap();
        assert!(effective.allows("posts.edit", "delete"));
    }

    #[tokio::test]
    async fn test_can_reflects_mutation_despite_cache() {
        let fx = fixture();

        assert!(fx.resolver.can("alice", "posts.edit.delete", None).await.unwrap());

        fx.resolver.assign_permissions("alice", &[PermissionRef::ById(10)]).await.unwrap();

        assert!(!fx.resolver.can("alice", "posts.edit.delete", None).await.unwrap());
    }

    #[tokio::test]
    async fn test_can_is_default_deny() {
        let fx = fixture();

        assert!(!fx.resolver.can("alice", "comments.moderate.read", None).await.unwrap());
        assert!(!fx.resolver.can("nobody", "posts.edit.create", None).await.unwrap());
    }

    #[tokio::test]
    async fn test_checks_are_audited() {
        let fx = fixture();

        fx.resolver.can("alice", "posts.edit.create", None).await.unwrap();
        fx.resolver.revoke_all_permissions("alice").await.unwrap();

        let events = fx.resolver.audit().for_user("alice").await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, AuditEventKind::PermissionCheck);
        assert_eq!(events[0].allowed, Some(true));
        assert_eq!(events[1].kind, AuditEventKind::OverridesCleared);
    }

    #[tokio::test]
    async fn test_cache_hit_skips_storage() {
        let mut roles = MockRoleSource::new();
        roles.expect_roles_of().times(1).returning(|_| vec!["editor".to_string()]);
        roles.expect_role_permissions().times(1).returning(|_| {
            let mut set = PermissionSet::new();
            set.insert("posts.edit", clearance_map([("create", true)]));
            set
        });

        let mut overrides = MockOverrideLink::new();
        overrides.expect_attached().times(1).returning(|_| Vec::new());

        let store = MockPermissionStore::new();

        let resolver = PermissionResolver::new(Arc::new(roles), Arc::new(store), Arc::new(overrides));

        let first = resolver.effective_permissions("alice").await.unwrap();
        let second = resolver.effective_permissions("alice").await.unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_not_found_propagates_from_store() {
        let roles = MockRoleSource::new();

        let mut overrides = MockOverrideLink::new();
        overrides.expect_attached().returning(|_| Vec::new());

        let mut store = MockPermissionStore::new();
        store.expect_find_by_id().returning(|_| None);

        let resolver = PermissionResolver::new(Arc::new(roles), Arc::new(store), Arc::new(overrides));

        let err = resolver.assign_permissions("alice", &[PermissionRef::ById(7)]).await.unwrap_err();
        assert!(matches!(err, AclError::NotFound { .. }));
    }
}
