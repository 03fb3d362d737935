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

//! Role/permission-based access control for user-like entities
//!
//! This crate provides:
//! - Merging of role-derived permission sets under "most permissive role
//!   wins" semantics
//! - User-level overrides that replace role grants per clearance, including
//!   explicit revocation
//! - A default-deny `can(expression, operator)` decision query
//! - TTL caching of merged results with invalidate-before-mutate ordering
//! - Override mutation operations (assign, revoke, sync, revoke-all)
//! - Audit logging of checks and mutations
//!
//! Storage is abstracted behind the [`store`] traits; in-memory
//! implementations ship for tests and embedding.

pub mod audit;
pub mod cache;
pub mod decision;
pub mod error;
pub mod merge;
pub mod permission;
pub mod resolver;
pub mod store;

pub use audit::{AuditEvent, AuditEventKind, AuditLog};
pub use cache::{CacheStats, PermissionCache, merged_key, permissions_key};
pub use decision::Operator;
pub use error::{AclError, AclResult};
pub use permission::{ClearanceMap, PermissionId, PermissionRecord, PermissionRef, PermissionSet, clearance_map};
pub use resolver::{AssignOutcome, PermissionResolver, ResolverConfig, SyncOutcome};
pub use store::{MemoryOverrideLink, MemoryPermissionStore, MemoryRoleSource, OverrideLink, PermissionStore, RoleId, RoleSource};
