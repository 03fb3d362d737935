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

//! Permission merge algorithm
//!
//! Two-phase merge producing the effective permission set:
//! 1. Union all role sets, more permissive role winning: once any role grants
//!    a clearance as true it stays true regardless of other roles' false
//!    values.
//! 2. Apply user overrides verbatim per clearance: an override replaces, it
//!    does not OR, which lets a user override explicitly revoke something a
//!    role granted.
//!
//! The role union is order-independent; override application is last-wins,
//! so the caller controls conflict resolution through the order it presents
//! override entries in.

use crate::permission::PermissionSet;

/// Union role permission sets, true swallowing false
pub fn union_roles(role_sets: &[PermissionSet]) -> PermissionSet {
    let mut result = PermissionSet::new();

    for role_set in role_sets {
        for (slug, clearances) in role_set.iter() {
            result.grant_union(slug, clearances);
        }
    }

    result
}

/// Apply user overrides onto a merged role set, replacing per clearance
pub fn apply_overrides(result: &mut PermissionSet, override_set: &PermissionSet) {
    for (slug, clearances) in override_set.iter() {
        result.override_with(slug, clearances);
    }
}

/// Merge role permission sets with user overrides into the effective set
///
/// Never fails: absent roles or an empty override set simply produce a
/// partial or empty result.
pub fn merge(role_sets: &[PermissionSet], override_set: &PermissionSet) -> PermissionSet {
    let mut result = union_roles(role_sets);
    apply_overrides(&mut result, override_set);
    result
}
