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

//! Permission model: stored records, clearance maps and permission sets

use crate::error::{AclError, AclResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Numeric identifier of a stored permission
pub type PermissionId = u64;

/// Mapping from clearance name (e.g. "create", "read", "update", "delete")
/// to whether it is granted
pub type ClearanceMap = HashMap<String, bool>;

/// A stored permission row
///
/// Each record names a slug (e.g. "posts.edit") and carries the clearance
/// flags it grants or denies. Records live in a [`PermissionStore`] and are
/// referenced from roles and from per-user overrides.
///
/// [`PermissionStore`]: crate::store::PermissionStore
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PermissionRecord {
    /// Unique permission identifier
    pub id: PermissionId,

    /// Permission slug, unique within the store
    pub name: String,

    /// Human-readable description
    pub description: String,

    /// Clearance flags this permission carries
    pub clearances: ClearanceMap,

    /// Record creation timestamp
    pub created_at: DateTime<Utc>,

    /// Record last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl PermissionRecord {
    /// Create a new permission record
    pub fn new(id: PermissionId, name: impl Into<String>, clearances: ClearanceMap) -> Self {
        let now = Utc::now();

        Self {
            id,
            name: name.into(),
            description: String::new(),
            clearances,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set a single clearance flag
    pub fn set_clearance(&mut self, clearance: impl Into<String>, value: bool) {
        self.clearances.insert(clearance.into(), value);
        self.updated_at = Utc::now();
    }
}

/// Reference to a permission, as accepted by the override mutation operations
///
/// The original dynamic-typed surface accepted strings, numbers and records
/// interchangeably; this makes the accepted shapes explicit. A string that
/// parses as a pure integer is an id lookup, any other non-empty string is a
/// name lookup, and an already-materialized record is used by its id directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionRef {
    /// Look the permission up by numeric id
    ById(PermissionId),

    /// Look the permission up by slug name
    ByName(String),

    /// Use an already-fetched record directly
    Record(PermissionRecord),
}

impl PermissionRef {
    /// Parse a raw string reference
    ///
    /// Fails with [`AclError::InvalidArgument`] for the empty string, the one
    /// shape that cannot name anything.
    pub fn parse(raw: &str) -> AclResult<Self> {
        if raw.is_empty() {
            return Err(AclError::InvalidArgument {
                message: "empty permission reference".to_string(),
            });
        }

        match raw.parse::<PermissionId>() {
            Ok(id) => Ok(PermissionRef::ById(id)),
            Err(_) => Ok(PermissionRef::ByName(raw.to_string())),
        }
    }
}

impl From<PermissionId> for PermissionRef {
    fn from(id: PermissionId) -> Self {
        PermissionRef::ById(id)
    }
}

impl From<PermissionRecord> for PermissionRef {
    fn from(record: PermissionRecord) -> Self {
        PermissionRef::Record(record)
    }
}

/// Set of permissions: slug mapped to its clearance flags
///
/// Pure value type. Absence of a slug means "no permission, all clearances
/// false"; a present slug has at least one clearance entry. Role permission
/// sets, user override sets and the merged effective set all use this shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct PermissionSet {
    entries: HashMap<String, ClearanceMap>,
}

impl PermissionSet {
    /// Create an empty permission set
    pub fn new() -> Self {
        Self { entries: HashMap::new() }
    }

    /// Insert a slug with its full clearance map, replacing any existing map
    pub fn insert(&mut self, slug: impl Into<String>, clearances: ClearanceMap) {
        self.entries.insert(slug.into(), clearances);
    }

    /// Union a clearance map into a slug, true winning over false
    ///
    /// If the slug is absent the incoming map is inserted whole. Otherwise
    /// each incoming `true` is kept and each incoming `false` only lands on
    /// clearances not yet present, so a grant from one source survives a
    /// deny from another.
    pub fn grant_union(&mut self, slug: &str, incoming: &ClearanceMap) {
        match self.entries.get_mut(slug) {
            Some(existing) => {
                for (clearance, value) in incoming {
                    let current = existing.entry(clearance.clone()).or_insert(false);
                    *current = *current || *value;
                }
            }
            None => {
                self.entries.insert(slug.to_string(), incoming.clone());
            }
        }
    }

    /// Overwrite clearances of a slug with the incoming map, verbatim
    ///
    /// Clearances not mentioned by the incoming map are left untouched; each
    /// mentioned clearance takes the incoming value unconditionally, so an
    /// explicit `false` revokes an earlier grant.
    pub fn override_with(&mut self, slug: &str, incoming: &ClearanceMap) {
        match self.entries.get_mut(slug) {
            Some(existing) => {
                for (clearance, value) in incoming {
                    existing.insert(clearance.clone(), *value);
                }
            }
            None => {
                self.entries.insert(slug.to_string(), incoming.clone());
            }
        }
    }

    /// Get the clearance map for a slug
    pub fn clearances(&self, slug: &str) -> Option<&ClearanceMap> {
        self.entries.get(slug)
    }

    /// Check whether a slug is present
    pub fn contains(&self, slug: &str) -> bool {
        self.entries.contains_key(slug)
    }

    /// Check whether a clearance is granted, default-deny
    pub fn allows(&self, slug: &str, clearance: &str) -> bool {
        self.entries.get(slug).and_then(|clearances| clearances.get(clearance)).copied().unwrap_or(false)
    }

    /// Check whether any clearance under a slug is granted
    pub fn allows_any(&self, slug: &str) -> bool {
        self.entries.get(slug).map(|clearances| clearances.values().any(|value| *value)).unwrap_or(false)
    }

    /// Iterate over (slug, clearance map) entries
    pub fn iter(&self) -> impl Iterator<Item = (&String, &ClearanceMap)> {
        self.entries.iter()
    }

    /// Number of slugs in the set
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, ClearanceMap)> for PermissionSet {
    fn from_iter<T: IntoIterator<Item = (String, ClearanceMap)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Build a clearance map from (name, flag) pairs
pub fn clearance_map<I, S>(pairs: I) -> ClearanceMap
where
    I: IntoIterator<Item = (S, bool)>,
    S: Into<String>,
{
    pairs.into_iter().map(|(name, value)| (name.into(), value)).collect()
}
