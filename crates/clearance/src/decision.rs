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

//! Decision evaluation against an effective permission set
//!
//! Expressions name one or more clearances: an atom is `slug.clearance`,
//! split on the last dot since slugs themselves contain dots
//! (`posts.edit.delete` asks for the `delete` clearance of `posts.edit`).
//! Atoms combine with `|` or `,` separators under an [`Operator`]. A bare
//! slug, or a `*` clearance, is satisfied by any granted clearance under
//! that slug.
//!
//! Evaluation never errors: unknown slugs, unknown clearances and malformed
//! atoms all resolve to `false` (default-deny).

use crate::error::{AclError, AclResult};
use crate::permission::PermissionSet;
use std::str::FromStr;

/// Wildcard clearance matching any granted clearance under a slug
pub const ANY_CLEARANCE: &str = "*";

/// How multiple atoms in an expression combine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// Every atom must be granted
    And,
    /// At least one atom must be granted
    Or,
}

impl FromStr for Operator {
    type Err = AclError;

    fn from_str(raw: &str) -> AclResult<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "and" => Ok(Operator::And),
            "or" => Ok(Operator::Or),
            other => Err(AclError::InvalidArgument {
                message: format!("unknown operator '{other}', expected 'and' or 'or'"),
            }),
        }
    }
}

/// Evaluate an expression against an effective permission set
///
/// With `operator` absent a multi-atom expression combines with OR; a
/// single-atom expression is a plain lookup either way.
pub fn check(effective: &PermissionSet, expression: &str, operator: Option<Operator>) -> bool {
    let atoms: Vec<&str> = expression.split(['|', ',']).map(str::trim).filter(|atom| !atom.is_empty()).collect();

    if atoms.is_empty() {
        return false;
    }

    match operator.unwrap_or(Operator::Or) {
        Operator::And => atoms.iter().all(|atom| check_atom(effective, atom)),
        Operator::Or => atoms.iter().any(|atom| check_atom(effective, atom)),
    }
}

/// Evaluate a single `slug.clearance` atom, default-deny
///
/// When the split-off slug is unknown the whole atom is retried as a bare
/// slug, so `posts.edit` still reads as "any clearance of posts.edit" even
/// though the last segment would otherwise parse as a clearance name.
fn check_atom(effective: &PermissionSet, atom: &str) -> bool {
    match atom.rsplit_once('.') {
        Some((slug, clearance)) if !slug.is_empty() && !clearance.is_empty() => {
            if effective.contains(slug) {
                if clearance == ANY_CLEARANCE { effective.allows_any(slug) } else { effective.allows(slug, clearance) }
            } else {
                effective.allows_any(atom)
            }
        }
        // No dot: the atom is a bare slug
        None => effective.allows_any(atom),
        // Leading or trailing dot
        Some(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::permission::clearance_map;

    fn effective() -> PermissionSet {
        let mut set = PermissionSet::new();
        set.insert("posts.edit", clearance_map([("create", true), ("delete", false)]));
        set.insert("reports.view", clearance_map([("read", true)]));
        set
    }

    #[test]
    fn test_single_atom_lookup() {
        let set = effective();

        assert!(check(&set, "posts.edit.create", None));
        assert!(!check(&set, "posts.edit.delete", None));
    }

    #[test]
    fn test_absent_slug_is_denied_not_an_error() {
        let set = effective();

        assert!(!check(&set, "comments.moderate.read", None));
        assert!(!check(&set, "comments.moderate", None));
    }

    #[test]
    fn test_absent_clearance_is_denied() {
        let set = effective();

        assert!(!check(&set, "posts.edit.publish", None));
    }

    #[test]
    fn test_and_operator() {
        let set = effective();

        assert!(check(&set, "posts.edit.create|reports.view.read", Some(Operator::And)));
        assert!(!check(&set, "posts.edit.create|posts.edit.delete", Some(Operator::And)));
    }

    #[test]
    fn test_or_operator() {
        let set = effective();

        assert!(check(&set, "posts.edit.delete|reports.view.read", Some(Operator::Or)));
        assert!(!check(&set, "posts.edit.delete|posts.edit.publish", Some(Operator::Or)));
    }

    #[test]
    fn test_default_operator_is_or() {
        let set = effective();

        assert!(check(&set, "posts.edit.delete,reports.view.read", None));
    }

    #[test]
    fn test_wildcard_clearance() {
        let set = effective();

        assert!(check(&set, "posts.edit.*", None));

        let mut all_denied = PermissionSet::new();
        all_denied.insert("posts.edit", clearance_map([("create", false)]));
        assert!(!check(&all_denied, "posts.edit.*", None));
    }

    #[test]
    fn test_bare_slug_means_any_clearance() {
        let set = effective();

        // "reports" alone is not a known slug; "reports.view" is
        assert!(check(&set, "reports.view", None));
        assert!(!check(&set, "reports", None));
    }

    #[test]
    fn test_malformed_atoms_are_denied() {
        let set = effective();

        assert!(!check(&set, "", None));
        assert!(!check(&set, ".create", None));
        assert!(!check(&set, "posts.edit.", None));
        assert!(!check(&set, "|,|", None));
    }

    #[test]
    fn test_operator_parsing() {
        assert_eq!("and".parse::<Operator>().unwrap(), Operator::And);
        assert_eq!("OR".parse::<Operator>().unwrap(), Operator::Or);
        assert!("xor".parse::<Operator>().is_err());
    }
}
