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

//! Error handling for the permission resolution engine

use thiserror::Error;

/// Error types for permission resolution and override mutation
///
/// Decision queries (`can`) never produce these: an unknown slug or clearance
/// resolves to `false` (default-deny). Errors are reserved for caller mistakes
/// during override mutation, where a reference that resolves to nothing
/// indicates misconfiguration rather than a denied permission.
#[derive(Error, Debug)]
pub enum AclError {
    #[error("Not found: {message}")]
    NotFound { message: String },

    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },
}

impl AclError {
    /// Get the error type identifier
    pub fn error_type(&self) -> &'static str {
        match self {
            AclError::NotFound { .. } => "not_found",
            AclError::InvalidArgument { .. } => "invalid_argument",
        }
    }
}

/// Result type for ACL operations
pub type AclResult<T> = Result<T, AclError>;
