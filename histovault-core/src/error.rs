// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Error types for the vault cache.
//!
//! A cache miss is never an error: lookup paths return `Ok(None)` and the
//! caller falls through to the next layer. Errors are reserved for broken
//! configuration, broken bytes and broken I/O.

use thiserror::Error;

/// Result type used throughout the vault cache crates.
pub type Result<T> = std::result::Result<T, VaultError>;

#[derive(Error, Debug)]
pub enum VaultError {
    /// Invalid caller-supplied configuration, e.g. a settlement without a
    /// usable evaluation rule. Fatal to the single vault being built.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Schema violation or undecodable bytes. Reported per entry; bulk
    /// scans skip the entry and continue.
    #[error("Format error in element '{element}': {reason}")]
    Format { element: String, reason: String },

    /// Structurally damaged store data (bad magic, checksum mismatch).
    #[error("Corruption: {0}")]
    Corruption(String),

    /// Invalid argument passed to a cache operation.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl VaultError {
    /// Build a format error for a named document element.
    pub fn format(element: impl Into<String>, reason: impl Into<String>) -> Self {
        VaultError::Format {
            element: element.into(),
            reason: reason.into(),
        }
    }
}
