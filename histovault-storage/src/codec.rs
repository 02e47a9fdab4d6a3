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

//! Serialization proxy between vaults and byte streams.
//!
//! Two interchangeable formats:
//!
//! - [`VaultFormat::Strict`]: a self-describing JSON document validated
//!   against the vault schema before decoding. Used for entries at rest,
//!   where bytes of unknown provenance must fail with a diagnosable error.
//! - [`VaultFormat::Compact`]: bincode without schema enforcement, for
//!   low-latency round-trips between trusted producer and consumer.
//!
//! A [`VaultCodec`] owns its format handlers, built once in the constructor
//! and reused for the codec's lifetime; a caller needing an independent
//! handler constructs its own codec. Decode failures never expose a
//! partially constructed vault.

use serde_json::Value;

use histovault_core::{Result, Vault, VaultError};

/// Byte stream format of a persisted vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VaultFormat {
    #[default]
    Strict,
    Compact,
}

/// Expected JSON shape of one schema element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ElementShape {
    String,
    /// A 40-character lowercase hex SHA-1 digest.
    Sha1Hex,
    Integer,
    Object,
}

/// One required element of the strict vault document.
#[derive(Debug, Clone)]
struct SchemaElement {
    name: &'static str,
    shape: ElementShape,
}

/// Bidirectional vault conversion with schema checking for the strict
/// format.
#[derive(Debug, Clone)]
pub struct VaultCodec {
    schema: Vec<SchemaElement>,
}

impl Default for VaultCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl VaultCodec {
    pub fn new() -> Self {
        let element = |name, shape| SchemaElement { name, shape };
        Self {
            schema: vec![
                element("vaultName", ElementShape::Sha1Hex),
                element("vaultDirectory", ElementShape::Sha1Hex),
                element("vaultCreated_ms", ElementShape::Integer),
                element("logFilePath", ElementShape::String),
                element("logFileLastModified", ElementShape::Integer),
                element("logFileLength", ElementShape::Integer),
                element("logFileVersion", ElementShape::Integer),
                element("logRecordSetOrdinal", ElementShape::Integer),
                element("logRecordsetBaseName", ElementShape::String),
                element("logDeviceName", ElementShape::String),
                element("logChannelNumber", ElementShape::Integer),
                element("logObjectKey", ElementShape::String),
                element("logStartTimestampMs", ElementShape::Integer),
                element("measurements", ElementShape::Object),
                element("settlements", ElementShape::Object),
                element("scores", ElementShape::Object),
            ],
        }
    }

    pub fn encode(&self, vault: &Vault, format: VaultFormat) -> Result<Vec<u8>> {
        match format {
            VaultFormat::Strict => serde_json::to_vec_pretty(vault)
                .map_err(|e| VaultError::format("histoVault", e.to_string())),
            VaultFormat::Compact => bincode::serialize(vault)
                .map_err(|e| VaultError::format("histoVault", e.to_string())),
        }
    }

    pub fn decode(&self, bytes: &[u8], format: VaultFormat) -> Result<Vault> {
        match format {
            VaultFormat::Strict => {
                let document: Value = serde_json::from_slice(bytes)
                    .map_err(|e| VaultError::format("histoVault", e.to_string()))?;
                self.validate(&document)?;
                serde_json::from_value(document)
                    .map_err(|e| VaultError::format("histoVault", e.to_string()))
            }
            VaultFormat::Compact => bincode::deserialize(bytes)
                .map_err(|e| VaultError::format("histoVault", e.to_string())),
        }
    }

    /// Check the document against the schema before any vault is built.
    fn validate(&self, document: &Value) -> Result<()> {
        let object = document
            .as_object()
            .ok_or_else(|| VaultError::format("histoVault", "document is not an object"))?;

        for element in &self.schema {
            let value = object
                .get(element.name)
                .ok_or_else(|| VaultError::format(element.name, "required element missing"))?;
            let ok = match element.shape {
                ElementShape::String => value.is_string(),
                ElementShape::Integer => value.is_i64() || value.is_u64(),
                ElementShape::Object => value.is_object(),
                ElementShape::Sha1Hex => value.as_str().is_some_and(is_sha1_hex),
            };
            if !ok {
                return Err(VaultError::format(
                    element.name,
                    format!("unexpected shape, wanted {:?}", element.shape),
                ));
            }
        }
        Ok(())
    }
}

fn is_sha1_hex(value: &str) -> bool {
    value.len() == 40 && value.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
