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

//! HistoVault Storage Layer
//!
//! Serialization, persistence and caching for vaults:
//!
//! - **Codec**: schema-checked strict format and compact trusted format
//! - **Persistent store**: single-archive or directory-of-entries layout
//!   under the scope directory, idempotent content-addressed writes
//! - **Front cache**: bounded, recency-evicting, load-coalescing in-memory
//!   map with hit/miss/eviction statistics
//! - **Reconciler**: batch resolution of trusses through the cache layers

pub mod archive;
pub mod codec;
pub mod dir_store;
pub mod front_cache;
pub mod reconcile;
pub mod store;

pub use archive::{ArchiveStore, ARCHIVE_MAGIC, ARCHIVE_VERSION};
pub use codec::{VaultCodec, VaultFormat};
pub use dir_store::DirectoryStore;
pub use front_cache::{FrontCache, FrontCacheStats, DEFAULT_MAX_ENTRIES};
pub use reconcile::{Reconciler, TrussJobs};
pub use store::{StoreLayout, VaultStore, ARCHIVE_FILE_NAME, MIN_VAULT_LENGTH};
