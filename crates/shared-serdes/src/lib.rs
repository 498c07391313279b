//! # Shared Serdes - Compact Wire Identifiers
//!
//! The serialization layer underneath every bridge.
//!
//! ## Responsibilities
//!
//! - **Identifier interning:** human-readable channel names map to short
//!   tokens (`"PlayerMoved"` → `"C"`), so packets never carry full names.
//! - **UUID packing:** correlation ids travel as 22-character packed strings
//!   instead of the 36-character canonical form.
//! - **Tables:** flattening keyed dictionaries into value sequences.
//!
//! ```text
//! name ──create_identifier──→ Token(3) ──encode──→ "D"
//! uuid ──pack_uuid──────────→ "3q2-7wAAQACAAAAAAAAAAA"
//! ```

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod errors;
pub mod identifiers;
pub mod tables;
pub mod uuid_codec;

pub use errors::SerdesError;
pub use identifiers::{IdentifierRegistry, Token};
pub use tables::dictionary_to_table;
pub use uuid_codec::{
    canonical_uuid, create_uuid, pack_uuid, pack_uuid_str, unpack_uuid, PACKED_UUID_LEN,
};
pub use uuid::Uuid;
