//! UUID creation and packing.
//!
//! The packed form is the 16 raw bytes in URL-safe unpadded base64:
//! 22 characters against 36 for the canonical hyphenated string.

use crate::errors::SerdesError;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use uuid::Uuid;

/// Length of every packed UUID.
pub const PACKED_UUID_LEN: usize = 22;

/// Generate a random (v4) UUID.
#[must_use]
pub fn create_uuid() -> Uuid {
    Uuid::new_v4()
}

/// Canonical lowercase hyphenated form.
#[must_use]
pub fn canonical_uuid(uuid: &Uuid) -> String {
    uuid.hyphenated().to_string()
}

/// Pack a UUID into its short string form.
#[must_use]
pub fn pack_uuid(uuid: &Uuid) -> String {
    URL_SAFE_NO_PAD.encode(uuid.as_bytes())
}

/// Pack a canonical UUID string.
///
/// # Errors
///
/// `SerdesError::MalformedUuid` if `canonical` does not parse.
pub fn pack_uuid_str(canonical: &str) -> Result<String, SerdesError> {
    let uuid = Uuid::parse_str(canonical)
        .map_err(|e| SerdesError::malformed(canonical, e.to_string()))?;
    Ok(pack_uuid(&uuid))
}

/// Inverse of [`pack_uuid`].
///
/// # Errors
///
/// `SerdesError::MalformedUuid` for wrong length, bad alphabet or
/// non-canonical trailing bits.
pub fn unpack_uuid(packed: &str) -> Result<Uuid, SerdesError> {
    if packed.len() != PACKED_UUID_LEN {
        return Err(SerdesError::malformed(
            packed,
            format!("expected {PACKED_UUID_LEN} characters, got {}", packed.len()),
        ));
    }
    let bytes = URL_SAFE_NO_PAD
        .decode(packed)
        .map_err(|e| SerdesError::malformed(packed, e.to_string()))?;
    Uuid::from_slice(&bytes).map_err(|e| SerdesError::malformed(packed, e.to_string()))
}
