//! Blob identity.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Width of a braced identifier as the CMS writes it into field values,
/// e.g. `{5B6C2D4E-0F1A-4B3C-8D9E-A1B2C3D4E5F6}`.
pub const KEY_WIDTH: usize = 38;

/// Identifies a blob in both the external object store and the ledger.
///
/// Rendered as a lowercase hyphenated UUID; that rendering is the object
/// name in the external store and the `blob_id` column of the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlobKey(Uuid);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid blob key {value:?}")]
pub struct KeyParseError {
    pub value: String,
}

impl BlobKey {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn uuid(&self) -> Uuid {
        self.0
    }

    /// Braced uppercase rendering, the form stored in content field values.
    pub fn to_field_value(&self) -> String {
        format!("{{{}}}", self.0.hyphenated().to_string().to_uppercase())
    }

    /// Interpret a raw content field value as a blob key.
    ///
    /// Values longer than [`KEY_WIDTH`] are clamped to their prefix before
    /// parsing; legacy rows sometimes carry trailing data after the id.
    pub fn from_field_value(raw: &str) -> Result<Self, KeyParseError> {
        let clamped = match raw.char_indices().nth(KEY_WIDTH) {
            Some((end, _)) => &raw[..end],
            None => raw,
        };
        clamped.trim().parse()
    }
}

impl Default for BlobKey {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for BlobKey {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl FromStr for BlobKey {
    type Err = KeyParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self).map_err(|_| KeyParseError {
            value: s.to_string(),
        })
    }
}

impl fmt::Display for BlobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}
