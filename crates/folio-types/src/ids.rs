//! Typed identifiers for documents, blocks, and input files.
//!
//! Each id is a UUIDv7 newtype, so ids sort by creation time. `Display`
//! gives the hyphenated text, `to_hex` the form the SQLite tables store, and
//! `short` an 8 digit prefix that only ever appears in output.
//!
//! `TempId` is minted by the client for a block that has not been persisted
//! yet. `PermanentId` is only ever produced by a persistence collaborator.
//! Keeping them as distinct types means a temporary id can never be mistaken
//! for a stored one.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A document identifier (summary, exercise sheet).
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(uuid::Uuid);

/// A client-minted block identity, valid until the create call resolves.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TempId(uuid::Uuid);

/// A block identity assigned by the persistence layer.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermanentId(uuid::Uuid);

/// An uploaded input file identifier.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(uuid::Uuid);

// ── Shared behavior ─────────────────────────────────────────────────────────

macro_rules! impl_typed_id {
    ($T:ident, $name:literal) => {
        impl $T {
            /// Mint a fresh UUIDv7.
            pub fn new() -> Self {
                Self(uuid::Uuid::now_v7())
            }

            /// Leading 8 hex digits, for log lines and terminal output.
            pub fn short(&self) -> String {
                let mut hex = self.to_hex();
                hex.truncate(8);
                hex
            }

            /// Hyphen-free 32 digit form, as stored in SQLite.
            pub fn to_hex(&self) -> String {
                self.0.simple().to_string()
            }

            /// Accepts the hyphenated and the hyphen-free form.
            pub fn parse(s: &str) -> Result<Self, uuid::Error> {
                uuid::Uuid::parse_str(s).map(Self)
            }
        }

        impl Default for $T {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl fmt::Debug for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($name, "({})"), self.short())
            }
        }
    };
}

impl_typed_id!(DocumentId, "DocumentId");
impl_typed_id!(TempId, "TempId");
impl_typed_id!(PermanentId, "PermanentId");
impl_typed_id!(FileId, "FileId");

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_unique() {
        let a = TempId::new();
        let b = TempId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_short_is_a_prefix_of_hex() {
        let id = DocumentId::new();
        assert_eq!(id.short().len(), 8);
        assert!(id.to_hex().starts_with(&id.short()));
    }

    #[test]
    fn test_parse_accepts_both_formats() {
        let id = PermanentId::new();
        assert_eq!(PermanentId::parse(&id.to_hex()).unwrap(), id);
        assert_eq!(PermanentId::parse(&id.to_string()).unwrap(), id);
    }

    #[test]
    fn test_debug_names_the_type() {
        let id = FileId::new();
        assert!(format!("{id:?}").starts_with("FileId("));
    }
}
