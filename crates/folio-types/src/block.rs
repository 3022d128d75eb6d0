//! The block entity, its identity regimes, and kind transitions.
//!
//! ## Identity
//!
//! A block is born `Pending(TempId)` on the client and becomes
//! `Committed(PermanentId)` exactly once, when its create call resolves. The
//! swap happens in place: same position, same content.
//!
//! ## Retype
//!
//! Changing kind is replace-semantics: the content becomes the empty payload
//! of the new kind. Applying a text variant to a non-text block first coerces
//! it to an empty text block, then applies the variant.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::EnumString;

use crate::content::{BlockContent, TextVariant};
use crate::ids::{FileId, PermanentId, TempId};

/// Block identity: temporary until persisted, permanent afterwards.
#[derive(Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "id", rename_all = "lowercase")]
pub enum BlockId {
    /// Client-minted, valid until the create call resolves.
    Pending(TempId),
    /// Assigned by the persistence layer.
    Committed(PermanentId),
}

impl BlockId {
    /// Mint a fresh temporary identity.
    pub fn temp() -> Self {
        BlockId::Pending(TempId::new())
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, BlockId::Pending(_))
    }

    pub fn is_committed(&self) -> bool {
        matches!(self, BlockId::Committed(_))
    }

    pub fn temp_id(&self) -> Option<TempId> {
        match self {
            BlockId::Pending(t) => Some(*t),
            BlockId::Committed(_) => None,
        }
    }
}

impl From<TempId> for BlockId {
    fn from(t: TempId) -> Self {
        BlockId::Pending(t)
    }
}

impl From<PermanentId> for BlockId {
    fn from(p: PermanentId) -> Self {
        BlockId::Committed(p)
    }
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockId::Pending(t) => write!(f, "tmp:{}", t.short()),
            BlockId::Committed(p) => write!(f, "{}", p.short()),
        }
    }
}

impl std::fmt::Debug for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BlockId({self})")
    }
}

/// What a block *is*.
///
/// Closed set today; new kinds only need a payload shape in
/// [`BlockContent`] and an arm in its codec.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default, EnumString)]
#[serde(rename_all = "kebab-case")]
#[strum(ascii_case_insensitive)]
pub enum BlockKind {
    /// Rich text (paragraphs, headings, lists...).
    #[default]
    Text,
    /// Raw formula markup.
    #[serde(alias = "latex")]
    #[strum(serialize = "formula", serialize = "latex")]
    Formula,
    /// A resolved image URL.
    Image,
    /// An image awaiting a human-provided source.
    #[serde(alias = "pending_image")]
    #[strum(serialize = "pending-image", serialize = "pending_image")]
    PendingImage,
}

impl BlockKind {
    /// Parse from string (case-insensitive, `latex` accepted for formula).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BlockKind::Text => "text",
            BlockKind::Formula => "formula",
            BlockKind::Image => "image",
            BlockKind::PendingImage => "pending-image",
        }
    }

    /// Text family blocks can be merged and split.
    pub fn is_text_family(&self) -> bool {
        matches!(self, BlockKind::Text)
    }
}

impl std::fmt::Display for BlockKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Traceability back to an input file. Set only by ingestion.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file_id: Option<FileId>,
}

impl Provenance {
    pub fn is_empty(&self) -> bool {
        self.source_page.is_none() && self.source_file_id.is_none()
    }
}

/// Target of a retype.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Retype {
    /// Change to another kind (destructive when the kind differs).
    Kind(BlockKind),
    /// Apply a text-internal structure, coercing to text first if needed.
    Variant(TextVariant),
}

/// The unit of document content.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    pub content: BlockContent,
    /// Dense position within the owning document.
    pub order: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance: Option<Provenance>,
}

impl Block {
    /// A block of `kind` with empty content.
    pub fn new(id: BlockId, kind: BlockKind, order: u32) -> Self {
        Self::with_content(id, BlockContent::empty(kind), order)
    }

    pub fn with_content(id: BlockId, content: BlockContent, order: u32) -> Self {
        Self {
            id,
            content,
            order,
            provenance: None,
        }
    }

    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = (!provenance.is_empty()).then_some(provenance);
        self
    }

    pub fn kind(&self) -> BlockKind {
        self.content.kind()
    }

    /// Change kind in place without touching id, order, or provenance.
    ///
    /// Returns `true` if the content changed.
    pub fn retype(&mut self, target: Retype) -> bool {
        match target {
            Retype::Kind(kind) if kind == self.kind() => false,
            Retype::Kind(kind) => {
                self.content = BlockContent::empty(kind);
                true
            }
            Retype::Variant(variant) => {
                if !self.kind().is_text_family() {
                    self.content = BlockContent::empty(BlockKind::Text);
                }
                let before = self.content.clone();
                if let Some(text) = self.content.as_text_mut() {
                    text.apply_variant(variant);
                }
                self.content != before
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_kind_aliases() {
        assert_eq!(BlockKind::from_str("latex"), Some(BlockKind::Formula));
        assert_eq!(BlockKind::from_str("FORMULA"), Some(BlockKind::Formula));
        assert_eq!(BlockKind::from_str("pending_image"), Some(BlockKind::PendingImage));
        assert_eq!(BlockKind::from_str("pending-image"), Some(BlockKind::PendingImage));
        assert_eq!(BlockKind::from_str("image_request"), None);
    }

    #[test]
    fn test_block_kind_serde_accepts_latex() {
        let k: BlockKind = serde_json::from_str("\"latex\"").unwrap();
        assert_eq!(k, BlockKind::Formula);
        assert_eq!(serde_json::to_string(&BlockKind::PendingImage).unwrap(), "\"pending-image\"");
    }

    #[test]
    fn test_block_id_regimes() {
        let pending = BlockId::temp();
        assert!(pending.is_pending());
        assert!(pending.temp_id().is_some());
        assert!(pending.to_string().starts_with("tmp:"));

        let committed = BlockId::from(PermanentId::new());
        assert!(committed.is_committed());
        assert!(committed.temp_id().is_none());
    }

    #[test]
    fn test_retype_text_to_formula_discards_content() {
        let mut block = Block::with_content(BlockId::temp(), BlockContent::text("<p>hello</p>"), 0);
        assert!(block.retype(Retype::Kind(BlockKind::Formula)));
        assert_eq!(block.kind(), BlockKind::Formula);
        assert!(block.content.is_empty());
    }

    #[test]
    fn test_retype_same_kind_keeps_content() {
        let mut block = Block::with_content(BlockId::temp(), BlockContent::formula("E=mc^2"), 3);
        assert!(!block.retype(Retype::Kind(BlockKind::Formula)));
        assert_eq!(block.content, BlockContent::formula("E=mc^2"));
        assert_eq!(block.order, 3);
    }

    #[test]
    fn test_variant_on_text_keeps_inner_markup() {
        let mut block = Block::with_content(BlockId::temp(), BlockContent::text("<p>Title</p>"), 0);
        assert!(block.retype(Retype::Variant(TextVariant::Heading1)));
        assert_eq!(block.content, BlockContent::text("<h1>Title</h1>"));
    }

    #[test]
    fn test_variant_on_formula_coerces_to_text() {
        let id = BlockId::temp();
        let mut block = Block::with_content(id, BlockContent::formula("x^2"), 1);
        assert!(block.retype(Retype::Variant(TextVariant::BulletList)));
        assert_eq!(block.kind(), BlockKind::Text);
        assert_eq!(block.content, BlockContent::text("<ul><li></li></ul>"));
        assert_eq!(block.id, id);
        assert_eq!(block.order, 1);
    }

    #[test]
    fn test_empty_provenance_is_dropped() {
        let block = Block::new(BlockId::temp(), BlockKind::Text, 0).with_provenance(Provenance::default());
        assert_eq!(block.provenance, None);
    }
}
