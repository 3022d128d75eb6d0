//! Block content payloads.
//!
//! Each [`BlockKind`](crate::BlockKind) has its own payload shape. On the
//! persistence boundary every payload travels as one opaque string; the
//! `to_payload` / `from_payload` pair is the only place that knows the
//! encoding:
//!
//! |----------------|-------------------------------------------------------|
//! | Kind           | Payload string                                        |
//! |----------------|-------------------------------------------------------|
//! | text           | rich text markup, verbatim                            |
//! | formula        | raw formula markup, verbatim                          |
//! | image          | bare URL, or `{"url": .., "width": ..}` with a hint   |
//! | pending-image  | `{"description": .., "page": .., "fileUrl": ..}`      |
//! |----------------|-------------------------------------------------------|

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::EnumString;
use thiserror::Error;

use crate::block::BlockKind;

/// Errors decoding a stored payload.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContentError {
    /// Payload looked structured but did not decode.
    #[error("malformed {kind} payload: {reason}")]
    MalformedPayload { kind: BlockKind, reason: String },
}

/// Structural variant inside the text family.
///
/// Variants live inside the markup itself (the outer element), so a text
/// block never needs a separate field to remember it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(ascii_case_insensitive)]
pub enum TextVariant {
    #[default]
    #[strum(serialize = "paragraph", serialize = "text", serialize = "p")]
    Paragraph,
    #[strum(serialize = "heading1", serialize = "h1")]
    Heading1,
    #[strum(serialize = "heading2", serialize = "h2")]
    Heading2,
    #[strum(serialize = "heading3", serialize = "h3")]
    Heading3,
    #[strum(serialize = "bullet_list", serialize = "bullets", serialize = "ul")]
    BulletList,
    #[strum(serialize = "ordered_list", serialize = "numbered", serialize = "ol")]
    OrderedList,
    #[strum(serialize = "task_list", serialize = "todo")]
    TaskList,
    #[strum(serialize = "quote", serialize = "blockquote")]
    Quote,
    #[strum(serialize = "code")]
    Code,
}

impl TextVariant {
    /// All variants, most specific wrapper first (used when detecting).
    pub const ALL: [TextVariant; 9] = [
        TextVariant::TaskList,
        TextVariant::BulletList,
        TextVariant::OrderedList,
        TextVariant::Code,
        TextVariant::Quote,
        TextVariant::Heading1,
        TextVariant::Heading2,
        TextVariant::Heading3,
        TextVariant::Paragraph,
    ];

    /// Parse from string (case-insensitive, with aliases).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    /// Opening and closing markup for this variant.
    pub fn wrapper(&self) -> (&'static str, &'static str) {
        match self {
            TextVariant::Paragraph => ("<p>", "</p>"),
            TextVariant::Heading1 => ("<h1>", "</h1>"),
            TextVariant::Heading2 => ("<h2>", "</h2>"),
            TextVariant::Heading3 => ("<h3>", "</h3>"),
            TextVariant::BulletList => ("<ul><li>", "</li></ul>"),
            TextVariant::OrderedList => ("<ol><li>", "</li></ol>"),
            TextVariant::TaskList => ("<ul data-type=\"taskList\"><li>", "</li></ul>"),
            TextVariant::Quote => ("<blockquote>", "</blockquote>"),
            TextVariant::Code => ("<pre><code>", "</code></pre>"),
        }
    }
}

/// Rich text markup for the text family.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RichText(String);

impl RichText {
    pub fn new(markup: impl Into<String>) -> Self {
        Self(markup.into())
    }

    pub fn markup(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Append another block's markup (merge semantics: plain concatenation).
    pub fn append(&mut self, other: &RichText) {
        self.0.push_str(&other.0);
    }

    /// The variant whose wrapper encloses the whole markup, if any.
    pub fn variant(&self) -> Option<TextVariant> {
        TextVariant::ALL
            .into_iter()
            .find(|v| unwrap_variant(self.0.trim(), *v).is_some())
    }

    /// Re-wrap the markup in `variant`, stripping one known outer wrapper first.
    pub fn apply_variant(&mut self, variant: TextVariant) {
        let trimmed = self.0.trim();
        let inner = TextVariant::ALL
            .into_iter()
            .find_map(|v| unwrap_variant(trimmed, v))
            .unwrap_or(trimmed);
        let (open, close) = variant.wrapper();
        self.0 = format!("{open}{inner}{close}");
    }
}

/// Inner markup if `markup` is exactly one `variant` element.
fn unwrap_variant(markup: &str, variant: TextVariant) -> Option<&str> {
    let (open, close) = variant.wrapper();
    let inner = markup.strip_prefix(open)?.strip_suffix(close)?;
    // "<p>a</p><p>b</p>" is two paragraphs, not one wrapper
    let innermost_close = close.split_inclusive('>').next().unwrap_or(close);
    if inner.contains(open) || inner.contains(innermost_close) {
        return None;
    }
    Some(inner)
}

/// Presentation-size hint for an image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeHint {
    /// Display width in CSS pixels.
    pub width: u32,
}

/// A resolved image.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSource {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<SizeHint>,
}

impl ImageSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            size: None,
        }
    }

    pub fn with_width(mut self, width: u32) -> Self {
        self.size = Some(SizeHint { width });
        self
    }
}

#[derive(Serialize, Deserialize)]
struct ImagePayload {
    url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    width: Option<u32>,
}

/// An image awaiting a human-provided source.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingImage {
    pub description: String,
    #[serde(default, rename = "page", skip_serializing_if = "Option::is_none")]
    pub page_hint: Option<u32>,
    #[serde(default, rename = "fileUrl", skip_serializing_if = "Option::is_none")]
    pub candidate_file_url: Option<String>,
}

/// Kind-shaped block payload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "kebab-case")]
pub enum BlockContent {
    Text(RichText),
    Formula(String),
    Image(ImageSource),
    PendingImage(PendingImage),
}

impl BlockContent {
    /// Empty payload of the given kind.
    pub fn empty(kind: BlockKind) -> Self {
        match kind {
            BlockKind::Text => BlockContent::Text(RichText::default()),
            BlockKind::Formula => BlockContent::Formula(String::new()),
            BlockKind::Image => BlockContent::Image(ImageSource::default()),
            BlockKind::PendingImage => BlockContent::PendingImage(PendingImage::default()),
        }
    }

    pub fn text(markup: impl Into<String>) -> Self {
        BlockContent::Text(RichText::new(markup))
    }

    pub fn formula(markup: impl Into<String>) -> Self {
        BlockContent::Formula(markup.into())
    }

    pub fn image(url: impl Into<String>) -> Self {
        BlockContent::Image(ImageSource::new(url))
    }

    pub fn kind(&self) -> BlockKind {
        match self {
            BlockContent::Text(_) => BlockKind::Text,
            BlockContent::Formula(_) => BlockKind::Formula,
            BlockContent::Image(_) => BlockKind::Image,
            BlockContent::PendingImage(_) => BlockKind::PendingImage,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            BlockContent::Text(t) => t.is_empty(),
            BlockContent::Formula(f) => f.is_empty(),
            BlockContent::Image(i) => i.url.is_empty(),
            BlockContent::PendingImage(p) => {
                p.description.is_empty() && p.page_hint.is_none() && p.candidate_file_url.is_none()
            }
        }
    }

    pub fn as_text(&self) -> Option<&RichText> {
        match self {
            BlockContent::Text(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_text_mut(&mut self) -> Option<&mut RichText> {
        match self {
            BlockContent::Text(t) => Some(t),
            _ => None,
        }
    }

    /// Encode to the opaque string stored by persistence.
    pub fn to_payload(&self) -> String {
        match self {
            BlockContent::Text(t) => t.markup().to_string(),
            BlockContent::Formula(f) => f.clone(),
            BlockContent::Image(img) => match img.size {
                None => img.url.clone(),
                Some(hint) => serde_json::to_string(&ImagePayload {
                    url: img.url.clone(),
                    width: Some(hint.width),
                })
                .unwrap_or_else(|_| img.url.clone()),
            },
            BlockContent::PendingImage(p) => {
                serde_json::to_string(p).unwrap_or_else(|_| p.description.clone())
            }
        }
    }

    /// Decode a stored payload for `kind`.
    ///
    /// A pending-image payload that is not JSON is read as a bare description.
    pub fn from_payload(kind: BlockKind, payload: &str) -> Result<Self, ContentError> {
        match kind {
            BlockKind::Text => Ok(BlockContent::text(payload)),
            BlockKind::Formula => Ok(BlockContent::formula(payload)),
            BlockKind::Image => {
                let trimmed = payload.trim_start();
                if !trimmed.starts_with('{') {
                    return Ok(BlockContent::image(payload));
                }
                let decoded: ImagePayload = serde_json::from_str(payload).map_err(|e| {
                    ContentError::MalformedPayload {
                        kind,
                        reason: e.to_string(),
                    }
                })?;
                Ok(BlockContent::Image(ImageSource {
                    url: decoded.url,
                    size: decoded.width.map(|width| SizeHint { width }),
                }))
            }
            BlockKind::PendingImage => {
                match serde_json::from_str::<PendingImage>(payload) {
                    Ok(p) => Ok(BlockContent::PendingImage(p)),
                    Err(_) => Ok(BlockContent::PendingImage(PendingImage {
                        description: payload.to_string(),
                        ..Default::default()
                    })),
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
