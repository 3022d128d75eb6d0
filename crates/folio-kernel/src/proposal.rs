//! Parsing untrusted generation output into block proposals.
//!
//! The generation step emits loosely typed JSON:
//!
//! ```json
//! { "title": "CMOS basics",
//!   "blocks": [
//!     { "type": "text", "content": "<p>...</p>" },
//!     { "type": "latex", "content": "V_{out} = ..." },
//!     { "type": "image_request", "content": "CMOS inverter schematic",
//!       "page": 12, "source_file": "lecture_03.pdf" } ] }
//! ```
//!
//! A bare array of blocks is accepted as well, and the whole payload may be
//! wrapped in a Markdown code fence. Parsing an item is total: every array
//! element becomes either [`ParsedItem::Recognized`] or
//! [`ParsedItem::Rejected`], never an error for the whole run. Any `order`
//! field is ignored; position in the array is the order.

use std::str::FromStr;

use serde_json::{Map, Value};
use strum::EnumString;

use crate::error::{IngestError, Result};

/// Block kinds the generation step may propose.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum ProposedKind {
    #[strum(serialize = "text", serialize = "paragraph")]
    Text,
    #[strum(serialize = "formula", serialize = "latex", serialize = "math")]
    Formula,
    /// Content is already an image URL.
    #[strum(serialize = "image")]
    Image,
    /// A visual asset is still needed; content is its description.
    #[strum(
        serialize = "image_request",
        serialize = "image-request",
        serialize = "pending_image",
        serialize = "pending-image"
    )]
    ImageRequest,
}

impl ProposedKind {
    /// Parse from string (case-insensitive, with aliases).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s.trim()).ok()
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, ProposedKind::ImageRequest)
    }
}

/// A validated block proposal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Proposal {
    pub kind: ProposedKind,
    /// Markup, formula source, URL, or description depending on `kind`.
    pub content: String,
    pub page_hint: Option<u32>,
    pub source_file_hint: Option<String>,
}

impl Proposal {
    pub fn new(kind: ProposedKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            page_hint: None,
            source_file_hint: None,
        }
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page_hint = Some(page);
        self
    }

    pub fn with_source_file(mut self, hint: impl Into<String>) -> Self {
        self.source_file_hint = Some(hint.into());
        self
    }
}

/// Outcome of parsing one generation item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParsedItem {
    Recognized(Proposal),
    Rejected { index: usize, reason: String },
}

impl ParsedItem {
    pub fn proposal(&self) -> Option<&Proposal> {
        match self {
            ParsedItem::Recognized(p) => Some(p),
            ParsedItem::Rejected { .. } => None,
        }
    }
}

/// Parsed generation output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GenerationOutput {
    pub title: Option<String>,
    pub items: Vec<ParsedItem>,
}

impl GenerationOutput {
    /// The generated title, or `fallback` when absent or blank.
    pub fn title_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(fallback)
    }

    pub fn rejected(&self) -> impl Iterator<Item = (usize, &str)> {
        self.items.iter().filter_map(|item| match item {
            ParsedItem::Rejected { index, reason } => Some((*index, reason.as_str())),
            ParsedItem::Recognized(_) => None,
        })
    }
}

/// Parse raw generation output text.
pub fn parse_generation(text: &str) -> Result<GenerationOutput> {
    let value: Value = serde_json::from_str(strip_code_fence(text))?;
    let (title, blocks) = match value {
        Value::Array(blocks) => (None, blocks),
        Value::Object(mut map) => {
            let title = map
                .get("title")
                .and_then(Value::as_str)
                .map(str::to_string);
            match map.remove("blocks") {
                Some(Value::Array(blocks)) => (title, blocks),
                _ => return Err(IngestError::MissingBlocks),
            }
        }
        _ => return Err(IngestError::MissingBlocks),
    };
    let items = blocks
        .iter()
        .enumerate()
        .map(|(index, value)| parse_item(index, value))
        .collect();
    Ok(GenerationOutput { title, items })
}

/// Validate one untrusted item.
pub fn parse_item(index: usize, value: &Value) -> ParsedItem {
    let reject = |reason: String| ParsedItem::Rejected { index, reason };

    let Some(map) = value.as_object() else {
        return reject(format!("expected an object, found {}", json_type(value)));
    };

    let kind = match map.get("type") {
        None | Some(Value::Null) => ProposedKind::Text,
        Some(Value::String(s)) => match ProposedKind::from_str(s) {
            Some(kind) => kind,
            None => return reject(format!("unknown block type {s:?}")),
        },
        Some(other) => return reject(format!("type must be a string, found {}", json_type(other))),
    };

    let content = match field(map, &["content", "description"]) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => {
            return reject(format!("content must be a string, found {}", json_type(other)));
        }
    };

    if content.trim().is_empty() && matches!(kind, ProposedKind::Image | ProposedKind::ImageRequest) {
        return reject(format!("{kind:?} item without content"));
    }

    ParsedItem::Recognized(Proposal {
        kind,
        content,
        page_hint: field(map, &["page", "pageHint", "page_hint"]).and_then(page_number),
        source_file_hint: field(map, &["source_file", "sourceFile", "sourceFileHint"])
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
    })
}

fn field<'a>(map: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|name| map.get(*name))
}

/// Pages arrive as numbers or numeric strings; anything else is dropped.
fn page_number(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Strip a surrounding ```` ```json ```` fence if present.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let body = rest.split_once('\n').map_or(rest, |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}
