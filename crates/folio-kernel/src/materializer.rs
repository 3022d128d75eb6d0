//! Block materializer: proposals in, ordered typed blocks out.
//!
//! Each recognized proposal becomes exactly one block, in input order;
//! rejected items are skipped. Image requests are substituted according to
//! the run's [`ResolutionPolicy`]:
//!
//! | Policy         | Image request becomes                                    |
//! |----------------|----------------------------------------------------------|
//! | `auto-resolve` | `image` if lookup finds a URL, else placeholder text     |
//! | `manual`       | `pending-image` with description, page, source file URL  |
//! | `suppress`     | placeholder text, no lookup                              |
//!
//! Output `order` is the position in the output list. Page hints never
//! reorder anything.

use std::str::FromStr;
use std::sync::Arc;

use folio_types::{Block, BlockContent, BlockId, PendingImage};
use serde::{Deserialize, Serialize};
use strum::EnumString;
use tracing::{debug, info, warn};

use crate::config::FolioConfig;
use crate::lookup::{ImageLookup, lookup_from_config_with};
use crate::proposal::{ParsedItem, Proposal, ProposedKind};
use crate::provenance::{self, CandidateFile};

/// How image requests are resolved, chosen once per run.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(ascii_case_insensitive)]
pub enum ResolutionPolicy {
    /// Look the image up, fall back to a placeholder annotation.
    #[default]
    #[serde(alias = "google", alias = "auto")]
    #[strum(serialize = "auto-resolve", serialize = "auto", serialize = "google")]
    AutoResolve,
    /// Leave a pending-image block for a human to fill.
    #[strum(serialize = "manual")]
    Manual,
    /// Always emit the placeholder annotation.
    #[serde(alias = "none")]
    #[strum(serialize = "suppress", serialize = "none")]
    Suppress,
}

impl ResolutionPolicy {
    /// Parse from string (case-insensitive, with aliases).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionPolicy::AutoResolve => "auto-resolve",
            ResolutionPolicy::Manual => "manual",
            ResolutionPolicy::Suppress => "suppress",
        }
    }
}

impl std::fmt::Display for ResolutionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Placeholder annotation for an unresolved image.
pub fn placeholder_markup(description: &str, page: Option<u32>) -> String {
    let page = page.map(|p| format!(" (Page {p})")).unwrap_or_default();
    format!(
        "<p class=\"image-placeholder\">🖼️ <strong>Image Placeholder:</strong> {}{page}</p>",
        escape_html(description.trim())
    )
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Counts per outcome, for logging and CLI output.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MaterializeStats {
    pub passed_through: usize,
    pub resolved_images: usize,
    pub placeholders: usize,
    pub pending_images: usize,
    pub rejected: usize,
}

/// Materializer output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Materialized {
    /// Pending ids, `order` dense from 0.
    pub blocks: Vec<Block>,
    pub stats: MaterializeStats,
}

/// Turns parsed generation items into blocks for one run.
pub struct Materializer {
    policy: ResolutionPolicy,
    files: Vec<CandidateFile>,
    lookup: Option<Arc<dyn ImageLookup>>,
}

impl Materializer {
    pub fn new(policy: ResolutionPolicy, files: Vec<CandidateFile>) -> Self {
        Self {
            policy,
            files,
            lookup: None,
        }
    }

    /// Policy from config; a lookup backend only when the policy needs one
    /// and credentials resolve.
    pub fn from_config(config: &FolioConfig, files: Vec<CandidateFile>) -> Self {
        Self::from_config_with(config, files, |name| std::env::var(name).ok())
    }

    /// [`from_config`](Self::from_config) with an explicit environment lookup.
    pub fn from_config_with(
        config: &FolioConfig,
        files: Vec<CandidateFile>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let policy = config.ingest.policy;
        let lookup = match policy {
            ResolutionPolicy::AutoResolve => lookup_from_config_with(&config.lookup, env),
            ResolutionPolicy::Manual | ResolutionPolicy::Suppress => None,
        };
        Self::new(policy, files).with_lookup(lookup)
    }

    pub fn with_lookup(mut self, lookup: Option<Arc<dyn ImageLookup>>) -> Self {
        self.lookup = lookup;
        self
    }

    pub fn policy(&self) -> ResolutionPolicy {
        self.policy
    }

    /// Materialize items in order.
    pub async fn materialize(&self, items: &[ParsedItem]) -> Materialized {
        let mut stats = MaterializeStats::default();
        let mut blocks = Vec::with_capacity(items.len());

        for item in items {
            let proposal = match item {
                ParsedItem::Recognized(p) => p,
                ParsedItem::Rejected { index, reason } => {
                    warn!(index, %reason, "dropping generation item");
                    stats.rejected += 1;
                    continue;
                }
            };
            let content = self.content_for(proposal, &mut stats).await;
            let provenance = provenance::resolve(
                proposal.page_hint,
                proposal.source_file_hint.as_deref(),
                &self.files,
            );
            if let (Some(hint), None) = (&proposal.source_file_hint, provenance.source_file_id) {
                debug!(%hint, "source file hint matched no input file");
            }
            let order = blocks.len() as u32;
            blocks.push(Block::with_content(BlockId::temp(), content, order).with_provenance(provenance));
        }

        info!(
            policy = %self.policy,
            blocks = blocks.len(),
            resolved = stats.resolved_images,
            placeholders = stats.placeholders,
            pending = stats.pending_images,
            rejected = stats.rejected,
            "materialized generation output"
        );
        Materialized { blocks, stats }
    }

    async fn content_for(&self, proposal: &Proposal, stats: &mut MaterializeStats) -> BlockContent {
        match proposal.kind {
            ProposedKind::Text => {
                stats.passed_through += 1;
                BlockContent::text(proposal.content.clone())
            }
            ProposedKind::Formula => {
                stats.passed_through += 1;
                BlockContent::formula(proposal.content.clone())
            }
            ProposedKind::Image => {
                stats.passed_through += 1;
                BlockContent::image(proposal.content.trim())
            }
            ProposedKind::ImageRequest => self.resolve_image_request(proposal, stats).await,
        }
    }

    async fn resolve_image_request(
        &self,
        proposal: &Proposal,
        stats: &mut MaterializeStats,
    ) -> BlockContent {
        let description = proposal.content.trim();
        match self.policy {
            ResolutionPolicy::AutoResolve => {
                if let Some(url) = self.lookup_image(description).await {
                    stats.resolved_images += 1;
                    return BlockContent::image(url);
                }
                stats.placeholders += 1;
                BlockContent::text(placeholder_markup(description, proposal.page_hint))
            }
            ResolutionPolicy::Manual => {
                stats.pending_images += 1;
                BlockContent::PendingImage(PendingImage {
                    description: description.to_string(),
                    page_hint: proposal.page_hint,
                    candidate_file_url: provenance::manual_source_url(
                        proposal.source_file_hint.as_deref(),
                        &self.files,
                    ),
                })
            }
            ResolutionPolicy::Suppress => {
                stats.placeholders += 1;
                BlockContent::text(placeholder_markup(description, proposal.page_hint))
            }
        }
    }

    async fn lookup_image(&self, description: &str) -> Option<String> {
        let Some(lookup) = &self.lookup else {
            debug!(%description, "no image lookup configured");
            return None;
        };
        match lookup.search(description).await {
            Ok(Some(url)) => Some(url),
            Ok(None) => {
                warn!(%description, "no image found, using placeholder");
                None
            }
            Err(e) => {
                warn!(%description, "image lookup failed, using placeholder: {e}");
                None
            }
        }
    }
}
