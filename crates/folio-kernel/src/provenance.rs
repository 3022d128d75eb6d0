//! Matching source-file hints against the run's input files.

use folio_types::{FileId, Provenance};

/// An input file available to an ingestion run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CandidateFile {
    pub id: FileId,
    pub name: String,
    pub url: String,
}

impl CandidateFile {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: FileId::new(),
            name: name.into(),
            url: url.into(),
        }
    }
}

/// Find the file a hint refers to.
///
/// Tried in order, first hit wins:
/// 1. exact name
/// 2. filename suffix (the URL or name ends with the hint, or the hint's
///    last path segment equals the name)
/// 3. case-insensitive comparison with extensions stripped
pub fn match_file<'a>(hint: &str, files: &'a [CandidateFile]) -> Option<&'a CandidateFile> {
    let hint = hint.trim();
    if hint.is_empty() {
        return None;
    }

    if let Some(file) = files.iter().find(|f| f.name == hint) {
        return Some(file);
    }

    let hint_base = basename(hint);
    if let Some(file) = files
        .iter()
        .find(|f| f.url.ends_with(hint) || f.name.ends_with(hint) || f.name == hint_base)
    {
        return Some(file);
    }

    let hint_stem = stem(hint_base);
    files
        .iter()
        .find(|f| stem(basename(&f.name)).eq_ignore_ascii_case(hint_stem))
}

/// Source file URL for a pending image.
///
/// With exactly one input file it is used regardless of the hint.
pub fn manual_source_url(hint: Option<&str>, files: &[CandidateFile]) -> Option<String> {
    if let [only] = files {
        return Some(only.url.clone());
    }
    hint.and_then(|h| match_file(h, files))
        .map(|f| f.url.clone())
}

/// Provenance from a page hint and a source-file hint.
///
/// An unmatched hint leaves the file unset.
pub fn resolve(page: Option<u32>, hint: Option<&str>, files: &[CandidateFile]) -> Provenance {
    Provenance {
        source_page: page,
        source_file_id: hint.and_then(|h| match_file(h, files)).map(|f| f.id),
    }
}

fn basename(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

fn stem(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => name,
    }
}
