//! Paragraph extraction and per-page ranking.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::ExtractedExcerpt;
use crate::score::relevance_score;

/// Paragraphs shorter than this (in characters, after whitespace
/// normalization) are noise: running heads, page numbers, orphan fragments.
pub const MIN_PARAGRAPH_CHARS: usize = 30;

/// At most this many excerpts survive per page.
pub const MAX_EXCERPTS_PER_PAGE: usize = 3;

static BLANK_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n\s*\n").unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Split a page's raw text into paragraphs, score them, and keep the top
/// ranked few.
///
/// Paragraph boundaries are blank lines. Each paragraph is trimmed and its
/// internal whitespace runs (including line breaks) collapsed to single
/// spaces before filtering. Sub-noise-floor and zero-scoring paragraphs
/// are dropped; the survivors are sorted by score descending (ties keep
/// document order) and truncated to [`MAX_EXCERPTS_PER_PAGE`].
///
/// `page` is the 1-based page number recorded on each excerpt. A page of
/// pure whitespace produces an empty vec, not an error.
pub fn extract_page_excerpts(text: &str, page: u32) -> Vec<ExtractedExcerpt> {
    let mut excerpts: Vec<ExtractedExcerpt> = split_paragraphs(text)
        .filter(|p| p.chars().count() >= MIN_PARAGRAPH_CHARS)
        .filter_map(|p| {
            let score = relevance_score(&p);
            (score > 0).then_some(ExtractedExcerpt {
                page,
                text: p,
                relevance_score: score,
            })
        })
        .collect();

    excerpts.sort_by(|a, b| b.relevance_score.cmp(&a.relevance_score));
    excerpts.truncate(MAX_EXCERPTS_PER_PAGE);
    excerpts
}

/// Blank-line paragraph split with whitespace normalization. Empty
/// segments are skipped.
fn split_paragraphs(text: &str) -> impl Iterator<Item = String> + '_ {
    BLANK_LINE.split(text).filter_map(|raw| {
        let paragraph = WHITESPACE.replace_all(raw.trim(), " ").into_owned();
        (!paragraph.is_empty()).then_some(paragraph)
    })
}
