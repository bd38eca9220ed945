//! Keyword-weighted relevance scoring for extracted paragraphs.
//!
//! The lexicons are a tunable approximation of how legal argumentation
//! reads; the scoring formula (1 point per positive hit, 2 per strong hit,
//! 1 length bonus) is relied on by the ranking and the tests.

/// Generic procedural and argumentative vocabulary, worth 1 point each.
pub const POSITIVE_KEYWORDS: &[&str] = &[
    "plaintiff",
    "defendant",
    "appellant",
    "argue",
    "statute",
    "court",
    "motion",
    "evidence",
    "therefore",
    "pursuant",
    "alleged",
    "claim",
    "judgment",
    "counsel",
];

/// Substantive constitutional and rights vocabulary, worth 2 points each.
pub const STRONG_KEYWORDS: &[&str] = &[
    "constitutional",
    "violation",
    "violates",
    "rights",
    "due process",
    "amendment",
    "precedent",
];

/// Paragraphs between these lengths (in characters) earn one bonus point:
/// long enough to carry a complete thought, short enough to not be a wall
/// of text.
pub const LENGTH_BONUS_MIN: usize = 100;
pub const LENGTH_BONUS_MAX: usize = 300;

/// Score a paragraph by case-insensitive keyword presence.
///
/// Each lexicon entry contributes at most once, regardless of how many
/// times it occurs. Returns 0 for text with no hits and no length bonus.
pub fn relevance_score(paragraph: &str) -> u32 {
    let lowered = paragraph.to_lowercase();
    let mut score = 0u32;

    for keyword in POSITIVE_KEYWORDS {
        if lowered.contains(keyword) {
            score += 1;
        }
    }
    for keyword in STRONG_KEYWORDS {
        if lowered.contains(keyword) {
            score += 2;
        }
    }

    let length = paragraph.chars().count();
    if (LENGTH_BONUS_MIN..=LENGTH_BONUS_MAX).contains(&length) {
        score += 1;
    }

    score
}
