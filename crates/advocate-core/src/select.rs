//! Page sampling policy.
//!
//! Dispositive argumentation in briefs clusters at the opening, the body
//! midpoint, and the conclusion. Sampling those regions bounds extraction
//! work on very large documents instead of scaling with page count.

/// Pick the 0-based page indices to sample from a document.
///
/// Coverage policy:
/// - page 0 always;
/// - pages 1 and 2 when the document has more than 3 pages;
/// - the middle page and its immediate neighbors when more than 10
///   (`middle = page_count / 2`);
/// - the last two pages when at least 5.
///
/// The result is deduplicated, sorted ascending, and always within
/// `[0, page_count)`. A zero-page document yields an empty selection.
pub fn select_pages(page_count: usize) -> Vec<usize> {
    if page_count == 0 {
        return Vec::new();
    }

    let mut pages = vec![0];

    if page_count > 3 {
        pages.push(1);
        pages.push(2);
    }

    if page_count > 10 {
        let middle = page_count / 2;
        pages.push(middle - 1);
        pages.push(middle);
        pages.push(middle + 1);
    }

    if page_count >= 5 {
        pages.push(page_count - 2);
        pages.push(page_count - 1);
    }

    pages.sort_unstable();
    pages.dedup();
    pages
}
