//! Argument synthesis: prompt construction, completion parsing, and the
//! rule-based fallback.
//!
//! The model path is best-effort. Any completion failure, timeout, or
//! response that parses to nothing routes to [`fallback_argument_set`],
//! which derives arguments from the scored excerpts alone. Synthesis never
//! fails: callers always get a structurally valid [`ArgumentSet`].

use std::fmt::Write;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::llm::{CompletionBackend, CompletionRequest};
use crate::{ArgumentSet, ExtractedExcerpt};

/// Excerpts are clipped to this many characters when quoted in the prompt
/// or in fallback summaries, bounding prompt size.
pub const EXCERPT_SNIPPET_CHARS: usize = 150;

/// How many arguments the model is asked to produce on each side.
pub const ARGUMENTS_PER_SIDE: usize = 5;

/// Outcome of a synthesis attempt.
#[derive(Debug, Clone)]
pub struct Synthesis {
    pub arguments: ArgumentSet,
    /// True when the arguments came from a parsed model completion rather
    /// than the rule-based fallback.
    pub via_model: bool,
    /// True when the model replied but no argument lists could be parsed
    /// out of the response.
    pub ambiguous: bool,
}

// ── Prompt ──────────────────────────────────────────────────────────────

fn clip(text: &str) -> String {
    text.chars().take(EXCERPT_SNIPPET_CHARS).collect()
}

fn build_prompt(excerpts: &[ExtractedExcerpt]) -> String {
    let mut prompt = String::from(
        "You are a legal assistant analyzing a legal brief.\n\
         Below are the most relevant excerpts from the brief, each labeled \
         with the page it appears on.\n\n",
    );
    for excerpt in excerpts {
        let _ = writeln!(prompt, "(Page {}) {}", excerpt.page, clip(&excerpt.text));
    }
    let _ = write!(
        prompt,
        "\nExtract exactly {n} arguments FOR the case and {n} arguments AGAINST \
         the case. Each argument must be a short summary and must reference a \
         page number from the excerpts above.\n\n\
         Output Format:\n\
         FOR:\n\
         1. <argument summary> (Page <number>)\n\
         AGAINST:\n\
         1. <argument summary> (Page <number>)\n",
        n = ARGUMENTS_PER_SIDE,
    );
    prompt
}

// ── Response parsing ────────────────────────────────────────────────────

// Section headers, tolerating markdown decoration and an optional colon:
// "FOR:", "**AGAINST:**", "### Arguments FOR", "**FOR**:". When a colon
// carries same-line text ("FOR: 1. ...") the match stops at the colon, so
// the rest of the line stays in the section region.
static FOR_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^[\s#*_]*(?:arguments\s+)?for(?:\s+the\s+case)?\s*(?:[\s#*_:]*$|[\s#*_]*:)")
        .unwrap()
});
static AGAINST_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?im)^[\s#*_]*(?:arguments\s+)?against(?:\s+the\s+case)?\s*(?:[\s#*_:]*$|[\s#*_]*:)",
    )
    .unwrap()
});

// Numbered ("1."/"2)") or bulleted ("-", "*", "•") list items.
static LIST_ITEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\s*(?:\d+[.)]\s*|[-*•]\s+)(.+)$").unwrap());

struct ParsedLists {
    for_arguments: Vec<String>,
    against_arguments: Vec<String>,
    /// True when no section marker was found, or both lists came back empty.
    ambiguous: bool,
}

/// Best-effort extraction of the for/against lists from free-form model
/// output. Total: always returns, possibly with empty lists.
fn parse_argument_lists(response: &str) -> ParsedLists {
    let for_marker = FOR_MARKER.find(response);
    let against_marker = AGAINST_MARKER.find(response);

    let (for_region, against_region) = match (for_marker, against_marker) {
        (Some(f), Some(a)) if f.start() <= a.start() => {
            (&response[f.end()..a.start()], &response[a.end()..])
        }
        // Sections in reverse order.
        (Some(f), Some(a)) => (&response[f.end()..], &response[a.end()..f.start()]),
        (Some(f), None) => (&response[f.end()..], ""),
        (None, Some(a)) => ("", &response[a.end()..]),
        (None, None) => {
            return ParsedLists {
                for_arguments: Vec::new(),
                against_arguments: Vec::new(),
                ambiguous: true,
            };
        }
    };

    let for_arguments = region_items(for_region);
    let against_arguments = region_items(against_region);
    let ambiguous = for_arguments.is_empty() && against_arguments.is_empty();
    ParsedLists {
        for_arguments,
        against_arguments,
        ambiguous,
    }
}

/// Items within one section region. Prefers numbered/bulleted items; if
/// none are recognized, every non-empty line counts as one item.
fn region_items(region: &str) -> Vec<String> {
    let items: Vec<String> = LIST_ITEM
        .captures_iter(region)
        .map(|cap| cap[1].trim().to_string())
        .filter(|item| !item.is_empty())
        .collect();
    if !items.is_empty() {
        return items;
    }
    region
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

// ── Rule-based fallback ─────────────────────────────────────────────────

/// Derive an [`ArgumentSet`] from the scored excerpts without any external
/// call: excerpts alternate between the two sides in rank order, at most
/// [`ARGUMENTS_PER_SIDE`] per side, each summary naming its page. Never
/// fails; an empty excerpt sequence yields an empty set.
pub fn fallback_argument_set(excerpts: &[ExtractedExcerpt]) -> ArgumentSet {
    let mut for_arguments = Vec::new();
    let mut against_arguments = Vec::new();
    for (i, excerpt) in excerpts.iter().enumerate() {
        let snippet = clip(&excerpt.text);
        if i % 2 == 0 {
            if for_arguments.len() < ARGUMENTS_PER_SIDE {
                for_arguments.push(format!(
                    "A central passage on page {} supports the case: \"{}\"",
                    excerpt.page, snippet
                ));
            }
        } else if against_arguments.len() < ARGUMENTS_PER_SIDE {
            against_arguments.push(format!(
                "A central passage on page {} could be read against the case: \"{}\"",
                excerpt.page, snippet
            ));
        }
        if for_arguments.len() == ARGUMENTS_PER_SIDE
            && against_arguments.len() == ARGUMENTS_PER_SIDE
        {
            break;
        }
    }
    ArgumentSet {
        for_arguments,
        against_arguments,
    }
}

// ── Entry point ─────────────────────────────────────────────────────────

/// Synthesize for/against arguments from the top excerpts via the
/// completion backend, with a bounded deadline.
///
/// Deterministic decoding (temperature 0, top_k 1) keeps outputs
/// reproducible for a given excerpt set. A failed call, an expired
/// deadline, and an unparseable response all degrade to the rule-based
/// fallback rather than surfacing an error.
pub async fn synthesize(
    excerpts: &[ExtractedExcerpt],
    backend: &dyn CompletionBackend,
    timeout: Duration,
    max_tokens: u32,
) -> Synthesis {
    let request = CompletionRequest::deterministic(build_prompt(excerpts), max_tokens);

    let result = match tokio::time::timeout(timeout, backend.complete(&request)).await {
        Ok(inner) => inner,
        Err(_) => Err(crate::llm::CompletionError::Timeout(timeout)),
    };

    match result {
        Ok(response) => {
            let parsed = parse_argument_lists(&response);
            if parsed.ambiguous {
                tracing::warn!(
                    backend = backend.name(),
                    response_len = response.len(),
                    "no arguments parsed from completion, using rule-based fallback"
                );
                Synthesis {
                    arguments: fallback_argument_set(excerpts),
                    via_model: false,
                    ambiguous: true,
                }
            } else {
                Synthesis {
                    arguments: ArgumentSet {
                        for_arguments: parsed.for_arguments,
                        against_arguments: parsed.against_arguments,
                    },
                    via_model: true,
                    ambiguous: false,
                }
            }
        }
        Err(e) => {
            tracing::warn!(
                backend = backend.name(),
                error = %e,
                "completion failed, using rule-based fallback"
            );
            Synthesis {
                arguments: fallback_argument_set(excerpts),
                via_model: false,
                ambiguous: false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::MockCompletion;

    fn excerpt(page: u32, text: &str, score: u32) -> ExtractedExcerpt {
        ExtractedExcerpt {
            page,
            text: text.to_string(),
            relevance_score: score,
        }
    }

    fn sample_excerpts() -> Vec<ExtractedExcerpt> {
        vec![
            excerpt(3, "The plaintiff argues the statute violates due process.", 9),
            excerpt(3, "The court has jurisdiction over the claim.", 4),
            excerpt(1, "Counsel moved for summary judgment on all counts.", 3),
        ]
    }

    #[test]
    fn prompt_labels_excerpts_with_pages() {
        let prompt = build_prompt(&sample_excerpts());
        assert!(prompt.contains("legal assistant"));
        assert!(prompt.contains("(Page 3) The plaintiff argues"));
        assert!(prompt.contains("(Page 1) Counsel moved"));
        assert!(prompt.contains("exactly 5 arguments FOR"));
        assert!(prompt.contains("FOR:\n1."));
    }

    #[test]
    fn prompt_clips_long_excerpts() {
        let long = "a".repeat(400);
        let prompt = build_prompt(&[excerpt(1, &long, 2)]);
        assert!(prompt.contains(&"a".repeat(150)));
        assert!(!prompt.contains(&"a".repeat(151)));
    }

    #[test]
    fn parses_numbered_sections() {
        let response = "FOR:\n\
                        1. The statute is unconstitutional (Page 3)\n\
                        2. Precedent favors the plaintiff (Page 2)\n\
                        \n\
                        AGAINST:\n\
                        1. Procedural default bars the claim (Page 1)\n";
        let parsed = parse_argument_lists(response);
        assert!(!parsed.ambiguous);
        assert_eq!(
            parsed.for_arguments,
            vec![
                "The statute is unconstitutional (Page 3)",
                "Precedent favors the plaintiff (Page 2)",
            ]
        );
        assert_eq!(
            parsed.against_arguments,
            vec!["Procedural default bars the claim (Page 1)"]
        );
    }

    #[test]
    fn parses_markdown_decorated_sections() {
        let response = "### Arguments FOR\n\
                        - The filing was timely (Page 4)\n\
                        \n\
                        **AGAINST:**\n\
                        * The damages theory is speculative (Page 2)\n";
        let parsed = parse_argument_lists(response);
        assert!(!parsed.ambiguous);
        assert_eq!(parsed.for_arguments, vec!["The filing was timely (Page 4)"]);
        assert_eq!(
            parsed.against_arguments,
            vec!["The damages theory is speculative (Page 2)"]
        );
    }

    #[test]
    fn bold_marker_with_colon_outside_is_recognized() {
        let response = "**FOR**:\n\
                        1. The statute is narrowly tailored (Page 2)\n\
                        \n\
                        **AGAINST**:\n\
                        1. The statute sweeps too broadly (Page 4)\n";
        let parsed = parse_argument_lists(response);
        assert!(!parsed.ambiguous);
        assert_eq!(
            parsed.for_arguments,
            vec!["The statute is narrowly tailored (Page 2)"]
        );
        assert_eq!(
            parsed.against_arguments,
            vec!["The statute sweeps too broadly (Page 4)"]
        );
    }

    #[test]
    fn items_on_the_marker_line_are_parsed() {
        let response = "FOR: 1. The precedent controls (Page 4)\n\
                        AGAINST: 1. The precedent is distinguishable (Page 2)\n";
        let parsed = parse_argument_lists(response);
        assert!(!parsed.ambiguous);
        assert_eq!(
            parsed.for_arguments,
            vec!["The precedent controls (Page 4)"]
        );
        assert_eq!(
            parsed.against_arguments,
            vec!["The precedent is distinguishable (Page 2)"]
        );
    }

    #[test]
    fn bare_lines_count_as_items_when_no_list_markers() {
        let response = "FOR:\n\
                        The statute cannot stand.\n\
                        Precedent is controlling.\n\
                        AGAINST:\n\
                        The claim is time-barred.\n";
        let parsed = parse_argument_lists(response);
        assert!(!parsed.ambiguous);
        assert_eq!(
            parsed.for_arguments,
            vec!["The statute cannot stand.", "Precedent is controlling."]
        );
        assert_eq!(parsed.against_arguments, vec!["The claim is time-barred."]);
    }

    #[test]
    fn missing_against_section_is_not_ambiguous() {
        let response = "FOR:\n1. The appeal was perfected on time (Page 1)\n";
        let parsed = parse_argument_lists(response);
        assert!(!parsed.ambiguous);
        assert_eq!(parsed.for_arguments.len(), 1);
        assert!(parsed.against_arguments.is_empty());
    }

    #[test]
    fn markerless_response_is_ambiguous() {
        let parsed = parse_argument_lists("The model rambled about something else entirely.");
        assert!(parsed.ambiguous);
        assert!(parsed.for_arguments.is_empty());
        assert!(parsed.against_arguments.is_empty());
    }

    #[test]
    fn prose_starting_with_for_is_not_a_marker() {
        let parsed =
            parse_argument_lists("For the foregoing reasons, the court should rule.\nNothing else.");
        assert!(parsed.ambiguous);
    }

    #[test]
    fn fallback_alternates_sides_and_names_pages() {
        let set = fallback_argument_set(&sample_excerpts());
        assert_eq!(set.for_arguments.len(), 2);
        assert_eq!(set.against_arguments.len(), 1);
        assert!(set.for_arguments[0].contains("page 3"));
        assert!(set.for_arguments[1].contains("page 1"));
        assert!(set.against_arguments[0].contains("page 3"));
    }

    #[test]
    fn fallback_caps_each_side() {
        let excerpts: Vec<ExtractedExcerpt> = (1..=20)
            .map(|p| excerpt(p, "Some sufficiently long paragraph about the case.", 1))
            .collect();
        let set = fallback_argument_set(&excerpts);
        assert_eq!(set.for_arguments.len(), ARGUMENTS_PER_SIDE);
        assert_eq!(set.against_arguments.len(), ARGUMENTS_PER_SIDE);
    }

    #[test]
    fn fallback_on_empty_excerpts_is_empty_but_valid() {
        let set = fallback_argument_set(&[]);
        assert!(set.for_arguments.is_empty());
        assert!(set.against_arguments.is_empty());
    }

    #[tokio::test]
    async fn well_formed_completion_is_used() {
        let backend = MockCompletion::replying(
            "FOR:\n1. The statute violates due process (Page 3)\n\
             AGAINST:\n1. The claim is moot (Page 1)\n",
        );
        let synthesis =
            synthesize(&sample_excerpts(), &backend, Duration::from_secs(5), 256).await;
        assert!(synthesis.via_model);
        assert!(!synthesis.ambiguous);
        assert_eq!(synthesis.arguments.for_arguments.len(), 1);
        assert_eq!(synthesis.arguments.against_arguments.len(), 1);
        assert_eq!(backend.call_count(), 1);
        assert!(backend.prompts()[0].contains("legal assistant"));
    }

    #[tokio::test]
    async fn completion_error_falls_back() {
        let backend = MockCompletion::failing("boom");
        let synthesis =
            synthesize(&sample_excerpts(), &backend, Duration::from_secs(5), 256).await;
        assert!(!synthesis.via_model);
        assert!(!synthesis.ambiguous);
        assert!(!synthesis.arguments.for_arguments.is_empty());
    }

    #[tokio::test]
    async fn slow_completion_times_out_and_falls_back() {
        let backend =
            MockCompletion::replying("FOR:\n1. Too late (Page 1)\n").with_delay(Duration::from_millis(500));
        let synthesis =
            synthesize(&sample_excerpts(), &backend, Duration::from_millis(50), 256).await;
        assert!(!synthesis.via_model);
        assert!(!synthesis.arguments.for_arguments.is_empty());
    }

    #[tokio::test]
    async fn unparseable_completion_falls_back_and_flags_ambiguity() {
        let backend = MockCompletion::replying("I cannot help with that.");
        let synthesis =
            synthesize(&sample_excerpts(), &backend, Duration::from_secs(5), 256).await;
        assert!(!synthesis.via_model);
        assert!(synthesis.ambiguous);
        assert!(!synthesis.arguments.for_arguments.is_empty());
    }
}
