use std::io::Write;

use advocate_core::{Analysis, AnalysisSource};
use owo_colors::OwoColorize;

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

/// Print the report banner and document metadata.
pub fn print_report_header(
    w: &mut dyn Write,
    file_name: &str,
    analysis: &Analysis,
    color: ColorMode,
) -> std::io::Result<()> {
    let sep = "=".repeat(60);
    if color.enabled() {
        writeln!(w, "{}", sep.bold())?;
        writeln!(w, "{} {}", "BRIEF ANALYSIS:".bold().cyan(), file_name.bold())?;
        writeln!(w, "{}", sep.bold())?;
    } else {
        writeln!(w, "{}", sep)?;
        writeln!(w, "BRIEF ANALYSIS: {}", file_name)?;
        writeln!(w, "{}", sep)?;
    }
    writeln!(w)?;

    let hash_line = format!("Content hash: {}", analysis.content_hash);
    if color.enabled() {
        writeln!(w, "{}", hash_line.dimmed())?;
    } else {
        writeln!(w, "{}", hash_line)?;
    }

    match analysis.source {
        AnalysisSource::Cache => {
            let msg = "Source: cache (document not re-read)";
            if color.enabled() {
                writeln!(w, "{}", msg.cyan())?;
            } else {
                writeln!(w, "{}", msg)?;
            }
        }
        AnalysisSource::Model => {
            writeln!(
                w,
                "Pages: {} total, {} sampled",
                analysis.page_count,
                analysis.pages_sampled.len()
            )?;
            if color.enabled() {
                writeln!(w, "Source: {}", "model synthesis".green())?;
            } else {
                writeln!(w, "Source: model synthesis")?;
            }
        }
        AnalysisSource::RuleBased => {
            writeln!(
                w,
                "Pages: {} total, {} sampled",
                analysis.page_count,
                analysis.pages_sampled.len()
            )?;
            if color.enabled() {
                writeln!(w, "Source: {}", "rule-based synthesis".yellow())?;
            } else {
                writeln!(w, "Source: rule-based synthesis")?;
            }
        }
    }

    if analysis.ambiguous {
        let msg = "Note: the model replied but its answer could not be parsed into argument lists";
        if color.enabled() {
            writeln!(w, "{}", msg.yellow())?;
        } else {
            writeln!(w, "{}", msg)?;
        }
    }

    writeln!(w)?;
    Ok(())
}

/// Print the for/against argument lists.
pub fn print_arguments(
    w: &mut dyn Write,
    analysis: &Analysis,
    color: ColorMode,
) -> std::io::Result<()> {
    print_argument_side(
        w,
        "ARGUMENTS FOR",
        &analysis.arguments.for_arguments,
        true,
        color,
    )?;
    print_argument_side(
        w,
        "ARGUMENTS AGAINST",
        &analysis.arguments.against_arguments,
        false,
        color,
    )?;
    Ok(())
}

fn print_argument_side(
    w: &mut dyn Write,
    heading: &str,
    arguments: &[String],
    supporting: bool,
    color: ColorMode,
) -> std::io::Result<()> {
    let sep = "-".repeat(60);
    if color.enabled() {
        if supporting {
            writeln!(w, "{}", heading.bold().green())?;
        } else {
            writeln!(w, "{}", heading.bold().red())?;
        }
        writeln!(w, "{}", sep.dimmed())?;
    } else {
        writeln!(w, "{}", heading)?;
        writeln!(w, "{}", sep)?;
    }

    if arguments.is_empty() {
        if color.enabled() {
            writeln!(w, "  {}", "(none found)".dimmed())?;
        } else {
            writeln!(w, "  (none found)")?;
        }
    } else {
        for (i, argument) in arguments.iter().enumerate() {
            writeln!(w, "  {}. {}", i + 1, argument)?;
        }
    }
    writeln!(w)?;
    Ok(())
}

/// Print the ranked excerpt list. Cache hits carry no excerpts, so nothing
/// is printed for them.
pub fn print_excerpts(
    w: &mut dyn Write,
    analysis: &Analysis,
    color: ColorMode,
) -> std::io::Result<()> {
    if analysis.excerpts.is_empty() {
        return Ok(());
    }

    let sep = "-".repeat(60);
    if color.enabled() {
        writeln!(w, "{}", "KEY EXCERPTS".bold())?;
        writeln!(w, "{}", sep.dimmed())?;
    } else {
        writeln!(w, "KEY EXCERPTS")?;
        writeln!(w, "{}", sep)?;
    }

    for excerpt in &analysis.excerpts {
        let label = format!("[Page {}]", excerpt.page);
        let display = truncate(&excerpt.text, 300);
        if color.enabled() {
            writeln!(
                w,
                "{} {}",
                label.bold().yellow(),
                format!("(score {})", excerpt.relevance_score).dimmed()
            )?;
        } else {
            writeln!(w, "{} (score {})", label, excerpt.relevance_score)?;
        }
        writeln!(w, "  {}", display)?;
        writeln!(w)?;
    }
    Ok(())
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() > max_chars {
        let clipped: String = s.chars().take(max_chars).collect();
        format!("{}...", clipped)
    } else {
        s.to_string()
    }
}
