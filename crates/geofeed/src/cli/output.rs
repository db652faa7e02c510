//! Text rendering for CLI output.

use std::fmt::Write;

use crate::summary::ReportSummary;

const ADDRESS_WIDTH: usize = 32;

/// One-line rendering used by `list --format plain`.
#[must_use]
pub fn plain_line(summary: &ReportSummary) -> String {
    format!(
        "{}  {}  {}  ★ {:.2} ({})  ♥ {}{}",
        summary.id,
        summary.posted,
        summary.address,
        summary.rating,
        summary.rating_count,
        summary.like_count,
        marks(summary)
    )
}

/// Aligned table used by `list --format table`.
#[must_use]
pub fn table(summaries: &[ReportSummary]) -> String {
    let id_width = summaries
        .iter()
        .map(|s| s.id.as_str().chars().count())
        .max()
        .unwrap_or(0)
        .max(2);

    let address_width = ADDRESS_WIDTH;

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<id_width$}  {:<18}  {:<address_width$}  {:>6}  {:>5}  {:>5}",
        "ID", "POSTED", "ADDRESS", "RATING", "VOTES", "LIKES"
    );
    for s in summaries {
        let _ = writeln!(
            out,
            "{:<id_width$}  {:<18}  {:<address_width$}  {:>6.2}  {:>5}  {:>5}{}",
            s.id.as_str(),
            s.posted,
            truncate(&s.address, address_width),
            s.rating,
            s.rating_count,
            s.like_count,
            marks(s)
        );
    }
    out
}

/// Multi-line rendering used by `show`.
#[must_use]
pub fn detail(summary: &ReportSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Report {}", summary.id);
    let _ = writeln!(out, "  Address:  {}", summary.address);
    let _ = writeln!(out, "  Posted:   {}", summary.posted);
    let _ = writeln!(out, "  Image:    {}", summary.image_ref);
    let _ = writeln!(
        out,
        "  Rating:   {:.2} from {} ratings",
        summary.rating, summary.rating_count
    );
    let _ = writeln!(out, "  Likes:    {}", summary.like_count);
    let _ = writeln!(
        out,
        "  Actions:  [{}] [{}] [Share]",
        summary.like_label, summary.rate_label
    );
    out
}

fn marks(summary: &ReportSummary) -> String {
    let mut marks = String::new();
    if summary.flags.liked_by_me {
        marks.push_str("  (liked)");
    }
    if summary.flags.rated_by_me {
        marks.push_str("  (rated)");
    }
    marks
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(width.saturating_sub(1)).collect();
    cut.push('…');
    cut
}
