//! Ranking report generation
//!
//! Renders a [`RankReport`] as plain text or as an HTML page:
//! - Optionally, every ranked result per keyword, target rows emphasized
//! - The ranks of the target site per keyword, or a "not found" line
//!
//! Emphasis is `<b>` in HTML and a pair of `!` in plain text.

use crate::config::ReportFormat;
use crate::crawler::{RankRecord, RankReport};

/// Line and emphasis markup of a report format
struct Style {
    format: ReportFormat,
    newline: &'static str,
    bold_open: &'static str,
    bold_close: &'static str,
}

impl Style {
    fn for_format(format: ReportFormat) -> Self {
        match format {
            ReportFormat::Text => Self {
                format,
                newline: "\n",
                bold_open: "!",
                bold_close: "!",
            },
            ReportFormat::Html => Self {
                format,
                newline: "<br>\n",
                bold_open: "<b>",
                bold_close: "</b>",
            },
        }
    }

    fn escape(&self, text: &str) -> String {
        match self.format {
            ReportFormat::Text => text.to_string(),
            ReportFormat::Html => html_escape::encode_text(text).into_owned(),
        }
    }

    /// Wraps `text` in emphasis and ends the line
    fn bold_line(&self, text: &str) -> String {
        format!("{}{}{}{}", self.bold_open, text, self.bold_close, self.newline)
    }
}

/// Formats a report
///
/// # Arguments
///
/// * `report` - The ranks collected by a run
/// * `format` - Plain text or HTML
/// * `show_all_ranks` - Include the full ranked result list of every keyword
pub fn format_report(report: &RankReport, format: ReportFormat, show_all_ranks: bool) -> String {
    let style = Style::for_format(format);
    let target = style.escape(&report.target);
    let mut out = String::new();

    if format == ReportFormat::Html {
        out.push_str("<html><body>\n");
    }

    out.push_str(&format!(
        "{}{}{}",
        style.newline,
        style.bold_line(&format!(
            " Rank check for {} via {} ",
            target,
            report.locale.search_domain()
        )),
        style.newline
    ));

    if show_all_ranks {
        for record in &report.records {
            format_rank_list(&mut out, record, &report.target, &style);
        }
    }

    for keyword in &report.keywords {
        let escaped = style.escape(keyword);
        let matches: Vec<_> = report.matches_for(keyword).collect();

        if matches.is_empty() {
            out.push_str(style.newline);
            out.push_str(&style.bold_line(&format!(
                "The specified site was not found in the search results for keyword \"{}\". ",
                escaped
            )));
            continue;
        }

        out.push_str(style.newline);
        out.push_str(style.newline);
        out.push_str(&style.bold_line(&format!(
            "Ranking information for keyword \"{}\" and website \"{}\" [{} / {}] ",
            escaped, target, report.locale.country, report.locale.language
        )));
        for m in matches {
            out.push_str(&format!(
                "Rank {} for URL {}{}",
                m.rank,
                style.escape(&m.url),
                style.newline
            ));
        }
    }

    if format == ReportFormat::Html {
        out.push_str("</body></html>\n");
    }

    out
}

fn format_rank_list(out: &mut String, record: &RankRecord, target: &str, style: &Style) {
    out.push_str(style.newline);
    out.push_str(style.newline);
    out.push_str(&style.bold_line(&format!(
        "Ranking information for keyword \"{}\" ",
        style.escape(&record.keyword)
    )));
    out.push_str(&style.bold_line("Rank - Website - Title"));

    for (rank, result) in record.ranked() {
        let line = format!(
            "{} - {} - {} ",
            rank,
            style.escape(&result.url),
            style.escape(&result.title)
        );

        if result.url.contains(target) {
            out.push_str(&style.bold_line(&line));
        } else {
            out.push_str(&line);
            out.push_str(style.newline);
        }
    }
}

/// Prints a report to stdout
pub fn print_report(report: &RankReport, format: ReportFormat, show_all_ranks: bool) {
    print!("{}", format_report(report, format, show_all_ranks));
}
