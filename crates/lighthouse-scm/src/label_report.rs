//! Tracking-comment format for providers without pull-request labels.
//!
//! The comment body is a persistent contract on the remote system: a hidden
//! marker line, a heading, and a single-column pipe table listing every
//! applied label. `parse_label_report` is the exact inverse of
//! `render_label_report`.

use std::collections::BTreeSet;

pub const LABEL_REPORT_MARKER: &str = "<!-- label report -->";

/// True when `body` is a label tracking comment.
pub fn is_label_report(body: &str) -> bool {
    body.lines()
        .next()
        .is_some_and(|line| line.trim() == LABEL_REPORT_MARKER)
}

/// Renders the tracking comment for `labels`, sorted and de-duplicated.
pub fn render_label_report<'a>(labels: impl IntoIterator<Item = &'a str>) -> String {
    let labels = labels
        .into_iter()
        .map(str::trim)
        .filter(|label| !label.is_empty())
        .collect::<BTreeSet<_>>();
    let mut body = String::new();
    body.push_str(LABEL_REPORT_MARKER);
    body.push_str("\n**Labels**\n\n| Label |\n| --- |\n");
    for label in labels {
        body.push_str("| ");
        body.push_str(&label.replace('|', "\\|"));
        body.push_str(" |\n");
    }
    body.push('\n');
    body
}

/// Reads the label rows between the `---` separator row and the first blank line.
pub fn parse_label_report(body: &str) -> BTreeSet<String> {
    let mut labels = BTreeSet::new();
    if !is_label_report(body) {
        return labels;
    }
    let mut in_table = false;
    for line in body.lines() {
        let trimmed = line.trim();
        if !in_table {
            if trimmed.starts_with('|') && trimmed.contains("---") {
                in_table = true;
            }
            continue;
        }
        if trimmed.is_empty() {
            break;
        }
        let Some(cell) = trimmed
            .strip_prefix('|')
            .and_then(|rest| rest.strip_suffix('|'))
        else {
            continue;
        };
        let label = cell.trim().replace("\\|", "|");
        if !label.is_empty() {
            labels.insert(label);
        }
    }
    labels
}
