//! Header/separator repair for pipe-delimited Markdown tables.
//!
//! HTML-to-Markdown conversion of filings regularly emits the `| --- |` row
//! above the row it belongs under (a blank spacer row was the table's first
//! row and has since been deleted), or leaves a separator whose width no
//! longer matches the header after empty cells were squeezed out. The repair
//! is a single forward pass: it swaps misordered pairs and regenerates the
//! separator from the width of its header.

use once_cell::sync::Lazy;
use regex::Regex;

static SEPARATOR_ROW: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\|[\s\-|:]+\|\s*$").expect("separator row regex"));

/// A pipe-delimited row whose cells hold only hyphens, colons and whitespace.
pub fn is_separator_row(line: &str) -> bool {
    SEPARATOR_ROW.is_match(line) && line.contains('-')
}

/// Separator sized from a reference row, `None` when the row is too narrow.
fn separator_for(row: &str) -> Option<String> {
    let columns = row.matches('|').count().checked_sub(1)?;
    if columns == 0 {
        return None;
    }
    Some(format!("|{}|", vec![" --- "; columns].join("|")))
}

/// Restore header-then-separator order and matching column counts in every
/// table block of `markdown`. Pure and total; its output is a fixed point.
///
/// A separator only counts as misordered when it opens a block, so a
/// separator already sitting under its header never trades places with the
/// first body row.
pub fn repair_table_structure(markdown: &str) -> String {
    let lines: Vec<&str> = markdown.split('\n').collect();
    let mut fixed: Vec<String> = Vec::with_capacity(lines.len());
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];

        if !is_separator_row(line) {
            fixed.push(line.to_string());
            i += 1;
            continue;
        }

        let opens_block = fixed.last().map_or(true, |prev| !prev.contains('|'));

        // Separator emitted above its header: swap and resize.
        if let (true, Some(next)) = (opens_block, lines.get(i + 1)) {
            if next.contains('|') && !is_separator_row(next) {
                let separator = separator_for(next).unwrap_or_else(|| line.to_string());
                fixed.push(next.to_string());
                fixed.push(separator);
                i += 2;
                continue;
            }
        }

        // Separator already under its header, possibly with the wrong width.
        let resized = fixed
            .last()
            .filter(|prev| prev.contains('|'))
            .and_then(|prev| separator_for(prev));
        fixed.push(resized.unwrap_or_else(|| line.to_string()));
        i += 1;
    }

    fixed.join("\n")
}
