//! Ordered text rewrites applied to rendered Markdown before table repair.
//!
//! Order matters: cell glue must run before the squeeze (a `$` cell is not
//! empty), the squeeze before empty-row removal (a squeezed row is a lone
//! `|`), and blank-line collapsing last so removed rows leave no gaps.
//! Whitespace inside table patterns is horizontal only; a pass never joins
//! two lines.

use once_cell::sync::Lazy;
use regex::{NoExpand, Regex};
use tracing::trace;

const TABLE_OF_CONTENTS: &str = "Table of Contents";

/// A named, independently testable rewrite over the whole document text.
#[derive(Clone, Copy)]
pub struct RewritePass {
    pub name: &'static str,
    pub apply: fn(&str) -> String,
}

impl std::fmt::Debug for RewritePass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RewritePass").field("name", &self.name).finish()
    }
}

pub const POST_PASSES: [RewritePass; 5] = [
    RewritePass { name: "table_of_contents", apply: collapse_table_of_contents },
    RewritePass { name: "financial_glue", apply: glue_financial_cells },
    RewritePass { name: "squeeze_empty_cells", apply: squeeze_empty_cells },
    RewritePass { name: "drop_empty_rows", apply: drop_empty_rows },
    RewritePass { name: "collapse_blank_lines", apply: collapse_blank_lines },
];

/// Run every pass of [`POST_PASSES`] in order.
pub fn apply_passes(text: &str) -> String {
    POST_PASSES.iter().fold(text.to_string(), |acc, pass| {
        let out = (pass.apply)(&acc);
        trace!(pass = pass.name, before = acc.len(), after = out.len(), "rewrite pass");
        out
    })
}

static DOLLAR_CELL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\|[^\S\r\n]*\$[^\S\r\n]*\|[^\S\r\n]*").expect("dollar cell regex"));
static PERCENT_CELL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\|[^\S\r\n]*%[^\S\r\n]*\|").expect("percent cell regex"));
static OPEN_PAREN_CELL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\|[^\S\r\n]*\([^\S\r\n]*\|[^\S\r\n]*").expect("open paren regex"));
static CLOSE_PAREN_CELL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\|[^\S\r\n]*\)[^\S\r\n]*\|").expect("close paren regex"));
static EMPTY_CELL_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\|([^\S\r\n]*\|)+").expect("empty cell regex"));
static EMPTY_ROW: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[^\S\r\n]*\|(?:[^\S\r\n]|\|)*$").expect("empty row regex"));
static BLANK_LINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("blank lines regex"));

/// Keep the first "Table of Contents" as a top-level heading, delete the rest.
pub fn collapse_table_of_contents(text: &str) -> String {
    let Some(pos) = text.find(TABLE_OF_CONTENTS) else {
        return text.to_string();
    };

    let (head, tail) = text.split_at(pos);
    let rest = tail[TABLE_OF_CONTENTS.len()..].replace(TABLE_OF_CONTENTS, "");
    format!("{head}# {TABLE_OF_CONTENTS}{rest}")
}

/// Merge `$`, `%`, `(` and `)` cells into the neighbouring value cell.
pub fn glue_financial_cells(text: &str) -> String {
    let text = DOLLAR_CELL.replace_all(text, NoExpand("| $"));
    let text = PERCENT_CELL.replace_all(&text, "% |");
    let text = OPEN_PAREN_CELL.replace_all(&text, "| (");
    CLOSE_PAREN_CELL.replace_all(&text, ") |").into_owned()
}

/// Collapse every run of empty cells down to a single pipe.
pub fn squeeze_empty_cells(text: &str) -> String {
    EMPTY_CELL_RUN.replace_all(text, "|").into_owned()
}

/// Blank out rows made only of pipes and whitespace.
pub fn drop_empty_rows(text: &str) -> String {
    EMPTY_ROW.replace_all(text, "").into_owned()
}

pub fn collapse_blank_lines(text: &str) -> String {
    BLANK_LINES.replace_all(text, "\n\n").into_owned()
}
