use super::loader::{NormalizedDocument, RawDocument};
use super::repair::repair_table_structure;
use super::rewrite::apply_passes;
use crate::utils::error::WorkerError;
use anyhow::Result;
use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Node};
use std::borrow::Cow;
use tracing::debug;

/// Elements removed together with everything inside them.
const DROPPED_TAGS: &[&str] = &[
    "script", "style", "meta", "head", "noscript", "link", "ix:header", "img",
];

/// Presentational or inline-XBRL wrappers: markup removed, children kept.
const UNWRAPPED_TAGS: &[&str] = &[
    "ix:nonnumeric", "ix:continuation", "span", "div", "font", "b", "i", "u", "center",
];

/// Elements rendered as their own paragraph.
const BLOCK_TAGS: &[&str] = &[
    "p", "blockquote", "section", "article", "main", "header", "footer", "address", "pre",
];

const MAX_COLSPAN: usize = 64;

/// Element nesting rendered structurally; deeper subtrees are flattened to text.
const MAX_DEPTH: usize = 256;

static PROCESSING_INSTRUCTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<\?xml.*?\?>").expect("processing instruction regex"));
static HIDDEN_STYLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)display:\s*none").expect("hidden style regex"));

pub struct MarkupNormalizer;

impl MarkupNormalizer {
    /// Normalize a raw filing into repaired Markdown.
    ///
    /// Fails only when the payload is empty or renders to no text at all;
    /// malformed fragments inside an otherwise usable document are dropped.
    pub fn normalize(raw: &RawDocument) -> Result<NormalizedDocument> {
        if raw.payload.iter().all(u8::is_ascii_whitespace) {
            return Err(WorkerError::ParsingError(format!(
                "{}: empty markup payload ({:?})",
                raw.ticker, raw.path
            ))
            .into());
        }

        let (markup, encoding) = Self::decode_text(&raw.payload);
        debug!(
            "Normalizing {} ({} bytes, {})",
            raw.ticker,
            raw.payload.len(),
            encoding.name()
        );

        let content = Self::normalize_markup(&markup);
        if content.trim().is_empty() {
            return Err(WorkerError::ParsingError(format!(
                "{}: no text survived normalization ({:?})",
                raw.ticker, raw.path
            ))
            .into());
        }

        debug!("Normalized {} into {} chars", raw.ticker, content.len());

        Ok(NormalizedDocument {
            ticker: raw.ticker.clone(),
            source: raw.path.clone(),
            content,
        })
    }

    /// Markup in, repaired Markdown out. Total over any input string.
    pub fn normalize_markup(markup: &str) -> String {
        let markup = PROCESSING_INSTRUCTION.replace_all(markup, "");
        let document = Html::parse_document(&markup);

        let mut writer = MarkdownWriter::new(false);
        writer.render_element(document.root_element());

        let rendered = writer.finish();
        repair_table_structure(&apply_passes(&rendered))
            .trim()
            .to_string()
    }

    /// Decode bytes, falling back to Windows-1252 for legacy filings
    fn decode_text(bytes: &[u8]) -> (Cow<'_, str>, &'static Encoding) {
        match std::str::from_utf8(bytes) {
            Ok(text) => (Cow::Borrowed(text), UTF_8),
            Err(_) => {
                let (text, _, _) = WINDOWS_1252.decode(bytes);
                (text, WINDOWS_1252)
            }
        }
    }
}

fn is_dropped(element: ElementRef<'_>) -> bool {
    let value = element.value();
    DROPPED_TAGS.contains(&value.name())
        || value
            .attr("style")
            .map_or(false, |style| HIDDEN_STYLE.is_match(style))
}

fn heading_level(name: &str) -> Option<usize> {
    match name {
        "h1" => Some(1),
        "h2" => Some(2),
        "h3" => Some(3),
        "h4" => Some(4),
        "h5" => Some(5),
        "h6" => Some(6),
        _ => None,
    }
}

/// Accumulates Markdown while walking the parsed tree.
struct MarkdownWriter {
    out: String,
    /// Inline mode renders line breaks and blocks as plain spaces (table cells, headings).
    inline: bool,
    depth: usize,
}

impl MarkdownWriter {
    fn new(inline: bool) -> Self {
        Self {
            out: String::new(),
            inline,
            depth: 0,
        }
    }

    fn finish(self) -> String {
        self.out.trim().to_string()
    }

    /// Flattened single-line text of an element's subtree.
    fn inline_text(&self, element: ElementRef<'_>) -> String {
        let mut writer = MarkdownWriter::new(true);
        writer.depth = self.depth;
        writer.render_children(element);
        writer.out.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    fn render_children(&mut self, element: ElementRef<'_>) {
        for child in element.children() {
            if let Some(child_element) = ElementRef::wrap(child) {
                self.render_element(child_element);
            } else if let Node::Text(text) = child.value() {
                self.push_text(text);
            }
        }
    }

    fn render_element(&mut self, element: ElementRef<'_>) {
        if is_dropped(element) {
            return;
        }

        // Unclosed inline tags can nest thousands deep; the walk must not follow them.
        if self.depth >= MAX_DEPTH {
            for text in element.text() {
                self.push_text(text);
            }
            return;
        }

        self.depth += 1;
        self.render_structure(element);
        self.depth -= 1;
    }

    fn render_structure(&mut self, element: ElementRef<'_>) {
        let name = element.value().name();

        if let Some(level) = heading_level(name) {
            let text = self.inline_text(element);
            if !text.is_empty() {
                self.block_break();
                self.out.push_str(&"#".repeat(level));
                self.out.push(' ');
                self.out.push_str(&text);
                self.block_break();
            }
            return;
        }

        match name {
            "br" => self.line_break_backslash(),
            "hr" => {
                self.block_break();
                self.out.push_str("---");
                self.block_break();
            }
            "table" => self.render_table(element),
            "ul" => self.render_list(element, false),
            "ol" => self.render_list(element, true),
            "strong" => self.render_emphasis(element, "**"),
            "em" => self.render_emphasis(element, "*"),
            name if BLOCK_TAGS.contains(&name) => {
                self.block_break();
                self.render_children(element);
                self.block_break();
            }
            name if UNWRAPPED_TAGS.contains(&name) => self.render_children(element),
            // Anchors and unknown elements keep their text only.
            _ => self.render_children(element),
        }
    }

    fn render_emphasis(&mut self, element: ElementRef<'_>, marker: &str) {
        let text = self.inline_text(element);
        if text.is_empty() {
            return;
        }
        self.space();
        self.out.push_str(marker);
        self.out.push_str(&text);
        self.out.push_str(marker);
    }

    fn render_list(&mut self, list: ElementRef<'_>, ordered: bool) {
        self.block_break();
        let items = list
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|item| item.value().name() == "li" && !is_dropped(*item));

        for (position, item) in items.enumerate() {
            let text = self.inline_text(item);
            if text.is_empty() {
                continue;
            }
            self.line_break();
            if ordered {
                self.out.push_str(&format!("{}. ", position + 1));
            } else {
                self.out.push_str("* ");
            }
            self.out.push_str(&text);
        }
        self.block_break();
    }

    fn render_table(&mut self, table: ElementRef<'_>) {
        let rows: Vec<Vec<String>> = table_rows(table)
            .into_iter()
            .map(|row| row_cells(row, &*self))
            .filter(|cells| !cells.is_empty())
            .collect();

        if rows.is_empty() {
            return;
        }

        if self.inline {
            for row in &rows {
                self.push_text(&row.join(" "));
                self.space();
            }
            return;
        }

        self.block_break();
        for (index, row) in rows.iter().enumerate() {
            self.out.push_str(&format_row(row));
            self.out.push('\n');
            if index == 0 {
                self.out.push_str(&format_row(&vec!["---".to_string(); row.len()]));
                self.out.push('\n');
            }
        }
        self.block_break();
    }

    fn push_text(&mut self, raw: &str) {
        let mut words = raw.split_whitespace().peekable();
        if words.peek().is_none() {
            if !raw.is_empty() {
                self.space();
            }
            return;
        }

        if raw.starts_with(char::is_whitespace) {
            self.space();
        }
        let joined = words.collect::<Vec<_>>().join(" ");
        self.out.push_str(&joined);
        if raw.ends_with(char::is_whitespace) {
            self.space();
        }
    }

    fn space(&mut self) {
        if !self.out.is_empty() && !self.out.ends_with(char::is_whitespace) {
            self.out.push(' ');
        }
    }

    fn trim_trailing_spaces(&mut self) {
        let len = self.out.trim_end_matches(' ').len();
        self.out.truncate(len);
    }

    fn line_break(&mut self) {
        if self.inline {
            self.space();
            return;
        }
        self.trim_trailing_spaces();
        if !self.out.is_empty() && !self.out.ends_with('\n') {
            self.out.push('\n');
        }
    }

    /// `<br>` in backslash style: `\` then newline.
    fn line_break_backslash(&mut self) {
        if self.inline {
            self.space();
            return;
        }
        self.trim_trailing_spaces();
        self.out.push_str("\\\n");
    }

    fn block_break(&mut self) {
        if self.inline {
            self.space();
            return;
        }
        self.trim_trailing_spaces();
        if self.out.is_empty() {
            return;
        }
        while !self.out.ends_with("\n\n") {
            self.out.push('\n');
        }
    }
}

/// `<tr>` elements of a table, looking through row groups but not into nested tables.
fn table_rows(table: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    let mut rows = Vec::new();
    for child in table.children().filter_map(ElementRef::wrap) {
        if is_dropped(child) {
            continue;
        }
        match child.value().name() {
            "tr" => rows.push(child),
            "thead" | "tbody" | "tfoot" => rows.extend(
                child
                    .children()
                    .filter_map(ElementRef::wrap)
                    .filter(|row| row.value().name() == "tr" && !is_dropped(*row)),
            ),
            _ => {}
        }
    }
    rows
}

/// Cell texts of a row; a `colspan=n` cell is followed by `n - 1` empty cells.
fn row_cells(row: ElementRef<'_>, writer: &MarkdownWriter) -> Vec<String> {
    let mut cells = Vec::new();
    for cell in row.children().filter_map(ElementRef::wrap) {
        if !matches!(cell.value().name(), "td" | "th") || is_dropped(cell) {
            continue;
        }
        cells.push(writer.inline_text(cell));

        let span = cell
            .value()
            .attr("colspan")
            .and_then(|raw| raw.trim().parse::<usize>().ok())
            .unwrap_or(1)
            .clamp(1, MAX_COLSPAN);
        cells.extend(std::iter::repeat(String::new()).take(span - 1));
    }
    cells
}

fn format_row(cells: &[String]) -> String {
    format!("| {} |", cells.join(" | "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn raw(ticker: &str, html: &str) -> RawDocument {
        RawDocument {
            ticker: ticker.to_string(),
            path: PathBuf::from(format!("html10k/{}.html", ticker)),
            payload: html.as_bytes().to_vec(),
        }
    }

    #[test]
    fn test_strips_noise_and_hidden_elements() {
        let html = r#"<?xml version="1.0" encoding="utf-8"?>
            <html><head><title>10-K</title><style>p{}</style></head>
            <body>
              <ix:header><ix:hidden>dei:EntityCentralIndexKey</ix:hidden></ix:header>
              <script>var x = 1;</script>
              <div style="DISPLAY: None">hidden facts</div>
              <p>Visible <img src="logo.png" alt="Logo"> text</p>
              <noscript>enable js</noscript>
            </body></html>"#;

        let output = MarkupNormalizer::normalize_markup(html);

        assert_eq!(output, "Visible text");
    }

    #[test]
    fn test_unwraps_presentational_tags() {
        let html = "<p><span><b>Net</b> <font>sales</font></span> <i>increased</i> \
                    <ix:nonNumeric name=\"x\">8%</ix:nonNumeric></p>";
        assert_eq!(
            MarkupNormalizer::normalize_markup(html),
            "Net sales increased 8%"
        );
    }

    #[test]
    fn test_headings_are_atx() {
        let html = "<h1>Part I</h1><h2>Item 1. <span>Business</span></h2><p>We make things.</p>";
        assert_eq!(
            MarkupNormalizer::normalize_markup(html),
            "# Part I\n\n## Item 1. Business\n\nWe make things."
        );
    }

    #[test]
    fn test_line_breaks_use_backslash() {
        let html = "<p>One<br>Two</p>";
        assert_eq!(MarkupNormalizer::normalize_markup(html), "One\\\nTwo");
    }

    #[test]
    fn test_anchor_text_kept_without_link() {
        let html = r##"<p>See <a href="#item7">Item 7</a>.</p>"##;
        assert_eq!(MarkupNormalizer::normalize_markup(html), "See Item 7.");
    }

    #[test]
    fn test_lists_render_items() {
        let html = "<ul><li>Risk one</li><li>Risk two</li></ul><ol><li>A</li><li>B</li></ol>";
        assert_eq!(
            MarkupNormalizer::normalize_markup(html),
            "* Risk one\n* Risk two\n\n1. A\n2. B"
        );
    }

    #[test]
    fn test_spacer_row_table_is_repaired() {
        // The blank first row is the header as rendered; once it is deleted the
        // separator sits above the real header and must be swapped back.
        let html = r#"<table>
            <tr><td>&#160;</td><td></td><td></td></tr>
            <tr><td>Fiscal Year</td><td colspan="2">Revenue</td></tr>
            <tr><td>2024</td><td>$</td><td>391,035</td></tr>
        </table>"#;

        let output = MarkupNormalizer::normalize_markup(html);

        assert_eq!(
            output,
            "| Fiscal Year | Revenue |\n| --- | --- |\n| 2024 | $391,035 |"
        );
    }

    #[test]
    fn test_table_of_contents_collapsed() {
        let html = "<p>Table of Contents</p><h2>Item 1</h2><p>Body</p>\
                    <p><a href=\"#toc\">Table of Contents</a></p><h2>Item 2</h2>";
        assert_eq!(
            MarkupNormalizer::normalize_markup(html),
            "# Table of Contents\n\n## Item 1\n\nBody\n\n## Item 2"
        );
    }

    #[test]
    fn test_no_line_has_consecutive_empty_cells() {
        let html = r#"<table>
            <tr><td></td><td>Q1</td><td></td><td></td><td>Q2</td></tr>
            <tr><td>Sales</td><td></td><td>10</td><td></td><td></td><td>12</td></tr>
            <tr><td></td><td></td><td></td></tr>
            <tr><td colspan="6">Total</td></tr>
        </table>"#;

        let output = MarkupNormalizer::normalize_markup(html);
        let empty_run = Regex::new(r"\|[^\S\n]*\|[^\S\n]*\|").unwrap();

        for line in output.lines() {
            assert!(!empty_run.is_match(line), "consecutive empty cells in {:?}", line);
        }
    }

    #[test]
    fn test_normalize_rejects_empty_payload() {
        let err = MarkupNormalizer::normalize(&raw("BAD", "   \n")).unwrap_err();
        assert!(err.to_string().contains("empty markup payload"));

        let err = MarkupNormalizer::normalize(&raw("BAD", "<html><script>x</script></html>")).unwrap_err();
        assert!(err.to_string().contains("no text survived"));
    }

    #[test]
    fn test_normalize_keeps_ticker_and_source() {
        let doc = MarkupNormalizer::normalize(&raw("AAPL", "<p>Apple Inc.</p>")).unwrap();
        assert_eq!(doc.ticker, "AAPL");
        assert_eq!(doc.source, PathBuf::from("html10k/AAPL.html"));
        assert_eq!(doc.content, "Apple Inc.");
    }

    #[test]
    fn test_windows_1252_payload_decodes() {
        let mut payload = b"<p>Caf".to_vec();
        payload.push(0xE9); // e-acute in Windows-1252, invalid as UTF-8
        payload.extend_from_slice(b" revenue</p>");

        let doc = MarkupNormalizer::normalize(&RawDocument {
            ticker: "CAFE".to_string(),
            path: PathBuf::from("html10k/CAFE.html"),
            payload,
        })
        .unwrap();

        assert_eq!(doc.content, "Caf\u{e9} revenue");
    }

    /// Runs on a thread with the same stack as a blocking-pool worker.
    fn normalize_on_small_stack(html: String) -> String {
        std::thread::Builder::new()
            .stack_size(2 * 1024 * 1024)
            .spawn(move || MarkupNormalizer::normalize_markup(&html))
            .unwrap()
            .join()
            .unwrap()
    }

    #[test]
    fn test_unclosed_font_tags_do_not_exhaust_stack() {
        let html = format!("<p>{}x</p>", "<font size=2>a ".repeat(10_000));

        let output = normalize_on_small_stack(html);

        assert_eq!(output.split_whitespace().filter(|w| *w == "a").count(), 10_000);
        assert!(output.ends_with('x'));
    }

    #[test]
    fn test_deeply_nested_blocks_flatten_to_text() {
        let html = format!("{}deep{}", "<div>".repeat(5000), "</div>".repeat(5000));
        assert_eq!(normalize_on_small_stack(html), "deep");
    }

    #[test]
    fn test_shallow_nesting_keeps_structure() {
        let html = format!(
            "{}<h2>Item 7</h2><p>Body</p>{}",
            "<div>".repeat(MAX_DEPTH / 2),
            "</div>".repeat(MAX_DEPTH / 2)
        );
        assert_eq!(MarkupNormalizer::normalize_markup(&html), "## Item 7\n\nBody");
    }
}
