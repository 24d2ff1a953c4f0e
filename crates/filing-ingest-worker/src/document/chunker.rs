use crate::config::ChunkingConfig;
use crate::utils::error::WorkerError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use text_splitter::{Characters, ChunkConfig, TextSplitter};
use tracing::debug;

/// Heading labels in effect for a section, levels 1 to 3.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderContext {
    pub h1: Option<String>,
    pub h2: Option<String>,
    pub h3: Option<String>,
}

impl HeaderContext {
    fn set(&mut self, level: usize, title: &str) {
        let title = Some(title.to_string());
        match level {
            1 => self.h1 = title,
            2 => self.h2 = title,
            _ => self.h3 = title,
        }
    }
}

/// Body text under one heading context.
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub headers: HeaderContext,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct Chunk {
    /// Position within the document, zero-based.
    pub index: usize,
    pub content: String,
    pub char_count: usize,
    /// Byte offset of `content` within its section body.
    pub offset: usize,
    pub headers: HeaderContext,
}

/// Level and title of an ATX heading line of level 1 to 3.
fn parse_heading(line: &str) -> Option<(usize, &str)> {
    let trimmed = line.trim_start();
    let level = trimmed.chars().take_while(|c| *c == '#').count();
    if !(1..=3).contains(&level) {
        return None;
    }
    let rest = &trimmed[level..];
    if !rest.starts_with(' ') {
        return None;
    }
    Some((level, rest.trim()))
}

fn is_fence(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("```") || trimmed.starts_with("~~~")
}

/// Split Markdown on `#`, `##` and `###` headings outside fenced code.
///
/// Heading lines leave the body and become header labels. A heading replaces
/// the label of its own level only. Sections whose body is blank are dropped.
pub fn split_sections(markdown: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut headers = HeaderContext::default();
    let mut body: Vec<&str> = Vec::new();
    let mut in_fence = false;

    for line in markdown.lines() {
        if is_fence(line) {
            in_fence = !in_fence;
            body.push(line);
            continue;
        }

        let heading = if in_fence { None } else { parse_heading(line) };
        match heading {
            Some((level, title)) => {
                push_section(&mut sections, &headers, &body);
                body.clear();
                headers.set(level, title);
            }
            None => body.push(line),
        }
    }
    push_section(&mut sections, &headers, &body);

    sections
}

fn push_section(sections: &mut Vec<Section>, headers: &HeaderContext, body: &[&str]) {
    let text = body.join("\n");
    if text.trim().is_empty() {
        return;
    }
    sections.push(Section {
        headers: headers.clone(),
        body: text,
    });
}

/// Two-stage chunker: heading sections first, then bounded character windows.
pub struct SectionChunker {
    splitter: TextSplitter<Characters>,
}

impl SectionChunker {
    pub fn new(config: &ChunkingConfig) -> Result<Self> {
        if config.size == 0 || config.overlap >= config.size {
            return Err(WorkerError::ChunkingError(format!(
                "invalid chunk window: size {} overlap {}",
                config.size, config.overlap
            ))
            .into());
        }

        let chunk_config = ChunkConfig::new(config.size)
            .with_overlap(config.overlap)
            .map_err(|e| WorkerError::ChunkingError(e.to_string()))?
            .with_trim(false);

        Ok(Self {
            splitter: TextSplitter::new(chunk_config),
        })
    }

    /// Chunk normalized Markdown, preserving document order.
    pub fn chunk(&self, markdown: &str) -> Vec<Chunk> {
        if markdown.trim().is_empty() {
            return Vec::new();
        }

        let sections = split_sections(markdown);
        debug!(
            "Chunking {} chars across {} sections",
            markdown.len(),
            sections.len()
        );

        let mut chunks = Vec::new();
        for section in &sections {
            for (offset, content) in self.splitter.chunk_indices(&section.body) {
                if content.trim().is_empty() {
                    continue;
                }
                chunks.push(Chunk {
                    index: chunks.len(),
                    content: content.to_string(),
                    char_count: content.chars().count(),
                    offset,
                    headers: section.headers.clone(),
                });
            }
        }

        debug!("Created {} chunks", chunks.len());

        chunks
    }
}
