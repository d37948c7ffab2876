use async_trait::async_trait;

use super::{ChunkingStrategy, Chunker, char_len, split_by_size, split_paragraphs, validate_text};
use crate::document::{Chunk, Document};
use crate::error::Result;

/// Section path of text that precedes the first heading.
pub const ROOT_SECTION: &str = "(root)";

const WHOLE_SECTION_CONFIDENCE: f32 = 1.0;
const PARAGRAPH_PACK_CONFIDENCE: f32 = 0.85;
const FIXED_SIZE_CONFIDENCE: f32 = 0.5;

/// Splits text on structural boundaries, keeping the heading hierarchy.
///
/// Recognised headings are markdown ATX headings (`#` .. `######`), HTML
/// `<h1>`..`<h6>` lines and numbered section titles such as `2.1 Storage Layout`.
/// Each chunk records its heading path (`"Guide > Install"`) in
/// `section_path`. A section that fits in `target_size` becomes one chunk;
/// larger sections are packed paragraph by paragraph, and a paragraph that
/// alone exceeds the target is split at word boundaries.
///
/// # Example
///
/// ```rust,ignore
/// use vault_rag::HierarchicalChunker;
///
/// let chunks = HierarchicalChunker::new(1000).chunk(&document).await?;
/// assert!(chunks.iter().all(|c| c.section_path.is_some()));
/// ```
#[derive(Debug, Clone)]
pub struct HierarchicalChunker {
    target_size: usize,
}

impl HierarchicalChunker {
    pub fn new(target_size: usize) -> Self {
        Self { target_size: target_size.max(1) }
    }

    pub fn target_size(&self) -> usize {
        self.target_size
    }

    /// Pieces of one section as `(text, confidence)`.
    fn split_section(&self, section: &Section) -> Vec<(String, f32)> {
        let mut blocks: Vec<&str> = Vec::with_capacity(section.paragraphs.len() + 1);
        if let Some(heading) = &section.heading {
            blocks.push(heading);
        }
        blocks.extend(section.paragraphs.iter().map(String::as_str));

        let whole = blocks.join("\n\n");
        if char_len(&whole) <= self.target_size {
            return vec![(whole, WHOLE_SECTION_CONFIDENCE)];
        }

        let mut pieces = Vec::new();
        let mut current = String::new();

        for block in blocks {
            let block_len = char_len(block);
            if block_len > self.target_size {
                if !current.is_empty() {
                    pieces.push((std::mem::take(&mut current), PARAGRAPH_PACK_CONFIDENCE));
                }
                pieces.extend(
                    split_by_size(block, self.target_size)
                        .into_iter()
                        .map(|piece| (piece, FIXED_SIZE_CONFIDENCE)),
                );
            } else if current.is_empty() {
                current = block.to_string();
            } else if char_len(&current) + 2 + block_len <= self.target_size {
                current.push_str("\n\n");
                current.push_str(block);
            } else {
                pieces.push((std::mem::replace(&mut current, block.to_string()), PARAGRAPH_PACK_CONFIDENCE));
            }
        }

        if !current.is_empty() {
            pieces.push((current, PARAGRAPH_PACK_CONFIDENCE));
        }
        pieces
    }
}

#[async_trait]
impl Chunker for HierarchicalChunker {
    fn strategy(&self) -> ChunkingStrategy {
        ChunkingStrategy::Hierarchical
    }

    async fn chunk(&self, document: &Document) -> Result<Vec<Chunk>> {
        validate_text(&document.text)?;

        let mut chunks = Vec::new();
        for section in parse_sections(&document.text) {
            for (text, confidence) in self.split_section(&section) {
                let sequence = chunks.len();
                chunks.push(
                    Chunk::new(document, self.strategy(), sequence, text, confidence)
                        .with_section_path(section.path.clone()),
                );
            }
        }
        Ok(chunks)
    }
}

/// A run of paragraphs under one heading.
#[derive(Debug)]
struct Section {
    path: String,
    heading: Option<String>,
    paragraphs: Vec<String>,
}

/// Parse text into sections. A heading with no body of its own only appears
/// in the path of its subsections; without subsections it becomes a section
/// holding just the heading line.
fn parse_sections(text: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut stack: Vec<(usize, String)> = Vec::new();
    let mut heading: Option<String> = None;
    let mut body = String::new();
    let mut in_fence = false;

    for line in text.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
        }

        let parsed = if in_fence { None } else { parse_heading(line) };
        match parsed {
            Some((level, title)) => {
                push_section(&mut sections, &stack, heading.take(), &body, Some(level));
                body.clear();
                while stack.last().is_some_and(|(l, _)| *l >= level) {
                    stack.pop();
                }
                stack.push((level, title));
                heading = Some(line.trim().to_string());
            }
            None => {
                body.push_str(line);
                body.push('\n');
            }
        }
    }
    push_section(&mut sections, &stack, heading, &body, None);
    sections
}

fn push_section(
    sections: &mut Vec<Section>,
    stack: &[(usize, String)],
    heading: Option<String>,
    body: &str,
    next_level: Option<usize>,
) {
    let paragraphs = split_paragraphs(body);
    if paragraphs.is_empty() {
        let level = stack.last().map(|(l, _)| *l);
        let has_subsection = matches!((level, next_level), (Some(l), Some(n)) if n > l);
        if heading.is_none() || has_subsection {
            return;
        }
    }
    let path = if stack.is_empty() {
        ROOT_SECTION.to_string()
    } else {
        stack.iter().map(|(_, title)| title.as_str()).collect::<Vec<_>>().join(" > ")
    };
    sections.push(Section { path, heading, paragraphs });
}

/// Recognise a heading line, returning its level and title.
pub(crate) fn parse_heading(line: &str) -> Option<(usize, String)> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return None;
    }

    // Markdown ATX: "## Title"
    if trimmed.starts_with('#') {
        let level = trimmed.chars().take_while(|c| *c == '#').count();
        let rest = &trimmed[level..];
        if (1..=6).contains(&level) && rest.starts_with(char::is_whitespace) {
            let title = rest.trim().trim_end_matches('#').trim();
            if !title.is_empty() {
                return Some((level, title.to_string()));
            }
        }
        return None;
    }

    // HTML: "<h2>Title</h2>"
    let lower = trimmed.to_ascii_lowercase();
    if lower.len() > 9 && lower.starts_with("<h") {
        let level = lower.as_bytes().get(2).filter(|b| (b'1'..=b'6').contains(b)).map(|b| usize::from(b - b'0'));
        if let Some(level) = level {
            let open = format!("<h{level}>");
            let close = format!("</h{level}>");
            if lower.starts_with(&open) && lower.ends_with(&close) {
                let title = trimmed[open.len()..trimmed.len() - close.len()].trim();
                if !title.is_empty() {
                    return Some((level, title.to_string()));
                }
            }
        }
        return None;
    }

    parse_numbered_heading(trimmed)
}

/// "3 Results", "2.1 Storage Layout", "4. Appendix": a short title-cased
/// line after a dotted section number, without terminal punctuation.
fn parse_numbered_heading(line: &str) -> Option<(usize, String)> {
    if char_len(line) > 60 || line.ends_with(['.', ',', ';', ':', '?', '!']) {
        return None;
    }
    let (number, title) = line.split_once(char::is_whitespace)?;
    let number = number.strip_suffix('.').unwrap_or(number);
    if number.is_empty() || !number.split('.').all(|part| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit())) {
        return None;
    }
    let title = title.trim();
    if !title.chars().next().is_some_and(char::is_uppercase) || title.split_whitespace().count() > 8 {
        return None;
    }
    Some((number.split('.').count(), title.to_string()))
}
