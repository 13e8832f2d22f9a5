//! Content-type aware chunking with overlap.
//!
//! Splits input text into bounded, ordered chunks. The split strategy is
//! chosen by detected content type: sentence boundaries for prose, line
//! boundaries with brace-aware break points for code, level-1 headings for
//! markdown. Adjacent chunks may overlap so retrieval never loses a sentence
//! that straddles a boundary.

use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

use crate::error::{AimemError, Result};

/// Tagged content variant driving the split strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Text,
    Code,
    Markdown,
    Json,
    Xml,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Code => "code",
            Self::Markdown => "markdown",
            Self::Json => "json",
            Self::Xml => "xml",
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single emitted chunk with position and scoring metadata.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkInfo {
    pub content: String,
    pub start_offset: usize,
    pub end_offset: usize,
    pub chunk_index: usize,
    pub content_type: ContentType,
    pub semantic_score: f64,
}

/// Aggregate statistics over a chunking run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChunkingStats {
    pub total_chunks: usize,
    pub average_chunk_size: f64,
    pub min_chunk_size: usize,
    pub max_chunk_size: usize,
    pub average_semantic_score: f64,
    pub total_content_size: usize,
}

fn sentence_regex() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    CELL.get_or_init(|| Regex::new(r"[.!?]+\s+").expect("valid sentence regex"))
}

fn code_patterns() -> &'static Vec<Regex> {
    static CELL: OnceLock<Vec<Regex>> = OnceLock::new();
    CELL.get_or_init(|| {
        [
            r"package\s+\w+",
            r"import\s+",
            r"function\s+\w+",
            r"def\s+\w+",
            r"class\s+\w+",
            r"#include\s+",
            r"public\s+class",
            r"fn\s+\w+",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("valid code pattern"))
        .collect()
    })
}

pub struct Chunker {
    pub max_chunk_size: usize,
    pub overlap_size: usize,
    pub min_chunk_size: usize,
    pub code_weight: f64,
    pub heading_weight: f64,
    pub link_weight: f64,
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            max_chunk_size: 1024,
            overlap_size: 100,
            min_chunk_size: 50,
            code_weight: 0.2,
            heading_weight: 0.3,
            link_weight: 0.1,
        }
    }
}

impl Chunker {
    pub fn from_config(config: &crate::config::AimemConfig) -> Self {
        Self {
            max_chunk_size: config.memory.chunk_size,
            overlap_size: config.effective_overlap(),
            min_chunk_size: config.chunking.min_chunk_size,
            code_weight: config.chunking.code_weight,
            heading_weight: config.chunking.heading_weight,
            link_weight: config.chunking.link_weight,
        }
    }

    /// Split `content` into ordered chunks of at most `max_size` bytes.
    ///
    /// Empty input yields an empty sequence. `max_size == 0` falls back to
    /// the configured maximum.
    pub fn chunk(&self, content: &str, max_size: usize) -> Result<Vec<ChunkInfo>> {
        if content.is_empty() {
            return Ok(Vec::new());
        }

        let max_size = if max_size == 0 {
            self.max_chunk_size
        } else {
            max_size
        };

        let content_type = detect_content_type(content);
        tracing::debug!(
            content_length = content.len(),
            content_type = %content_type,
            max_size,
            "chunking content"
        );

        let chunks = match content_type {
            ContentType::Code => self.chunk_code(content, max_size)?,
            ContentType::Markdown => self.chunk_markdown(content, max_size)?,
            // Structure-preserving splitting for JSON/XML is a non-goal
            ContentType::Json | ContentType::Xml => {
                self.chunk_as(content, max_size, content_type)?
            }
            ContentType::Text => self.chunk_as(content, max_size, ContentType::Text)?,
        };

        tracing::debug!(chunk_count = chunks.len(), "chunking completed");
        Ok(chunks)
    }

    /// Sentence-boundary splitting, tagging output with `content_type`.
    fn chunk_as(
        &self,
        content: &str,
        max_size: usize,
        content_type: ContentType,
    ) -> Result<Vec<ChunkInfo>> {
        if content.len() <= max_size {
            return Ok(vec![self.whole_chunk(content, content_type)]);
        }

        let sentences = split_sentences(content);
        let mut chunks = Vec::new();
        let mut current = String::new();
        let mut current_offset = 0usize;
        let mut index = 0usize;

        for sentence in &sentences {
            if !current.is_empty() && current.len() + sentence.len() > max_size {
                let end = current_offset + current.len();
                chunks.push(ChunkInfo {
                    content: current.trim().to_string(),
                    start_offset: current_offset,
                    end_offset: end,
                    chunk_index: index,
                    content_type,
                    semantic_score: self.semantic_score(&current, content_type),
                });

                let overlap = self.overlap_tail(&current)?;
                current_offset = end - overlap.len();
                current = overlap;
                current.push_str(sentence);
                index += 1;
            } else {
                current.push_str(sentence);
            }
        }

        if !current.trim().is_empty() {
            chunks.push(ChunkInfo {
                content: current.trim().to_string(),
                start_offset: current_offset,
                end_offset: current_offset + current.len(),
                chunk_index: index,
                content_type,
                semantic_score: self.semantic_score(&current, content_type),
            });
        }

        Ok(chunks)
    }

    /// Line-oriented splitting for code. The break point is the offset after
    /// the last line that is blank or contains only `}`.
    fn chunk_code(&self, content: &str, max_size: usize) -> Result<Vec<ChunkInfo>> {
        if content.len() <= max_size {
            return Ok(vec![self.whole_chunk(content, ContentType::Code)]);
        }

        let mut chunks = Vec::new();
        let mut current = String::new();
        let mut current_offset = 0usize;
        let mut index = 0usize;

        let lines: Vec<&str> = content.split('\n').collect();
        for (i, line) in lines.iter().enumerate() {
            let mut line_text = (*line).to_string();
            if i < lines.len() - 1 {
                line_text.push('\n');
            }

            if !current.is_empty() && current.len() + line_text.len() > max_size {
                let break_point = code_break_point(&current);
                let head = &current[..break_point];
                chunks.push(ChunkInfo {
                    content: head.to_string(),
                    start_offset: current_offset,
                    end_offset: current_offset + break_point,
                    chunk_index: index,
                    content_type: ContentType::Code,
                    semantic_score: self.semantic_score(head, ContentType::Code),
                });

                let remaining = current[break_point..].to_string();
                let overlap = code_overlap(head, self.overlap_size);
                current_offset = current_offset + break_point - overlap.len();
                current = overlap;
                current.push_str(&remaining);
                current.push_str(&line_text);
                index += 1;
            } else {
                current.push_str(&line_text);
            }
        }

        if !current.trim().is_empty() {
            chunks.push(ChunkInfo {
                content: current.clone(),
                start_offset: current_offset,
                end_offset: current_offset + current.len(),
                chunk_index: index,
                content_type: ContentType::Code,
                semantic_score: self.semantic_score(&current, ContentType::Code),
            });
        }

        Ok(chunks)
    }

    /// Split at level-1 headings first; oversized sections fall back to the
    /// sentence splitter.
    fn chunk_markdown(&self, content: &str, max_size: usize) -> Result<Vec<ChunkInfo>> {
        if content.len() <= max_size {
            return Ok(vec![self.whole_chunk(content, ContentType::Markdown)]);
        }

        let sections = split_markdown_sections(content);
        let mut chunks = Vec::new();
        let mut index = 0usize;
        let mut offset = 0usize;

        for section in &sections {
            if section.len() <= max_size {
                chunks.push(ChunkInfo {
                    content: section.clone(),
                    start_offset: offset,
                    end_offset: offset + section.len(),
                    chunk_index: index,
                    content_type: ContentType::Markdown,
                    semantic_score: self.semantic_score(section, ContentType::Markdown),
                });
                index += 1;
            } else {
                for sub in self.chunk_as(section, max_size, ContentType::Text)? {
                    chunks.push(ChunkInfo {
                        content: sub.content.clone(),
                        start_offset: offset + sub.start_offset,
                        end_offset: offset + sub.end_offset,
                        chunk_index: index,
                        content_type: ContentType::Markdown,
                        semantic_score: self
                            .semantic_score(&sub.content, ContentType::Markdown),
                    });
                    index += 1;
                }
            }
            offset += section.len();
        }

        Ok(chunks)
    }

    fn whole_chunk(&self, content: &str, content_type: ContentType) -> ChunkInfo {
        ChunkInfo {
            content: content.to_string(),
            start_offset: 0,
            end_offset: content.len(),
            chunk_index: 0,
            content_type,
            semantic_score: 1.0,
        }
    }

    /// Trailing overlap for prose: the last sentence if it fits, otherwise
    /// the trailing `overlap_size` bytes.
    fn overlap_tail(&self, chunk: &str) -> Result<String> {
        if self.overlap_size == 0 || chunk.len() <= self.overlap_size {
            return Ok(String::new());
        }

        let sentences = split_sentences(chunk);
        if sentences.len() > 1 {
            let last = &sentences[sentences.len() - 1];
            if last.len() <= self.overlap_size {
                return Ok(last.clone());
            }
        }

        let cut = chunk.len() - self.overlap_size;
        if !chunk.is_char_boundary(cut) {
            return Err(AimemError::Chunking(format!(
                "overlap cut at byte {cut} is not a UTF-8 boundary"
            )));
        }
        Ok(chunk[cut..].to_string())
    }

    /// Heuristic semantic weight in `[0, 1]`: base 0.5, plus the configured
    /// code/heading/link weights, minus a short-chunk penalty.
    fn semantic_score(&self, content: &str, content_type: ContentType) -> f64 {
        let mut score = 0.5;

        if content_type == ContentType::Code {
            score += self.code_weight;
        }
        if content_type == ContentType::Markdown && content.contains("# ") {
            score += self.heading_weight;
        }
        if contains_link(content) {
            score += self.link_weight;
        }

        if content.len() < self.min_chunk_size {
            score -= 0.2;
        }

        score.clamp(0.0, 1.0)
    }

    /// Quality gate: non-empty, within size bounds.
    pub fn validate(&self, chunk: &str) -> Result<()> {
        if chunk.is_empty() {
            return Err(AimemError::Chunking("chunk cannot be empty".into()));
        }
        if chunk.len() < self.min_chunk_size {
            return Err(AimemError::Chunking(format!(
                "chunk too small: {} < {}",
                chunk.len(),
                self.min_chunk_size
            )));
        }
        if chunk.len() > self.max_chunk_size * 2 {
            return Err(AimemError::Chunking(format!(
                "chunk too large: {} > {}",
                chunk.len(),
                self.max_chunk_size * 2
            )));
        }
        Ok(())
    }
}

/// Aggregate chunk statistics.
pub fn chunking_stats(chunks: &[ChunkInfo]) -> ChunkingStats {
    if chunks.is_empty() {
        return ChunkingStats::default();
    }

    let sizes: Vec<usize> = chunks.iter().map(|c| c.content.len()).collect();
    let total: usize = sizes.iter().sum();
    let score_sum: f64 = chunks.iter().map(|c| c.semantic_score).sum();

    ChunkingStats {
        total_chunks: chunks.len(),
        average_chunk_size: total as f64 / chunks.len() as f64,
        min_chunk_size: *sizes.iter().min().expect("non-empty"),
        max_chunk_size: *sizes.iter().max().expect("non-empty"),
        average_semantic_score: score_sum / chunks.len() as f64,
        total_content_size: total,
    }
}

/// Detect the content variant. Code patterns win over markdown markers; JSON
/// and XML are recognized by their outer delimiters.
pub fn detect_content_type(content: &str) -> ContentType {
    let content = content.trim();

    for pattern in code_patterns() {
        if pattern.is_match(content) {
            return ContentType::Code;
        }
    }

    if content.contains("# ")
        || content.contains("## ")
        || content.contains("```")
        || content.contains("**")
    {
        return ContentType::Markdown;
    }

    if (content.starts_with('{') && content.ends_with('}'))
        || (content.starts_with('[') && content.ends_with(']'))
    {
        return ContentType::Json;
    }

    if content.starts_with('<') && content.contains('>') {
        return ContentType::Xml;
    }

    ContentType::Text
}

/// Split text into sentences on `[.!?]+` followed by whitespace, keeping the
/// punctuation and trailing whitespace attached to each sentence.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut result = Vec::new();
    let mut last = 0usize;

    for m in sentence_regex().find_iter(text) {
        result.push(text[last..m.end()].to_string());
        last = m.end();
    }

    if last < text.len() {
        result.push(text[last..].to_string());
    }

    result
}

/// Break offset for code: just after the last line that is blank or `}`.
fn code_break_point(code: &str) -> usize {
    let lines: Vec<&str> = code.split('\n').collect();

    for i in (0..lines.len()).rev() {
        let trimmed = lines[i].trim();
        if trimmed == "}" || trimmed.is_empty() {
            // Byte offset just past line i (including its newline)
            let offset: usize = lines[..=i].iter().map(|l| l.len() + 1).sum();
            return offset.min(code.len());
        }
    }

    code.len()
}

/// Trailing lines of `chunk` that fit within `overlap_size` bytes.
fn code_overlap(chunk: &str, overlap_size: usize) -> String {
    if overlap_size == 0 {
        return String::new();
    }

    let lines: Vec<&str> = chunk.split('\n').collect();
    let mut taken: Vec<&str> = Vec::new();
    let mut used = 0usize;

    for line in lines.iter().rev() {
        let len = line.len() + 1;
        if used + len > overlap_size {
            break;
        }
        taken.push(line);
        used += len;
    }

    taken.reverse();
    if taken.is_empty() {
        String::new()
    } else {
        let mut out = taken.join("\n");
        out.push('\n');
        out
    }
}

/// Markdown link or bare URL.
fn contains_link(content: &str) -> bool {
    content.contains("](") || content.contains("http://") || content.contains("https://")
}

/// Split markdown into sections starting at level-1 headings.
fn split_markdown_sections(content: &str) -> Vec<String> {
    let mut sections = Vec::new();
    let mut current = String::new();

    for line in content.split_inclusive('\n') {
        if line.trim_start().starts_with("# ") && !current.is_empty() {
            sections.push(std::mem::take(&mut current));
        }
        current.push_str(line);
    }

    if !current.is_empty() {
        sections.push(current);
    }

    sections
}
