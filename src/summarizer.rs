//! Extractive summarization with code and link preservation.
//!
//! Sentences are scored by position, length, code/link presence, keyword
//! density, and surface features, then greedily selected into a byte budget
//! and restored to document order. Fenced code blocks, inline code, markdown
//! links, and bare URLs are set aside up front and appended if selection did
//! not carry them through, so a summary never loses an exact command or URL.

use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::OnceLock;

use crate::chunker::split_sentences;
use crate::error::Result;

#[derive(Debug, Clone, Serialize)]
pub struct SentenceInfo {
    pub text: String,
    pub score: f64,
    pub position: usize,
    pub length: usize,
    pub has_code: bool,
    pub has_links: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SummaryStats {
    pub sentences_analyzed: usize,
    pub sentences_selected: usize,
    pub code_blocks_found: usize,
    pub links_found: usize,
    pub keywords_extracted: usize,
    pub average_score: f64,
}

/// Summarization result with scoring metadata.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SummaryOutcome {
    pub summary: String,
    pub original_length: usize,
    pub summary_length: usize,
    pub compression_ratio: f64,
    pub preserved_elements: Vec<String>,
    pub stats: SummaryStats,
}

fn fenced_code_regex() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    CELL.get_or_init(|| Regex::new(r"```[\s\S]*?```").expect("valid regex"))
}

fn inline_code_regex() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    CELL.get_or_init(|| Regex::new(r"`[^`]+`").expect("valid regex"))
}

fn markdown_link_regex() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    CELL.get_or_init(|| Regex::new(r"\[([^\]]+)\]\(([^)]+)\)").expect("valid regex"))
}

fn url_regex() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    CELL.get_or_init(|| Regex::new(r"https?://\S+").expect("valid regex"))
}

fn word_clean_regex() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    CELL.get_or_init(|| Regex::new(r"[^\w]").expect("valid regex"))
}

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "is", "are", "was", "were", "be", "been", "have", "has", "had", "do", "does", "did",
    "will", "would", "could", "should", "this", "that", "these", "those", "i", "you", "he",
    "she", "it", "we", "they", "them", "their", "what", "which", "who", "when", "where",
    "why", "how", "may", "might", "must", "can",
];

pub fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(&word)
}

fn clean_word(word: &str) -> String {
    word_clean_regex().replace_all(word, "").to_lowercase()
}

/// Top-N frequency keywords: length > 3, non-stopword, frequency >= 2.
pub fn extract_keywords(content: &str, max_keywords: usize) -> Vec<String> {
    let mut freq: HashMap<String, usize> = HashMap::new();

    for word in content.to_lowercase().split_whitespace() {
        let cleaned = clean_word(word);
        if cleaned.len() > 3 && !is_stop_word(&cleaned) {
            *freq.entry(cleaned).or_insert(0) += 1;
        }
    }

    let mut sorted: Vec<(String, usize)> =
        freq.into_iter().filter(|(_, count)| *count > 1).collect();
    // Tie-break alphabetically so keyword order is deterministic
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    sorted
        .into_iter()
        .take(max_keywords)
        .map(|(word, _)| word)
        .collect()
}

pub struct Summarizer {
    pub min_summary_length: usize,
    pub max_summary_length: usize,
    pub preserve_code: bool,
    pub preserve_links: bool,
    pub keyword_weight: f64,
}

impl Default for Summarizer {
    fn default() -> Self {
        Self {
            min_summary_length: 50,
            max_summary_length: 2000,
            preserve_code: true,
            preserve_links: true,
            keyword_weight: 1.5,
        }
    }
}

impl Summarizer {
    pub fn from_config(config: &crate::config::AimemConfig) -> Self {
        Self {
            min_summary_length: config.summary.min_summary_length,
            max_summary_length: config.summary.max_summary_length,
            preserve_code: config.summary.preserve_code,
            preserve_links: config.summary.preserve_links,
            keyword_weight: config.summary.keyword_weight,
        }
    }

    /// Summarize `content` into roughly `max_length` bytes.
    ///
    /// Idempotent when the input already fits. The budget may be exceeded
    /// when preserved-element restoration overflows it.
    pub fn summarize(&self, content: &str, max_length: usize) -> Result<String> {
        Ok(self.summarize_with_info(content, max_length)?.summary)
    }

    /// Summarize with full scoring metadata.
    pub fn summarize_with_info(&self, content: &str, max_length: usize) -> Result<SummaryOutcome> {
        if content.is_empty() {
            return Ok(SummaryOutcome::default());
        }

        let max_length = max_length
            .max(self.min_summary_length)
            .min(self.max_summary_length);
        let original_length = content.len();

        if original_length <= max_length {
            return Ok(SummaryOutcome {
                summary: content.to_string(),
                original_length,
                summary_length: original_length,
                compression_ratio: 1.0,
                ..Default::default()
            });
        }

        let preserved = self.extract_preserved_elements(content);
        let sentences = split_protected_sentences(content);

        if sentences.is_empty() {
            let end = floor_char_boundary(content, max_length.min(content.len()));
            return Ok(SummaryOutcome {
                summary: content[..end].to_string(),
                original_length,
                summary_length: end,
                compression_ratio: end as f64 / original_length as f64,
                ..Default::default()
            });
        }

        let keywords = extract_keywords(content, 10);
        let mut infos = self.analyze_sentences(&sentences);
        self.apply_keyword_bonus(&mut infos, &keywords);

        let selected = self.select_sentences(&infos, max_length, &preserved);
        let summary = self.build_summary(&selected, &preserved);

        let stats = SummaryStats {
            sentences_analyzed: infos.len(),
            sentences_selected: selected.len(),
            code_blocks_found: infos.iter().filter(|s| s.has_code).count(),
            links_found: infos.iter().filter(|s| s.has_links).count(),
            keywords_extracted: keywords.len(),
            average_score: if infos.is_empty() {
                0.0
            } else {
                infos.iter().map(|s| s.score).sum::<f64>() / infos.len() as f64
            },
        };

        let summary_length = summary.len();
        Ok(SummaryOutcome {
            summary,
            original_length,
            summary_length,
            compression_ratio: summary_length as f64 / original_length as f64,
            preserved_elements: preserved_element_types(&preserved),
            stats,
        })
    }

    /// Fenced code blocks, inline code, markdown links, and bare URLs.
    fn extract_preserved_elements(&self, content: &str) -> Vec<String> {
        let mut preserved = Vec::new();

        if self.preserve_code {
            for m in fenced_code_regex().find_iter(content) {
                preserved.push(m.as_str().to_string());
            }
            for m in inline_code_regex().find_iter(content) {
                preserved.push(m.as_str().to_string());
            }
        }

        if self.preserve_links {
            for m in markdown_link_regex().find_iter(content) {
                preserved.push(m.as_str().to_string());
            }
            for m in url_regex().find_iter(content) {
                preserved.push(m.as_str().to_string());
            }
        }

        preserved
    }

    fn analyze_sentences(&self, sentences: &[String]) -> Vec<SentenceInfo> {
        let total = sentences.len();
        sentences
            .iter()
            .enumerate()
            .map(|(i, text)| {
                let mut info = SentenceInfo {
                    text: text.clone(),
                    score: 0.0,
                    position: i,
                    length: text.len(),
                    has_code: contains_code(text),
                    has_links: contains_links(text),
                };
                info.score = self.score_sentence(&info, total);
                info
            })
            .collect()
    }

    fn score_sentence(&self, info: &SentenceInfo, total_sentences: usize) -> f64 {
        let mut score = 0.0;

        // First and last sentences carry the thesis and the conclusion
        score += if info.position == 0 || info.position + 1 == total_sentences {
            0.3
        } else if info.position < 3 || info.position + 3 >= total_sentences {
            0.2
        } else {
            0.1
        };

        if info.length > 50 && info.length < 200 {
            score += 0.2;
        } else if info.length >= 20 {
            score += 0.1;
        }

        if info.has_code && self.preserve_code {
            score += 0.4;
        }
        if info.has_links && self.preserve_links {
            score += 0.3;
        }

        let keyword_count = info
            .text
            .to_lowercase()
            .split_whitespace()
            .filter(|w| {
                let c = clean_word(w);
                c.len() > 3 && !is_stop_word(&c)
            })
            .count();
        score += (keyword_count as f64 * 0.05).min(0.3);

        if info.text.chars().any(|c| c.is_ascii_digit()) {
            score += 0.1;
        }

        if info.text.trim_end().ends_with('?') {
            score += 0.2;
        }

        let capitalized = info
            .text
            .split_whitespace()
            .filter(|w| w.len() > 1 && w.chars().next().is_some_and(|c| c.is_uppercase()))
            .count();
        score += (capitalized as f64 * 0.05).min(0.2);

        score.min(1.0)
    }

    fn apply_keyword_bonus(&self, sentences: &mut [SentenceInfo], keywords: &[String]) {
        if keywords.is_empty() {
            return;
        }

        for info in sentences.iter_mut() {
            let matches = info
                .text
                .to_lowercase()
                .split_whitespace()
                .filter(|w| keywords.contains(&clean_word(w)))
                .count();
            if matches > 0 {
                let bonus = matches as f64 * self.keyword_weight * 0.1;
                info.score += bonus.min(0.5);
            }
        }
    }

    /// Greedy selection by score within the budget left after preserved
    /// elements, restored to original sentence order.
    fn select_sentences(
        &self,
        sentences: &[SentenceInfo],
        max_length: usize,
        preserved: &[String],
    ) -> Vec<SentenceInfo> {
        let mut ranked: Vec<&SentenceInfo> = sentences.iter().collect();
        ranked.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.position.cmp(&b.position))
        });

        let preserved_length: usize = preserved.iter().map(String::len).sum();
        let mut available = max_length.saturating_sub(preserved_length);
        if available < self.min_summary_length {
            available = max_length;
        }

        let mut selected = Vec::new();
        let mut used = 0usize;
        for sentence in ranked {
            if used + sentence.length <= available {
                selected.push(sentence.clone());
                used += sentence.length;
            }
            if used >= available {
                break;
            }
        }

        selected.sort_by_key(|s| s.position);
        selected
    }

    fn build_summary(&self, sentences: &[SentenceInfo], preserved: &[String]) -> String {
        let mut summary = sentences
            .iter()
            .map(|s| s.text.trim())
            .collect::<Vec<_>>()
            .join(" ");

        for element in preserved {
            if !summary.contains(element.as_str()) {
                summary.push_str("\n\n");
                summary.push_str(element);
            }
        }

        summary.trim().to_string()
    }
}

/// Sentence splitting that never cuts inside a fenced code block: blocks are
/// swapped for placeholders, split, then swapped back.
fn split_protected_sentences(content: &str) -> Vec<String> {
    let blocks: Vec<&str> = fenced_code_regex()
        .find_iter(content)
        .map(|m| m.as_str())
        .collect();

    let mut protected = content.to_string();
    for (i, block) in blocks.iter().enumerate() {
        protected = protected.replacen(block, &format!("__CODE_BLOCK_{i}__"), 1);
    }

    split_sentences(&protected)
        .into_iter()
        .map(|mut sentence| {
            for (i, block) in blocks.iter().enumerate() {
                let placeholder = format!("__CODE_BLOCK_{i}__");
                if sentence.contains(&placeholder) {
                    sentence = sentence.replacen(&placeholder, block, 1);
                }
            }
            sentence.trim().to_string()
        })
        .filter(|s| !s.is_empty())
        .collect()
}

fn contains_code(text: &str) -> bool {
    const PATTERNS: &[&str] = &[
        "`", "```", "fn ", "func ", "def ", "class ", "import ", "#include", "console.",
        "print(",
    ];
    PATTERNS.iter().any(|p| text.contains(p))
}

fn contains_links(text: &str) -> bool {
    const PATTERNS: &[&str] = &["http://", "https://", "[", "www."];
    PATTERNS.iter().any(|p| text.contains(p))
}

fn preserved_element_types(elements: &[String]) -> Vec<String> {
    let mut types = Vec::new();
    if elements.iter().any(|e| e.contains('`')) {
        types.push("code".to_string());
    }
    if elements.iter().any(|e| e.contains("http") || e.contains('[')) {
        types.push("links".to_string());
    }
    types
}

/// Largest byte index `<= at` that lands on a char boundary.
fn floor_char_boundary(s: &str, at: usize) -> usize {
    let mut idx = at.min(s.len());
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}
