//! Continuation context extraction.
//!
//! Condenses accumulated output into the handful of facts a continuation
//! request needs: where the story is, what the markup looks like, which
//! sentence was interrupted and which tags still need closing.

use crate::markup::{self, TERMINATORS, is_terminator};
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

/// Tags tracked when telling the model what to close.
pub const PROSE_TAGS: &[&str] = &["div", "p", "span", "section", "article", "blockquote"];

const SUMMARY_PARAGRAPHS: usize = 5;
const SUMMARY_CLAUSE_CHARS: usize = 60;
const RECENT_BLOCKS: usize = 4;
const RECENT_HTML_CHARS: usize = 1000;
const INCOMPLETE_WINDOW_CHARS: usize = 100;
const PROMPT_EXCERPT_CHARS: usize = 300;

/// Block-level boundaries that become paragraph breaks in plain text.
static BLOCK_BREAK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)</(?:p|div|section|article|blockquote|li|h[1-6])\s*>|<br\s*/?>")
        .expect("block break regex")
});

/// Boundaries used to walk back over whole blocks of markup.
static BLOCK_END_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</(?:p|div)\s*>").expect("block end regex"));

const CLAUSE_BREAKS: &[char] = &['，', '、', '；', '：', '。', '！', '？', '…', ',', ';', ':', '.', '!', '?'];

/// Everything a continuation request is built from. Ephemeral.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContinuationContext {
    /// First clause of each of the last few paragraphs, joined with ` → `.
    pub plot_summary: String,
    /// Trailing markup, for style matching only.
    pub recent_html: String,
    pub last_complete_sentence: String,
    /// Fragment after the final terminator; empty when the text ends cleanly.
    pub incomplete_text: String,
    /// Prose tags still open, outermost first.
    pub unclosed_tags: Vec<String>,
    /// Character count of the accumulated content.
    pub total_length: usize,
    pub ends_with_punctuation: bool,
    /// The original request, shortened.
    pub original_prompt: String,
}

/// Build the context for continuing `accumulated`.
pub fn build(accumulated: &str, original_prompt: &str) -> ContinuationContext {
    let plain = markup::plain_text(accumulated);
    let visible = plain.trim_end();

    ContinuationContext {
        plot_summary: plot_summary(accumulated),
        recent_html: recent_html(accumulated).to_string(),
        last_complete_sentence: last_complete_sentence(visible),
        incomplete_text: incomplete_text(visible),
        unclosed_tags: markup::unclosed_in(accumulated, PROSE_TAGS),
        total_length: accumulated.chars().count(),
        ends_with_punctuation: visible.chars().last().is_some_and(markup::is_noise),
        original_prompt: markup::head_chars(original_prompt, PROMPT_EXCERPT_CHARS).to_string(),
    }
}

fn plot_summary(html: &str) -> String {
    let without_style = markup::strip_style_blocks(html);
    let broken = BLOCK_BREAK_RE.replace_all(&without_style, "\n");
    let text = markup::strip_tags(&broken);

    let paragraphs: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    let start = paragraphs.len().saturating_sub(SUMMARY_PARAGRAPHS);

    paragraphs[start..]
        .iter()
        .filter_map(|p| {
            let clause = p.split(CLAUSE_BREAKS).next().unwrap_or("").trim();
            (!clause.is_empty()).then(|| markup::head_chars(clause, SUMMARY_CLAUSE_CHARS))
        })
        .collect::<Vec<_>>()
        .join(" → ")
}

fn recent_html(html: &str) -> &str {
    let ends: Vec<usize> = BLOCK_END_RE.find_iter(html).map(|m| m.end()).collect();
    // Trailing partial block plus RECENT_BLOCKS whole ones.
    let start = if ends.len() > RECENT_BLOCKS {
        ends[ends.len() - RECENT_BLOCKS - 1]
    } else {
        0
    };
    markup::tail_chars(&html[start..], RECENT_HTML_CHARS)
}

fn last_complete_sentence(text: &str) -> String {
    let Some(end) = text.rfind(TERMINATORS) else {
        return String::new();
    };
    let end = end + text[end..].chars().next().map_or(0, char::len_utf8);
    let body = &text[..end];
    // Skip the run of terminators that closes this sentence ("?!", "……").
    let core = body.trim_end_matches(TERMINATORS);
    let start = core.rfind(TERMINATORS).map_or(0, |i| {
        i + core[i..].chars().next().map_or(0, char::len_utf8)
    });
    body[start..].trim().to_string()
}

/// Text after the final terminator in the window, or the trailing word when
/// the window has no terminator at all.
fn incomplete_text(text: &str) -> String {
    let window = markup::tail_chars(text, INCOMPLETE_WINDOW_CHARS);
    let after = |(i, c): (usize, char)| i + c.len_utf8();
    let fragment_start = match window.char_indices().rev().find(|&(_, c)| is_terminator(c)) {
        Some(found) => after(found),
        None => window
            .char_indices()
            .rev()
            .find(|&(_, c)| c.is_whitespace())
            .map_or(0, after),
    };
    window[fragment_start..].trim().to_string()
}
