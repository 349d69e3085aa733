//! Truncation detection.
//!
//! Two independent heuristics decide whether a response was cut off: a tag
//! balance check over the markup, and a sentence completion check over the
//! visible text. Both are best-effort and never fail.

use crate::config::DetectionMode;
use crate::markup::{self, CLAUSE_SEPARATORS, TERMINATORS, TagKind, is_cjk};
use serde::Serialize;

/// Tags whose absence of a closing tag means the document was cut off.
pub const STRUCTURAL_TAGS: &[&str] = &[
    "div", "style", "span", "p", "section", "article", "main", "header", "footer",
];

/// Characters inspected at the end of the visible text.
pub const SENTENCE_TAIL_CHARS: usize = 50;

/// CJK marks that legitimately end a sentence (including closing quotes and
/// brackets that follow a terminator).
const CJK_TERMINALS: &[char] = &['。', '！', '？', '…', '」', '』', '”', '’', '）', '》', '】', '～'];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HtmlCheck {
    pub is_truncated: bool,
    pub reason: Option<String>,
    /// Structural tags left open, outermost first.
    pub unclosed_tags: Vec<String>,
    /// `<style>` open/close counts match and every block has balanced braces.
    pub style_balanced: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SentenceCheck {
    pub is_truncated: bool,
    pub reason: Option<String>,
    /// The inspected trailing text.
    pub tail: String,
}

/// Verdict for one piece of content. Recomputed on every cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TruncationReport {
    pub is_truncated: bool,
    /// Reason of the check that fired; the HTML check wins when both do.
    pub reason: Option<String>,
    pub html_check: Option<HtmlCheck>,
    pub sentence_check: Option<SentenceCheck>,
}

impl TruncationReport {
    /// Unclosed structural tags reported by the HTML check, if it ran.
    pub fn unclosed_tags(&self) -> &[String] {
        self.html_check
            .as_ref()
            .map(|h| h.unclosed_tags.as_slice())
            .unwrap_or(&[])
    }
}

/// Run the checks selected by `mode` on `content`.
pub fn detect(content: &str, mode: DetectionMode) -> TruncationReport {
    let html_check = mode.checks_html().then(|| check_html(content));
    let sentence_check = mode.checks_sentence().then(|| check_sentence(content));

    let reason = html_check
        .as_ref()
        .filter(|c| c.is_truncated)
        .and_then(|c| c.reason.clone())
        .or_else(|| {
            sentence_check
                .as_ref()
                .filter(|c| c.is_truncated)
                .and_then(|c| c.reason.clone())
        });

    TruncationReport {
        is_truncated: reason.is_some(),
        reason,
        html_check,
        sentence_check,
    }
}

/// Tag balance check.
pub fn check_html(content: &str) -> HtmlCheck {
    let unclosed_tags = markup::unclosed_in(content, STRUCTURAL_TAGS);
    let style_problem = style_imbalance(content);

    let reason = if !unclosed_tags.is_empty() {
        Some(format!("unclosed tags: {}", unclosed_tags.join(", ")))
    } else {
        style_problem.clone()
    };

    HtmlCheck {
        is_truncated: reason.is_some(),
        reason,
        unclosed_tags,
        style_balanced: style_problem.is_none(),
    }
}

/// Describe the first `<style>` imbalance found, if any.
fn style_imbalance(content: &str) -> Option<String> {
    let mut opens = Vec::new();
    let mut closes = Vec::new();
    for tag in markup::tags(content).filter(|t| t.name == "style") {
        match tag.kind {
            TagKind::Open => opens.push(tag.end),
            TagKind::Close => closes.push(tag.start),
            TagKind::SelfClosing => {}
        }
    }

    if opens.len() != closes.len() {
        return Some(format!(
            "unbalanced <style> tags ({} open, {} closed)",
            opens.len(),
            closes.len()
        ));
    }

    for body_start in opens {
        let body_end = closes
            .iter()
            .copied()
            .find(|&c| c >= body_start)
            .unwrap_or(content.len());
        let body = &content[body_start..body_end];
        let open_braces = body.matches('{').count();
        let close_braces = body.matches('}').count();
        if open_braces != close_braces {
            return Some(format!(
                "unbalanced braces in <style> block ({} '{{', {} '}}')",
                open_braces, close_braces
            ));
        }
    }
    None
}

/// Sentence completion check over the visible text.
///
/// Flags CJK text whose last character is a CJK character other than a
/// terminal mark, and text ending in a Latin letter with no sentence or
/// clause punctuation in the two characters before it.
pub fn check_sentence(content: &str) -> SentenceCheck {
    let plain = markup::plain_text(content);
    let trimmed = plain.trim_end();
    let tail = markup::tail_chars(trimmed, SENTENCE_TAIL_CHARS).to_string();

    let Some(last) = tail.chars().last() else {
        return SentenceCheck {
            is_truncated: false,
            reason: None,
            tail,
        };
    };

    let reason = if trimmed.chars().any(is_cjk) && is_cjk(last) && !CJK_TERMINALS.contains(&last)
    {
        Some(format!("text ends mid-sentence at '{}'", last))
    } else if last.is_ascii_alphabetic() {
        let preceding: Vec<char> = tail.chars().rev().skip(1).take(2).collect();
        let punctuated = preceding
            .iter()
            .any(|c| TERMINATORS.contains(c) || CLAUSE_SEPARATORS.contains(c));
        (!punctuated).then(|| "text ends in an unfinished word".to_string())
    } else {
        None
    };

    SentenceCheck {
        is_truncated: reason.is_some(),
        reason,
        tail,
    }
}
