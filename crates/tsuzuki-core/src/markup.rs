//! Lightweight markup scanning shared by the detector, the context builder and
//! the merger.
//!
//! This is not an HTML parser. It recognises `<name ...>`, `</name>` and
//! `<name .../>` tokens, which is all the truncation heuristics need.

use regex::Regex;
use std::ops::Range;
use std::sync::LazyLock;

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<(/?)([a-zA-Z][a-zA-Z0-9-]*)\b[^<>]*?(/?)>").expect("tag regex")
});

static ANY_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^<>]*>").expect("any-tag regex"));

static STYLE_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<style\b[^>]*>.*?(?:</style\s*>|\z)").expect("style block regex")
});

/// Elements that never take a closing tag.
pub const VOID_ELEMENTS: &[&str] = &[
    "br", "hr", "img", "input", "meta", "link", "area", "base", "col", "embed", "param",
    "source", "track", "wbr",
];

/// Sentence terminators, CJK and ASCII.
pub const TERMINATORS: &[char] = &['。', '！', '？', '…', '.', '!', '?'];

/// Clause separators that end a phrase without ending the sentence.
pub const CLAUSE_SEPARATORS: &[char] = &['，', '、', '；', '：', ',', ';', ':'];

/// CJK punctuation treated as noise when comparing text across a seam.
const CJK_PUNCTUATION: &[char] = &[
    '。', '，', '、', '；', '：', '！', '？', '…', '—', '「', '」', '『', '』', '“', '”', '‘',
    '’', '（', '）', '《', '》', '【', '】', '～', '·',
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    Open,
    Close,
    SelfClosing,
}

/// One tag token found in a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    /// Lowercased element name.
    pub name: String,
    pub kind: TagKind,
    /// Byte offset of `<`.
    pub start: usize,
    /// Byte offset just past `>`.
    pub end: usize,
}

/// All tag tokens in document order.
pub fn tags(content: &str) -> impl Iterator<Item = Tag> + '_ {
    TAG_RE.captures_iter(content).filter_map(|caps| {
        let whole = caps.get(0)?;
        let name = caps.get(2)?.as_str().to_ascii_lowercase();
        let kind = if !caps[1].is_empty() {
            TagKind::Close
        } else if !caps[3].is_empty() {
            TagKind::SelfClosing
        } else {
            TagKind::Open
        };
        Some(Tag {
            name,
            kind,
            start: whole.start(),
            end: whole.end(),
        })
    })
}

pub fn is_void(name: &str) -> bool {
    VOID_ELEMENTS.contains(&name)
}

/// Element names still open at the end of `content`, outermost first.
///
/// Void and self-closing tags are ignored. A closing tag removes the most
/// recent matching open element; stray closing tags are ignored.
pub fn open_elements(content: &str) -> Vec<String> {
    let mut stack: Vec<String> = Vec::new();
    for tag in tags(content) {
        if is_void(&tag.name) {
            continue;
        }
        match tag.kind {
            TagKind::Open => stack.push(tag.name),
            TagKind::Close => {
                if let Some(pos) = stack.iter().rposition(|open| *open == tag.name) {
                    stack.remove(pos);
                }
            }
            TagKind::SelfClosing => {}
        }
    }
    stack
}

/// Open elements restricted to `subset`, outermost first.
pub fn unclosed_in(content: &str, subset: &[&str]) -> Vec<String> {
    open_elements(content)
        .into_iter()
        .filter(|name| subset.contains(&name.as_str()))
        .collect()
}

/// Remove every tag token, keeping text content.
pub fn strip_tags(content: &str) -> String {
    ANY_TAG_RE.replace_all(content, "").into_owned()
}

/// Byte ranges of every `<...>` token.
pub fn tag_spans(content: &str) -> impl Iterator<Item = Range<usize>> + '_ {
    ANY_TAG_RE.find_iter(content).map(|m| m.range())
}

/// Characters of `content` that sit outside tag tokens, with their byte offsets.
pub fn text_char_indices(content: &str) -> Vec<(usize, char)> {
    let mut spans = tag_spans(content).peekable();
    content
        .char_indices()
        .filter(|&(i, _)| {
            while spans.next_if(|span| span.end <= i).is_some() {}
            !spans.peek().is_some_and(|span| span.contains(&i))
        })
        .collect()
}

/// Remove `<style>` blocks including their contents.
pub fn strip_style_blocks(content: &str) -> String {
    STYLE_BLOCK_RE.replace_all(content, "").into_owned()
}

/// Visible text of an HTML fragment.
pub fn plain_text(content: &str) -> String {
    strip_tags(&strip_style_blocks(content))
}

/// Han, kana and hangul.
pub fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{4E00}'..='\u{9FFF}'
        | '\u{3400}'..='\u{4DBF}'
        | '\u{F900}'..='\u{FAFF}'
        | '\u{3040}'..='\u{30FF}'
        | '\u{AC00}'..='\u{D7AF}')
}

pub fn is_terminator(c: char) -> bool {
    TERMINATORS.contains(&c)
}

/// Whitespace and punctuation, ignored when comparing seam text.
pub fn is_noise(c: char) -> bool {
    c.is_whitespace() || c.is_ascii_punctuation() || CJK_PUNCTUATION.contains(&c)
}

/// Last `n` characters of `text`.
pub fn tail_chars(text: &str, n: usize) -> &str {
    let count = text.chars().count();
    if count <= n {
        return text;
    }
    match text.char_indices().nth(count - n) {
        Some((idx, _)) => &text[idx..],
        None => text,
    }
}

/// First `n` characters of `text`.
pub fn head_chars(text: &str, n: usize) -> &str {
    match text.char_indices().nth(n) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
