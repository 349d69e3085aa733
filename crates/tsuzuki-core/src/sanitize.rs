//! Output sanitization.
//!
//! Models wrap the HTML they were asked for in all kinds of noise: reasoning
//! blocks, markdown fences, a sentence of preamble, a closing remark. The
//! sanitizer isolates the payload and degrades to the fence-stripped input
//! whenever cleaning would leave (almost) nothing.

use crate::markup::is_noise;
use regex::Regex;
use std::sync::LazyLock;

/// Results shorter than this fall back to the lightly cleaned input.
pub const MIN_SANITIZED_CHARS: usize = 10;

/// Tag pairs removed together with their contents.
pub const META_TAGS: &[&str] = &[
    "thinking",
    "system",
    "note",
    "ooc",
    "debug",
    "meta",
    "comment",
    "analysis",
    "reflection",
    "planning",
    "internal",
];

static META_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    META_TAGS
        .iter()
        .map(|tag| {
            Regex::new(&format!(r"(?is)<{tag}\b[^>]*>.*?</{tag}\s*>")).expect("meta tag regex")
        })
        .collect()
});

static FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)```(?:html)?").expect("fence regex"));

static OPENING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)<(?:!doctype|html|head|body|style|div|section|article|main|header|p|span|h[1-6])\b",
    )
    .expect("opening token regex")
});

static CLOSING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)</(?:html|head|body|style|div|section|article|main|header|p|span|h[1-6])\s*>",
    )
    .expect("closing token regex")
});

static ANY_CLOSING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</[a-zA-Z][^<>]*>").expect("any closing regex"));

static STYLE_SPLIT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<style\b[^>]*>.*?(?:</style\s*>|\z)").expect("style split regex")
});

static EMPHASIS_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(^|[\s>])\*\*([^*\n]+?)\*\*($|[\s<])",
        r"(^|[\s>])__([^_\n]+?)__($|[\s<])",
        r"(^|[\s>])\*([^*\n]+?)\*($|[\s<])",
        r"(^|[\s>])_([^_\n]+?)_($|[\s<])",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("emphasis regex"))
    .collect()
});

static LINE_MARKER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^[ \t]*(?:#{1,6}|[-*+])[ \t]+").expect("line marker regex"));

static BLANK_LINES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:\r?\n){3,}").expect("blank lines regex"));

/// Full cleanup for a top-level response.
pub fn sanitize(raw: &str) -> String {
    clean(raw, true)
}

/// Cleanup for a continuation response.
///
/// Continuations legitimately start in the middle of a sentence, so leading
/// text before the first HTML token is kept.
pub fn sanitize_fragment(raw: &str) -> String {
    clean(raw, false)
}

fn clean(raw: &str, cut_leading: bool) -> String {
    let mut text = raw.to_string();

    for re in META_RES.iter() {
        text = re.replace_all(&text, "").into_owned();
    }

    text = strip_fences(&text);

    if cut_leading && let Some(m) = OPENING_RE.find(&text) {
        text = text[m.start()..].to_string();
    }

    let last_close = CLOSING_RE
        .find_iter(&text)
        .last()
        .or_else(|| ANY_CLOSING_RE.find_iter(&text).last());
    if let Some(m) = last_close {
        text.truncate(m.end());
    }

    text = outside_style_blocks(&text, strip_markdown);
    text = BLANK_LINES_RE.replace_all(&text, "\n\n").into_owned();

    let cleaned = trim(&text, cut_leading);
    if cleaned.chars().count() < MIN_SANITIZED_CHARS || cleaned.chars().all(is_noise) {
        return trim(&strip_fences(raw), cut_leading).to_string();
    }
    cleaned.to_string()
}

/// Leading whitespace of a fragment separates it from the previous word.
fn trim(text: &str, leading: bool) -> &str {
    if leading { text.trim() } else { text.trim_end() }
}

fn strip_fences(text: &str) -> String {
    FENCE_RE.replace_all(text, "").into_owned()
}

fn strip_markdown(text: &str) -> String {
    let mut out = text.to_string();
    for re in EMPHASIS_RES.iter() {
        // Adjacent markers share a boundary character, so one pass can miss
        // every other occurrence.
        for _ in 0..3 {
            let next = re.replace_all(&out, "$1$2$3").into_owned();
            if next == out {
                break;
            }
            out = next;
        }
    }
    LINE_MARKER_RE.replace_all(&out, "").into_owned()
}

/// Apply `f` to everything except `<style>` blocks, which pass through untouched.
fn outside_style_blocks(text: &str, f: fn(&str) -> String) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for m in STYLE_SPLIT_RE.find_iter(text) {
        out.push_str(&f(&text[last..m.start()]));
        out.push_str(m.as_str());
        last = m.end();
    }
    out.push_str(&f(&text[last..]));
    out
}
