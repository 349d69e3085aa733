//! Seam deduplication between existing content and a continuation.
//!
//! Continuations tend to restate the last few words they were given, often
//! with different punctuation. Candidate overlaps are compared with
//! punctuation and whitespace removed, so `门口。` and `门口，` still line up.
//! When nothing matches, the new text is returned untouched: a little
//! duplication is preferable to cutting real content.

use crate::config::OverlapConfig;
use crate::markup::{self, is_noise, is_terminator};
use std::borrow::Cow;

/// Result of stitching a continuation onto existing content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Merged {
    pub content: String,
    /// Characters of the continuation dropped as duplicate.
    pub removed_chars: usize,
}

/// Drop the part of `new` that repeats the end of `existing`.
///
/// Both sides are compared as visible text, so markup on either side of the
/// seam does not hide a repeat. Tags inside the dropped span are kept in front
/// of the remainder.
pub fn remove_overlap<'a>(existing: &str, new: &'a str, config: &OverlapConfig) -> Cow<'a, str> {
    let existing_plain = markup::plain_text(existing);
    let tail = markup::tail_chars(existing_plain.trim_end(), config.existing_tail);

    let text = markup::text_char_indices(new);
    let head_len = text.len().min(config.window);
    let head_normalized: Vec<char> = text[..head_len]
        .iter()
        .map(|&(_, c)| c)
        .filter(|&c| !is_noise(c))
        .collect();

    let max_len = config.window.min(tail.chars().count()).min(head_len);
    if max_len < config.min_overlap {
        return Cow::Borrowed(new);
    }

    for len in (config.min_overlap..=max_len).rev() {
        let candidate = markup::tail_chars(tail, len);
        let normalized: Vec<char> = candidate.chars().filter(|&c| !is_noise(c)).collect();
        // Mostly punctuation is not evidence of a repeat.
        if normalized.is_empty() || normalized.len() * 2 < len {
            continue;
        }
        if head_normalized.starts_with(&normalized) {
            let cut = raw_end_of_overlap(&text, normalized.len());
            let cut = skip_repeated_punctuation(candidate, new, cut);
            let cut = skip_dangling_word(tail, new, cut);
            return with_skipped_tags(new, cut);
        }
    }
    Cow::Borrowed(new)
}

/// Append `new` to `existing` with the seam overlap removed, optionally
/// separating the two with `marker`.
pub fn merge(existing: &str, new: &str, config: &OverlapConfig, marker: Option<&str>) -> Merged {
    let remainder = remove_overlap(existing, new, config);
    let removed_chars = new.chars().count().saturating_sub(remainder.chars().count());

    let mut content = String::with_capacity(existing.len() + remainder.len());
    content.push_str(existing);
    if let Some(marker) = marker
        && !remainder.is_empty()
    {
        content.push_str(marker);
    }
    content.push_str(&remainder);

    Merged {
        content,
        removed_chars,
    }
}

/// Byte offset in the raw text just past its `count`-th content character.
fn raw_end_of_overlap(text: &[(usize, char)], count: usize) -> usize {
    text.iter()
        .filter(|&&(_, c)| !is_noise(c))
        .nth(count.saturating_sub(1))
        .map_or(0, |&(i, c)| i + c.len_utf8())
}

/// `new[cut..]`, preceded by the tag tokens found in `new[..cut]`.
fn with_skipped_tags(new: &str, cut: usize) -> Cow<'_, str> {
    let mut skipped = markup::tag_spans(&new[..cut]).peekable();
    if skipped.peek().is_none() {
        return Cow::Borrowed(&new[cut..]);
    }
    let mut kept: String = skipped.map(|span| &new[span]).collect();
    kept.push_str(&new[cut..]);
    Cow::Owned(kept)
}

/// Consume punctuation in `new` that repeats the punctuation ending `existing_tail`.
fn skip_repeated_punctuation(existing_tail: &str, new: &str, cut: usize) -> usize {
    let trailing_start = existing_tail
        .char_indices()
        .rev()
        .find(|&(_, c)| !is_noise(c))
        .map_or(0, |(i, c)| i + c.len_utf8());
    let trailing = &existing_tail[trailing_start..];

    let common: usize = trailing
        .chars()
        .zip(new[cut..].chars())
        .take_while(|(a, b)| a == b)
        .map(|(_, b)| b.len_utf8())
        .sum();
    cut + common
}

/// If the overlap ends inside a Latin word that `existing_tail` had already
/// finished, the continuation is restating a longer phrase; jump to the next
/// sentence end or tag instead of leaving half a word behind.
fn skip_dangling_word(existing_tail: &str, new: &str, cut: usize) -> usize {
    let before = new[..cut].chars().next_back();
    let after = new[cut..].chars().next();
    let existing_done = existing_tail.chars().next_back().is_some_and(|c| !c.is_alphanumeric());

    let splits_word = matches!((before, after), (Some(b), Some(a))
        if b.is_ascii_alphanumeric() && a.is_ascii_alphanumeric());
    if !(splits_word && existing_done) {
        return cut;
    }

    let rest = &new[cut..];
    match rest.char_indices().find(|&(_, c)| is_terminator(c) || c == '<') {
        Some((i, '<')) => cut + i,
        Some((i, c)) => {
            let next = cut + i + c.len_utf8();
            let following = &new[next..];
            next + (following.len() - following.trim_start().len())
        }
        None => cut,
    }
}
