//! Continuation request rendering.

use super::{ContinuationContext, ContinuationState};
use crate::api::request::GenerationRequest;

/// Build the next request of a continuation cycle.
///
/// Model and sampling parameters carry over from `base`; only the prompt text
/// changes.
pub fn continuation_request(
    base: &GenerationRequest,
    ctx: &ContinuationContext,
    state: &ContinuationState,
) -> GenerationRequest {
    base.with_prompts(system_prompt(ctx, state), user_prompt(ctx))
}

fn system_prompt(ctx: &ContinuationContext, state: &ContinuationState) -> String {
    let mut out = String::from(
        "You are continuing a piece of HTML-formatted writing that was cut off \
         mid-generation. Pick up exactly where it stops. Do not repeat text that \
         was already written and do not restart or summarise. Output only the \
         continuation: no commentary, no code fences.",
    );

    if !ctx.unclosed_tags.is_empty() {
        let closing: String = ctx
            .unclosed_tags
            .iter()
            .rev()
            .map(|tag| format!("</{}>", tag))
            .collect();
        out.push_str(&format!(
            "\n\nThese elements are still open: {}. Finish the current passage, \
             then close them in this order: {}",
            ctx.unclosed_tags.join(", "),
            closing
        ));
    }

    if !ctx.recent_html.is_empty() {
        out.push_str("\n\nMatch the markup, classes and inline styling of the recent HTML.");
    }

    match (&state.character_name, &state.user_name) {
        (Some(character), Some(user)) => out.push_str(&format!(
            "\n\nKeep writing as {} and keep {} in the same role as before.",
            character, user
        )),
        (Some(character), None) => {
            out.push_str(&format!("\n\nKeep writing as {}.", character));
        }
        (None, Some(user)) => {
            out.push_str(&format!("\n\nKeep {} in the same role as before.", user));
        }
        (None, None) => {}
    }

    out
}

fn user_prompt(ctx: &ContinuationContext) -> String {
    let sections = [
        ("Original request", ctx.original_prompt.as_str()),
        ("Story so far", ctx.plot_summary.as_str()),
        ("Last complete sentence", ctx.last_complete_sentence.as_str()),
        ("Unfinished text", ctx.incomplete_text.as_str()),
        ("Recent HTML", ctx.recent_html.as_str()),
    ];

    let mut out = String::new();
    for (title, body) in sections {
        if body.trim().is_empty() {
            continue;
        }
        out.push_str(&format!("## {}\n{}\n\n", title, body));
    }

    out.push_str(&format!(
        "The text so far is {} characters long. ",
        ctx.total_length
    ));
    if ctx.incomplete_text.is_empty() {
        out.push_str("Continue with the next sentence.");
    } else {
        out.push_str(&format!(
            "Continue directly after \"{}\".",
            ctx.incomplete_text
        ));
    }
    out
}
