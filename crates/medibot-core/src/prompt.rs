//! Prompt assembly and answer cleanup for the text model.

use once_cell::sync::Lazy;
use regex::Regex;

/// Token-efficient system prompt for step-by-step medical guidance.
pub const SYSTEM_PROMPT: &str = "\
You are MediBot, a medical assistance AI providing step-by-step guidance.

Rules:
- Number steps explicitly (Step 1 to Step N). Each step is self-contained.
- Keep each step to 2-3 concise sentences. Avoid filler.
- Each step maps to one image (don't reference images in text).
- Structure each step internally: action, method, what to avoid, expected outcome.
- NEVER diagnose or prescribe. Recommend professional care when risk is high.
- Use warm, simple, reassuring language.

Format:
**Understanding Your Situation**
1-2 sentence overview.

**Step 1: [Action Title]**
Instruction with materials, timing, technique.

(Continue for all necessary steps)

**Warnings**
Safety-critical information.

**When to Seek Professional Help**
Urgent conditions.

Greetings: If user says \"Hi\"/\"Hello\" or is vague, respond warmly, summarize capabilities, and ask for their medical concern. Do NOT generate steps for a random condition.";

const THINKING_ADDENDUM: &str =
    "\n\nThinking Mode: Show reasoning in <thinking>...</thinking> tags before your response.";

static THINKING_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<thinking>.*?</thinking>").expect("thinking regex"));

static EXCESS_NEWLINES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n{3,}").expect("newline regex"));

/// Builds the full prompt from the system prompt, optional context, and the
/// user query.
#[must_use]
pub fn build_prompt(query: &str, context: &str, thinking_mode: bool) -> String {
    let mut system = SYSTEM_PROMPT.to_string();
    if thinking_mode {
        system.push_str(THINKING_ADDENDUM);
    }

    let user = if context.is_empty() {
        query.to_string()
    } else {
        format!("Context: {context}\n\n{query}")
    };

    format!("{system}\n\nUser: {user}")
}

/// Cleans a raw model answer.
///
/// Thinking blocks are stripped unless the caller asked to keep them, in
/// which case they are reformatted for display. Runs of blank lines are
/// collapsed either way.
#[must_use]
pub fn clean_model_answer(answer: &str, keep_thinking: bool) -> String {
    let cleaned = if keep_thinking {
        answer
            .replace("<thinking>", "\n\n---\n**My Thinking Process:**\n")
            .replace("</thinking>", "\n\n---\n\n")
    } else {
        THINKING_BLOCK.replace_all(answer, "").into_owned()
    };

    EXCESS_NEWLINES.replace_all(&cleaned, "\n\n").trim().to_string()
}
