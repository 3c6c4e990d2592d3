//! Conversation auto-title: a short label from the first exchange.
//!
//! Used to rename a conversation from its provisional title (the truncated first
//! message) to a descriptive summary such as "Photosynthesis Basics".

/// System instruction for the title-generation model.
pub const TITLE_SYSTEM: &str = r#"You write titles for chat conversations between a user and an expert persona.

Rules:
- Generate a title of 2-6 words
- Capture the main topic the user asked about
- Use title case
- Do not include names, dates, or quotation marks
- Do not end with punctuation

Return ONLY the title, nothing else."#;

/// User prompt template: placeholders are replaced with excerpts of the exchange.
pub const TITLE_USER_TEMPLATE: &str = r#"Write a short title for this conversation.

User:
---
{user_message}
---

Assistant:
---
{agent_response}
---

Title:"#;

const EXCERPT_CHARS: usize = 500;

fn excerpt(text: &str) -> String {
    text.trim().chars().take(EXCERPT_CHARS).collect()
}

/// Build the user prompt from the first user message and the assistant's reply (first 500 chars of each).
pub fn title_user_prompt(user_message: &str, agent_response: &str) -> String {
    TITLE_USER_TEMPLATE
        .replace("{user_message}", &excerpt(user_message))
        .replace("{agent_response}", &excerpt(agent_response))
}
