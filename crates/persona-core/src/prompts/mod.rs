//! Prompt templates for server-side helpers that build prompts on the client.

pub mod title;

pub use title::{title_user_prompt, TITLE_SYSTEM, TITLE_USER_TEMPLATE};
