//! Centralized prompt definitions for the conversation engine.
//!
//! Keeping the templates in one place makes them easier to maintain and
//! version. Templates use `{placeholder}` markers filled in by the engine.

/// System instruction prepended to every chat prompt.
pub const CHAT_SYSTEM_PROMPT: &str = r#"You are a helpful, knowledgeable assistant in an ongoing conversation.

Guidelines:
- Answer the latest user message directly
- Use the conversation context to stay consistent with earlier turns
- Be concise; prefer plain prose over lists unless asked
- If the context contradicts itself, trust the most recent turns"#;

/// Chat prompt template. Placeholders: `{summary}`, `{transcript}`.
pub const CHAT_PROMPT_TEMPLATE: &str = r#"{system}

Conversation summary so far:
{summary}

Conversation:
{transcript}

Continue the conversation as the assistant. Respond with the assistant's next message only, without a role label."#;

/// Summary-refresh prompt template. Placeholder: `{transcript}`.
pub const SUMMARY_PROMPT_TEMPLATE: &str = r#"Summarize the following conversation in 2-4 sentences. Capture the user's goals, key facts established, and any open questions. Respond with the summary only.

Conversation:
{transcript}"#;

/// Build the chat prompt from the rolling summary and the rendered
/// transcript of the active path.
pub fn chat_prompt(summary: Option<&str>, transcript: &str) -> String {
    CHAT_PROMPT_TEMPLATE
        .replace("{system}", CHAT_SYSTEM_PROMPT)
        .replace("{summary}", summary.unwrap_or("(none yet)"))
        .replace("{transcript}", transcript)
}

/// Build the summary-refresh prompt from the rendered transcript.
pub fn summary_prompt(transcript: &str) -> String {
    SUMMARY_PROMPT_TEMPLATE.replace("{transcript}", transcript)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_prompt_fills_placeholders() {
        let prompt = chat_prompt(Some("planning a trip"), "User: hi");
        assert!(prompt.contains("planning a trip"));
        assert!(prompt.contains("User: hi"));
        assert!(!prompt.contains("{summary}"));
        assert!(!prompt.contains("{transcript}"));
    }

    #[test]
    fn test_chat_prompt_without_summary() {
        let prompt = chat_prompt(None, "User: hi");
        assert!(prompt.contains("(none yet)"));
    }

    #[test]
    fn test_summary_prompt_fills_transcript() {
        let prompt = summary_prompt("User: hi\nAssistant: hello");
        assert!(prompt.contains("Assistant: hello"));
        assert!(!prompt.contains("{transcript}"));
    }
}
