//! Token estimation for pre-call budget reservations
//!
//! The ledger needs a spend estimate before the provider call happens. The
//! estimate only has to be in the right ballpark: `commit` replaces it with
//! the measured usage afterwards.

use crate::core::models::ChatRequest;

/// Rough characters-per-token ratio for English-like text.
const CHARS_PER_TOKEN: usize = 4;

/// Per-message overhead tokens (role framing, separators).
const MESSAGE_OVERHEAD_TOKENS: usize = 4;

/// Estimate the prompt token count for a normalized chat request.
pub fn estimate_prompt_tokens(request: &ChatRequest) -> u64 {
    let mut tokens = 0usize;
    for message in &request.messages {
        tokens += message.content.len() / CHARS_PER_TOKEN + MESSAGE_OVERHEAD_TOKENS;
    }
    tokens as u64
}

/// Estimate total tokens (prompt + completion) for reservation purposes.
///
/// Uses the caller's `max_tokens` override when present, otherwise a
/// conservative default completion allowance.
pub fn estimate_total_tokens(request: &ChatRequest) -> u64 {
    let completion = request.overrides.max_tokens.unwrap_or(256) as u64;
    estimate_prompt_tokens(request) + completion
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{CallerIdentity, ChatRequest, Message};

    fn request_with_content(content: &str) -> ChatRequest {
        ChatRequest::new(
            "fast-model",
            vec![Message::user(content)],
            CallerIdentity::new("sk-test"),
        )
    }

    #[test]
    fn prompt_estimate_scales_with_content() {
        let short = request_with_content("hi");
        let long = request_with_content(&"word ".repeat(100));
        assert!(estimate_prompt_tokens(&long) > estimate_prompt_tokens(&short));
    }

    #[test]
    fn total_estimate_honors_max_tokens_override() {
        let mut request = request_with_content("hello");
        request.overrides.max_tokens = Some(1000);
        let with_override = estimate_total_tokens(&request);

        request.overrides.max_tokens = None;
        let without = estimate_total_tokens(&request);

        assert!(with_override > without);
    }
}
