//! Token budget for extracted page text.
//!
//! The check happens in tokens, the cut happens in characters. The overshoot
//! is bounded because the cut only runs once the token check already failed.

use std::sync::OnceLock;
use tiktoken_rs::CoreBPE;
use tracing::warn;

/// Approximate bytes per token when the tokenizer is unavailable
const APPROX_BYTES_PER_TOKEN: usize = 4;

/// Appended to text that was cut
pub const TRUNCATION_MARKER: &str = "\n[Content truncated due to length...]";

fn shared_encoder() -> Option<&'static CoreBPE> {
    static ENCODER: OnceLock<Option<CoreBPE>> = OnceLock::new();
    ENCODER
        .get_or_init(|| match tiktoken_rs::cl100k_base() {
            Ok(bpe) => Some(bpe),
            Err(e) => {
                warn!("Tokenizer unavailable, falling back to estimates: {}", e);
                None
            }
        })
        .as_ref()
}

#[derive(Clone, Copy)]
pub struct TokenBudget {
    token_limit: usize,
    char_cut: usize,
    encoder: Option<&'static CoreBPE>,
}

impl std::fmt::Debug for TokenBudget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenBudget")
            .field("token_limit", &self.token_limit)
            .field("char_cut", &self.char_cut)
            .field("exact", &self.encoder.is_some())
            .finish()
    }
}

impl TokenBudget {
    pub fn new(token_limit: usize, char_cut: usize) -> Self {
        Self {
            token_limit,
            char_cut,
            encoder: shared_encoder(),
        }
    }

    pub fn token_limit(&self) -> usize {
        self.token_limit
    }

    pub fn char_cut(&self) -> usize {
        self.char_cut
    }

    /// Count tokens with cl100k, or estimate from byte length.
    pub fn count_tokens(&self, text: &str) -> usize {
        match self.encoder {
            Some(bpe) => bpe.encode_with_special_tokens(text).len(),
            None => text.len().div_ceil(APPROX_BYTES_PER_TOKEN),
        }
    }

    /// Apply the budget. Returns the (possibly cut) text and whether it was cut.
    pub fn apply(&self, text: String) -> (String, bool) {
        if self.count_tokens(&text) <= self.token_limit {
            return (text, false);
        }

        let end = text
            .char_indices()
            .nth(self.char_cut)
            .map(|(i, _)| i)
            .unwrap_or(text.len());
        let mut cut = text[..end].to_string();
        cut.push_str(TRUNCATION_MARKER);
        (cut, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_under_limit_untouched() {
        let budget = TokenBudget::new(1_000, 10);
        let (text, truncated) = budget.apply("a short sentence".to_string());
        assert_eq!(text, "a short sentence");
        assert!(!truncated);
    }

    #[test]
    fn test_over_limit_cut_in_characters() {
        let budget = TokenBudget::new(10, 40);
        let long = "word ".repeat(500);
        let (text, truncated) = budget.apply(long);
        assert!(truncated);
        assert!(text.ends_with(TRUNCATION_MARKER));
        assert!(text.chars().count() <= 40 + TRUNCATION_MARKER.chars().count());
    }

    #[test]
    fn test_cut_respects_char_boundaries() {
        let budget = TokenBudget::new(5, 7);
        let (text, truncated) = budget.apply("żółć ".repeat(200));
        assert!(truncated);
        assert!(text.starts_with("żółć żó"));
    }

    #[test]
    fn test_count_tokens_nonzero() {
        let budget = TokenBudget::new(10, 10);
        assert!(budget.count_tokens("Hello, world!") > 0);
        assert_eq!(budget.count_tokens(""), 0);
    }
}
