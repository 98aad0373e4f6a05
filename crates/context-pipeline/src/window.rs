//! C7 — TokenWindow: the final trim. Packs messages newest-first into a
//! budget with configurable headroom, pinning a leading `[HISTORY_SUMMARY]`
//! message if present.

use context_types::{ContextError, Conversation, HeadroomPercent, Message, Result, TokenBudget};

use crate::token::TokenCounter;

/// Headroom `TokenWindow::trim_to_budget` is called with.
#[derive(Debug, Clone, Copy)]
pub struct TokenWindowConfig {
    pub headroom: f32,
}

impl Default for TokenWindowConfig {
    fn default() -> Self {
        Self { headroom: 0.1 }
    }
}

/// Diagnostics `trim_to_budget` reports alongside the trimmed conversation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrimDiagnostics {
    pub current_tokens: u32,
    pub budget: u32,
    /// Computed against the raw `budget`, not the effective (headroom-
    /// adjusted) budget — see the open question in the design notes.
    pub within_budget: bool,
    pub utilization_percent: f32,
    pub was_trimmed: bool,
    pub removed_count: usize,
}

/// The trimmed conversation plus the diagnostics describing what happened.
#[derive(Debug, Clone, PartialEq)]
pub struct TrimOutcome {
    pub conversation: Conversation,
    pub diagnostics: TrimDiagnostics,
}

/// Final token-budget trim over a conversation.
pub struct TokenWindow<'a> {
    counter: &'a TokenCounter,
    config: TokenWindowConfig,
}

impl<'a> TokenWindow<'a> {
    pub fn new(counter: &'a TokenCounter, config: TokenWindowConfig) -> Self {
        Self { counter, config }
    }

    /// `trim_to_budget` — see module docs.
    pub fn trim_to_budget(&self, conversation: &Conversation, budget: TokenBudget) -> Result<TrimOutcome> {
        let headroom = HeadroomPercent::new(self.config.headroom).ok_or_else(|| {
            ContextError::validation(
                "TokenWindow",
                format!("headroom {} is out of range [0.0, 1.0)", self.config.headroom),
            )
        })?;

        if conversation.is_empty() {
            return Err(ContextError::validation(
                "TokenWindow",
                "cannot trim an empty conversation",
            ));
        }

        let effective = headroom.apply(budget);
        let current_tokens = self.counter.count_conversation(conversation);

        if current_tokens <= effective {
            return Ok(TrimOutcome {
                conversation: conversation.clone(),
                diagnostics: diagnostics(current_tokens, budget, current_tokens, false, 0),
            });
        }

        let messages = conversation.messages();
        let (pinned, rest) = match messages.first() {
            Some(first) if first.is_history_summary() => (Some(first.clone()), &messages[1..]),
            _ => (None, messages),
        };

        let pinned_tokens = pinned.as_ref().map(|m| self.counter.count_message(m)).unwrap_or(0);
        let remaining_budget = effective.saturating_sub(pinned_tokens);

        let mut kept_reversed: Vec<Message> = Vec::new();
        let mut running_total = 0u32;
        for message in rest.iter().rev() {
            let cost = self.counter.count_message(message);
            if running_total + cost > remaining_budget {
                break;
            }
            running_total += cost;
            kept_reversed.push(message.clone());
        }
        kept_reversed.reverse();

        let mut out_messages = Vec::with_capacity(kept_reversed.len() + 1);
        out_messages.extend(pinned.clone());
        out_messages.extend(kept_reversed);

        let removed_count = messages.len() - out_messages.len();
        let out_conversation = Conversation::new(out_messages);
        let final_tokens = self.counter.count_conversation(&out_conversation);

        Ok(TrimOutcome {
            conversation: out_conversation,
            diagnostics: diagnostics(current_tokens, budget, final_tokens, true, removed_count),
        })
    }
}

fn diagnostics(
    current_tokens: u32,
    budget: TokenBudget,
    final_tokens: u32,
    was_trimmed: bool,
    removed_count: usize,
) -> TrimDiagnostics {
    let raw_budget = budget.get();
    TrimDiagnostics {
        current_tokens: final_tokens,
        budget: raw_budget,
        within_budget: final_tokens <= raw_budget,
        utilization_percent: (final_tokens as f32 / raw_budget as f32) * 100.0,
        was_trimmed,
        removed_count,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use context_types::Tokenizer;

    use super::*;
    use crate::token::ApproxCharTokenizer;

    fn counter() -> TokenCounter {
        TokenCounter::new(Arc::new(ApproxCharTokenizer) as Arc<dyn Tokenizer>).unwrap()
    }

    #[test]
    fn under_budget_is_returned_unchanged() {
        let counter = counter();
        let window = TokenWindow::new(&counter, TokenWindowConfig { headroom: 0.1 });
        let conv = Conversation::new(vec![Message::user("hi"), Message::assistant("hello")]);
        let outcome = window.trim_to_budget(&conv, TokenBudget::new(1000).unwrap()).unwrap();
        assert_eq!(outcome.conversation, conv);
        assert!(!outcome.diagnostics.was_trimmed);
    }

    #[test]
    fn over_budget_keeps_newest_messages_in_order() {
        let counter = counter();
        let window = TokenWindow::new(&counter, TokenWindowConfig { headroom: 0.0 });
        let mut messages = Vec::new();
        for i in 0..20 {
            messages.push(Message::user(format!("turn {i}")));
            messages.push(Message::assistant(format!("reply {i}")));
        }
        let conv = Conversation::new(messages.clone());
        let outcome = window.trim_to_budget(&conv, TokenBudget::new(60).unwrap()).unwrap();
        assert!(outcome.diagnostics.was_trimmed);
        assert!(outcome.conversation.count() < messages.len());
        // Kept messages are a chronological-order suffix of the input.
        let kept = outcome.conversation.messages();
        assert_eq!(kept, &messages[messages.len() - kept.len()..]);
    }

    #[test]
    fn pinned_history_summary_is_never_evicted() {
        let counter = counter();
        let window = TokenWindow::new(&counter, TokenWindowConfig { headroom: 0.0 });
        let mut messages = vec![Message::system(context_types::wrap_history_summary("digest"))];
        for i in 0..20 {
            messages.push(Message::user(format!("turn {i}")));
        }
        let conv = Conversation::new(messages);
        let outcome = window.trim_to_budget(&conv, TokenBudget::new(30).unwrap()).unwrap();
        assert!(outcome.conversation.messages()[0].is_history_summary());
    }

    #[test]
    fn rejects_empty_conversation() {
        let counter = counter();
        let window = TokenWindow::new(&counter, TokenWindowConfig::default());
        let conv = Conversation::empty();
        let result = window.trim_to_budget(&conv, TokenBudget::new(100).unwrap());
        assert!(matches!(result, Err(ContextError::Validation { .. })));
    }

    #[test]
    fn rejects_out_of_range_headroom() {
        let counter = counter();
        let window = TokenWindow::new(&counter, TokenWindowConfig { headroom: 1.5 });
        let conv = Conversation::new(vec![Message::user("hi")]);
        let result = window.trim_to_budget(&conv, TokenBudget::new(100).unwrap());
        assert!(matches!(result, Err(ContextError::Validation { .. })));
    }
}
