//! Streaming policy shared by every generation: when to publish partial
//! output and when to stop the runtime's sampling loop.

use serde::Serialize;

/// Why a generation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The runtime hit an end-of-sequence token or its own limit.
    EndOfSequence,
    /// The token budget was reached.
    TokenBudget,
    /// The caller cancelled the generation.
    Cancelled,
}

/// What the per-token callback should do for the current token count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenDecision {
    Continue,
    /// Decode everything generated so far and publish it, then continue.
    Publish,
    Stop(StopReason),
}

/// Throttles partial-output publishes to every `publish_every` tokens and
/// enforces the token budget.
///
/// Token counts may arrive in batches; a batch that crosses one or more
/// multiples of `publish_every` yields a single publish.
#[derive(Debug, Clone)]
pub struct TokenPolicy {
    max_tokens: usize,
    publish_every: usize,
    last_published: usize,
    stop_reason: Option<StopReason>,
}

impl TokenPolicy {
    pub fn new(max_tokens: usize, publish_every: usize) -> Self {
        Self {
            max_tokens,
            publish_every: publish_every.max(1),
            last_published: 0,
            stop_reason: None,
        }
    }

    pub fn observe(&mut self, token_count: usize, cancelled: bool) -> TokenDecision {
        if cancelled {
            return self.stop(StopReason::Cancelled);
        }
        // No partial publish at the budget: the final publish follows right away.
        if token_count >= self.max_tokens {
            return self.stop(StopReason::TokenBudget);
        }
        if token_count / self.publish_every > self.last_published / self.publish_every {
            self.last_published = token_count;
            return TokenDecision::Publish;
        }
        TokenDecision::Continue
    }

    /// The reason this policy stopped the stream, or `EndOfSequence` when the
    /// runtime finished on its own.
    pub fn stop_reason(&self) -> StopReason {
        self.stop_reason.unwrap_or(StopReason::EndOfSequence)
    }

    fn stop(&mut self, reason: StopReason) -> TokenDecision {
        self.stop_reason.get_or_insert(reason);
        TokenDecision::Stop(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publishes_on_every_fourth_token() {
        let mut policy = TokenPolicy::new(420, 4);
        let publishes: Vec<usize> = (1..=12)
            .filter(|&n| policy.observe(n, false) == TokenDecision::Publish)
            .collect();
        assert_eq!(publishes, vec![4, 8, 12]);
    }

    #[test]
    fn batch_crossing_several_multiples_publishes_once() {
        let mut policy = TokenPolicy::new(420, 4);
        assert_eq!(policy.observe(3, false), TokenDecision::Continue);
        assert_eq!(policy.observe(10, false), TokenDecision::Publish);
        assert_eq!(policy.observe(11, false), TokenDecision::Continue);
        assert_eq!(policy.observe(12, false), TokenDecision::Publish);
    }

    #[test]
    fn stops_exactly_at_budget() {
        let mut policy = TokenPolicy::new(6, 4);
        for n in 1..6 {
            assert!(!matches!(policy.observe(n, false), TokenDecision::Stop(_)), "stopped at {n}");
        }
        assert_eq!(policy.observe(6, false), TokenDecision::Stop(StopReason::TokenBudget));
        assert_eq!(policy.stop_reason(), StopReason::TokenBudget);
    }

    #[test]
    fn budget_on_a_publish_boundary_stops_without_publishing() {
        let mut policy = TokenPolicy::new(8, 4);
        assert_eq!(policy.observe(4, false), TokenDecision::Publish);
        assert_eq!(policy.observe(8, false), TokenDecision::Stop(StopReason::TokenBudget));
    }

    #[test]
    fn cancellation_wins() {
        let mut policy = TokenPolicy::new(8, 4);
        assert_eq!(policy.observe(4, true), TokenDecision::Stop(StopReason::Cancelled));
        assert_eq!(policy.stop_reason(), StopReason::Cancelled);
    }

    #[test]
    fn natural_end_reports_end_of_sequence() {
        let mut policy = TokenPolicy::new(420, 4);
        policy.observe(5, false);
        assert_eq!(policy.stop_reason(), StopReason::EndOfSequence);
    }
}
