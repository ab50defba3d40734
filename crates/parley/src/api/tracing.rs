//! Correlation IDs and token usage tracking for conversation turns.
//!
//! Assigns a unique `turn_id` to each orchestrated turn so log lines from the
//! router, retry loop, and speech synthesis can be tied together. Tracks
//! cumulative token usage per provider.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use super::router::ProviderId;

/// Generate a unique ID for a conversation turn.
pub fn generate_turn_id() -> String {
    let ts = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    // Use a counter to handle sub-nanosecond calls.
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("turn-{ts:x}-{count:04x}")
}

/// Token usage reported by a provider.
///
/// Accepts both naming schemes seen in the wild: `prompt_tokens` /
/// `completion_tokens` and `input_tokens` / `output_tokens`.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct Usage {
    #[serde(default, alias = "input_tokens", skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<u32>,
    #[serde(default, alias = "output_tokens", skip_serializing_if = "Option::is_none")]
    pub completion_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u32>,
}

impl Usage {
    /// Total tokens, derived from the parts when the provider omits it.
    pub fn total(&self) -> u32 {
        self.total_tokens.unwrap_or_else(|| {
            self.prompt_tokens.unwrap_or(0) + self.completion_tokens.unwrap_or(0)
        })
    }
}

/// Per-provider running totals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProviderTotals {
    pub turns: u64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

/// Cumulative usage across all turns of an orchestrator.
#[derive(Debug, Default)]
pub struct UsageTracker {
    totals: HashMap<ProviderId, ProviderTotals>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one successful turn, with optional token usage.
    pub fn record(&mut self, provider: ProviderId, usage: Option<&Usage>) {
        let entry = self.totals.entry(provider).or_default();
        entry.turns += 1;
        if let Some(usage) = usage {
            entry.prompt_tokens += u64::from(usage.prompt_tokens.unwrap_or(0));
            entry.completion_tokens += u64::from(usage.completion_tokens.unwrap_or(0));
        }
    }

    /// Totals for one provider (zeroed if it was never used).
    pub fn totals(&self, provider: ProviderId) -> ProviderTotals {
        self.totals.get(&provider).cloned().unwrap_or_default()
    }

    /// Tokens consumed across every provider.
    pub fn total_tokens(&self) -> u64 {
        self.totals
            .values()
            .map(|t| t.prompt_tokens + t.completion_tokens)
            .sum()
    }

    /// Format as a short summary string.
    pub fn summary(&self) -> String {
        let primary = self.totals(ProviderId::Primary);
        let secondary = self.totals(ProviderId::Secondary);
        format!(
            "primary: {} turn(s), secondary: {} turn(s), tokens: {} total",
            primary.turns,
            secondary.turns,
            self.total_tokens(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_id_unique() {
        let id1 = generate_turn_id();
        let id2 = generate_turn_id();
        assert_ne!(id1, id2);
        assert!(id1.starts_with("turn-"));
    }

    #[test]
    fn usage_accepts_both_naming_schemes() {
        let openai: Usage =
            serde_json::from_str(r#"{"prompt_tokens":10,"completion_tokens":5}"#).unwrap();
        let anthropic: Usage =
            serde_json::from_str(r#"{"input_tokens":10,"output_tokens":5}"#).unwrap();
        assert_eq!(openai, anthropic);
        assert_eq!(openai.total(), 15);
    }

    #[test]
    fn tracker_accumulates_per_provider() {
        let mut tracker = UsageTracker::new();
        let usage = Usage {
            prompt_tokens: Some(100),
            completion_tokens: Some(50),
            total_tokens: None,
        };
        tracker.record(ProviderId::Primary, Some(&usage));
        tracker.record(ProviderId::Primary, None);
        tracker.record(ProviderId::Secondary, Some(&usage));

        assert_eq!(tracker.totals(ProviderId::Primary).turns, 2);
        assert_eq!(tracker.totals(ProviderId::Primary).prompt_tokens, 100);
        assert_eq!(tracker.total_tokens(), 300);
        assert!(tracker.summary().contains("primary: 2 turn(s)"));
    }
}
