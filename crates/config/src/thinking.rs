//! Thinking-block (chain-of-thought) policy configuration.

use serde::Deserialize;

fn default_enabled() -> bool {
    true
}

fn default_budget_tokens() -> u32 {
    10_000
}

/// Default thinking-block policy applied when a client does not explicitly
/// request or refuse extended thinking.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThinkingConfig {
    /// Whether thinking is enabled by default for models that support it.
    pub enabled: bool,
    /// Default `budget_tokens` forwarded to the upstream `thinkingConfig`
    /// when a client requests thinking without specifying a budget.
    pub budget_tokens: u32,
}

impl Default for ThinkingConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            budget_tokens: default_budget_tokens(),
        }
    }
}
