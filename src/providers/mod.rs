pub mod claude;
pub mod codex;
pub mod gemini;
pub mod provider;
pub mod types;

pub use claude::ClaudeProvider;
pub use codex::CodexProvider;
pub use gemini::GeminiProvider;
pub use provider::{ProviderError, QueryProvider, QueryRequest};
pub use types::{Message, MessageRole, QueryOptions, ResponseMetrics, StreamChunk};

use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// The providers claif can dispatch to. Closed set: adding a backend means
/// adding a variant, an implementation module, and a config table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Claude,
    Gemini,
    Codex,
}

impl ProviderKind {
    /// All providers in registry/display order.
    pub const ALL: [ProviderKind; 3] = [
        ProviderKind::Claude,
        ProviderKind::Gemini,
        ProviderKind::Codex,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::Claude => "claude",
            ProviderKind::Gemini => "gemini",
            ProviderKind::Codex => "codex",
        }
    }

    /// Case-insensitive parse, for config values and environment variables.
    /// CLI flags go through clap's ValueEnum instead.
    pub fn parse(s: &str) -> Option<ProviderKind> {
        match s.to_ascii_lowercase().as_str() {
            "claude" => Some(ProviderKind::Claude),
            "gemini" => Some(ProviderKind::Gemini),
            "codex" => Some(ProviderKind::Codex),
            _ => None,
        }
    }

    /// Environment variable holding this provider's API key.
    pub fn api_key_env(self) -> &'static str {
        match self {
            ProviderKind::Claude => "ANTHROPIC_API_KEY",
            ProviderKind::Gemini => "GEMINI_API_KEY",
            ProviderKind::Codex => "OPENAI_API_KEY",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}
