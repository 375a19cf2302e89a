//! Rule-based pre-classifier — deterministic signals computed before the
//! LLM call.
//!
//! Derives four booleans from the sender domain and subject keywords.
//! Unlike a spam filter these never short-circuit triage: they feed the
//! LLM prompt as context, drive the priority overrides, and always win
//! over same-named fields in the model's output.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::pipeline::types::InboundEmail;

/// Domain and keyword lists driving the rule signals.
///
/// Matching is case-insensitive substring containment: a configured
/// domain matches anywhere in the sender address (so `client.com` also
/// covers `mail.client.com`), a keyword anywhere in the subject.
#[derive(Debug, Clone)]
pub struct RulesConfig {
    /// Internal/leadership sender domains.
    pub hierarchy_domains: Vec<String>,
    /// Client/partner sender domains.
    pub client_domains: Vec<String>,
    /// Subject keywords marking a meeting-type message.
    pub meeting_keywords: Vec<String>,
    /// Subject keywords marking a minutes (MoM) message.
    pub mom_keywords: Vec<String>,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            hierarchy_domains: vec!["yourcompany.com".into()],
            client_domains: vec!["client.com".into(), "partner.org".into()],
            meeting_keywords: vec![
                "meeting".into(),
                "call".into(),
                "sync".into(),
                "discussion".into(),
                "review".into(),
                "zoom".into(),
                "teams".into(),
                "meet".into(),
            ],
            mom_keywords: vec![
                "mom".into(),
                "minutes".into(),
                "summary".into(),
                "action items".into(),
                "notes".into(),
            ],
        }
    }
}

impl RulesConfig {
    /// Build config from environment variables, falling back to the
    /// defaults per list. Lists are comma-separated, e.g.
    /// `HIERARCHY_DOMAINS=corp.com,hq.corp.com`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            hierarchy_domains: env_list("HIERARCHY_DOMAINS")
                .unwrap_or(defaults.hierarchy_domains),
            client_domains: env_list("CLIENT_DOMAINS").unwrap_or(defaults.client_domains),
            meeting_keywords: env_list("MEETING_KEYWORDS").unwrap_or(defaults.meeting_keywords),
            mom_keywords: env_list("MOM_KEYWORDS").unwrap_or(defaults.mom_keywords),
        }
    }
}

/// Read a comma-separated list from the environment. Empty or unset
/// variables yield `None` so the default list applies.
fn env_list(key: &str) -> Option<Vec<String>> {
    let raw = std::env::var(key).ok()?;
    let items: Vec<String> = raw
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect();
    if items.is_empty() { None } else { Some(items) }
}

// ── Signals ─────────────────────────────────────────────────────────

/// Deterministic signals computed from an email before any model call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSignals {
    pub is_hierarchy: bool,
    pub is_client: bool,
    pub is_meeting: bool,
    pub is_mom: bool,
}

/// Rule pre-classifier over an immutable config.
pub struct RulesEngine {
    config: RulesConfig,
}

impl RulesEngine {
    pub fn new(config: RulesConfig) -> Self {
        Self { config }
    }

    /// Compute the four rule signals for an email.
    pub fn evaluate(&self, email: &InboundEmail) -> RuleSignals {
        let sender = email.from.to_lowercase();
        let subject = email.subject.to_lowercase();

        let signals = RuleSignals {
            is_hierarchy: contains_any(&sender, &self.config.hierarchy_domains),
            is_client: contains_any(&sender, &self.config.client_domains),
            is_meeting: contains_any(&subject, &self.config.meeting_keywords),
            is_mom: contains_any(&subject, &self.config.mom_keywords),
        };

        debug!(
            id = %email.id,
            is_hierarchy = signals.is_hierarchy,
            is_client = signals.is_client,
            is_meeting = signals.is_meeting,
            is_mom = signals.is_mom,
            "Rule signals computed"
        );
        signals
    }
}

fn contains_any(haystack: &str, needles: &[String]) -> bool {
    needles.iter().any(|n| haystack.contains(n.as_str()))
}
