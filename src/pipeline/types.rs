//! Shared types for the correspondence triage pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Inbound email ───────────────────────────────────────────────────

/// Normalized inbound email, as supplied by the mailbox provider.
///
/// The pipeline processes it through rules → retrieval → LLM triage →
/// store logging → meeting tracking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEmail {
    /// Unique message ID (provider-native).
    pub id: String,
    /// Thread/conversation ID, when the provider supplies one.
    #[serde(default)]
    pub thread_id: Option<String>,
    /// Sender address.
    pub from: String,
    /// Recipient addresses.
    #[serde(default)]
    pub to: Vec<String>,
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub body: String,
    /// When the message was received.
    #[serde(default)]
    pub received_at: Option<DateTime<Utc>>,
}

impl InboundEmail {
    /// Receipt timestamp, falling back to the current time when the
    /// provider did not supply one.
    pub fn received_at_or_now(&self) -> DateTime<Utc> {
        self.received_at.unwrap_or_else(Utc::now)
    }
}

// ── Category ────────────────────────────────────────────────────────

/// Message category assigned by triage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Category {
    Work,
    Client,
    Personal,
    Spam,
    Newsletter,
    #[serde(rename = "HR")]
    Hr,
    Finance,
    General,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Work => "Work",
            Self::Client => "Client",
            Self::Personal => "Personal",
            Self::Spam => "Spam",
            Self::Newsletter => "Newsletter",
            Self::Hr => "HR",
            Self::Finance => "Finance",
            Self::General => "General",
        }
    }

    /// Parse a model-emitted category, case-insensitively. Unknown or
    /// missing values fall back to `General`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "work" => Self::Work,
            "client" => Self::Client,
            "personal" => Self::Personal,
            "spam" => Self::Spam,
            "newsletter" => Self::Newsletter,
            "hr" => Self::Hr,
            "finance" => Self::Finance,
            _ => Self::General,
        }
    }
}

// ── Priority ────────────────────────────────────────────────────────

/// Message priority. Ordered so that override rules can only raise it:
/// `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }

    /// Parse a model-emitted priority, case-insensitively. Unknown or
    /// missing values fall back to `Low`.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "medium" => Self::Medium,
            "high" => Self::High,
            _ => Self::Low,
        }
    }
}

// ── Classification result ───────────────────────────────────────────

/// Structured output of the classification engine.
///
/// LLM fields merged with the four rule-derived booleans; rule booleans
/// always win over any same-named field the model emits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub category: Category,
    pub priority: Priority,
    /// Model confidence, clamped to [0, 1].
    pub confidence: f64,
    /// Sender domain is an internal/leadership domain (rule-derived).
    pub is_hierarchy: bool,
    /// Sender domain is a client/partner domain (rule-derived).
    pub is_client: bool,
    pub is_escalation: bool,
    pub is_urgent: bool,
    /// Subject matched a meeting keyword (rule-derived).
    pub is_meeting: bool,
    /// Subject matched a minutes keyword (rule-derived).
    pub is_mom: bool,
    /// The model judged that minutes are expected but absent.
    pub mom_missing: bool,
    /// Suggested follow-up actions, in order.
    pub actions: Vec<String>,
    /// One-line rationale for the classification.
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_reply: Option<String>,
    pub tags: Vec<String>,
}

// ── Processed email ─────────────────────────────────────────────────

/// Result of running one email through classification, store logging,
/// and meeting lifecycle tracking.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessedEmail {
    pub email_id: String,
    pub classification: ClassificationResult,
    /// Whether this email created a new tracked meeting.
    pub meeting_tracked: bool,
    /// How many open meetings a MoM reply closed (0 when not a MoM).
    pub meetings_completed: u64,
    pub processed_at: DateTime<Utc>,
}
