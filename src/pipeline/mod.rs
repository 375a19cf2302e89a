//! Message triage pipeline.
//!
//! Every inbound message flows through:
//! 1. `RulesEngine::evaluate()` — fast domain/keyword signals (no LLM)
//! 2. `ClassificationEngine::classify()` — policy retrieval + LLM triage
//! 3. `TriageProcessor::process()` — persist the result, update meeting
//!    lifecycle state
//!
//! Reminder scanning and dispatch live in `crate::reminders` and run on
//! their own triggers.

pub mod engine;
pub mod processor;
pub mod rules;
pub mod tracker;
pub mod types;

pub use engine::ClassificationEngine;
pub use processor::TriageProcessor;
pub use rules::{RuleSignals, RulesConfig, RulesEngine};
pub use tracker::{MeetingTracker, TrackingOutcome};
pub use types::{Category, ClassificationResult, InboundEmail, Priority, ProcessedEmail};
