//! Mail Sentinel — correspondence triage and follow-up engine.

pub mod api;
pub mod channels;
pub mod config;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod reminders;
pub mod retrieval;
pub mod store;
