//! Classification engine — fuses rule signals, policy retrieval, and a
//! structured LLM call into one classification result.
//!
//! Flow:
//! 1. Rule pre-classifier (fast, no I/O) → four boolean signals
//! 2. Policy retriever → top-K policy snippets for grounding
//! 3. LLM call (retried on capacity errors) → structured JSON analysis
//! 4. Priority overrides + rule-signal merge → `ClassificationResult`
//!
//! A retrieval failure or an exhausted/malformed LLM call fails the
//! whole classification; nothing is persisted for that message.

use std::sync::Arc;

use tracing::debug;

use crate::error::{LlmError, PipelineError};
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider, RetryPolicy, retry_with_backoff};
use crate::pipeline::rules::{RuleSignals, RulesEngine};
use crate::pipeline::types::{Category, ClassificationResult, InboundEmail, Priority};
use crate::retrieval::{DEFAULT_TOP_K, PolicyRetriever};

/// Max tokens for the triage completion (structured JSON payload).
const TRIAGE_MAX_TOKENS: u64 = 1024;

/// Temperature for triage (deterministic-ish).
const TRIAGE_TEMPERATURE: f64 = 0.1;

/// Email body chars included in the prompt.
const TRIAGE_BODY_MAX_CHARS: usize = 4000;

/// Fields the model must return; absence fails the classification.
/// `category` and `priority` are absent here on purpose — they fall
/// back to `General`/`Low`.
const REQUIRED_FIELDS: [&str; 7] = [
    "confidence",
    "is_escalation",
    "is_urgent",
    "mom_missing",
    "actions",
    "reason",
    "tags",
];

/// Composes rules, retrieval, and the LLM into `classify()`.
pub struct ClassificationEngine {
    retriever: Arc<dyn PolicyRetriever>,
    llm: Arc<dyn LlmProvider>,
    rules: RulesEngine,
    retry: RetryPolicy,
}

impl ClassificationEngine {
    pub fn new(
        retriever: Arc<dyn PolicyRetriever>,
        llm: Arc<dyn LlmProvider>,
        rules: RulesEngine,
    ) -> Self {
        Self {
            retriever,
            llm,
            rules,
            retry: RetryPolicy::default(),
        }
    }

    /// Override the retry policy (tests use millisecond delays).
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Classify one email. Pure with respect to the store — persisting
    /// the result is the caller's job.
    pub async fn classify(
        &self,
        email: &InboundEmail,
    ) -> Result<ClassificationResult, PipelineError> {
        let signals = self.rules.evaluate(email);

        let query = format!("{}\n{}", email.subject, email.body);
        let snippets = self.retriever.retrieve(&query, DEFAULT_TOP_K).await?;

        let request = CompletionRequest::new(vec![
            ChatMessage::system(build_triage_system_prompt(&signals, &snippets)),
            ChatMessage::user(build_triage_user_prompt(email)),
        ])
        .with_temperature(TRIAGE_TEMPERATURE)
        .with_max_tokens(TRIAGE_MAX_TOKENS);

        let response = retry_with_backoff(self.retry, LlmError::is_transient, || {
            self.llm.complete(request.clone())
        })
        .await?;

        let result = parse_classification(&response.content, signals)?;
        debug!(
            id = %email.id,
            category = result.category.as_str(),
            priority = result.priority.as_str(),
            confidence = result.confidence,
            "Email classified"
        );
        Ok(result)
    }
}

// ── Prompt construction ─────────────────────────────────────────────

fn build_triage_system_prompt(signals: &RuleSignals, policies: &[String]) -> String {
    format!(
        "You are an intelligent email analyzer for a corporate environment.\n\
         Your goal is to classify emails, assess priority, and detect actionable items \
         based on company policies.\n\n\
         CONTEXT:\n\
         - Is Hierarchy (Internal Management): {is_hierarchy}\n\
         - Is Client (External): {is_client}\n\
         - Is Meeting Related: {is_meeting}\n\n\
         RELEVANT POLICIES:\n\
         {policies}\n\n\
         TASK:\n\
         Analyze the email and respond with ONLY a JSON object with the following fields:\n\
         - category: (String) One of \"Work\", \"Client\", \"Personal\", \"Spam\", \"Newsletter\", \"HR\", \"Finance\"\n\
         - priority: (String) \"High\", \"Medium\", \"Low\"\n\
         - confidence: (Number) 0.0 to 1.0\n\
         - is_escalation: (Boolean) true if the tone indicates anger, frustration, or explicit escalation\n\
         - is_urgent: (Boolean) true if immediate action is requested (e.g. \"ASAP\", \"Urgent\", deadlines today)\n\
         - mom_missing: (Boolean) true ONLY if this is a past meeting whose minutes (MoM) have not been sent yet\n\
         - actions: (Array<String>) recommended actions (e.g. \"Reply\", \"Schedule Meeting\", \"File Ticket\")\n\
         - reason: (String) brief explanation of the classification\n\
         - suggested_reply: (String) a draft response, when a reply is warranted\n\
         - tags: (Array<String>) relevant tags (e.g. \"Project X\", \"Invoice\", \"Bug\")",
        is_hierarchy = signals.is_hierarchy,
        is_client = signals.is_client,
        is_meeting = signals.is_meeting,
        policies = policies.join("\n"),
    )
}

fn build_triage_user_prompt(email: &InboundEmail) -> String {
    // Body truncated for token efficiency; retrieval already saw the
    // full text.
    let body_preview: String = email.body.chars().take(TRIAGE_BODY_MAX_CHARS).collect();
    format!(
        "From: {}\nSubject: {}\n\n{}",
        email.from, email.subject, body_preview
    )
}

// ── Response parsing ────────────────────────────────────────────────

/// Analysis fields as the model emits them, before validation/merge.
#[derive(Debug, serde::Deserialize)]
struct RawAnalysis {
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    priority: Option<String>,
    confidence: f64,
    is_escalation: bool,
    is_urgent: bool,
    mom_missing: bool,
    actions: Vec<String>,
    reason: String,
    #[serde(default)]
    suggested_reply: Option<String>,
    tags: Vec<String>,
}

/// Validate and merge the model response with the rule signals.
///
/// Missing required fields and non-JSON payloads are hard failures,
/// never coerced. Rule booleans always win over same-named fields in
/// the model output.
fn parse_classification(
    raw: &str,
    signals: RuleSignals,
) -> Result<ClassificationResult, PipelineError> {
    let json_str = extract_json_object(raw);
    let value: serde_json::Value = serde_json::from_str(&json_str).map_err(|e| {
        PipelineError::Classification(format!("triage response was not valid JSON: {e}"))
    })?;

    for field in REQUIRED_FIELDS {
        if value.get(field).is_none() {
            return Err(PipelineError::Classification(format!(
                "triage response missing required field `{field}`"
            )));
        }
    }

    let analysis: RawAnalysis = serde_json::from_value(value).map_err(|e| {
        PipelineError::Classification(format!("triage response malformed: {e}"))
    })?;

    let category = analysis
        .category
        .as_deref()
        .map(Category::parse)
        .unwrap_or(Category::General);
    let mut priority = analysis
        .priority
        .as_deref()
        .map(Priority::parse)
        .unwrap_or(Priority::Low);

    // Overrides, in order: hierarchy/client lifts Low to Medium, then
    // escalation/urgency forces High and dominates.
    if (signals.is_hierarchy || signals.is_client) && priority == Priority::Low {
        priority = Priority::Medium;
    }
    if analysis.is_escalation || analysis.is_urgent {
        priority = Priority::High;
    }

    Ok(ClassificationResult {
        category,
        priority,
        confidence: analysis.confidence.clamp(0.0, 1.0),
        is_hierarchy: signals.is_hierarchy,
        is_client: signals.is_client,
        is_escalation: analysis.is_escalation,
        is_urgent: analysis.is_urgent,
        is_meeting: signals.is_meeting,
        is_mom: signals.is_mom,
        mom_missing: analysis.mom_missing,
        actions: analysis.actions,
        reason: analysis.reason,
        suggested_reply: analysis.suggested_reply.filter(|s| !s.trim().is_empty()),
        tags: analysis.tags,
    })
}

/// Extract a JSON object from model output (handles markdown fences).
fn extract_json_object(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.starts_with('{') {
        return trimmed.to_string();
    }

    for fence in ["```json", "```"] {
        if let Some(start) = trimmed.find(fence) {
            let after = &trimmed[start + fence.len()..];
            if let Some(end) = after.find("```") {
                let inner = after[..end].trim();
                if inner.starts_with('{') {
                    return inner.to_string();
                }
            }
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}'))
        && end > start
    {
        return trimmed[start..=end].to_string();
    }

    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::error::RetrievalError;
    use crate::llm::CompletionResponse;
    use crate::pipeline::rules::RulesConfig;

    struct StaticRetriever {
        snippets: Vec<String>,
        fail: bool,
    }

    #[async_trait]
    impl PolicyRetriever for StaticRetriever {
        async fn retrieve(
            &self,
            _text: &str,
            _limit: usize,
        ) -> Result<Vec<String>, RetrievalError> {
            if self.fail {
                return Err(RetrievalError::SearchFailed {
                    reason: "index offline".into(),
                });
            }
            Ok(self.snippets.clone())
        }
    }

    struct ScriptedLlm {
        responses: Mutex<VecDeque<Result<String, LlmError>>>,
        calls: AtomicU32,
    }

    impl ScriptedLlm {
        fn new(responses: Vec<Result<String, LlmError>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                calls: AtomicU32::new(0),
            }
        }

        fn call_count(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedLlm {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.responses.lock().unwrap().pop_front() {
                Some(Ok(content)) => Ok(CompletionResponse { content }),
                Some(Err(e)) => Err(e),
                None => panic!("scripted responses exhausted"),
            }
        }
    }

    fn fast_retry() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 5,
            initial_delay: Duration::from_millis(1),
        }
    }

    fn make_engine(
        retriever: StaticRetriever,
        llm: Arc<ScriptedLlm>,
    ) -> ClassificationEngine {
        ClassificationEngine::new(
            Arc::new(retriever),
            llm,
            RulesEngine::new(RulesConfig::default()),
        )
        .with_retry_policy(fast_retry())
    }

    fn make_email(from: &str, subject: &str) -> InboundEmail {
        InboundEmail {
            id: "e1".into(),
            thread_id: Some("t1".into()),
            from: from.into(),
            to: vec!["me@yourcompany.com".into()],
            subject: subject.into(),
            body: "Please see details attached.".into(),
            received_at: None,
        }
    }

    fn analysis_json(priority: &str, extra: &str) -> String {
        format!(
            r#"{{"category":"Work","priority":"{priority}","confidence":0.9,
                "is_escalation":false,"is_urgent":false,"mom_missing":false,
                "actions":["Reply"],"reason":"test","suggested_reply":"Will do.",
                "tags":["Project X"]{extra}}}"#
        )
    }

    #[tokio::test]
    async fn merges_rule_signals_with_model_output() {
        let llm = Arc::new(ScriptedLlm::new(vec![Ok(analysis_json("High", ""))]));
        let engine = make_engine(
            StaticRetriever { snippets: vec!["policy A".into()], fail: false },
            Arc::clone(&llm),
        );

        let result = engine
            .classify(&make_email("pm@client.com", "Sync call tomorrow"))
            .await
            .unwrap();

        assert!(result.is_client);
        assert!(result.is_meeting);
        assert!(!result.is_hierarchy);
        assert!(!result.is_mom);
        assert_eq!(result.category, Category::Work);
        assert_eq!(result.priority, Priority::High);
        assert_eq!(result.suggested_reply.as_deref(), Some("Will do."));
        assert_eq!(llm.call_count(), 1);
    }

    #[tokio::test]
    async fn client_sender_lifts_low_to_medium() {
        let llm = Arc::new(ScriptedLlm::new(vec![Ok(analysis_json("Low", ""))]));
        let engine = make_engine(
            StaticRetriever { snippets: vec![], fail: false },
            Arc::clone(&llm),
        );

        let result = engine
            .classify(&make_email("pm@client.com", "Sync call tomorrow"))
            .await
            .unwrap();
        assert_eq!(result.priority, Priority::Medium);
    }

    #[tokio::test]
    async fn hierarchy_does_not_touch_medium() {
        let llm = Arc::new(ScriptedLlm::new(vec![Ok(analysis_json("Medium", ""))]));
        let engine = make_engine(
            StaticRetriever { snippets: vec![], fail: false },
            Arc::clone(&llm),
        );

        let result = engine
            .classify(&make_email("ceo@yourcompany.com", "Numbers"))
            .await
            .unwrap();
        assert_eq!(result.priority, Priority::Medium);
    }

    #[tokio::test]
    async fn escalation_forces_high() {
        let response = analysis_json("Low", "").replace(
            r#""is_escalation":false"#,
            r#""is_escalation":true"#,
        );
        let llm = Arc::new(ScriptedLlm::new(vec![Ok(response)]));
        let engine = make_engine(
            StaticRetriever { snippets: vec![], fail: false },
            Arc::clone(&llm),
        );

        let result = engine
            .classify(&make_email("nobody@example.com", "Complaint"))
            .await
            .unwrap();
        assert_eq!(result.priority, Priority::High);
    }

    #[tokio::test]
    async fn model_cannot_override_rule_booleans() {
        let llm = Arc::new(ScriptedLlm::new(vec![Ok(analysis_json(
            "Low",
            r#","is_meeting":true,"is_hierarchy":true"#,
        ))]));
        let engine = make_engine(
            StaticRetriever { snippets: vec![], fail: false },
            Arc::clone(&llm),
        );

        // Plain external sender, no meeting keyword in the subject.
        let result = engine
            .classify(&make_email("someone@example.com", "Question"))
            .await
            .unwrap();
        assert!(!result.is_meeting);
        assert!(!result.is_hierarchy);
    }

    #[tokio::test]
    async fn missing_required_field_is_hard_failure() {
        let llm = Arc::new(ScriptedLlm::new(vec![Ok(
            r#"{"category":"Work","priority":"Low"}"#.to_string(),
        )]));
        let engine = make_engine(
            StaticRetriever { snippets: vec![], fail: false },
            Arc::clone(&llm),
        );

        let err = engine
            .classify(&make_email("a@example.com", "Hello"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("confidence"), "got: {err}");
        // Malformed responses are not retried.
        assert_eq!(llm.call_count(), 1);
    }

    #[tokio::test]
    async fn non_json_response_is_hard_failure() {
        let llm = Arc::new(ScriptedLlm::new(vec![Ok(
            "I could not analyze this email.".to_string(),
        )]));
        let engine = make_engine(
            StaticRetriever { snippets: vec![], fail: false },
            Arc::clone(&llm),
        );

        let err = engine
            .classify(&make_email("a@example.com", "Hello"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Classification(_)));
    }

    #[tokio::test]
    async fn fenced_json_is_accepted() {
        let fenced = format!("```json\n{}\n```", analysis_json("Medium", ""));
        let llm = Arc::new(ScriptedLlm::new(vec![Ok(fenced)]));
        let engine = make_engine(
            StaticRetriever { snippets: vec![], fail: false },
            Arc::clone(&llm),
        );

        let result = engine
            .classify(&make_email("a@example.com", "Hello"))
            .await
            .unwrap();
        assert_eq!(result.priority, Priority::Medium);
    }

    #[tokio::test]
    async fn confidence_is_clamped() {
        let response = analysis_json("Low", "").replace("0.9", "1.7");
        let llm = Arc::new(ScriptedLlm::new(vec![Ok(response)]));
        let engine = make_engine(
            StaticRetriever { snippets: vec![], fail: false },
            Arc::clone(&llm),
        );

        let result = engine
            .classify(&make_email("a@example.com", "Hello"))
            .await
            .unwrap();
        assert_eq!(result.confidence, 1.0);
    }

    #[tokio::test]
    async fn category_and_priority_fall_back() {
        let response = r#"{"confidence":0.5,"is_escalation":false,"is_urgent":false,
            "mom_missing":false,"actions":[],"reason":"unsure","tags":[]}"#;
        let llm = Arc::new(ScriptedLlm::new(vec![Ok(response.to_string())]));
        let engine = make_engine(
            StaticRetriever { snippets: vec![], fail: false },
            Arc::clone(&llm),
        );

        let result = engine
            .classify(&make_email("a@example.com", "Hello"))
            .await
            .unwrap();
        assert_eq!(result.category, Category::General);
        assert_eq!(result.priority, Priority::Low);
    }

    #[tokio::test]
    async fn retrieval_failure_aborts_before_llm() {
        let llm = Arc::new(ScriptedLlm::new(vec![]));
        let engine = make_engine(
            StaticRetriever { snippets: vec![], fail: true },
            Arc::clone(&llm),
        );

        let err = engine
            .classify(&make_email("a@example.com", "Hello"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Retrieval(_)));
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn transient_llm_errors_are_retried() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            Err(LlmError::RateLimited { provider: "scripted".into(), retry_after: None }),
            Err(LlmError::Unavailable {
                provider: "scripted".into(),
                reason: "overloaded".into(),
            }),
            Ok(analysis_json("Low", "")),
        ]));
        let engine = make_engine(
            StaticRetriever { snippets: vec![], fail: false },
            Arc::clone(&llm),
        );

        let result = engine.classify(&make_email("a@example.com", "Hello")).await;
        assert!(result.is_ok());
        assert_eq!(llm.call_count(), 3);
    }

    #[tokio::test]
    async fn non_transient_llm_error_propagates_immediately() {
        let llm = Arc::new(ScriptedLlm::new(vec![Err(LlmError::AuthFailed {
            provider: "scripted".into(),
        })]));
        let engine = make_engine(
            StaticRetriever { snippets: vec![], fail: false },
            Arc::clone(&llm),
        );

        let err = engine
            .classify(&make_email("a@example.com", "Hello"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Llm(LlmError::AuthFailed { .. })));
        assert_eq!(llm.call_count(), 1);
    }

    #[test]
    fn extract_json_handles_bare_and_fenced_objects() {
        assert_eq!(extract_json_object(r#"{"a":1}"#), r#"{"a":1}"#);
        assert_eq!(extract_json_object("```json\n{\"a\":1}\n```"), r#"{"a":1}"#);
        assert_eq!(extract_json_object("```\n{\"a\":1}\n```"), r#"{"a":1}"#);
        assert_eq!(
            extract_json_object("Here you go: {\"a\":1} — done"),
            r#"{"a":1}"#
        );
    }

    #[test]
    fn system_prompt_carries_signals_and_policies() {
        let signals = RuleSignals {
            is_hierarchy: true,
            is_client: false,
            is_meeting: true,
            is_mom: false,
        };
        let prompt =
            build_triage_system_prompt(&signals, &["Policy one".into(), "Policy two".into()]);
        assert!(prompt.contains("Is Hierarchy (Internal Management): true"));
        assert!(prompt.contains("Is Meeting Related: true"));
        assert!(prompt.contains("Policy one\nPolicy two"));
    }
}
