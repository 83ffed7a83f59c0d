//! Two-tier intent classification: the ordered pattern rules first, the
//! remote classifier only when the patterns are not confident enough.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use shopchat_core::config::ClassifierConfig;
use shopchat_core::domain::intent::IntentResult;
use shopchat_core::errors::ApplicationError;
use shopchat_core::retry::AttemptError;
use shopchat_core::text::normalize;
use shopchat_core::RetryPolicy;

use crate::context::{ClassifierContext, LastSlots};
use crate::guardrails::{GuardrailDecision, RemoteGuardrail};
use crate::remote::{DisabledRemoteClassifier, HttpRemoteClassifier, RemoteClassifier, RemoteRequest};
use crate::rules::{first_match, RuleInput, CONTEXT_RULES, DOMAIN_RULES};

#[derive(Clone, Debug, PartialEq)]
pub struct ClassifierSettings {
    pub remote_enabled: bool,
    /// Pattern results at or above this confidence never reach the remote tier.
    pub confidence_threshold: f32,
    pub per_attempt_timeout: Duration,
    pub retry: RetryPolicy,
    pub history_limit: usize,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            remote_enabled: false,
            confidence_threshold: 0.9,
            per_attempt_timeout: Duration::from_secs(8),
            retry: RetryPolicy::with_retries(2, 200),
            history_limit: 6,
        }
    }
}

impl ClassifierSettings {
    pub fn from_config(config: &ClassifierConfig) -> Self {
        Self {
            remote_enabled: config.enabled,
            confidence_threshold: config.confidence_threshold,
            per_attempt_timeout: Duration::from_secs(config.timeout_secs),
            retry: RetryPolicy::with_retries(config.max_retries, config.retry_base_delay_ms),
            history_limit: config.history_limit,
        }
    }
}

pub struct IntentClassifier {
    remote: Arc<dyn RemoteClassifier>,
    guardrail: RemoteGuardrail,
    settings: ClassifierSettings,
}

impl IntentClassifier {
    pub fn new(remote: Arc<dyn RemoteClassifier>, settings: ClassifierSettings) -> Self {
        Self { remote, guardrail: RemoteGuardrail::default(), settings }
    }

    pub fn pattern_only() -> Self {
        Self::new(Arc::new(DisabledRemoteClassifier), ClassifierSettings::default())
    }

    /// Builds the HTTP remote tier when it is enabled. A remote tier that
    /// cannot be constructed leaves the classifier pattern-only.
    pub fn from_config(config: &ClassifierConfig) -> Self {
        let settings = ClassifierSettings::from_config(config);
        if !settings.remote_enabled {
            return Self::new(Arc::new(DisabledRemoteClassifier), settings);
        }
        match HttpRemoteClassifier::from_config(config) {
            Ok(remote) => Self::new(Arc::new(remote), settings),
            Err(error) => {
                warn!(
                    event_name = "classifier.remote_unavailable",
                    error = %error,
                    "remote classifier disabled; falling back to pattern rules only"
                );
                Self::new(Arc::new(DisabledRemoteClassifier), settings)
            }
        }
    }

    pub fn with_guardrail(mut self, guardrail: RemoteGuardrail) -> Self {
        self.guardrail = guardrail;
        self
    }

    pub fn settings(&self) -> &ClassifierSettings {
        &self.settings
    }

    /// Deterministic tier only.
    pub fn classify_patterns(&self, raw: &str, last_slots: &LastSlots) -> IntentResult {
        let text = normalize(raw);
        if text.is_empty() {
            return IntentResult::unknown();
        }

        let input = RuleInput { text: &text, raw: raw.trim(), last_slots };
        let context_match = last_slots
            .open_checkout_step()
            .and_then(|_| first_match(CONTEXT_RULES, &input));
        match context_match.or_else(|| first_match(DOMAIN_RULES, &input)) {
            Some((rule, result)) => {
                debug!(
                    event_name = "classifier.pattern_matched",
                    rule,
                    intent = result.intent.as_str(),
                    confidence = result.confidence,
                    "pattern rule matched"
                );
                result
            }
            None => IntentResult::unknown(),
        }
    }

    /// Never fails: every remote problem degrades to the pattern result.
    pub async fn classify(
        &self,
        raw: &str,
        context: &ClassifierContext,
        last_slots: &LastSlots,
    ) -> IntentResult {
        let pattern = self.classify_patterns(raw, last_slots);
        if raw.trim().is_empty()
            || pattern.confidence >= self.settings.confidence_threshold
            || !self.settings.remote_enabled
            || !self.remote.is_enabled()
        {
            return pattern;
        }

        let request = self.remote_request(raw, context, last_slots);
        let outcome = self
            .settings
            .retry
            .run_bounded("classifier.remote", self.settings.per_attempt_timeout, |_| {
                self.remote.classify(&request)
            })
            .await;

        let response = match outcome {
            Ok(response) => response,
            Err(error) => {
                let error = match error {
                    AttemptError::Failed(error) => ApplicationError::from(error),
                    AttemptError::TimedOut(after) => {
                        ApplicationError::Integration(format!("remote classifier timed out after {after:?}"))
                    }
                };
                warn!(
                    event_name = "classifier.remote_failed",
                    error = %error,
                    pattern_intent = pattern.intent.as_str(),
                    "remote classification failed; using pattern result"
                );
                return pattern;
            }
        };

        match self.guardrail.evaluate(response) {
            GuardrailDecision::Allow(remote) if remote.confidence > pattern.confidence => remote,
            GuardrailDecision::Allow(_) => pattern,
            GuardrailDecision::Deny { reason_code } => {
                warn!(
                    event_name = "classifier.remote_rejected",
                    reason_code,
                    "remote classification rejected by guardrail"
                );
                pattern
            }
        }
    }

    fn remote_request(
        &self,
        raw: &str,
        context: &ClassifierContext,
        last_slots: &LastSlots,
    ) -> RemoteRequest {
        let mut context_state = context.context_state.clone();
        if let Some(step) = last_slots.open_checkout_step() {
            context_state.insert("checkout_step".to_string(), Value::from(step.as_str()));
        }
        if let Some(code) = &last_slots.product_code {
            context_state.insert("product_code".to_string(), Value::from(code.as_str()));
        }
        RemoteRequest {
            message: raw.trim().to_string(),
            history: context.recent_history(self.settings.history_limit),
            allowed_intents: self.guardrail.allowed_intent_names(),
            context_state,
        }
    }
}
