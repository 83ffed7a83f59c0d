use shopchat_core::domain::intent::{DetectionMethod, Intent, IntentResult, Slots};

use crate::remote::{map_remote_intent, RemoteResponse};

pub const MAX_REPLY_CHARS: usize = 1_000;

#[derive(Clone, Debug, PartialEq)]
pub enum GuardrailDecision {
    Allow(IntentResult),
    Deny { reason_code: &'static str },
}

/// Decides which remote classifications may stand in for a pattern result.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteGuardrail {
    allowed: Vec<Intent>,
}

impl Default for RemoteGuardrail {
    fn default() -> Self {
        Self::new(
            Intent::ALL
                .into_iter()
                .filter(|intent| !intent.is_context_only() && *intent != Intent::Unknown),
        )
    }
}

impl RemoteGuardrail {
    pub fn new(allowed: impl IntoIterator<Item = Intent>) -> Self {
        Self { allowed: allowed.into_iter().collect() }
    }

    pub fn allowed_intent_names(&self) -> Vec<String> {
        self.allowed.iter().map(|intent| intent.as_str().to_string()).collect()
    }

    pub fn evaluate(&self, response: RemoteResponse) -> GuardrailDecision {
        if !response.ok {
            return GuardrailDecision::Deny { reason_code: "remote_not_ok" };
        }
        let Some(name) = response.intent.as_deref() else {
            return GuardrailDecision::Deny { reason_code: "missing_intent" };
        };

        let intent = map_remote_intent(name);
        if intent == Intent::Unknown {
            return GuardrailDecision::Deny { reason_code: "unknown_intent" };
        }
        if intent.is_context_only() {
            return GuardrailDecision::Deny { reason_code: "context_only_intent" };
        }
        if !self.allowed.contains(&intent) {
            return GuardrailDecision::Deny { reason_code: "intent_not_allowed" };
        }

        let mut result = IntentResult::new(intent, response.confidence, DetectionMethod::Remote)
            .with_slots(Slots::from_remote(intent, response.slots));
        if let Some(reply_text) = response.reply_text.as_deref().and_then(cap_reply_text) {
            result = result.with_reply_text(reply_text);
        }
        GuardrailDecision::Allow(result)
    }
}

fn cap_reply_text(text: &str) -> Option<String> {
    let text = text.trim();
    (!text.is_empty()).then(|| text.chars().take(MAX_REPLY_CHARS).collect())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use shopchat_core::domain::intent::{DetectionMethod, Intent, SlotKey};

    use super::{GuardrailDecision, RemoteGuardrail, MAX_REPLY_CHARS};
    use crate::remote::RemoteResponse;

    fn response(intent: &str, confidence: f32) -> RemoteResponse {
        RemoteResponse {
            ok: true,
            intent: Some(intent.to_string()),
            confidence,
            ..RemoteResponse::default()
        }
    }

    fn denial(decision: GuardrailDecision) -> &'static str {
        match decision {
            GuardrailDecision::Deny { reason_code } => reason_code,
            GuardrailDecision::Allow(_) => "",
        }
    }

    #[test]
    fn context_only_intents_are_denied() {
        let guardrail = RemoteGuardrail::default();
        assert_eq!(denial(guardrail.evaluate(response("checkout_confirm", 0.99))), "context_only_intent");
        assert_eq!(denial(guardrail.evaluate(response("checkout_cancel", 0.99))), "context_only_intent");
    }

    #[test]
    fn intents_outside_allow_list_are_denied() {
        let guardrail = RemoteGuardrail::new([Intent::Greeting]);
        assert_eq!(denial(guardrail.evaluate(response("price_inquiry", 0.8))), "intent_not_allowed");
        assert_eq!(denial(guardrail.evaluate(response("weather", 0.8))), "unknown_intent");

        let mut failed = response("greeting", 0.8);
        failed.ok = false;
        assert_eq!(denial(guardrail.evaluate(failed)), "remote_not_ok");
    }

    #[test]
    fn allowed_result_filters_slots_and_caps_reply() {
        let mut remote = response("want_to_buy", 0.8);
        remote.slots = json!({
            "product_code": "RLX-SUB-001",
            "address_text": "should not survive",
            "mood": "excited"
        })
        .as_object()
        .cloned()
        .unwrap_or_default();
        remote.reply_text = Some(format!("  {}  ", "ก".repeat(MAX_REPLY_CHARS + 50)));

        let GuardrailDecision::Allow(result) = RemoteGuardrail::default().evaluate(remote) else {
            panic!("expected remote result to be allowed");
        };
        assert_eq!(result.intent, Intent::PurchaseIntent);
        assert_eq!(result.method, DetectionMethod::Remote);
        assert_eq!(result.slots.text(SlotKey::ProductCode), Some("RLX-SUB-001"));
        assert_eq!(result.slots.get(SlotKey::AddressText), None);
        assert!(result.slots.extra().contains_key("mood"));
        assert_eq!(result.reply_text.map(|text| text.chars().count()), Some(MAX_REPLY_CHARS));
    }
}
