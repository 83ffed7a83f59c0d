use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use shopchat_core::domain::checkout::{CheckoutState, CheckoutStep};

/// What the previous turn left behind that the pattern tier may consult.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastSlots {
    pub checkout_step: Option<CheckoutStep>,
    pub product_code: Option<String>,
    pub product_id: Option<String>,
}

impl LastSlots {
    pub fn from_checkout(state: &CheckoutState) -> Self {
        Self {
            checkout_step: Some(state.step),
            product_code: Some(state.product.code.clone()),
            product_id: Some(state.product.id.0.clone()),
        }
    }

    /// Step of a checkout that still waits for the customer.
    pub fn open_checkout_step(&self) -> Option<CheckoutStep> {
        self.checkout_step.filter(CheckoutStep::is_open)
    }

    pub fn has_product_context(&self) -> bool {
        let present = |value: &Option<String>| value.as_deref().is_some_and(|v| !v.trim().is_empty());
        present(&self.product_code) || present(&self.product_id)
    }
}

/// Conversation context forwarded to the remote classifier.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassifierContext {
    /// Most recent customer messages, oldest first.
    pub history: Vec<String>,
    pub context_state: Map<String, Value>,
}

impl ClassifierContext {
    pub fn with_history(history: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self { history: history.into_iter().map(Into::into).collect(), context_state: Map::new() }
    }

    /// Last `limit` history entries.
    pub fn recent_history(&self, limit: usize) -> Vec<String> {
        let skip = self.history.len().saturating_sub(limit);
        self.history.iter().skip(skip).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use shopchat_core::domain::checkout::CheckoutStep;

    use super::{ClassifierContext, LastSlots};

    #[test]
    fn confirmed_checkout_is_not_open() {
        let open = LastSlots { checkout_step: Some(CheckoutStep::CollectingAddress), ..LastSlots::default() };
        assert_eq!(open.open_checkout_step(), Some(CheckoutStep::CollectingAddress));

        let done = LastSlots { checkout_step: Some(CheckoutStep::Confirmed), ..LastSlots::default() };
        assert_eq!(done.open_checkout_step(), None);
    }

    #[test]
    fn blank_product_fields_are_not_product_context() {
        let slots = LastSlots { product_code: Some("  ".to_string()), ..LastSlots::default() };
        assert!(!slots.has_product_context());
        assert!(LastSlots { product_id: Some("p-1".to_string()), ..LastSlots::default() }
            .has_product_context());
    }

    #[test]
    fn recent_history_keeps_the_tail() {
        let context = ClassifierContext::with_history(["a", "b", "c", "d"]);
        assert_eq!(context.recent_history(2), vec!["c".to_string(), "d".to_string()]);
        assert_eq!(context.recent_history(10).len(), 4);
    }
}
