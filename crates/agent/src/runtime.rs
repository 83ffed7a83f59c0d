//! Per-message entry point. Each (user, channel) pair is a single writer: the
//! checkout state is read, advanced and written back under one lock, and the
//! remote classifier runs outside of it.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use shopchat_core::audit::TracingAuditSink;
use shopchat_core::config::ConfigProvider;
use shopchat_core::domain::checkout::CheckoutState;
use shopchat_core::domain::conversation::{ConversationKey, CHECKOUT_STATE_TTL_SECS};
use shopchat_core::domain::intent::{Intent, IntentResult, SlotKey};
use shopchat_core::errors::{ApplicationError, DomainError};
use shopchat_core::flows::guards::detect_payment_method;
use shopchat_core::flows::{CheckoutFlow, FlowAction, FlowReply, PassReason, StateMutation};
use shopchat_core::retry::AttemptError;
use shopchat_core::text::normalize;
use shopchat_core::{CheckoutPolicy, FlowContext, FlowEngine, FlowResult, RetryPolicy};
use shopchat_db::{AddressStore, CheckoutStateRepository, ProductCatalog, StateStore, StoreError};

use crate::classifier::IntentClassifier;
use crate::context::{ClassifierContext, LastSlots};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    pub user_id: String,
    pub channel_id: String,
    pub tenant_id: String,
    pub text: String,
    pub correlation_id: Option<String>,
    /// Earlier customer messages, oldest first.
    pub history: Vec<String>,
}

impl InboundMessage {
    pub fn new(
        user_id: impl Into<String>,
        channel_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            channel_id: channel_id.into(),
            tenant_id: "default".to_string(),
            text: text.into(),
            correlation_id: None,
            history: Vec::new(),
        }
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = tenant_id.into();
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn with_history(mut self, history: Vec<String>) -> Self {
        self.history = history;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRoute {
    /// The active checkout consumed the message.
    Checkout,
    /// The message opened a new checkout.
    CheckoutStarted,
    /// No checkout involvement; the host acts on the intent.
    Classified,
}

impl TurnRoute {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Checkout => "checkout",
            Self::CheckoutStarted => "checkout_started",
            Self::Classified => "classified",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TurnOutcome {
    pub route: TurnRoute,
    pub reply: Option<String>,
    pub actions: Vec<FlowAction>,
    pub intent: Option<IntentResult>,
    pub correlation_id: String,
}

pub struct ConversationRuntime {
    checkouts: CheckoutStateRepository<dyn StateStore>,
    addresses: Arc<dyn AddressStore>,
    catalog: Arc<dyn ProductCatalog>,
    config: Arc<dyn ConfigProvider>,
    classifier: IntentClassifier,
    engine: FlowEngine<CheckoutFlow>,
    store_retry: RetryPolicy,
    store_timeout: Duration,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ConversationRuntime {
    pub fn new(
        state_store: Arc<dyn StateStore>,
        addresses: Arc<dyn AddressStore>,
        catalog: Arc<dyn ProductCatalog>,
        config: Arc<dyn ConfigProvider>,
        classifier: IntentClassifier,
    ) -> Self {
        Self {
            checkouts: CheckoutStateRepository::new(state_store, CHECKOUT_STATE_TTL_SECS),
            addresses,
            catalog,
            config,
            classifier,
            engine: FlowEngine::new(CheckoutFlow).with_audit_sink(Arc::new(TracingAuditSink)),
            store_retry: RetryPolicy::with_retries(1, 50),
            store_timeout: Duration::from_millis(2_000),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_state_ttl(mut self, ttl_secs: u64) -> Self {
        self.checkouts = self.checkouts.with_ttl_secs(ttl_secs);
        self
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn with_store_retry(mut self, retry: RetryPolicy) -> Self {
        self.store_retry = retry;
        self
    }

    pub fn with_engine(mut self, engine: FlowEngine<CheckoutFlow>) -> Self {
        self.engine = engine;
        self
    }

    /// Handles one inbound message. Collaborator failures are logged and
    /// degrade the turn; they never surface to the caller.
    pub async fn handle_message(&self, message: InboundMessage) -> TurnOutcome {
        let correlation_id =
            message.correlation_id.clone().unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let key = ConversationKey::new(&message.user_id, &message.channel_id);
        let policy = self.config.checkout_policy(&message.tenant_id).unwrap_or_default();
        let context = FlowContext::new(correlation_id.clone(), Utc::now());

        let outcome = self.run_turn(&message, &key, &policy, &context).await;
        info!(
            event_name = "runtime.turn",
            correlation_id = %correlation_id,
            conversation = %key,
            tenant_id = %message.tenant_id,
            route = outcome.route.as_str(),
            intent = outcome.intent.as_ref().map(|intent| intent.intent.as_str()).unwrap_or("none"),
            replied = outcome.reply.is_some(),
            "conversation turn handled"
        );
        outcome
    }

    async fn run_turn(
        &self,
        message: &InboundMessage,
        key: &ConversationKey,
        policy: &CheckoutPolicy,
        context: &FlowContext,
    ) -> TurnOutcome {
        let lock = self.conversation_lock(key).await;

        let (seen, last_slots) = {
            let _guard = lock.lock().await;
            match self.load_state(key, context).await {
                None => (None, LastSlots::default()),
                Some(stored) => {
                    let state = match self.resolve_product(&stored, context).await {
                        ProductResolution::Current(state) => state,
                        ProductResolution::Gone(violation) => {
                            warn!(
                                event_name = "runtime.checkout_invariant_violated",
                                correlation_id = %context.correlation_id,
                                conversation = %key,
                                error = %ApplicationError::from(violation),
                                "abandoning checkout"
                            );
                            let result = self.engine.abandon(&stored, context);
                            return self
                                .finish_checkout_turn(result, key, message, context, TurnRoute::Checkout)
                                .await;
                        }
                    };

                    match self.engine.advance(&message.text, &state, policy, context) {
                        FlowResult::Pass(reason) => {
                            log_pass(reason, context);
                            let last_slots = LastSlots::from_checkout(&state);
                            (Some(stored), last_slots)
                        }
                        result => {
                            return self
                                .finish_checkout_turn(result, key, message, context, TurnRoute::Checkout)
                                .await;
                        }
                    }
                }
            }
        };

        self.classify_and_route(message, key, policy, context, seen, last_slots, &lock).await
    }

    #[allow(clippy::too_many_arguments)]
    async fn classify_and_route(
        &self,
        message: &InboundMessage,
        key: &ConversationKey,
        policy: &CheckoutPolicy,
        context: &FlowContext,
        seen: Option<CheckoutState>,
        last_slots: LastSlots,
        lock: &Mutex<()>,
    ) -> TurnOutcome {
        let classifier_context = ClassifierContext::with_history(message.history.iter().cloned());
        let intent = self.classifier.classify(&message.text, &classifier_context, &last_slots).await;

        let product_code = match (intent.intent, intent.slots.text(SlotKey::ProductCode)) {
            (Intent::PurchaseIntent, Some(code)) => code.to_string(),
            _ => return classified(intent, context),
        };

        let product = match self.store_call("catalog.find_by_code", || self.catalog.find_by_code(&product_code)).await {
            Ok(Some(product)) => product,
            Ok(None) => {
                info!(
                    event_name = "runtime.product_not_found",
                    correlation_id = %context.correlation_id,
                    product_code = %product_code,
                    "purchase intent for unknown product code"
                );
                return classified(intent, context);
            }
            Err(error) => {
                warn!(
                    event_name = "runtime.catalog_failed",
                    correlation_id = %context.correlation_id,
                    error = %error,
                    "catalog lookup failed"
                );
                return classified(intent, context);
            }
        };

        let _guard = lock.lock().await;
        let current = self.load_state(key, context).await;
        if current != seen {
            warn!(
                event_name = "runtime.checkout_changed_concurrently",
                correlation_id = %context.correlation_id,
                conversation = %key,
                "checkout changed while classifying; not overwriting"
            );
            return classified(intent, context);
        }

        let preselected = detect_payment_method(&normalize(&message.text));
        let result = self.engine.start(product, preselected, policy, context);
        let mut outcome =
            self.finish_checkout_turn(result, key, message, context, TurnRoute::CheckoutStarted).await;
        outcome.intent = Some(intent);
        outcome
    }

    /// Persists the mutation, then performs best-effort side effects.
    async fn finish_checkout_turn(
        &self,
        result: FlowResult,
        key: &ConversationKey,
        message: &InboundMessage,
        context: &FlowContext,
        route: TurnRoute,
    ) -> TurnOutcome {
        let Some(FlowReply { reply, actions, mutation, .. }) = result.into_reply() else {
            return TurnOutcome {
                route: TurnRoute::Classified,
                reply: None,
                actions: Vec::new(),
                intent: None,
                correlation_id: context.correlation_id.clone(),
            };
        };

        self.persist(key, &mutation, context).await;
        for action in &actions {
            if let FlowAction::SaveAddress(address) = action {
                let customer_ref = format!("{}:{}", message.channel_id, message.user_id);
                let saved = self
                    .store_call("address.save", || self.addresses.save(address, &customer_ref))
                    .await;
                if let Err(error) = saved {
                    warn!(
                        event_name = "runtime.address_save_failed",
                        correlation_id = %context.correlation_id,
                        error = %error,
                        "saving address failed; checkout continues"
                    );
                }
            }
        }

        TurnOutcome {
            route,
            reply: Some(reply),
            actions,
            intent: None,
            correlation_id: context.correlation_id.clone(),
        }
    }

    async fn persist(&self, key: &ConversationKey, mutation: &StateMutation, context: &FlowContext) {
        let result = match mutation {
            StateMutation::Save(state) => {
                self.store_call("checkout.save", || self.checkouts.save(key, state)).await
            }
            StateMutation::Clear => self.store_call("checkout.clear", || self.checkouts.clear(key)).await,
            StateMutation::Unchanged => Ok(()),
        };
        if let Err(error) = result {
            error!(
                event_name = "runtime.persist_failed",
                correlation_id = %context.correlation_id,
                conversation = %key,
                error = %ApplicationError::from(error),
                "checkout state could not be persisted"
            );
        }
    }

    /// A store that cannot be read is treated as holding no checkout.
    async fn load_state(&self, key: &ConversationKey, context: &FlowContext) -> Option<CheckoutState> {
        match self.store_call("checkout.load", || self.checkouts.load(key)).await {
            Ok(state) => state,
            Err(error) => {
                warn!(
                    event_name = "runtime.state_unavailable",
                    correlation_id = %context.correlation_id,
                    conversation = %key,
                    error = %error,
                    "checkout state unavailable; treating as absent"
                );
                None
            }
        }
    }

    /// Refreshes the stored product from the catalog. A catalog outage keeps
    /// the stored copy; a missing or unsellable product ends the checkout.
    async fn resolve_product(&self, state: &CheckoutState, context: &FlowContext) -> ProductResolution {
        match self.store_call("catalog.find_by_id", || self.catalog.find_by_id(&state.product.id)).await {
            Ok(Some(product)) if product.is_sellable() => {
                let mut state = state.clone();
                state.product = product;
                ProductResolution::Current(state)
            }
            Ok(Some(product)) => ProductResolution::Gone(DomainError::InvariantViolation(format!(
                "product `{}` is no longer sellable at price {}",
                product.id.0, product.price
            ))),
            Ok(None) => ProductResolution::Gone(DomainError::UnresolvableProduct {
                product_id: state.product.id.0.clone(),
            }),
            Err(error) => {
                warn!(
                    event_name = "runtime.catalog_failed",
                    correlation_id = %context.correlation_id,
                    error = %error,
                    "catalog unavailable; continuing with stored product"
                );
                ProductResolution::Current(state.clone())
            }
        }
    }

    async fn store_call<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        self.store_retry
            .run_bounded(operation, self.store_timeout, |_| call())
            .await
            .map_err(|error| match error {
                AttemptError::Failed(error) => error,
                AttemptError::TimedOut(after) => {
                    StoreError::Unavailable(format!("{operation} timed out after {after:?}"))
                }
            })
    }

    async fn conversation_lock(&self, key: &ConversationKey) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        locks.entry(key.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }
}

enum ProductResolution {
    Current(CheckoutState),
    Gone(DomainError),
}

fn classified(intent: IntentResult, context: &FlowContext) -> TurnOutcome {
    TurnOutcome {
        route: TurnRoute::Classified,
        reply: intent.reply_text.clone(),
        actions: Vec::new(),
        intent: Some(intent),
        correlation_id: context.correlation_id.clone(),
    }
}

fn log_pass(reason: PassReason, context: &FlowContext) {
    info!(
        event_name = "runtime.checkout_passed",
        correlation_id = %context.correlation_id,
        reason = reason.as_str(),
        "checkout passed message to classifier"
    );
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use serde_json::Value;

    use shopchat_core::domain::address::{Address, AddressId};
    use shopchat_core::domain::checkout::{CheckoutState, CheckoutStep, DeliveryMethod, PaymentType};
    use shopchat_core::domain::conversation::ConversationKey;
    use shopchat_core::domain::intent::Intent;
    use shopchat_core::domain::product::{ProductId, ProductRef};
    use shopchat_core::flows::FlowAction;
    use shopchat_core::{CheckoutPolicy, StaticConfigProvider};
    use shopchat_db::{
        AddressStore, CheckoutStateRepository, InMemoryAddressStore, InMemoryProductCatalog,
        InMemoryStateStore, StateStore, StoreError,
    };

    use super::{ConversationRuntime, InboundMessage, TurnRoute};
    use crate::classifier::IntentClassifier;

    fn rolex() -> ProductRef {
        ProductRef::new("p-rlx", "RLX-SUB-001", "Rolex Submariner", Decimal::new(450_000, 0))
    }

    fn necklace() -> ProductRef {
        ProductRef::new("p-gld", "GLD-NCK-001", "สร้อยคอทองคำ", Decimal::new(9_000, 0))
    }

    /// Delays reads so that unsynchronised turns would interleave.
    #[derive(Default)]
    struct SlowStateStore {
        inner: InMemoryStateStore,
    }

    #[async_trait]
    impl StateStore for SlowStateStore {
        async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: Value, ttl_secs: u64) -> Result<(), StoreError> {
            self.inner.set(key, value, ttl_secs).await
        }

        async fn delete(&self, key: &str) -> Result<(), StoreError> {
            self.inner.delete(key).await
        }
    }

    struct BrokenAddressStore;

    #[async_trait]
    impl AddressStore for BrokenAddressStore {
        async fn save(&self, _: &Address, _: &str) -> Result<AddressId, StoreError> {
            Err(StoreError::Unavailable("address service down".to_string()))
        }

        async fn list_for_customer(&self, _: &str) -> Result<Vec<Address>, StoreError> {
            Ok(Vec::new())
        }
    }

    struct Harness {
        runtime: ConversationRuntime,
        states: CheckoutStateRepository<dyn StateStore>,
        catalog: Arc<InMemoryProductCatalog>,
    }

    fn harness_with(state_store: Arc<dyn StateStore>, addresses: Arc<dyn AddressStore>) -> Harness {
        let catalog = Arc::new(InMemoryProductCatalog::with_products([rolex(), necklace()]));
        let runtime = ConversationRuntime::new(
            state_store.clone(),
            addresses,
            catalog.clone(),
            Arc::new(StaticConfigProvider::default()),
            IntentClassifier::pattern_only(),
        );
        Harness { runtime, states: CheckoutStateRepository::new(state_store, 1_800), catalog }
    }

    fn harness() -> Harness {
        harness_with(Arc::new(InMemoryStateStore::default()), Arc::new(InMemoryAddressStore::default()))
    }

    fn key() -> ConversationKey {
        ConversationKey::new("U1", "line")
    }

    fn message(text: &str) -> InboundMessage {
        InboundMessage::new("U1", "line", text).with_correlation_id("corr-test")
    }

    async fn seed(harness: &Harness, state: CheckoutState) {
        harness.states.save(&key(), &state).await.expect("seed checkout");
    }

    #[tokio::test]
    async fn purchase_with_product_code_opens_checkout() {
        let harness = harness();

        let outcome = harness.runtime.handle_message(message("สนใจ RLX-SUB-001 ครับ")).await;

        assert_eq!(outcome.route, TurnRoute::CheckoutStarted);
        assert_eq!(outcome.correlation_id, "corr-test");
        assert_eq!(outcome.intent.map(|intent| intent.intent), Some(Intent::PurchaseIntent));
        assert!(outcome.reply.is_some());
        let state = harness.states.load(&key()).await.expect("load").expect("checkout opened");
        assert_eq!(state.step, CheckoutStep::SelectingPayment);
        assert_eq!(state.product.code, "RLX-SUB-001");
    }

    #[tokio::test]
    async fn unknown_product_code_is_left_to_the_host() {
        let harness = harness();

        let outcome = harness.runtime.handle_message(message("สนใจ XYZ-999 ครับ")).await;

        assert_eq!(outcome.route, TurnRoute::Classified);
        assert!(harness.states.load(&key()).await.expect("load").is_none());
    }

    #[tokio::test]
    async fn active_checkout_consumes_payment_answer() {
        let harness = harness();
        seed(&harness, CheckoutState::new(necklace(), Utc::now())).await;

        let outcome = harness.runtime.handle_message(message("2")).await;

        assert_eq!(outcome.route, TurnRoute::Checkout);
        assert_eq!(outcome.intent, None);
        let state = harness.states.load(&key()).await.expect("load").expect("state");
        assert_eq!(state.step, CheckoutStep::SelectingDelivery);
        assert_eq!(state.payment_type, Some(PaymentType::Installment));
    }

    #[tokio::test]
    async fn interruption_question_is_classified_and_checkout_kept() {
        let harness = harness();
        seed(&harness, CheckoutState::new(necklace(), Utc::now())).await;

        let outcome = harness.runtime.handle_message(message("ราคาเท่าไหร่")).await;

        assert_eq!(outcome.route, TurnRoute::Classified);
        assert_eq!(outcome.intent.map(|intent| intent.intent), Some(Intent::PriceInquiry));
        let state = harness.states.load(&key()).await.expect("load").expect("state kept");
        assert_eq!(state.step, CheckoutStep::SelectingPayment);
    }

    #[tokio::test]
    async fn checkout_for_product_repriced_to_zero_is_cleared() {
        let harness = harness();
        seed(&harness, CheckoutState::new(necklace(), Utc::now())).await;
        let mut repriced = necklace();
        repriced.price = Decimal::ZERO;
        harness.catalog.upsert(repriced).await;

        let outcome = harness.runtime.handle_message(message("1")).await;

        assert_eq!(outcome.route, TurnRoute::Checkout);
        assert!(outcome.reply.is_some());
        assert!(harness.states.load(&key()).await.expect("load").is_none());
    }

    #[tokio::test]
    async fn checkout_for_withdrawn_product_is_cleared() {
        let harness = harness();
        seed(&harness, CheckoutState::new(necklace(), Utc::now())).await;
        harness.catalog.remove(&ProductId("p-gld".to_string())).await;

        let outcome = harness.runtime.handle_message(message("1")).await;

        assert_eq!(outcome.route, TurnRoute::Checkout);
        assert!(outcome.reply.is_some());
        assert!(harness.states.load(&key()).await.expect("load").is_none());
    }

    #[tokio::test]
    async fn failed_address_save_does_not_block_confirmation() {
        let harness = harness_with(Arc::new(InMemoryStateStore::default()), Arc::new(BrokenAddressStore));
        let mut state = CheckoutState::new(necklace(), Utc::now());
        state.step = CheckoutStep::CollectingAddress;
        state.payment_type = Some(PaymentType::Full);
        state.delivery_method = Some(DeliveryMethod::Courier);
        state.shipping_fee = CheckoutPolicy::default().shipping.courier_fee;
        seed(&harness, state).await;

        let outcome = harness
            .runtime
            .handle_message(message("Somchai Jaidee 0812345678 Soi 5 Sukhumvit Road Bangkok 10110"))
            .await;

        assert_eq!(outcome.route, TurnRoute::Checkout);
        assert!(outcome.actions.iter().any(|action| matches!(action, FlowAction::SaveAddress(_))));
        let state = harness.states.load(&key()).await.expect("load").expect("state");
        assert_eq!(state.step, CheckoutStep::Confirmed);
    }

    #[tokio::test]
    async fn concurrent_deliveries_advance_once_per_message() {
        let harness =
            harness_with(Arc::new(SlowStateStore::default()), Arc::new(InMemoryAddressStore::default()));
        seed(&harness, CheckoutState::new(necklace(), Utc::now())).await;

        let (first, second) = tokio::join!(
            harness.runtime.handle_message(message("1")),
            harness.runtime.handle_message(message("1")),
        );

        assert_eq!(first.route, TurnRoute::Checkout);
        assert_eq!(second.route, TurnRoute::Checkout);
        let state = harness.states.load(&key()).await.expect("load").expect("state");
        assert_eq!(state.payment_type, Some(PaymentType::Full));
        assert_eq!(state.delivery_method, Some(DeliveryMethod::Pickup));
        assert_eq!(state.step, CheckoutStep::Confirmed);
    }
}
