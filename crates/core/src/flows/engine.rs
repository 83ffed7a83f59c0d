use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{debug, warn};

use crate::address;
use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::config::CheckoutPolicy;
use crate::domain::checkout::{
    CheckoutState, CheckoutStep, DeliveryMethod, OrderStatus, PaymentType,
};
use crate::domain::product::ProductRef;
use crate::errors::{ApplicationError, DomainError, InterfaceError};
use crate::flows::guards;
use crate::flows::replies;
use crate::flows::states::{
    FlowAction, FlowContext, FlowEvent, FlowReply, FlowResult, FlowTarget, PassReason,
    StateMutation, TransitionOutcome,
};
use crate::pricing::compute_plan;
use crate::text::{is_structured_product_code, normalize};

const ENGINE_ACTOR: &str = "checkout-engine";

pub trait FlowDefinition {
    fn initial_step(&self) -> CheckoutStep;
    fn transition(
        &self,
        current: CheckoutStep,
        event: &FlowEvent,
    ) -> Result<TransitionOutcome, FlowTransitionError>;
}

/// Payment, then delivery, then address, then hand-off.
#[derive(Clone, Copy, Debug, Default)]
pub struct CheckoutFlow;

impl FlowDefinition for CheckoutFlow {
    fn initial_step(&self) -> CheckoutStep {
        CheckoutStep::SelectingPayment
    }

    fn transition(
        &self,
        current: CheckoutStep,
        event: &FlowEvent,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        transition_checkout(current, event)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("invalid checkout transition from `{}` on {:?}", .from.as_str(), .event)]
pub struct FlowTransitionError {
    pub from: CheckoutStep,
    pub event: FlowEvent,
}

fn transition_checkout(
    current: CheckoutStep,
    event: &FlowEvent,
) -> Result<TransitionOutcome, FlowTransitionError> {
    use CheckoutStep::{CollectingAddress, Confirmed, SelectingDelivery, SelectingPayment};
    use FlowAction::{HandoffToStaff, RequestPaymentProof};
    use FlowEvent::{
        AddressBuffered, AddressCompleted, CancelRequested, DeliverySelected, PaymentChanged,
        PaymentProofAcknowledged, PaymentSelected, ProductUnavailable,
    };

    let (to, actions) = match (current, event) {
        (_, CancelRequested) | (_, ProductUnavailable) => (FlowTarget::Cleared, Vec::new()),
        (SelectingPayment, PaymentSelected(_)) => (FlowTarget::Step(SelectingDelivery), Vec::new()),
        (SelectingPayment, AddressBuffered) => (FlowTarget::Step(SelectingPayment), Vec::new()),
        (SelectingDelivery, PaymentChanged(_)) => (FlowTarget::Step(SelectingDelivery), Vec::new()),
        (SelectingDelivery, DeliverySelected(DeliveryMethod::Pickup)) => {
            (FlowTarget::Step(Confirmed), vec![HandoffToStaff])
        }
        (SelectingDelivery, DeliverySelected(_)) => {
            (FlowTarget::Step(CollectingAddress), Vec::new())
        }
        (CollectingAddress, PaymentChanged(_)) | (CollectingAddress, AddressBuffered) => {
            (FlowTarget::Step(CollectingAddress), Vec::new())
        }
        (CollectingAddress, AddressCompleted) => {
            (FlowTarget::Step(Confirmed), vec![HandoffToStaff])
        }
        (Confirmed, PaymentProofAcknowledged) => {
            (FlowTarget::Step(Confirmed), vec![RequestPaymentProof])
        }
        _ => return Err(FlowTransitionError { from: current, event: event.clone() }),
    };

    Ok(TransitionOutcome { from: current, to, event: event.clone(), actions })
}

pub struct FlowEngine<F> {
    flow: F,
    audit: Option<Arc<dyn AuditSink>>,
}

impl Default for FlowEngine<CheckoutFlow> {
    fn default() -> Self {
        Self::new(CheckoutFlow)
    }
}

/// One turn of the checkout against the default flow. See [`FlowEngine::advance`].
pub fn advance(
    raw: &str,
    state: &CheckoutState,
    policy: &CheckoutPolicy,
    context: &FlowContext,
) -> FlowResult {
    FlowEngine::new(CheckoutFlow).advance(raw, state, policy, context)
}

impl<F> FlowEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow, audit: None }
    }

    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    pub fn initial_step(&self) -> CheckoutStep {
        self.flow.initial_step()
    }

    pub fn apply(
        &self,
        current: CheckoutStep,
        event: &FlowEvent,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        self.flow.transition(current, event)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: CheckoutStep,
        event: &FlowEvent,
        sink: &S,
        audit: &AuditContext,
        at: DateTime<Utc>,
    ) -> Result<TransitionOutcome, FlowTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, event);
        match &result {
            Ok(outcome) => {
                sink.emit(
                    AuditEvent::new(
                        audit,
                        "checkout.transition_applied",
                        AuditCategory::Flow,
                        AuditOutcome::Applied,
                        at,
                    )
                    .with_detail("from", outcome.from.as_str())
                    .with_detail("to", target_name(outcome.to))
                    .with_detail("event", format!("{:?}", outcome.event)),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::new(
                        audit,
                        "checkout.transition_rejected",
                        AuditCategory::Flow,
                        AuditOutcome::Rejected,
                        at,
                    )
                    .with_detail("error", error.to_string()),
                );
            }
        }
        result
    }

    /// Opens a checkout for `product`. With a preselected payment type the
    /// state starts one step further, at delivery selection.
    pub fn start(
        &self,
        product: ProductRef,
        preselected: Option<PaymentType>,
        policy: &CheckoutPolicy,
        context: &FlowContext,
    ) -> FlowResult {
        if !product.is_sellable() {
            let violation = DomainError::InvariantViolation(format!(
                "product `{}` has non-positive price {}",
                product.code, product.price
            ));
            let error = ApplicationError::from(violation).into_interface(context.correlation_id.clone());
            warn!(
                event_name = "checkout.start_rejected",
                correlation_id = %error.correlation_id(),
                product_code = %product.code,
                error = %error,
                "refusing to open checkout for unsellable product"
            );
            return reply(error.user_message(), Vec::new(), StateMutation::Clear, Vec::new());
        }

        let mut state = CheckoutState::new(product, context.now);
        state.step = self.initial_step();

        let Some(payment_type) = preselected else {
            let text = replies::payment_options(&state.product, policy, context.today);
            return reply(
                text,
                vec![FlowAction::QuickReplies(replies::payment_quick_replies())],
                StateMutation::Save(state),
                Vec::new(),
            );
        };

        let outcome = match self.transition(&state, FlowEvent::PaymentSelected(payment_type), context)
        {
            Ok(outcome) => outcome,
            Err(error) => return rejected(&error),
        };
        state.payment_type = Some(payment_type);
        apply_target(&mut state, outcome.to);

        let plan = compute_plan(state.product.price, payment_type, policy, context.today);
        let text = replies::preselected_payment(&state.product, &plan, policy);
        reply(
            text,
            vec![FlowAction::QuickReplies(replies::delivery_quick_replies(policy))],
            StateMutation::Save(state),
            vec![outcome],
        )
    }

    /// Advances an active checkout by one customer message.
    pub fn advance(
        &self,
        raw: &str,
        state: &CheckoutState,
        policy: &CheckoutPolicy,
        context: &FlowContext,
    ) -> FlowResult {
        let result = self.advance_inner(raw, state, policy, context);
        debug!(
            event_name = "checkout.advance",
            correlation_id = %context.correlation_id,
            step = state.step.as_str(),
            passed = result.is_pass(),
            "checkout turn evaluated"
        );
        result
    }

    /// Clears a checkout whose product can no longer be resolved.
    pub fn abandon(&self, state: &CheckoutState, context: &FlowContext) -> FlowResult {
        warn!(
            event_name = "checkout.product_unavailable",
            correlation_id = %context.correlation_id,
            product_id = %state.product.id.0,
            "clearing checkout for unavailable product"
        );
        match self.transition(state, FlowEvent::ProductUnavailable, context) {
            Ok(outcome) => reply(replies::APOLOGY, Vec::new(), StateMutation::Clear, vec![outcome]),
            Err(_) => reply(replies::APOLOGY, Vec::new(), StateMutation::Clear, Vec::new()),
        }
    }

    fn advance_inner(
        &self,
        raw: &str,
        state: &CheckoutState,
        policy: &CheckoutPolicy,
        context: &FlowContext,
    ) -> FlowResult {
        if !state.product.is_sellable() {
            return self.abandon(state, context);
        }

        let raw = raw.trim();
        let text = normalize(raw);
        if text.is_empty() {
            return FlowResult::Pass(PassReason::Unrecognized);
        }

        if guards::is_cancel(&text) {
            return match self.transition(state, FlowEvent::CancelRequested, context) {
                Ok(outcome) => {
                    reply(replies::CANCELLED, Vec::new(), StateMutation::Clear, vec![outcome])
                }
                Err(error) => rejected(&error),
            };
        }
        if guards::is_interruption_question(&text) {
            return FlowResult::Pass(PassReason::InterruptionQuestion);
        }
        if is_structured_product_code(&text) {
            return FlowResult::Pass(PassReason::ProductCode);
        }

        match state.step {
            CheckoutStep::SelectingPayment => self.on_selecting_payment(raw, &text, state, policy, context),
            CheckoutStep::SelectingDelivery => {
                self.on_selecting_delivery(&text, state, policy, context)
            }
            CheckoutStep::CollectingAddress => {
                self.on_collecting_address(raw, &text, state, policy, context)
            }
            CheckoutStep::Confirmed => self.on_confirmed(&text, state, context),
        }
    }

    fn on_selecting_payment(
        &self,
        raw: &str,
        text: &str,
        state: &CheckoutState,
        policy: &CheckoutPolicy,
        context: &FlowContext,
    ) -> FlowResult {
        if let Some(payment_type) = guards::detect_payment_method(text) {
            let outcome =
                match self.transition(state, FlowEvent::PaymentSelected(payment_type), context) {
                    Ok(outcome) => outcome,
                    Err(error) => return rejected(&error),
                };
            let mut next = state.clone();
            next.payment_type = Some(payment_type);
            apply_target(&mut next, outcome.to);

            let plan = compute_plan(next.product.price, payment_type, policy, context.today);
            return reply(
                replies::payment_selected(&plan, policy),
                vec![FlowAction::QuickReplies(replies::delivery_quick_replies(policy))],
                StateMutation::Save(next),
                vec![outcome],
            );
        }

        if address::looks_like_address(raw) {
            let outcome = match self.transition(state, FlowEvent::AddressBuffered, context) {
                Ok(outcome) => outcome,
                Err(error) => return rejected(&error),
            };
            let mut next = state.clone();
            next.buffer_address_text(raw);
            return reply(
                replies::address_buffered_reprompt(),
                vec![FlowAction::QuickReplies(replies::payment_quick_replies())],
                StateMutation::Save(next),
                vec![outcome],
            );
        }

        FlowResult::Pass(PassReason::Unrecognized)
    }

    fn on_selecting_delivery(
        &self,
        text: &str,
        state: &CheckoutState,
        policy: &CheckoutPolicy,
        context: &FlowContext,
    ) -> FlowResult {
        if let Some(payment_type) = guards::detect_payment_change(text) {
            return self.change_payment(payment_type, state, policy, context);
        }

        if let Some(method) = guards::detect_delivery(text) {
            let outcome = match self.transition(state, FlowEvent::DeliverySelected(method), context)
            {
                Ok(outcome) => outcome,
                Err(error) => return rejected(&error),
            };
            let mut next = state.clone();
            next.delivery_method = Some(method);
            next.shipping_fee = match method {
                DeliveryMethod::Pickup => Decimal::ZERO,
                DeliveryMethod::Courier => policy.shipping.courier_fee,
                DeliveryMethod::Rideshare => policy.shipping.rideshare_fee,
            };
            apply_target(&mut next, outcome.to);

            if !method.needs_address() {
                return self.confirm(next, policy, context, Vec::new(), vec![outcome]);
            }

            let header = replies::delivery_header(method, next.shipping_fee);
            if next.address_buffer.trim().is_empty() {
                return reply(
                    replies::delivery_chosen(method, next.shipping_fee),
                    Vec::new(),
                    StateMutation::Save(next),
                    vec![outcome],
                );
            }

            let validation = address::validate(&next.address_buffer);
            if validation.complete {
                return self.finish_address(next, policy, context, vec![outcome]);
            }
            let text = format!("{header}\n\n{}", address::missing_fields_prompt(&validation.missing));
            return reply(text, Vec::new(), StateMutation::Save(next), vec![outcome]);
        }

        if guards::is_generic_delivery(text) {
            let (text, quick_replies) = replies::ask_carrier(policy);
            return reply(
                text,
                vec![FlowAction::QuickReplies(quick_replies)],
                StateMutation::Unchanged,
                Vec::new(),
            );
        }

        FlowResult::Pass(PassReason::Unrecognized)
    }

    fn on_collecting_address(
        &self,
        raw: &str,
        text: &str,
        state: &CheckoutState,
        policy: &CheckoutPolicy,
        context: &FlowContext,
    ) -> FlowResult {
        if let Some(payment_type) = guards::detect_payment_change(text) {
            return self.change_payment(payment_type, state, policy, context);
        }

        let mut next = state.clone();
        next.buffer_address_text(raw);
        let validation = address::validate(&next.address_buffer);
        if validation.complete {
            return self.finish_address(next, policy, context, Vec::new());
        }

        let outcome = match self.transition(state, FlowEvent::AddressBuffered, context) {
            Ok(outcome) => outcome,
            Err(error) => return rejected(&error),
        };
        reply(
            address::missing_fields_prompt(&validation.missing),
            Vec::new(),
            StateMutation::Save(next),
            vec![outcome],
        )
    }

    fn on_confirmed(&self, text: &str, state: &CheckoutState, context: &FlowContext) -> FlowResult {
        if !guards::is_payment_proof(text) {
            return FlowResult::Pass(PassReason::Unrecognized);
        }
        match self.transition(state, FlowEvent::PaymentProofAcknowledged, context) {
            Ok(outcome) => {
                let actions = outcome.actions.clone();
                reply(replies::PAYMENT_PROOF_REQUEST, actions, StateMutation::Unchanged, vec![outcome])
            }
            Err(error) => rejected(&error),
        }
    }

    /// Re-shows the plan under a new payment type. Delivery, fee and buffer stay.
    fn change_payment(
        &self,
        payment_type: PaymentType,
        state: &CheckoutState,
        policy: &CheckoutPolicy,
        context: &FlowContext,
    ) -> FlowResult {
        let outcome = match self.transition(state, FlowEvent::PaymentChanged(payment_type), context)
        {
            Ok(outcome) => outcome,
            Err(error) => return rejected(&error),
        };
        let mut next = state.clone();
        next.payment_type = Some(payment_type);
        apply_target(&mut next, outcome.to);

        let plan = compute_plan(next.product.price, payment_type, policy, context.today);
        let (next_prompt, actions) = match next.step {
            CheckoutStep::CollectingAddress => (replies::ASK_FOR_ADDRESS, Vec::new()),
            _ => (
                replies::delivery_prompt(),
                vec![FlowAction::QuickReplies(replies::delivery_quick_replies(policy))],
            ),
        };
        reply(
            replies::payment_changed(&plan, policy, next_prompt),
            actions,
            StateMutation::Save(next),
            vec![outcome],
        )
    }

    /// `state` already carries the delivery choice and a complete buffer.
    fn finish_address(
        &self,
        mut state: CheckoutState,
        policy: &CheckoutPolicy,
        context: &FlowContext,
        mut transitions: Vec<TransitionOutcome>,
    ) -> FlowResult {
        let outcome = match self.transition(&state, FlowEvent::AddressCompleted, context) {
            Ok(outcome) => outcome,
            Err(error) => return rejected(&error),
        };
        let parsed = address::parse(&state.address_buffer);
        state.shipping_address = Some(parsed.clone());
        state.address_buffer.clear();
        apply_target(&mut state, outcome.to);
        transitions.push(outcome);

        self.confirm(state, policy, context, vec![FlowAction::SaveAddress(parsed)], transitions)
    }

    fn confirm(
        &self,
        mut state: CheckoutState,
        policy: &CheckoutPolicy,
        context: &FlowContext,
        mut actions: Vec<FlowAction>,
        transitions: Vec<TransitionOutcome>,
    ) -> FlowResult {
        state.order_status = OrderStatus::PendingStaffReview;
        let payment_type = state.payment_type.unwrap_or(PaymentType::Full);
        let plan = compute_plan(state.product.price, payment_type, policy, context.today);

        for outcome in &transitions {
            actions.extend(outcome.actions.iter().cloned());
        }
        let text = replies::confirmation(&state, &plan);
        reply(text, actions, StateMutation::Save(state), transitions)
    }

    fn transition(
        &self,
        state: &CheckoutState,
        event: FlowEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, InterfaceError> {
        let result = match &self.audit {
            Some(sink) => {
                let audit = AuditContext::new(None, context.correlation_id.clone(), ENGINE_ACTOR);
                self.apply_with_audit(state.step, &event, sink.as_ref(), &audit, context.now)
            }
            None => self.apply(state.step, &event),
        };
        result.map_err(|rejection| {
            let error = ApplicationError::from(DomainError::from(rejection))
                .into_interface(context.correlation_id.clone());
            warn!(
                event_name = "checkout.transition_rejected",
                correlation_id = %error.correlation_id(),
                error = %error,
                "checkout transition rejected"
            );
            error
        })
    }
}

fn target_name(target: FlowTarget) -> &'static str {
    match target {
        FlowTarget::Step(step) => step.as_str(),
        FlowTarget::Cleared => "cleared",
    }
}

fn apply_target(state: &mut CheckoutState, target: FlowTarget) {
    if let FlowTarget::Step(step) = target {
        state.step = step;
    }
}

fn reply(
    text: impl Into<String>,
    actions: Vec<FlowAction>,
    mutation: StateMutation,
    transitions: Vec<TransitionOutcome>,
) -> FlowResult {
    FlowResult::Reply(FlowReply { reply: text.into(), actions, mutation, transitions })
}

/// The checkout stays where it was; the customer gets the interface apology.
fn rejected(error: &InterfaceError) -> FlowResult {
    reply(error.user_message(), Vec::new(), StateMutation::Unchanged, Vec::new())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{DateTime, TimeZone, Utc};
    use rust_decimal::Decimal;

    use crate::audit::{AuditContext, AuditOutcome, InMemoryAuditSink};
    use crate::config::CheckoutPolicy;
    use crate::domain::checkout::{
        CheckoutState, CheckoutStep, DeliveryMethod, OrderStatus, PaymentType,
    };
    use crate::domain::product::ProductRef;
    use crate::errors::InterfaceError;
    use crate::flows::engine::{
        advance, CheckoutFlow, FlowDefinition, FlowEngine, FlowTransitionError,
    };
    use crate::flows::replies;
    use crate::flows::states::{
        FlowAction, FlowContext, FlowEvent, FlowReply, FlowResult, FlowTarget, PassReason,
        StateMutation,
    };

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).single().expect("valid timestamp")
    }

    fn context() -> FlowContext {
        FlowContext::new("turn-1", now())
    }

    fn product() -> ProductRef {
        ProductRef::new("p-1", "GLD-NCK-001", "สร้อยคอทองคำ", Decimal::new(9000, 0))
    }

    fn state_at(step: CheckoutStep) -> CheckoutState {
        let mut state = CheckoutState::new(product(), now());
        state.step = step;
        if step != CheckoutStep::SelectingPayment {
            state.payment_type = Some(PaymentType::Full);
        }
        if step == CheckoutStep::CollectingAddress {
            state.delivery_method = Some(DeliveryMethod::Courier);
            state.shipping_fee = Decimal::new(150, 0);
        }
        state
    }

    fn expect_reply(result: FlowResult) -> FlowReply {
        match result {
            FlowResult::Reply(reply) => reply,
            FlowResult::Pass(reason) => panic!("expected reply, got pass({})", reason.as_str()),
        }
    }

    fn saved(reply: &FlowReply) -> &CheckoutState {
        match &reply.mutation {
            StateMutation::Save(state) => state,
            other => panic!("expected saved state, got {other:?}"),
        }
    }

    #[test]
    fn cancel_during_delivery_selection_clears_state() {
        let policy = CheckoutPolicy::default();
        let reply =
            expect_reply(advance("ยกเลิกค่ะ", &state_at(CheckoutStep::SelectingDelivery), &policy, &context()));

        assert_eq!(reply.mutation, StateMutation::Clear);
        assert_eq!(reply.reply, replies::CANCELLED);
        assert_eq!(reply.transitions[0].to, FlowTarget::Cleared);
    }

    #[test]
    fn identical_inputs_produce_identical_results() {
        let policy = CheckoutPolicy::default();
        let state = state_at(CheckoutStep::SelectingPayment);
        let first = advance("2", &state, &policy, &context());
        let second = advance("2", &state, &policy, &context());
        assert_eq!(first, second);
    }

    #[test]
    fn numeric_shortcut_selects_installment_and_lists_each_period() {
        let policy = CheckoutPolicy::default();
        let reply =
            expect_reply(advance("2", &state_at(CheckoutStep::SelectingPayment), &policy, &context()));

        let next = saved(&reply);
        assert_eq!(next.step, CheckoutStep::SelectingDelivery);
        assert_eq!(next.payment_type, Some(PaymentType::Installment));
        let schedule_lines = reply.reply.lines().filter(|line| line.starts_with("งวดที่")).count();
        assert_eq!(schedule_lines, policy.installment.periods as usize);
        assert!(matches!(reply.actions.as_slice(), [FlowAction::QuickReplies(_)]));
    }

    #[test]
    fn address_split_over_two_turns_confirms_with_name_from_first_turn() {
        let policy = CheckoutPolicy::default();
        let state = state_at(CheckoutStep::CollectingAddress);

        let first = expect_reply(advance("สมชาย ใจดี", &state, &policy, &context()));
        let buffered = saved(&first).clone();
        assert_eq!(buffered.step, CheckoutStep::CollectingAddress);
        assert!(first.reply.contains("เบอร์โทรศัพท์"));
        assert!(!first.reply.contains("ชื่อ-นามสกุล"));

        let second = expect_reply(advance(
            "0812345678 เขตบางนา กรุงเทพ 10260",
            &buffered,
            &policy,
            &context(),
        ));
        let confirmed = saved(&second);
        assert_eq!(confirmed.step, CheckoutStep::Confirmed);
        assert_eq!(confirmed.order_status, OrderStatus::PendingStaffReview);
        assert!(confirmed.address_buffer.is_empty());

        let address = confirmed.shipping_address.as_ref().expect("address parsed");
        assert_eq!(address.name, "สมชาย ใจดี");
        assert_eq!(address.phone, "0812345678");
        assert_eq!(address.district, "บางนา");
        assert_eq!(address.province, "กรุงเทพฯ");
        assert_eq!(address.postal_code, "10260");

        assert!(matches!(second.actions.first(), Some(FlowAction::SaveAddress(saved)) if saved == address));
        assert!(second.actions.contains(&FlowAction::HandoffToStaff));
        assert!(second.reply.contains("฿9,150"));
    }

    #[test]
    fn pickup_confirms_without_address() {
        let policy = CheckoutPolicy::default();
        let reply =
            expect_reply(advance("1", &state_at(CheckoutStep::SelectingDelivery), &policy, &context()));

        let next = saved(&reply);
        assert_eq!(next.step, CheckoutStep::Confirmed);
        assert_eq!(next.delivery_method, Some(DeliveryMethod::Pickup));
        assert_eq!(next.shipping_fee, Decimal::ZERO);
        assert_eq!(next.order_status, OrderStatus::PendingStaffReview);
        assert_eq!(reply.actions, vec![FlowAction::HandoffToStaff]);
        assert!(reply.reply.contains("รับที่ร้าน"));
    }

    #[test]
    fn questions_and_product_codes_pass_without_touching_state() {
        let policy = CheckoutPolicy::default();
        let state = state_at(CheckoutStep::SelectingDelivery);

        assert_eq!(
            advance("มีสีอื่นมั้ย", &state, &policy, &context()),
            FlowResult::Pass(PassReason::InterruptionQuestion)
        );
        assert_eq!(
            advance("RLX-SUB-001", &state, &policy, &context()),
            FlowResult::Pass(PassReason::ProductCode)
        );
        assert_eq!(advance("   ", &state, &policy, &context()), FlowResult::Pass(PassReason::Unrecognized));
    }

    #[test]
    fn deposit_question_is_an_answer_not_an_interruption() {
        let policy = CheckoutPolicy::default();
        let reply = expect_reply(advance(
            "Can I pay a deposit instead?",
            &state_at(CheckoutStep::SelectingDelivery),
            &policy,
            &context(),
        ));
        assert_eq!(saved(&reply).payment_type, Some(PaymentType::Deposit));
    }

    #[test]
    fn unsellable_product_clears_with_apology() {
        let policy = CheckoutPolicy::default();
        let mut state = state_at(CheckoutStep::SelectingDelivery);
        state.product.price = Decimal::ZERO;

        let reply = expect_reply(advance("ยกเลิก", &state, &policy, &context()));
        assert_eq!(reply.reply, replies::APOLOGY);
        assert_eq!(reply.mutation, StateMutation::Clear);
        assert_eq!(reply.transitions[0].event, FlowEvent::ProductUnavailable);
    }

    #[test]
    fn early_address_is_kept_and_completes_on_courier_choice() {
        let policy = CheckoutPolicy::default();
        let early = "คุณสมหญิง รักดี 99/1 ซอยสุขุมวิท 5 เขตวัฒนา กรุงเทพ 10110 โทร 0898765432";

        let buffered =
            expect_reply(advance(early, &state_at(CheckoutStep::SelectingPayment), &policy, &context()));
        let state = saved(&buffered).clone();
        assert_eq!(state.step, CheckoutStep::SelectingPayment);
        assert_eq!(state.address_buffer, early);

        let paid = expect_reply(advance("โอนเต็ม", &state, &policy, &context()));
        let state = saved(&paid).clone();
        assert_eq!(state.address_buffer, early);

        let shipped = expect_reply(advance("2", &state, &policy, &context()));
        let confirmed = saved(&shipped);
        assert_eq!(confirmed.step, CheckoutStep::Confirmed);
        assert_eq!(confirmed.shipping_fee, Decimal::new(150, 0));
        assert_eq!(
            confirmed.shipping_address.as_ref().map(|address| address.phone.as_str()),
            Some("0898765432")
        );
        assert_eq!(shipped.transitions.len(), 2);
    }

    #[test]
    fn payment_change_keeps_delivery_and_buffer() {
        let policy = CheckoutPolicy::default();
        let mut state = state_at(CheckoutStep::CollectingAddress);
        state.address_buffer = "สมชาย ใจดี".to_string();

        let reply = expect_reply(advance("เปลี่ยนเป็นผ่อน", &state, &policy, &context()));
        let next = saved(&reply);
        assert_eq!(next.step, CheckoutStep::CollectingAddress);
        assert_eq!(next.payment_type, Some(PaymentType::Installment));
        assert_eq!(next.delivery_method, Some(DeliveryMethod::Courier));
        assert_eq!(next.shipping_fee, Decimal::new(150, 0));
        assert_eq!(next.address_buffer, "สมชาย ใจดี");
        assert!(reply.reply.ends_with(replies::ASK_FOR_ADDRESS));
    }

    #[test]
    fn generic_delivery_asks_for_carrier() {
        let policy = CheckoutPolicy::default();
        let reply =
            expect_reply(advance("ส่ง", &state_at(CheckoutStep::SelectingDelivery), &policy, &context()));
        assert_eq!(reply.mutation, StateMutation::Unchanged);
        assert!(reply.reply.contains("EMS"));
    }

    #[test]
    fn confirmed_step_only_accepts_payment_proof() {
        let policy = CheckoutPolicy::default();
        let state = state_at(CheckoutStep::Confirmed);

        let reply = expect_reply(advance("โอนแล้วค่ะ", &state, &policy, &context()));
        assert_eq!(reply.reply, replies::PAYMENT_PROOF_REQUEST);
        assert_eq!(reply.actions, vec![FlowAction::RequestPaymentProof]);
        assert_eq!(reply.mutation, StateMutation::Unchanged);

        assert!(advance("ขอบคุณค่ะ", &state, &policy, &context()).is_pass());
    }

    #[test]
    fn start_without_preselection_offers_payment_options() {
        let engine = FlowEngine::new(CheckoutFlow);
        let policy = CheckoutPolicy::default();
        let reply = expect_reply(engine.start(product(), None, &policy, &context()));

        assert_eq!(saved(&reply).step, CheckoutStep::SelectingPayment);
        assert!(reply.reply.contains("งวดแรก ฿3,270"));
        assert!(reply.transitions.is_empty());
    }

    #[test]
    fn start_with_preselected_payment_skips_to_delivery() {
        let engine = FlowEngine::new(CheckoutFlow);
        let policy = CheckoutPolicy::default();
        let reply =
            expect_reply(engine.start(product(), Some(PaymentType::Deposit), &policy, &context()));

        let state = saved(&reply);
        assert_eq!(state.step, CheckoutStep::SelectingDelivery);
        assert_eq!(state.payment_type, Some(PaymentType::Deposit));
        assert!(reply.reply.contains("฿900"));
    }

    #[test]
    fn transition_table_rejects_out_of_order_events() {
        let flow = CheckoutFlow;
        let error = flow
            .transition(CheckoutStep::SelectingPayment, &FlowEvent::AddressCompleted)
            .expect_err("address cannot complete before payment");
        assert_eq!(error.from, CheckoutStep::SelectingPayment);
        assert!(flow
            .transition(CheckoutStep::Confirmed, &FlowEvent::DeliverySelected(DeliveryMethod::Pickup))
            .is_err());
        assert_eq!(
            flow.transition(CheckoutStep::Confirmed, &FlowEvent::CancelRequested)
                .map(|outcome| outcome.to),
            Ok(FlowTarget::Cleared)
        );
    }

    #[test]
    fn audited_engine_records_applied_and_rejected_transitions() {
        let sink = InMemoryAuditSink::default();
        let engine = FlowEngine::new(CheckoutFlow).with_audit_sink(Arc::new(sink.clone()));
        let policy = CheckoutPolicy::default();

        expect_reply(engine.advance("3", &state_at(CheckoutStep::SelectingPayment), &policy, &context()));
        let rejected = engine.apply_with_audit(
            CheckoutStep::Confirmed,
            &FlowEvent::AddressBuffered,
            &sink,
            &AuditContext::new(None, "turn-2", "test"),
            now(),
        );
        assert!(rejected.is_err());

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "checkout.transition_applied");
        assert_eq!(events[0].context.correlation_id, "turn-1");
        assert_eq!(events[0].detail("to"), Some("selecting_delivery"));
        assert_eq!(events[1].outcome, AuditOutcome::Rejected);
    }

    /// Rejects every event so the engine's refusal path is reachable.
    struct ClosedFlow;

    impl FlowDefinition for ClosedFlow {
        fn initial_step(&self) -> CheckoutStep {
            CheckoutStep::SelectingPayment
        }

        fn transition(
            &self,
            current: CheckoutStep,
            event: &FlowEvent,
        ) -> Result<crate::flows::states::TransitionOutcome, FlowTransitionError> {
            Err(FlowTransitionError { from: current, event: event.clone() })
        }
    }

    #[test]
    fn rejected_transition_keeps_state_and_answers_with_bad_request_apology() {
        let engine = FlowEngine::new(ClosedFlow);
        let policy = CheckoutPolicy::default();
        let expected = InterfaceError::BadRequest {
            message: String::new(),
            correlation_id: String::new(),
        }
        .user_message();

        let reply = expect_reply(engine.advance(
            "โอนเต็ม",
            &state_at(CheckoutStep::SelectingPayment),
            &policy,
            &context(),
        ));

        assert_eq!(reply.reply, expected);
        assert_eq!(reply.mutation, StateMutation::Unchanged);
        assert!(reply.transitions.is_empty());
    }

    #[test]
    fn starting_checkout_for_zero_price_product_is_refused() {
        let engine = FlowEngine::new(CheckoutFlow);
        let policy = CheckoutPolicy::default();
        let mut free = product();
        free.price = Decimal::ZERO;

        let reply = expect_reply(engine.start(free, None, &policy, &context()));

        assert_ne!(reply.reply, replies::APOLOGY);
        assert!(reply.reply.contains("ไม่สามารถดำเนินการได้"));
        assert_eq!(reply.mutation, StateMutation::Clear);
        assert!(reply.transitions.is_empty());
    }
}
