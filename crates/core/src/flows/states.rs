use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::address::Address;
use crate::domain::checkout::{CheckoutState, CheckoutStep, DeliveryMethod, PaymentType};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "event", content = "value")]
pub enum FlowEvent {
    PaymentSelected(PaymentType),
    PaymentChanged(PaymentType),
    AddressBuffered,
    DeliverySelected(DeliveryMethod),
    AddressCompleted,
    PaymentProofAcknowledged,
    CancelRequested,
    ProductUnavailable,
}

/// Inputs that are not part of the message or the stored state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowContext {
    pub now: DateTime<Utc>,
    /// Calendar day used for due dates.
    pub today: NaiveDate,
    pub correlation_id: String,
}

impl FlowContext {
    pub fn new(correlation_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self { now, today: now.date_naive(), correlation_id: correlation_id.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuickReply {
    pub label: String,
    pub text: String,
}

impl QuickReply {
    pub fn new(label: impl Into<String>, text: impl Into<String>) -> Self {
        Self { label: label.into(), text: text.into() }
    }
}

/// Side effects the caller performs after persisting the state mutation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "payload")]
pub enum FlowAction {
    SaveAddress(Address),
    HandoffToStaff,
    RequestPaymentProof,
    QuickReplies(Vec<QuickReply>),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "state")]
pub enum StateMutation {
    Save(CheckoutState),
    Clear,
    Unchanged,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowTarget {
    Step(CheckoutStep),
    Cleared,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: CheckoutStep,
    pub to: FlowTarget,
    pub event: FlowEvent,
    pub actions: Vec<FlowAction>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowReply {
    pub reply: String,
    pub actions: Vec<FlowAction>,
    pub mutation: StateMutation,
    pub transitions: Vec<TransitionOutcome>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassReason {
    InterruptionQuestion,
    ProductCode,
    Unrecognized,
}

impl PassReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InterruptionQuestion => "interruption_question",
            Self::ProductCode => "product_code",
            Self::Unrecognized => "unrecognized",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowResult {
    Reply(FlowReply),
    Pass(PassReason),
}

impl FlowResult {
    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass(_))
    }

    pub fn reply(&self) -> Option<&FlowReply> {
        match self {
            Self::Reply(reply) => Some(reply),
            Self::Pass(_) => None,
        }
    }

    pub fn into_reply(self) -> Option<FlowReply> {
        match self {
            Self::Reply(reply) => Some(reply),
            Self::Pass(_) => None,
        }
    }
}
