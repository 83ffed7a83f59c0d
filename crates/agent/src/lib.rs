//! Message routing for the shop chat: the two-tier intent classifier, the
//! guardrail applied to remote classifications, and the conversation runtime
//! that serializes checkout turns per customer.

pub mod classifier;
pub mod context;
pub mod guardrails;
pub mod remote;
pub mod rules;
pub mod runtime;

pub use classifier::{ClassifierSettings, IntentClassifier};
pub use context::{ClassifierContext, LastSlots};
pub use remote::{
    DisabledRemoteClassifier, HttpRemoteClassifier, RemoteClassifier, RemoteClassifierError,
    RemoteRequest, RemoteResponse,
};
pub use runtime::{ConversationRuntime, InboundMessage, TurnOutcome, TurnRoute};
