pub mod engine;
pub mod guards;
pub mod replies;
pub mod states;

pub use engine::{advance, CheckoutFlow, FlowDefinition, FlowEngine, FlowTransitionError};
pub use states::{
    FlowAction, FlowContext, FlowEvent, FlowReply, FlowResult, FlowTarget, PassReason,
    QuickReply, StateMutation, TransitionOutcome,
};
