pub mod address;
pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod pricing;
pub mod retry;
pub mod text;

pub use config::{CheckoutPolicy, ConfigProvider, StaticConfigProvider};
pub use domain::address::{Address, AddressField, AddressId};
pub use domain::checkout::{CheckoutState, CheckoutStep, DeliveryMethod, OrderStatus, PaymentType};
pub use domain::conversation::{ConversationKey, CHECKOUT_STATE_TTL_SECS};
pub use domain::intent::{DetectionMethod, Intent, IntentResult, SlotKey, SlotValue, Slots};
pub use domain::product::{ProductId, ProductRef};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use flows::{advance, FlowContext, FlowEngine, FlowResult};
pub use pricing::{compute_plan, PaymentPlan};
pub use retry::RetryPolicy;
