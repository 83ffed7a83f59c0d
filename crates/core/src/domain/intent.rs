use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Closed intent catalog. Anything a classifier cannot place here is `Unknown`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    CheckoutConfirm,
    CheckoutCancel,
    PaymentSlipVerify,
    PaymentOptions,
    ShippingAddress,
    ChangePaymentMethod,
    AdminHandoff,
    RequestVideoCall,
    PriceNegotiation,
    InstallmentCheck,
    DepositNew,
    DepositFlow,
    PawnInquiry,
    TradeIn,
    RepairInquiry,
    OrderStatus,
    PurchaseIntent,
    ProductLookupByCode,
    ProductAvailability,
    PriceInquiry,
    BrowseProducts,
    ProductSearch,
    Greeting,
    Thanks,
    Unknown,
}

impl Intent {
    pub const ALL: [Intent; 25] = [
        Self::CheckoutConfirm,
        Self::CheckoutCancel,
        Self::PaymentSlipVerify,
        Self::PaymentOptions,
        Self::ShippingAddress,
        Self::ChangePaymentMethod,
        Self::AdminHandoff,
        Self::RequestVideoCall,
        Self::PriceNegotiation,
        Self::InstallmentCheck,
        Self::DepositNew,
        Self::DepositFlow,
        Self::PawnInquiry,
        Self::TradeIn,
        Self::RepairInquiry,
        Self::OrderStatus,
        Self::PurchaseIntent,
        Self::ProductLookupByCode,
        Self::ProductAvailability,
        Self::PriceInquiry,
        Self::BrowseProducts,
        Self::ProductSearch,
        Self::Greeting,
        Self::Thanks,
        Self::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CheckoutConfirm => "checkout_confirm",
            Self::CheckoutCancel => "checkout_cancel",
            Self::PaymentSlipVerify => "payment_slip_verify",
            Self::PaymentOptions => "payment_options",
            Self::ShippingAddress => "shipping_address",
            Self::ChangePaymentMethod => "change_payment_method",
            Self::AdminHandoff => "admin_handoff",
            Self::RequestVideoCall => "request_video_call",
            Self::PriceNegotiation => "price_negotiation",
            Self::InstallmentCheck => "installment_check",
            Self::DepositNew => "deposit_new",
            Self::DepositFlow => "deposit_flow",
            Self::PawnInquiry => "pawn_inquiry",
            Self::TradeIn => "trade_in",
            Self::RepairInquiry => "repair_inquiry",
            Self::OrderStatus => "order_status",
            Self::PurchaseIntent => "purchase_intent",
            Self::ProductLookupByCode => "product_lookup_by_code",
            Self::ProductAvailability => "product_availability",
            Self::PriceInquiry => "price_inquiry",
            Self::BrowseProducts => "browse_products",
            Self::ProductSearch => "product_search",
            Self::Greeting => "greeting",
            Self::Thanks => "thanks",
            Self::Unknown => "unknown",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().to_ascii_lowercase();
        Self::ALL.iter().copied().find(|intent| intent.as_str() == name)
    }

    /// Lower is more urgent. Used downstream when two subsystems claim one turn.
    pub fn priority(&self) -> u16 {
        match self {
            Self::CheckoutConfirm => 1,
            Self::CheckoutCancel => 2,
            Self::PaymentSlipVerify => 3,
            Self::PaymentOptions => 4,
            Self::ShippingAddress => 5,
            Self::ChangePaymentMethod => 6,
            Self::AdminHandoff => 10,
            Self::RequestVideoCall => 11,
            Self::PriceNegotiation => 12,
            Self::InstallmentCheck => 20,
            Self::DepositNew => 21,
            Self::DepositFlow => 22,
            Self::PawnInquiry => 23,
            Self::TradeIn => 24,
            Self::RepairInquiry => 25,
            Self::OrderStatus => 29,
            Self::PurchaseIntent => 30,
            Self::ProductLookupByCode => 31,
            Self::ProductAvailability => 32,
            Self::PriceInquiry => 34,
            Self::BrowseProducts => 36,
            Self::ProductSearch => 38,
            Self::Greeting => 50,
            Self::Thanks => 51,
            Self::Unknown => 100,
        }
    }

    /// Slot keys an intent is allowed to carry.
    pub fn allowed_slots(&self) -> &'static [SlotKey] {
        match self {
            Self::ShippingAddress => &[SlotKey::AddressText],
            Self::ChangePaymentMethod => &[SlotKey::NewPaymentMethod],
            Self::PaymentOptions
            | Self::InstallmentCheck
            | Self::DepositNew
            | Self::DepositFlow
            | Self::PawnInquiry
            | Self::RepairInquiry => &[SlotKey::ActionType],
            Self::TradeIn => &[SlotKey::ActionType, SlotKey::TradeInAmount],
            Self::PurchaseIntent => {
                &[SlotKey::ProductCode, SlotKey::ProductIndex, SlotKey::ProductNameQuery]
            }
            Self::ProductLookupByCode => &[SlotKey::ProductCode],
            Self::ProductAvailability | Self::PriceInquiry | Self::ProductSearch => {
                &[SlotKey::ProductCode, SlotKey::ProductNameQuery]
            }
            _ => &[],
        }
    }

    /// Intents that only make sense against an open checkout and are therefore
    /// only produced by the deterministic context rules.
    pub fn is_context_only(&self) -> bool {
        matches!(self, Self::CheckoutConfirm | Self::CheckoutCancel)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    Pattern,
    Remote,
    Context,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotKey {
    ProductCode,
    ProductIndex,
    ProductNameQuery,
    AddressText,
    NewPaymentMethod,
    ActionType,
    TradeInAmount,
}

impl SlotKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ProductCode => "product_code",
            Self::ProductIndex => "product_index",
            Self::ProductNameQuery => "product_name_query",
            Self::AddressText => "address_text",
            Self::NewPaymentMethod => "new_payment_method",
            Self::ActionType => "action_type",
            Self::TradeInAmount => "trade_in_amount",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        [
            Self::ProductCode,
            Self::ProductIndex,
            Self::ProductNameQuery,
            Self::AddressText,
            Self::NewPaymentMethod,
            Self::ActionType,
            Self::TradeInAmount,
        ]
        .into_iter()
        .find(|key| key.as_str() == name)
    }

    fn expects_integer(&self) -> bool {
        matches!(self, Self::ProductIndex | Self::TradeInAmount)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SlotValue {
    Integer(i64),
    Text(String),
}

impl SlotValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            Self::Integer(_) => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(value) => Some(*value),
            Self::Text(_) => None,
        }
    }
}

/// Typed slot map. `extra` holds remote-supplied keys outside the closed set
/// and is never consulted by the flow engine.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slots {
    #[serde(default)]
    values: BTreeMap<SlotKey, SlotValue>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    extra: Map<String, Value>,
}

impl Slots {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: SlotKey, value: SlotValue) -> Self {
        self.values.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: SlotKey, value: SlotValue) {
        self.values.insert(key, value);
    }

    pub fn get(&self, key: SlotKey) -> Option<&SlotValue> {
        self.values.get(&key)
    }

    pub fn text(&self, key: SlotKey) -> Option<&str> {
        self.get(key).and_then(SlotValue::as_text)
    }

    pub fn integer(&self, key: SlotKey) -> Option<i64> {
        self.get(key).and_then(SlotValue::as_integer)
    }

    pub fn keys(&self) -> impl Iterator<Item = SlotKey> + '_ {
        self.values.keys().copied()
    }

    pub fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.extra.is_empty()
    }

    /// Drops typed slots the intent does not declare.
    pub fn retain_allowed(&mut self, intent: Intent) {
        let allowed = intent.allowed_slots();
        self.values.retain(|key, _| allowed.contains(key));
    }

    /// Builds slots from a loosely typed remote payload. Known keys with the
    /// expected JSON shape become typed slots; everything else lands in `extra`.
    pub fn from_remote(intent: Intent, raw: Map<String, Value>) -> Self {
        let allowed = intent.allowed_slots();
        let mut slots = Self::new();
        for (name, value) in raw {
            let typed = SlotKey::from_name(&name)
                .filter(|key| allowed.contains(key))
                .and_then(|key| typed_value(key, &value).map(|typed| (key, typed)));
            match typed {
                Some((key, typed)) => slots.insert(key, typed),
                None => {
                    slots.extra.insert(name, value);
                }
            }
        }
        slots
    }
}

fn typed_value(key: SlotKey, value: &Value) -> Option<SlotValue> {
    if key.expects_integer() {
        return match value {
            Value::Number(number) => number.as_i64().map(SlotValue::Integer),
            Value::String(text) => text.trim().replace(',', "").parse().ok().map(SlotValue::Integer),
            _ => None,
        };
    }
    match value {
        Value::String(text) if !text.trim().is_empty() => Some(SlotValue::text(text.trim())),
        Value::Number(number) => Some(SlotValue::text(number.to_string())),
        _ => None,
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntentResult {
    pub intent: Intent,
    pub confidence: f32,
    pub slots: Slots,
    pub method: DetectionMethod,
    pub priority: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_text: Option<String>,
}

impl IntentResult {
    pub fn new(intent: Intent, confidence: f32, method: DetectionMethod) -> Self {
        let confidence = if confidence.is_finite() { confidence.clamp(0.0, 1.0) } else { 0.0 };
        Self {
            intent,
            confidence,
            slots: Slots::new(),
            method,
            priority: intent.priority(),
            reply_text: None,
        }
    }

    pub fn unknown() -> Self {
        Self::new(Intent::Unknown, 0.0, DetectionMethod::Pattern)
    }

    pub fn with_slot(mut self, key: SlotKey, value: SlotValue) -> Self {
        self.slots.insert(key, value);
        self.slots.retain_allowed(self.intent);
        self
    }

    pub fn with_slots(mut self, mut slots: Slots) -> Self {
        slots.retain_allowed(self.intent);
        self.slots = slots;
        self
    }

    pub fn with_reply_text(mut self, reply_text: impl Into<String>) -> Self {
        self.reply_text = Some(reply_text.into());
        self
    }
}
