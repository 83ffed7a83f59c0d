use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::address::Address;
use crate::domain::product::ProductRef;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutStep {
    SelectingPayment,
    SelectingDelivery,
    CollectingAddress,
    Confirmed,
}

impl CheckoutStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SelectingPayment => "selecting_payment",
            Self::SelectingDelivery => "selecting_delivery",
            Self::CollectingAddress => "collecting_address",
            Self::Confirmed => "confirmed",
        }
    }

    /// Steps in which the customer still owes the bot an answer.
    pub fn is_open(&self) -> bool {
        !matches!(self, Self::Confirmed)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentType {
    Full,
    Installment,
    Deposit,
}

impl PaymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Installment => "installment",
            Self::Deposit => "deposit",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Full => "ชำระเต็มจำนวน",
            Self::Installment => "ผ่อนชำระ",
            Self::Deposit => "มัดจำ",
        }
    }
}

impl FromStr for PaymentType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(Self::Full),
            "installment" => Ok(Self::Installment),
            "deposit" => Ok(Self::Deposit),
            other => Err(format!("unknown payment type `{other}` (expected full|installment|deposit)")),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMethod {
    Pickup,
    Courier,
    Rideshare,
}

impl DeliveryMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pickup => "pickup",
            Self::Courier => "courier",
            Self::Rideshare => "rideshare",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Pickup => "รับที่ร้าน",
            Self::Courier => "ส่ง EMS",
            Self::Rideshare => "ส่ง Grab",
        }
    }

    pub fn needs_address(&self) -> bool {
        !matches!(self, Self::Pickup)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    #[default]
    Open,
    PendingStaffReview,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::PendingStaffReview => "pending_staff_review",
        }
    }
}

/// Per-conversation checkout progress. Owned by the flow engine and persisted
/// under [`crate::ConversationKey::checkout_key`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutState {
    pub step: CheckoutStep,
    pub product: ProductRef,
    pub payment_type: Option<PaymentType>,
    pub delivery_method: Option<DeliveryMethod>,
    pub shipping_fee: Decimal,
    pub shipping_address: Option<Address>,
    #[serde(default)]
    pub address_buffer: String,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub order_status: OrderStatus,
}

impl CheckoutState {
    pub fn new(product: ProductRef, started_at: DateTime<Utc>) -> Self {
        Self {
            step: CheckoutStep::SelectingPayment,
            product,
            payment_type: None,
            delivery_method: None,
            shipping_fee: Decimal::ZERO,
            shipping_address: None,
            address_buffer: String::new(),
            started_at,
            order_status: OrderStatus::Open,
        }
    }

    /// Appends a customer message to the multi-turn address buffer.
    pub fn buffer_address_text(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        if !self.address_buffer.is_empty() {
            self.address_buffer.push('\n');
        }
        self.address_buffer.push_str(text);
    }
}
