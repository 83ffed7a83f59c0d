use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::json;
use shopchat_core::config::{ConfigProvider, LoadOptions, StaticConfigProvider};
use shopchat_core::domain::checkout::PaymentType;
use shopchat_core::flows::replies::plan_summary;
use shopchat_core::pricing::compute_plan;

use crate::commands::{load_config, to_data, CommandResult};

pub fn run(
    options: &LoadOptions,
    price: &str,
    payment: &str,
    tenant: Option<&str>,
    today: NaiveDate,
) -> CommandResult {
    let config = match load_config("plan", options) {
        Ok(config) => config,
        Err(result) => return result,
    };

    let price = match price.trim().replace(',', "").parse::<Decimal>() {
        Ok(price) if price > Decimal::ZERO => price,
        Ok(_) => return CommandResult::failure("plan", "invalid_input", "price must be positive", 6),
        Err(error) => {
            return CommandResult::failure("plan", "invalid_input", format!("invalid price: {error}"), 6)
        }
    };
    let payment_type = match payment.parse::<PaymentType>() {
        Ok(payment_type) => payment_type,
        Err(message) => return CommandResult::failure("plan", "invalid_input", message, 6),
    };

    let tenant = tenant.unwrap_or("default");
    let policy = StaticConfigProvider::new(config.checkout.clone())
        .checkout_policy(tenant)
        .unwrap_or_default();
    let plan = compute_plan(price, payment_type, &policy, today);

    CommandResult::success_with(
        "plan",
        format!("{} plan over {} period(s)", payment_type.as_str(), plan.periods),
        json!({
            "tenant": tenant,
            "plan": to_data(&plan),
            "summary": plan_summary(&plan, &policy),
        }),
    )
}
