use serde_json::json;
use shopchat_core::address::{parse, validate};

use crate::commands::{to_data, CommandResult};

pub fn run(text: &str) -> CommandResult {
    let validation = validate(text);
    let message = if validation.complete {
        "address complete".to_string()
    } else {
        let missing: Vec<_> = validation.missing.iter().map(|field| field.as_str()).collect();
        format!("address incomplete; missing {}", missing.join(", "))
    };

    CommandResult::success_with(
        "address",
        message,
        json!({
            "validation": to_data(&validation),
            "address": to_data(&parse(text)),
        }),
    )
}
