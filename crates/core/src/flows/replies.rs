//! Customer-facing Thai copy for each checkout step.

use rust_decimal::Decimal;

use crate::config::CheckoutPolicy;
use crate::domain::checkout::{CheckoutState, DeliveryMethod, PaymentType};
use crate::domain::product::ProductRef;
use crate::flows::states::QuickReply;
use crate::pricing::{compute_plan, format_baht, PaymentPlan};

pub const APOLOGY: &str = "ขออภัยค่ะ เกิดข้อผิดพลาด กรุณาลองใหม่อีกครั้ง 🙏";
pub const CANCELLED: &str = "ยกเลิกการสั่งซื้อเรียบร้อยค่ะ 🙏\n\nหากต้องการสินค้าอื่น สามารถค้นหาได้เลยค่ะ";
pub const PAYMENT_PROOF_REQUEST: &str = "รบกวนส่งรูปสลิปมาได้เลยค่ะ เดี๋ยวตรวจสอบให้นะคะ 📸";
pub const ASK_FOR_ADDRESS: &str = "รบกวนแจ้ง ชื่อ-ที่อยู่-เบอร์โทร สำหรับจัดส่งค่ะ 📝";
const DELIVERY_PROMPT: &str = "📦 รับสินค้า: กรุณาเลือกช่องทางค่ะ";

fn percent(value: Decimal) -> String {
    value.normalize().to_string()
}

/// `150` rather than `฿150`, for inline fee notes.
fn plain_amount(amount: Decimal) -> String {
    format_baht(amount).replacen('฿', "", 1)
}

fn cancel_button() -> QuickReply {
    QuickReply::new("❌ ยกเลิก", "ยกเลิก")
}

fn product_header(product: &ProductRef) -> String {
    format!("📦 {}\n📝 {}\n💰 ราคา: {}\n\n", product.code, product.name, format_baht(product.price))
}

pub fn payment_quick_replies() -> Vec<QuickReply> {
    vec![
        QuickReply::new("💳 ชำระเต็ม", "1.โอนเต็ม"),
        QuickReply::new("📅 ผ่อนชำระ", "2.ผ่อน"),
        QuickReply::new("💵 มัดจำ", "3.มัดจำ"),
        cancel_button(),
    ]
}

pub fn delivery_quick_replies(policy: &CheckoutPolicy) -> Vec<QuickReply> {
    vec![
        QuickReply::new("🏪 รับที่ร้าน", "1.รับที่ร้าน"),
        QuickReply::new(
            format!("📦 EMS +{}", format_baht(policy.shipping.courier_fee)),
            "2.ส่ง EMS",
        ),
        QuickReply::new("🛵 Grab", "3.ส่ง Grab"),
        cancel_button(),
    ]
}

/// Opening message of a checkout: the three payment options with previews.
pub fn payment_options(
    product: &ProductRef,
    policy: &CheckoutPolicy,
    today: chrono::NaiveDate,
) -> String {
    let installment = compute_plan(product.price, PaymentType::Installment, policy, today);
    let deposit = compute_plan(product.price, PaymentType::Deposit, policy, today);

    let mut text = String::from("✅ ยืนยันรายการสั่งซื้อ\n\n");
    text.push_str(&product_header(product));
    text.push_str("เลือกวิธีชำระเงินค่ะ:\n");
    text.push_str(&format!("1️⃣ โอนเต็มจำนวน {}\n", format_baht(product.price)));
    text.push_str(&format!(
        "2️⃣ ผ่อน {} งวด (งวดแรก {} รวมค่าดำเนินการ {}%)\n",
        installment.periods,
        format_baht(installment.first_period_amount),
        percent(policy.installment.service_fee_percent)
    ));
    text.push_str(&format!(
        "3️⃣ มัดจำ {} ({}%)\n\n",
        format_baht(deposit.first_period_amount),
        percent(policy.deposit.percent)
    ));
    text.push_str("พิมพ์ตัวเลข 1-3 หรือพิมพ์ตอบได้เลยค่ะ 😊");
    text
}

/// Plan block. Installment plans list one `งวดที่` line per period.
pub fn plan_summary(plan: &PaymentPlan, policy: &CheckoutPolicy) -> String {
    let mut text = String::new();
    match plan.payment_type {
        PaymentType::Installment => {
            text.push_str(&format!(
                "📝 ตารางผ่อนชำระ (รวมค่าดำเนินการ {}%)\n\n",
                percent(policy.installment.service_fee_percent)
            ));
            for payment in &plan.schedule {
                text.push_str(&format!(
                    "งวดที่ {}: {} (กำหนด {})\n",
                    payment.number,
                    format_baht(payment.amount),
                    payment.due_date.format("%d/%m/%Y")
                ));
            }
        }
        PaymentType::Deposit => {
            text.push_str("📝 มัดจำจองสินค้า\n\n");
            if let Some(deposit) = &plan.deposit {
                text.push_str(&format!(
                    "💰 ยอดมัดจำ: {} ({}%)\n💰 ยอดคงเหลือ: {}\n📅 เก็บสินค้าไว้ให้ {} วัน\n",
                    format_baht(deposit.amount),
                    percent(deposit.percent),
                    format_baht(deposit.remaining),
                    deposit.hold_days
                ));
            }
        }
        PaymentType::Full => {
            text.push_str("📝 ชำระเต็มจำนวน\n\n");
            text.push_str(&format!("💰 ยอดชำระ: {}\n", format_baht(plan.total_amount)));
        }
    }
    text
}

pub fn payment_selected(plan: &PaymentPlan, policy: &CheckoutPolicy) -> String {
    format!(
        "✅ เลือก{}\n\n{}\n{DELIVERY_PROMPT}",
        plan.payment_type.label(),
        plan_summary(plan, policy)
    )
}

/// Reply for a checkout opened with the payment type already chosen.
pub fn preselected_payment(product: &ProductRef, plan: &PaymentPlan, policy: &CheckoutPolicy) -> String {
    format!(
        "✅ รับทราบค่ะ\n\n{}{}\n{DELIVERY_PROMPT}",
        product_header(product),
        plan_summary(plan, policy)
    )
}

/// Mid-flow payment change. `next_prompt` repeats whatever the current step still needs.
pub fn payment_changed(plan: &PaymentPlan, policy: &CheckoutPolicy, next_prompt: &str) -> String {
    format!(
        "ได้ค่ะ เปลี่ยนเป็น{}แล้วค่ะ ✅\n\n{}\n{next_prompt}",
        plan.payment_type.label(),
        plan_summary(plan, policy)
    )
}

pub fn delivery_prompt() -> &'static str {
    DELIVERY_PROMPT
}

pub fn ask_carrier(policy: &CheckoutPolicy) -> (String, Vec<QuickReply>) {
    let text = format!(
        "ต้องการส่งแบบไหนคะ?\n\n📦 EMS (+{} บาท)\n🛵 Grab ({})",
        plain_amount(policy.shipping.courier_fee),
        rideshare_fee_note(policy.shipping.rideshare_fee)
    );
    let replies = vec![
        QuickReply::new("📦 EMS", "2.ส่ง EMS"),
        QuickReply::new("🛵 Grab", "3.ส่ง Grab"),
        cancel_button(),
    ];
    (text, replies)
}

fn rideshare_fee_note(fee: Decimal) -> String {
    if fee > Decimal::ZERO {
        format!("+{} บาท", plain_amount(fee))
    } else {
        "ค่าส่งตามระยะทาง".to_string()
    }
}

/// First line of the reply to a carrier choice, e.g. `✅ ส่ง EMS (+150 บาท)`.
pub fn delivery_header(method: DeliveryMethod, fee: Decimal) -> String {
    let fee_note = match method {
        DeliveryMethod::Rideshare => format!(" ({})", rideshare_fee_note(fee)),
        _ if fee > Decimal::ZERO => format!(" (+{} บาท)", plain_amount(fee)),
        _ => String::new(),
    };
    format!("✅ {}{fee_note}", method.label())
}

pub fn delivery_chosen(method: DeliveryMethod, fee: Decimal) -> String {
    format!("{}\n\n{ASK_FOR_ADDRESS}", delivery_header(method, fee))
}

pub fn address_buffered_reprompt() -> String {
    "ขอบคุณสำหรับข้อมูลที่อยู่ค่ะ 📝\n\nแต่รบกวนเลือกวิธีชำระเงินก่อนนะคะ:\n1️⃣ โอนเต็ม\n2️⃣ ผ่อน\n3️⃣ มัดจำ"
        .to_string()
}

/// Summary sent on reaching the confirmed step.
pub fn confirmation(state: &CheckoutState, plan: &PaymentPlan) -> String {
    let product = &state.product;
    let mut lines = vec![
        "✅ บันทึกข้อมูลเรียบร้อยแล้วค่ะ".to_string(),
        String::new(),
        format!("📦 สินค้า: {} - {}", product.code, product.name),
    ];

    match (&plan.payment_type, &plan.deposit) {
        (PaymentType::Deposit, Some(deposit)) => {
            lines.push(format!(
                "💰 ยอดมัดจำ: {} ({}%)",
                format_baht(deposit.amount),
                percent(deposit.percent)
            ));
            lines.push(format!("💰 ยอดคงเหลือ: {}", format_baht(deposit.remaining)));
            lines.push(format!("📅 เก็บสินค้าไว้ให้: {} วัน", deposit.hold_days));
        }
        (PaymentType::Installment, _) => {
            lines.push(format!("💰 ยอดรวม: {}", format_baht(plan.total_amount)));
            lines.push(format!(
                "📅 ผ่อน {} งวด (งวดแรก {})",
                plan.periods,
                format_baht(plan.first_period_amount)
            ));
        }
        _ => lines.push(format!("💰 ยอดรวม: {}", format_baht(plan.total_amount))),
    }

    if state.shipping_fee > Decimal::ZERO {
        lines.push(format!("🚚 ค่าจัดส่ง: {}", format_baht(state.shipping_fee)));
        lines.push(format!(
            "🧾 ยอดรวมทั้งสิ้น: {}",
            format_baht(plan.total_amount + state.shipping_fee)
        ));
    }

    let payment_label = state.payment_type.unwrap_or(plan.payment_type).label();
    lines.push(format!("💳 วิธีชำระ: {payment_label}"));
    if let Some(method) = state.delivery_method {
        lines.push(format!("🚚 รับสินค้า: {}", method.label()));
    }

    if let Some(address) = &state.shipping_address {
        let mut recipient = address.name.clone();
        if !address.phone.is_empty() {
            recipient.push_str(&format!(" ({})", address.phone));
        }
        lines.push(format!("📍 จัดส่งถึง: {}", recipient.trim()));
        let summary = address.summary_line();
        if !summary.is_empty() {
            lines.push(format!("   {summary}"));
        }
    }

    lines.push(String::new());
    lines.push(
        "🙏 รอเจ้าหน้าที่ติดต่อกลับเพื่อยืนยันออเดอร์และแจ้งรายละเอียดการชำระเงินนะคะ".to_string(),
    );
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use super::{ask_carrier, delivery_chosen, payment_options, payment_selected};
    use crate::config::CheckoutPolicy;
    use crate::domain::checkout::{DeliveryMethod, PaymentType};
    use crate::domain::product::ProductRef;
    use crate::pricing::compute_plan;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 1).expect("valid date")
    }

    #[test]
    fn options_show_previews_without_schedule_lines() {
        let product = ProductRef::new("p-1", "GLD-NCK-001", "สร้อยคอทองคำ", Decimal::new(9000, 0));
        let text = payment_options(&product, &CheckoutPolicy::default(), today());

        assert!(text.contains("฿9,000"));
        assert!(text.contains("งวดแรก ฿3,270"));
        assert!(text.contains("มัดจำ ฿900 (10%)"));
        assert!(!text.contains("งวดที่"));
    }

    #[test]
    fn installment_summary_lists_each_period_with_due_date() {
        let policy = CheckoutPolicy::default();
        let plan = compute_plan(Decimal::new(9000, 0), PaymentType::Installment, &policy, today());
        let text = payment_selected(&plan, &policy);

        assert_eq!(text.lines().filter(|line| line.starts_with("งวดที่")).count(), 3);
        assert!(text.contains("งวดที่ 1: ฿3,270 (กำหนด 01/03/2026)"));
        assert!(text.contains("งวดที่ 3: ฿3,000 (กำหนด 30/04/2026)"));
    }

    #[test]
    fn courier_reply_names_fee_and_asks_for_address() {
        assert_eq!(
            delivery_chosen(DeliveryMethod::Courier, Decimal::new(150, 0)),
            "✅ ส่ง EMS (+150 บาท)\n\nรบกวนแจ้ง ชื่อ-ที่อยู่-เบอร์โทร สำหรับจัดส่งค่ะ 📝"
        );
        assert!(delivery_chosen(DeliveryMethod::Rideshare, Decimal::ZERO).contains("ค่าส่งตามระยะทาง"));
    }

    #[test]
    fn carrier_question_offers_both_carriers() {
        let (text, replies) = ask_carrier(&CheckoutPolicy::default());
        assert!(text.contains("EMS (+150 บาท)"));
        assert_eq!(replies.len(), 3);
    }
}
