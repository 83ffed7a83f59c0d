//! Ordered pattern rules for the deterministic classifier tier.
//!
//! Each table is evaluated top to bottom and the first rule whose predicate
//! holds produces the result. Order is part of the behaviour: never sort.

use shopchat_core::domain::intent::{DetectionMethod, Intent, IntentResult, SlotKey, SlotValue};
use shopchat_core::flows::guards::detect_payment_change;
use shopchat_core::lazy_regex;
use shopchat_core::text::{char_len, find_product_code};

use crate::context::LastSlots;
use shopchat_core::domain::checkout::{CheckoutStep, PaymentType};

pub struct RuleInput<'a> {
    /// Normalized text.
    pub text: &'a str,
    /// Trimmed text as the customer typed it.
    pub raw: &'a str,
    pub last_slots: &'a LastSlots,
}

pub struct Rule {
    pub name: &'static str,
    pub predicate: fn(&RuleInput<'_>) -> bool,
    pub build: fn(&RuleInput<'_>) -> IntentResult,
}

/// First matching rule's name and result.
pub fn first_match(rules: &[Rule], input: &RuleInput<'_>) -> Option<(&'static str, IntentResult)> {
    rules.iter().find(|rule| (rule.predicate)(input)).map(|rule| (rule.name, (rule.build)(input)))
}

fn pattern(intent: Intent, confidence: f32) -> IntentResult {
    IntentResult::new(intent, confidence, DetectionMethod::Pattern)
}

fn in_context(intent: Intent, confidence: f32) -> IntentResult {
    IntentResult::new(intent, confidence, DetectionMethod::Context)
}

fn action(result: IntentResult, action_type: &str) -> IntentResult {
    result.with_slot(SlotKey::ActionType, SlotValue::text(action_type))
}

/// Rules that only apply while a checkout waits for the customer.
pub const CONTEXT_RULES: &[Rule] = &[
    Rule { name: "checkout_confirm", predicate: is_checkout_confirm, build: build_checkout_confirm },
    Rule { name: "checkout_cancel", predicate: is_checkout_cancel, build: build_checkout_cancel },
    Rule { name: "payment_options_question", predicate: is_payment_question, build: build_payment_question },
    Rule { name: "shipping_address", predicate: is_shipping_address, build: build_shipping_address },
];

fn is_checkout_confirm(input: &RuleInput<'_>) -> bool {
    lazy_regex!(r"^(?:ยืนยัน|ตกลง|ok|yes|ใช่|เอา(?:เลย|ครับ|ค่ะ)?|สั่ง(?:ซื้อ)?|confirm|โอน(?:เลย|เงิน)?|จ่าย(?:เงิน|เลย)?)")
        .is_match(input.text)
}

fn build_checkout_confirm(_: &RuleInput<'_>) -> IntentResult {
    in_context(Intent::CheckoutConfirm, 1.0)
}

fn is_checkout_cancel(input: &RuleInput<'_>) -> bool {
    lazy_regex!(r"^(?:ยกเลิก|ไม่(?:เอา|ซื้อ)|no\b|cancel|เปลี่ยนใจ|พอแค่นี้)").is_match(input.text)
}

fn build_checkout_cancel(_: &RuleInput<'_>) -> IntentResult {
    in_context(Intent::CheckoutCancel, 1.0)
}

fn is_payment_question(input: &RuleInput<'_>) -> bool {
    lazy_regex!(r"(?:ผ่อน|บัตร|โอน|มัดจำ|แบบไหน|ทางไหน).*(?:ได้|ไหม|บ้าง|หรือ)").is_match(input.text)
}

fn build_payment_question(_: &RuleInput<'_>) -> IntentResult {
    in_context(Intent::PaymentOptions, 0.95)
}

fn is_shipping_address(input: &RuleInput<'_>) -> bool {
    input.last_slots.checkout_step == Some(CheckoutStep::CollectingAddress)
        && char_len(input.text) > 20
        && lazy_regex!(r"[0-9]+.*(?:เขต|อำเภอ|แขวง|ตำบล|จ\.|จังหวัด|กทม|road|ถนน|ซอย)")
            .is_match(input.text)
}

fn build_shipping_address(input: &RuleInput<'_>) -> IntentResult {
    in_context(Intent::ShippingAddress, 0.95)
        .with_slot(SlotKey::AddressText, SlotValue::text(input.raw))
}

/// Fixed-lexicon families, most specific first.
pub const DOMAIN_RULES: &[Rule] = &[
    Rule { name: "change_payment_method", predicate: is_payment_change, build: build_payment_change },
    Rule { name: "installment_check", predicate: is_installment_check, build: build_installment_check },
    Rule { name: "installment_info", predicate: mentions_installment, build: build_installment_info },
    Rule { name: "deposit", predicate: mentions_deposit, build: build_deposit },
    Rule { name: "pawn_inquiry", predicate: is_pawn, build: build_pawn },
    Rule { name: "admin_handoff", predicate: wants_admin, build: build_admin },
    Rule { name: "request_video_call", predicate: wants_video_call, build: build_video_call },
    Rule { name: "price_negotiation", predicate: is_negotiation, build: build_negotiation },
    Rule { name: "trade_in_calculate", predicate: is_trade_in_calculation, build: build_trade_in_calculation },
    Rule { name: "trade_in_inquiry", predicate: is_trade_in, build: build_trade_in },
    Rule { name: "return_policy", predicate: is_return_policy, build: build_return_policy },
    Rule { name: "payment_slip_verify", predicate: is_payment_slip, build: build_payment_slip },
    Rule { name: "repair_inquiry", predicate: is_repair, build: build_repair },
    Rule { name: "order_status", predicate: is_order_status, build: build_order_status },
    Rule { name: "product_code", predicate: has_product_code, build: build_product_code },
    Rule { name: "purchase_interest", predicate: is_purchase_interest, build: build_purchase_interest },
    Rule { name: "purchase_by_index", predicate: is_purchase_by_index, build: build_purchase_by_index },
    Rule { name: "purchase_by_name", predicate: is_purchase_by_name, build: build_purchase_by_name },
    Rule { name: "price_inquiry", predicate: is_price_inquiry, build: build_price_inquiry },
    Rule { name: "browse_products", predicate: is_browse, build: build_browse },
    Rule { name: "product_availability", predicate: is_availability, build: build_availability },
    Rule { name: "product_search", predicate: is_category_mention, build: build_product_search },
    Rule { name: "browse_catalog", predicate: is_catalog_request, build: build_catalog_request },
    Rule { name: "greeting", predicate: is_greeting, build: build_greeting },
    Rule { name: "thanks", predicate: is_thanks, build: build_thanks },
];

fn is_payment_change(input: &RuleInput<'_>) -> bool {
    lazy_regex!(
        r"เปลี่ยน.*(?:โอน|ผ่อน|มัดจำ|ออม|จ่าย|ชำระ|วิธี)|โอนดีกว่า|ผ่อนดีกว่า|ขอเปลี่ยน.*(?:วิธี|ชำระ)|จ่ายเต็ม.*แทน|เปลี่ยนใจ.*(?:โอน|ผ่อน)"
    )
    .is_match(input.text)
}

fn build_payment_change(input: &RuleInput<'_>) -> IntentResult {
    let result = pattern(Intent::ChangePaymentMethod, 0.95);
    match detect_payment_change(input.text) {
        Some(payment_type) => {
            result.with_slot(SlotKey::NewPaymentMethod, SlotValue::text(payment_type.as_str()))
        }
        None => result,
    }
}

fn mentions_installment(input: &RuleInput<'_>) -> bool {
    lazy_regex!(r"ผ่อน|ออม|installment|งวด").is_match(input.text)
}

fn is_installment_check(input: &RuleInput<'_>) -> bool {
    mentions_installment(input)
        && lazy_regex!(
            r"ยอด(?:ผ่อน|ค้าง)|ผ่อน.*(?:เหลือ|ค้าง|อยู่)|เช็ค(?:ผ่อน|ยอด|งวด)|ปิดยอด|งวด.*(?:เหลือ|ถัด|หน้า)|ค้าง.*งวด|สัญญาผ่อน"
        )
        .is_match(input.text)
}

fn build_installment_check(_: &RuleInput<'_>) -> IntentResult {
    action(pattern(Intent::InstallmentCheck, 0.95), "check_balance")
}

fn build_installment_info(input: &RuleInput<'_>) -> IntentResult {
    if input.last_slots.has_product_context() {
        action(pattern(Intent::PaymentOptions, 0.95), "installment_info")
    } else {
        action(pattern(Intent::PaymentOptions, 0.90), "general_info")
    }
}

fn mentions_deposit(input: &RuleInput<'_>) -> bool {
    lazy_regex!(r"จอง|มัดจำ|วางเงิน").is_match(input.text)
}

/// Inside an open checkout a deposit mention is a payment change.
fn build_deposit(input: &RuleInput<'_>) -> IntentResult {
    let slots = input.last_slots;
    if slots.open_checkout_step().is_some() && slots.has_product_context() {
        return in_context(Intent::ChangePaymentMethod, 0.95).with_slot(
            SlotKey::NewPaymentMethod,
            SlotValue::text(PaymentType::Deposit.as_str()),
        );
    }
    if slots.has_product_context() {
        action(pattern(Intent::DepositNew, 0.95), "proceed")
    } else {
        action(pattern(Intent::DepositFlow, 0.90), "ask_product")
    }
}

fn is_pawn(input: &RuleInput<'_>) -> bool {
    lazy_regex!(r"จำนำ|รับฝาก|ฝากขาย|ขายฝาก|ฝาก.*ช่วยขาย|เอามาฝาก|ไถ่ถอน|ไถ่คืน|consign")
        .is_match(input.text)
}

fn build_pawn(input: &RuleInput<'_>) -> IntentResult {
    let action_type =
        if lazy_regex!(r"ต่อดอก|ดอกเบี้ย").is_match(input.text) { "pay_interest" } else { "inquiry" };
    action(pattern(Intent::PawnInquiry, 0.95), action_type)
}

fn wants_admin(input: &RuleInput<'_>) -> bool {
    // `ยาก` counts on its own, not inside `อยาก`.
    lazy_regex!(
        r"(?:ติดต่อ|คุย|ขอ).*(?:แอดมิน|เจ้าหน้าที่|คน|staff|admin)|งง|ไม่เข้าใจ|(?:^|[^อ])ยาก|ช่วยด้วย|@admin"
    )
    .is_match(input.text)
}

fn build_admin(_: &RuleInput<'_>) -> IntentResult {
    pattern(Intent::AdminHandoff, 1.0)
}

fn wants_video_call(input: &RuleInput<'_>) -> bool {
    lazy_regex!(
        r"(?:video|วิดีโอ|วีดีโอ).*(?:call|คอล|ดู|หน่อย)|(?:โทร|call).*(?:ดู|หน่อย|ของ|สินค้า)|ขอดู.*(?:live|สด|จริง)|face\s*time"
    )
    .is_match(input.text)
}

fn build_video_call(_: &RuleInput<'_>) -> IntentResult {
    pattern(Intent::RequestVideoCall, 1.0)
}

fn is_negotiation(input: &RuleInput<'_>) -> bool {
    lazy_regex!(
        r"(?:ลด|ส่วนลด|discount|ต่อ|หั่น).*(?:ได้|หน่อย|ไหม|นิด|ราคา|price)|ราคา.*(?:ต่อ|ลด|เยอะ|ถูก).*ได้|(?:ขอ|ช่วย).*(?:ลด|ต่อ|ส่วนลด)|แพง.*(?:ไป|จัง|มาก)"
    )
    .is_match(input.text)
}

fn build_negotiation(_: &RuleInput<'_>) -> IntentResult {
    pattern(Intent::PriceNegotiation, 0.95)
}

fn trade_in_amount(text: &str) -> Option<i64> {
    let caps = lazy_regex!(r"(?:คำนวณ|คิด).*(?:เทิร์น|เปลี่ยน|คืน).*?([0-9][0-9,]*)").captures(text)?;
    caps.get(1)?.as_str().replace(',', "").parse().ok()
}

fn is_trade_in_calculation(input: &RuleInput<'_>) -> bool {
    trade_in_amount(input.text).is_some()
}

fn build_trade_in_calculation(input: &RuleInput<'_>) -> IntentResult {
    let result = action(pattern(Intent::TradeIn, 0.95), "calculate");
    match trade_in_amount(input.text) {
        Some(amount) => result.with_slot(SlotKey::TradeInAmount, SlotValue::Integer(amount)),
        None => result,
    }
}

fn is_trade_in(input: &RuleInput<'_>) -> bool {
    lazy_regex!(
        r"เทิร์น|\bturn\b|\btrade|(?:เปลี่ยน|แลก).*(?:ของเก่า|สินค้าเก่า|เรือนเก่า)|(?:ขาย|คืน).*(?:ให้ร้าน|กลับ|ของเก่า)|นำของเก่ามา.*(?:แลก|เปลี่ยน)"
    )
    .is_match(input.text)
}

fn build_trade_in(_: &RuleInput<'_>) -> IntentResult {
    action(pattern(Intent::TradeIn, 0.95), "inquiry")
}

fn is_return_policy(input: &RuleInput<'_>) -> bool {
    lazy_regex!(r"(?:คืน|เปลี่ยน).*(?:ได้|ไหม|ยังไง|อย่างไร)|นโยบาย.*(?:คืน|เปลี่ยน)|return.*policy")
        .is_match(input.text)
}

fn build_return_policy(_: &RuleInput<'_>) -> IntentResult {
    action(pattern(Intent::TradeIn, 0.9), "return_policy")
}

fn is_payment_slip(input: &RuleInput<'_>) -> bool {
    lazy_regex!(r"(?:โอน|ชำระ|จ่าย).*(?:แล้ว|เรียบร้อย)|สลิป|หลักฐาน").is_match(input.text)
}

fn build_payment_slip(_: &RuleInput<'_>) -> IntentResult {
    pattern(Intent::PaymentSlipVerify, 0.95)
}

fn is_repair(input: &RuleInput<'_>) -> bool {
    lazy_regex!(r"ซ่อม|ชุบ|ล้าง|repair").is_match(input.text)
}

fn build_repair(input: &RuleInput<'_>) -> IntentResult {
    let action_type =
        if lazy_regex!(r"สถานะ|เสร็จ|ยัง").is_match(input.text) { "check_status" } else { "new" };
    action(pattern(Intent::RepairInquiry, 0.95), action_type)
}

fn is_order_status(input: &RuleInput<'_>) -> bool {
    lazy_regex!(r"(?:สถานะ|เช็ค|ดู).*(?:ออเดอร์|order|คำสั่งซื้อ|ของ|พัสดุ)").is_match(input.text)
}

fn build_order_status(_: &RuleInput<'_>) -> IntentResult {
    pattern(Intent::OrderStatus, 0.95)
}

fn has_product_code(input: &RuleInput<'_>) -> bool {
    find_product_code(input.text).is_some()
}

fn build_product_code(input: &RuleInput<'_>) -> IntentResult {
    let code = find_product_code(input.text).unwrap_or_default();
    let wants_to_buy = lazy_regex!(r"สนใจ|เอา|ซื้อ|รับ|จอง|\bcf\b|\bf\b").is_match(input.text);
    let result = if wants_to_buy {
        pattern(Intent::PurchaseIntent, 1.0)
    } else {
        pattern(Intent::ProductLookupByCode, 0.95)
    };
    result.with_slot(SlotKey::ProductCode, SlotValue::text(code))
}

fn is_purchase_interest(input: &RuleInput<'_>) -> bool {
    lazy_regex!(r"^(?:สนใจ|รับ|เอา|จอง|cf|f)\s*(?:ครับ|ค่ะ|จ้า|นะ|เลย)?$").is_match(input.text)
        || lazy_regex!(r"^(?:สนใจ|รับ|เอา|จอง).*(?:ชิ้นนี้|เรือนนี้|ตัวนี้|อันนี้)").is_match(input.text)
}

fn build_purchase_interest(_: &RuleInput<'_>) -> IntentResult {
    pattern(Intent::PurchaseIntent, 0.95)
}

/// Position in the list the customer was last shown. `-1` means the last one.
fn product_index(text: &str) -> Option<i64> {
    let caps = lazy_regex!(
        r"(?:เอา|สนใจ|รับ|จอง|ซื้อ).*(?:ตัว|รายการ|อัน|ชิ้น).*?(?:ที่\s*)?([0-9]+|แรก|หนึ่ง|สอง|สาม|สี่|ห้า|ล่าสุด)"
    )
    .captures(text)?;
    let token = caps.get(1)?.as_str();
    let index = match token {
        "แรก" | "หนึ่ง" => 1,
        "สอง" => 2,
        "สาม" => 3,
        "สี่" => 4,
        "ห้า" => 5,
        "ล่าสุด" => -1,
        digits => digits.parse().unwrap_or(1),
    };
    Some(index)
}

fn is_purchase_by_index(input: &RuleInput<'_>) -> bool {
    product_index(input.text).is_some()
}

fn build_purchase_by_index(input: &RuleInput<'_>) -> IntentResult {
    let index = product_index(input.text).unwrap_or(1);
    pattern(Intent::PurchaseIntent, 0.95).with_slot(SlotKey::ProductIndex, SlotValue::Integer(index))
}

fn product_name_query(text: &str) -> Option<String> {
    let caps = lazy_regex!(r"^(?:เอา|สนใจ|รับ|จอง|ซื้อ)\s*(.{2,30})$").captures(text)?;
    let name = caps.get(1)?.as_str().trim();
    let name = lazy_regex!(r"(?:ครับ|ค่ะ|จ้า|นะ|เลย|ด้วย)$").replace(name, "");
    let name = name.trim();
    (char_len(name) >= 2).then(|| name.to_string())
}

fn is_purchase_by_name(input: &RuleInput<'_>) -> bool {
    product_name_query(input.text).is_some()
}

fn build_purchase_by_name(input: &RuleInput<'_>) -> IntentResult {
    let name = product_name_query(input.text).unwrap_or_default();
    pattern(Intent::PurchaseIntent, 0.9).with_slot(SlotKey::ProductNameQuery, SlotValue::text(name))
}

fn is_price_inquiry(input: &RuleInput<'_>) -> bool {
    lazy_regex!(r"ราคา|เท่าไหร่|กี่บาท|price").is_match(input.text)
}

fn build_price_inquiry(_: &RuleInput<'_>) -> IntentResult {
    pattern(Intent::PriceInquiry, 0.9)
}

fn is_browse(input: &RuleInput<'_>) -> bool {
    let text = input.text;
    lazy_regex!(r"^มี.*(?:สินค้า|ของ).*(?:อะไร|บ้าง|ไหม)").is_match(text)
        || lazy_regex!(r"^(?:สนใจ|อยากดู|อยากได้)\s*สินค้า\s*(?:ครับ|ค่ะ|คะ|จ้า|นะ)?$").is_match(text)
        || lazy_regex!(r"(?:มี|มีอะไร|แนะนำ|อยากดู).*(?:อะไร|อะไรบ้าง|บ้าง|แนะนำ)\s*(?:ไหม|คะ|ครับ)?$")
            .is_match(text)
        || lazy_regex!(r"(?:สินค้า|ของ).*(?:แนะนำ|ยอดนิยม|ขายดี|ใหม่)").is_match(text)
        || lazy_regex!(r"^สินค้า\s*(?:ครับ|ค่ะ|คะ)?$").is_match(text)
}

fn build_browse(_: &RuleInput<'_>) -> IntentResult {
    pattern(Intent::BrowseProducts, 0.9)
}

fn is_availability(input: &RuleInput<'_>) -> bool {
    lazy_regex!(
        r"(?:มี|หา|ดู|อยากได้|อยากเอา|เอา|ต้องการ|สนใจ).*(?:สินค้า|นาฬิกา|แหวน|สร้อย|กำไล|จี้|ต่างหู|เพชร|ทอง|กระเป๋า|พระ|เลี่ยม|ตลับ|ไหม|บ้าง)"
    )
    .is_match(input.text)
}

fn build_availability(input: &RuleInput<'_>) -> IntentResult {
    pattern(Intent::ProductAvailability, 0.9)
        .with_slot(SlotKey::ProductNameQuery, SlotValue::text(input.raw))
}

fn is_category_mention(input: &RuleInput<'_>) -> bool {
    // `กำไร` is a common misspelling of `กำไล`.
    lazy_regex!(r"^(?:นาฬิกา|แหวน|สร้อย|กำไล|กำไร|จี้|ต่างหู|กระเป๋า|พระ|เลี่ยม)").is_match(input.text)
}

fn build_product_search(input: &RuleInput<'_>) -> IntentResult {
    pattern(Intent::ProductSearch, 0.85)
        .with_slot(SlotKey::ProductNameQuery, SlotValue::text(input.raw))
}

fn is_catalog_request(input: &RuleInput<'_>) -> bool {
    lazy_regex!(r"(?:สอบถาม|ดู|อยากดู|ขอดู).*(?:สินค้า|ของ|รายการ|catalog)|^สอบถามสินค้า$")
        .is_match(input.text)
}

fn build_catalog_request(_: &RuleInput<'_>) -> IntentResult {
    pattern(Intent::BrowseProducts, 0.85)
}

fn is_greeting(input: &RuleInput<'_>) -> bool {
    lazy_regex!(r"^(?:สวัสดี|ดีครับ|ดีค่ะ|hello|hi\b)").is_match(input.text)
}

fn build_greeting(_: &RuleInput<'_>) -> IntentResult {
    pattern(Intent::Greeting, 0.9)
}

fn is_thanks(input: &RuleInput<'_>) -> bool {
    lazy_regex!(r"^(?:ขอบคุณ|ขอบใจ|thanks|thx)").is_match(input.text)
}

fn build_thanks(_: &RuleInput<'_>) -> IntentResult {
    pattern(Intent::Thanks, 0.9)
}
