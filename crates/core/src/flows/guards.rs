//! Lexicon checks used by the checkout engine. All functions expect text that
//! already went through [`crate::text::normalize`].

use crate::domain::checkout::{DeliveryMethod, PaymentType};
use crate::lazy_regex;
use crate::text::char_len;

const POLITE_TAIL: &str = r"(?:\s*(?:ครับ|ค่ะ|คะ|นะ|จ้า))?";

pub fn is_cancel(text: &str) -> bool {
    if lazy_regex!(
        r"ยกเลิก|ไม่เอา|พอแล้ว|ไม่ซื้อ|เปลี่ยนใจ|ไม่ต้อง|เริ่มใหม่|รีเซ็ต|\bcancel\b|\breset\b|\bquit\b"
    )
    .is_match(text)
    {
        return true;
    }
    // Short verbs only count when they are the whole message.
    let whole = lazy_regex!(&format!(r"^(?:หยุด|ออก|กลับ|stop|exit){POLITE_TAIL}$"));
    whole.is_match(text)
}

/// A question about something else. Messages naming a payment method are
/// answers, not interruptions.
pub fn is_interruption_question(text: &str) -> bool {
    if lazy_regex!(r"จอง|มัดจำ|ผ่อน|ออม|โอนเต็ม|จ่ายเต็ม|deposit|install|\bfull\b|\bcash\b").is_match(text) {
        return false;
    }
    lazy_regex!(
        r"ได้ไหม|มีไหม|แบบไหน|อะไรบ้าง|ยังไง|หรือเปล่า|ไหม|หรือ$|ราคา|เท่าไหร่|กี่บาท|เงื่อนไข|นโยบาย|รายละเอียด|\?|\bhow\b|\bwhat\b|\bwhich\b|\bprice\b|\bpolicy\b"
    )
    .is_match(text)
}

pub fn detect_payment_method(text: &str) -> Option<PaymentType> {
    if lazy_regex!(r"ผ่อน|ออม|งวด|installment|แบ่งจ่าย").is_match(text) {
        return Some(PaymentType::Installment);
    }
    if lazy_regex!(r"มัดจำ|จอง|deposit").is_match(text) {
        return Some(PaymentType::Deposit);
    }
    if lazy_regex!(r"เต็ม|โอน|เงินสด|จ่ายสด|^สด|\bfull\b|\bcash\b|ยืนยัน.*ชำระ|ยืนยันเลย|ชำระเต็ม").is_match(text) {
        return Some(PaymentType::Full);
    }

    let text = text.trim();
    if lazy_regex!(r"^(?:1|หนึ่ง)\.?$").is_match(text) {
        return Some(PaymentType::Full);
    }
    if lazy_regex!(r"^(?:2|สอง)\.?$").is_match(text) {
        return Some(PaymentType::Installment);
    }
    if lazy_regex!(r"^(?:3|สาม)\.?$").is_match(text) {
        return Some(PaymentType::Deposit);
    }

    let acknowledgement =
        lazy_regex!(&format!(r"^(?:ยืนยัน|ตกลง|ok|okay|โอเค|เอา|รับ|ได้){POLITE_TAIL}$"));
    acknowledgement.is_match(text).then_some(PaymentType::Full)
}

/// Narrow variant of [`detect_payment_method`] for steps where a payment type
/// is already chosen, so only explicit change requests match.
pub fn detect_payment_change(text: &str) -> Option<PaymentType> {
    if lazy_regex!(r"(?:จอง|มัดจำ).{0,15}(?:ก่อน|ได้ไหม|ดีกว่า|แทน)").is_match(text) {
        return Some(PaymentType::Deposit);
    }
    if lazy_regex!(r"(?:ผ่อน|ออม).{0,15}(?:ก่อน|ได้ไหม|ดีกว่า|แทน)").is_match(text) {
        return Some(PaymentType::Installment);
    }
    if lazy_regex!(r"(?:โอนเต็ม|จ่ายเต็ม).{0,10}(?:ได้|ไหม|ดีกว่า|แทน)").is_match(text) {
        return Some(PaymentType::Full);
    }

    if lazy_regex!(r"เปลี่ยน.{0,5}(?:เป็น|ไป).{0,5}(?:จอง|มัดจำ)").is_match(text) {
        return Some(PaymentType::Deposit);
    }
    if lazy_regex!(r"เปลี่ยน.{0,5}(?:เป็น|ไป).{0,5}(?:ผ่อน|ออม)").is_match(text) {
        return Some(PaymentType::Installment);
    }
    if lazy_regex!(r"เปลี่ยน.{0,5}(?:เป็น|ไป).{0,5}(?:โอน|เต็ม|สด)").is_match(text) {
        return Some(PaymentType::Full);
    }

    if let Some(caps) = lazy_regex!(
        r"\b(?:switch|change)\s+(?:to\s+)?(deposit|installments?|full)\b|\b(deposit|installments?|full)\b.{0,20}\binstead\b"
    )
    .captures(text)
    {
        let word = caps.get(1).or_else(|| caps.get(2)).map(|found| found.as_str()).unwrap_or_default();
        return match word {
            "deposit" => Some(PaymentType::Deposit),
            "full" => Some(PaymentType::Full),
            _ => Some(PaymentType::Installment),
        };
    }

    let text = text.trim();
    if char_len(text) <= 20 {
        if lazy_regex!(r"^(?:ขอ)?(?:จอง|มัดจำ)(?:ก่อน|ได้|นะ|ค่ะ|ครับ)?$").is_match(text) {
            return Some(PaymentType::Deposit);
        }
        if lazy_regex!(r"^(?:ขอ)?(?:ผ่อน|ออม)(?:ก่อน|ได้|นะ|ค่ะ|ครับ)?$").is_match(text) {
            return Some(PaymentType::Installment);
        }
    }

    None
}

pub fn detect_delivery(text: &str) -> Option<DeliveryMethod> {
    let text = text.trim();
    if lazy_regex!(r"^1\.?$|^1\.\s*รับ|รับ.*ร้าน|รับเอง|pickup|pick up|หน้าร้าน").is_match(text) {
        return Some(DeliveryMethod::Pickup);
    }
    if lazy_regex!(r"^2\.?$|^2\.\s*ส่ง|(?:^|[^a-z])ems(?:$|[^a-z])|ไปรษณีย์|courier").is_match(text) {
        return Some(DeliveryMethod::Courier);
    }
    if lazy_regex!(r"^3\.?$|^3\.\s*ส่ง|grab|แกร็บ|แกรบ|lalamove|rideshare").is_match(text) {
        return Some(DeliveryMethod::Rideshare);
    }
    None
}

/// "Deliver" without a carrier.
pub fn is_generic_delivery(text: &str) -> bool {
    lazy_regex!(r"^(?:ส่ง|จัดส่ง|deliver|delivery|ship|shipping)$").is_match(text.trim())
}

pub fn is_payment_proof(text: &str) -> bool {
    lazy_regex!(r"ยืนยัน.*สลิป|ส่งสลิป|โอนแล้ว|จ่ายแล้ว|ชำระแล้ว|\bslip\b|\bpaid\b|transferred")
        .is_match(text)
}

#[cfg(test)]
mod tests {
    use super::{
        detect_delivery, detect_payment_change, detect_payment_method, is_cancel,
        is_generic_delivery, is_interruption_question, is_payment_proof,
    };
    use crate::domain::checkout::{DeliveryMethod, PaymentType};
    use crate::text::normalize;

    #[test]
    fn cancel_phrases_match_anywhere_but_short_verbs_only_alone() {
        assert!(is_cancel(&normalize("ขอยกเลิกค่ะ")));
        assert!(is_cancel(&normalize("ไม่เอาแล้วครับ")));
        assert!(is_cancel(&normalize("Cancel please")));
        assert!(is_cancel(&normalize("หยุด")));
        assert!(is_cancel(&normalize("stop ครับ")));
        assert!(!is_cancel(&normalize("ออกใบกำกับภาษีได้ไหม")));
        assert!(!is_cancel(&normalize("ส่งกลับบ้านที่ต่างจังหวัด")));
        assert!(!is_cancel(&normalize("bus stop near soi 5")));
    }

    #[test]
    fn questions_interrupt_unless_they_name_a_payment_method() {
        assert!(is_interruption_question(&normalize("มีสีอื่นไหม")));
        assert!(is_interruption_question(&normalize("ร้านอยู่ที่ไหนมั้ย")));
        assert!(is_interruption_question(&normalize("ค่าส่งเท่าไหร่")));
        assert!(is_interruption_question(&normalize("what is the return policy?")));
        assert!(!is_interruption_question(&normalize("มัดจำได้ไหม")));
        assert!(!is_interruption_question(&normalize("can I pay a deposit instead?")));
        assert!(!is_interruption_question(&normalize("รับที่ร้าน")));
    }

    #[test]
    fn payment_method_keywords_and_shortcuts() {
        assert_eq!(detect_payment_method("ผ่อนค่ะ"), Some(PaymentType::Installment));
        assert_eq!(detect_payment_method("2"), Some(PaymentType::Installment));
        assert_eq!(detect_payment_method("2.ผ่อน"), Some(PaymentType::Installment));
        assert_eq!(detect_payment_method("3"), Some(PaymentType::Deposit));
        assert_eq!(detect_payment_method("จองไว้ก่อน"), Some(PaymentType::Deposit));
        assert_eq!(detect_payment_method("1."), Some(PaymentType::Full));
        assert_eq!(detect_payment_method("โอนเต็ม"), Some(PaymentType::Full));
        assert_eq!(detect_payment_method("ok"), Some(PaymentType::Full));
        assert_eq!(detect_payment_method("ตกลงค่ะ"), Some(PaymentType::Full));
        assert_eq!(detect_payment_method("12"), None);
        assert_eq!(detect_payment_method("สวัสดี"), None);
    }

    #[test]
    fn payment_change_requires_explicit_request() {
        assert_eq!(detect_payment_change("มัดจำก่อนได้ไหม"), Some(PaymentType::Deposit));
        assert_eq!(detect_payment_change("เปลี่ยนเป็นผ่อน"), Some(PaymentType::Installment));
        assert_eq!(detect_payment_change("ขอผ่อนนะ"), Some(PaymentType::Installment));
        assert_eq!(detect_payment_change("จ่ายเต็มดีกว่า"), Some(PaymentType::Full));
        assert_eq!(
            detect_payment_change(&normalize("Can I pay a deposit instead?")),
            Some(PaymentType::Deposit)
        );
        assert_eq!(detect_payment_change("switch to installments"), Some(PaymentType::Installment));
        assert_eq!(detect_payment_change("ส่ง ems"), None);
        assert_eq!(detect_payment_change("ผ่อน"), Some(PaymentType::Installment));
    }

    #[test]
    fn delivery_shortcuts_and_carriers() {
        assert_eq!(detect_delivery("1"), Some(DeliveryMethod::Pickup));
        assert_eq!(detect_delivery("1.รับที่ร้าน"), Some(DeliveryMethod::Pickup));
        assert_eq!(detect_delivery("รับเองค่ะ"), Some(DeliveryMethod::Pickup));
        assert_eq!(detect_delivery("2"), Some(DeliveryMethod::Courier));
        assert_eq!(detect_delivery(&normalize("ส่ง EMS")), Some(DeliveryMethod::Courier));
        assert_eq!(detect_delivery("ส่งไปรษณีย์"), Some(DeliveryMethod::Courier));
        assert_eq!(detect_delivery("3.ส่ง grab"), Some(DeliveryMethod::Rideshare));
        assert_eq!(detect_delivery("แกร็บค่ะ"), Some(DeliveryMethod::Rideshare));
        assert_eq!(detect_delivery("items"), None);
        assert_eq!(detect_delivery("ส่ง"), None);
        assert!(is_generic_delivery("ส่ง"));
        assert!(is_generic_delivery("delivery"));
    }

    #[test]
    fn payment_proof_phrases() {
        assert!(is_payment_proof("โอนแล้วค่ะ"));
        assert!(is_payment_proof("ส่งสลิปให้แล้ว"));
        assert!(is_payment_proof(&normalize("Paid, sending slip")));
        assert!(!is_payment_proof("ขอบคุณค่ะ"));
    }
}
