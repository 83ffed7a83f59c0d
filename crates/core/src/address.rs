//! Validation and parsing of free-text Thai shipping addresses.
//!
//! The validator only decides whether enough has been typed to ship; the
//! parser then splits the buffer into [`Address`] fields on a best-effort basis.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::address::{Address, AddressField};
use crate::lazy_regex;
use crate::text::{char_len, Regex};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressValidation {
    pub complete: bool,
    pub missing: Vec<AddressField>,
    pub has_name: bool,
    pub has_phone: bool,
    pub has_address: bool,
    pub indicator_score: usize,
}

fn phone_pattern() -> &'static Regex {
    lazy_regex!(r"0[689][0-9]{8}|0[1-5][0-9]{7}")
}

fn postal_code_pattern() -> &'static Regex {
    lazy_regex!(r"(?:^|[^0-9A-Za-z_])([0-9]{5})(?:$|[^0-9A-Za-z_])")
}

fn has_name_signal(text: &str) -> bool {
    lazy_regex!(r"[ก-๙]{2,}\s+[ก-๙]{2,}").is_match(text)
        || lazy_regex!(r"[a-zA-Z]{2,}\s+[a-zA-Z]{2,}").is_match(text)
        || lazy_regex!(r"คุณ\s*[ก-๙a-zA-Z]+").is_match(text)
}

fn address_indicator_score(text: &str) -> usize {
    let indicators = [
        lazy_regex!(r"[0-9]+/[0-9]+"),
        lazy_regex!(r"(?i)ถ\.?|ถนน|road|rd"),
        lazy_regex!(r"(?i)ซ\.?|ซอย|soi"),
        lazy_regex!(r"(?i)ม\.?|หมู่"),
        lazy_regex!(r"(?i)ต\.?|ตำบล|แขวง"),
        lazy_regex!(r"(?i)อ\.?|อำเภอ|เขต|เมือง"),
        lazy_regex!(r"(?i)จ\.?|จังหวัด|กรุงเทพ|กทม"),
        postal_code_pattern(),
    ];
    indicators.iter().filter(|pattern| pattern.is_match(text)).count()
}

/// Decides whether the buffered text carries a name, a phone number and an
/// address. `missing` is always ordered name, phone, address.
pub fn validate(buffer: &str) -> AddressValidation {
    let text = buffer.trim();
    let length = char_len(text);

    let has_phone = phone_pattern().is_match(text);
    let has_name = has_name_signal(text);
    let indicator_score = address_indicator_score(text);
    let has_digit = text.chars().any(|ch| ch.is_ascii_digit());
    let has_address = indicator_score >= 2 || (length > 40 && has_digit);

    let mut missing = Vec::new();
    if !has_name {
        missing.push(AddressField::Name);
    }
    if !has_phone {
        missing.push(AddressField::Phone);
    }
    if !has_address {
        missing.push(AddressField::Address);
    }

    // Long buffers with a phone number are accepted even if one pattern misfired.
    let signals = [has_name, has_phone, has_address].into_iter().filter(|signal| *signal).count();
    if !missing.is_empty() && length >= 50 && has_phone && (signals >= 2 || length >= 80) {
        debug!(length, signals, "address validation accepted by length fallback");
        missing.clear();
    }

    AddressValidation {
        complete: missing.is_empty(),
        missing,
        has_name,
        has_phone,
        has_address,
        indicator_score,
    }
}

/// Cheap pre-check used before a delivery method is chosen, to avoid throwing
/// away an address the customer typed early.
pub fn looks_like_address(text: &str) -> bool {
    let text = text.trim();
    let length = char_len(text);
    if length < 15 {
        return false;
    }

    let mut score = 0;
    if phone_pattern().is_match(text) {
        score += 3;
    }
    if lazy_regex!(r"[0-9]{5}").is_match(text) {
        score += 2;
    }
    if lazy_regex!(r"(?i)กรุงเทพ|กทม|นนทบุรี|ปทุมธานี|สมุทรปราการ|ชลบุรี|bangkok").is_match(text) {
        score += 2;
    }
    if lazy_regex!(r"(?i)อำเภอ|เขต|ตำบล|แขวง|ซอย|ถนน|หมู่|บ้าน|\bsoi\b|\broad\b|\bmoo\b|district")
        .is_match(text)
    {
        score += 2;
    }

    score >= 2 || length >= 30
}

const KNOWN_PROVINCES: [&str; 22] = [
    "นนทบุรี",
    "ปทุมธานี",
    "สมุทรปราการ",
    "ชลบุรี",
    "เชียงใหม่",
    "ขอนแก่น",
    "นครราชสีมา",
    "สงขลา",
    "ภูเก็ต",
    "ระยอง",
    "นครปฐม",
    "สมุทรสาคร",
    "พระนครศรีอยุธยา",
    "ลพบุรี",
    "สระบุรี",
    "เชียงราย",
    "พิษณุโลก",
    "อุดรธานี",
    "นครสวรรค์",
    "สุราษฎร์ธานี",
    "หาดใหญ่",
    "ฉะเชิงเทรา",
];

/// Splits a validated buffer into address fields.
pub fn parse(buffer: &str) -> Address {
    let mut address = Address::default();
    let mut rest = collapse_whitespace(buffer);

    let phone = phone_pattern().find(&rest).map(|found| (found.as_str().to_string(), found.range()));
    if let Some((phone, range)) = phone {
        address.phone = phone;
        rest.replace_range(range, " ");
    }

    // Postal codes close the address, so the last standalone five-digit group wins.
    let postal = postal_code_pattern()
        .captures_iter(&rest)
        .filter_map(|caps| caps.get(1))
        .last()
        .map(|code| (code.as_str().to_string(), code.range()));
    if let Some((code, range)) = postal {
        address.postal_code = code;
        rest.replace_range(range, " ");
    }

    if let Some((province, matched)) = extract_province(&rest) {
        address.province = province;
        rest = rest.replacen(&matched, " ", 1);
    }

    if let Some((district, matched)) =
        capture_after_marker(lazy_regex!(r"(?:อำเภอ|เขต|อ\.)\s*([ก-๙]+)"), &rest)
    {
        address.district = district;
        rest = rest.replacen(&matched, " ", 1);
    }

    if let Some((subdistrict, matched)) =
        capture_after_marker(lazy_regex!(r"(?:ตำบล|แขวง|ต\.)\s*([ก-๙]+)"), &rest)
    {
        address.subdistrict = subdistrict;
        rest = rest.replacen(&matched, " ", 1);
    }

    rest = collapse_whitespace(&rest);
    if let Some(name) = leading_name(&rest) {
        rest = rest.replacen(&name, "", 1);
        address.name = name;
    } else if let Some(name) = name_line(buffer) {
        rest = rest.replacen(&name, "", 1);
        address.name = name;
    }

    address.line1 = collapse_whitespace(&rest).trim_matches(|ch: char| ch == ',' || ch.is_whitespace()).to_string();
    address
}

fn collapse_whitespace(text: &str) -> String {
    lazy_regex!(r"\s+").replace_all(text.trim(), " ").into_owned()
}

fn capture_after_marker(pattern: &Regex, text: &str) -> Option<(String, String)> {
    let caps = pattern.captures(text)?;
    let whole = caps.get(0)?.as_str().to_string();
    let value = caps.get(1)?.as_str().to_string();
    Some((value, whole))
}

fn extract_province(text: &str) -> Option<(String, String)> {
    if let Some(found) = capture_after_marker(lazy_regex!(r"(?:จังหวัด|จ\.)\s*([ก-๙]+)"), text) {
        return Some(found);
    }
    if let Some(found) = lazy_regex!(r"กรุงเทพมหานคร|กรุงเทพฯ|กรุงเทพ|กทม\.?").find(text) {
        return Some(("กรุงเทพฯ".to_string(), found.as_str().to_string()));
    }
    if let Some(found) = lazy_regex!(r"(?i)\bbangkok\b").find(text) {
        return Some(("Bangkok".to_string(), found.as_str().to_string()));
    }
    KNOWN_PROVINCES
        .iter()
        .find(|province| text.contains(*province))
        .map(|province| (province.to_string(), province.to_string()))
}

fn leading_name(text: &str) -> Option<String> {
    let caps = lazy_regex!(
        r"^((?:คุณ|นางสาว|นาย|นาง|น\.ส\.|ดร\.|พ\.ญ\.|พ\.ท\.)?\s*[ก-๙a-zA-Z]+(?:\s+[ก-๙a-zA-Z]+)?)"
    )
    .captures(text)?;
    let candidate = caps.get(1)?.as_str().trim().to_string();
    let looks_like_place = lazy_regex!(r"(?i)หมู่|ถนน|ซอย|บ้าน|เลขที่|\bsoi\b|\broad\b|\bmoo\b")
        .is_match(&candidate);
    (char_len(&candidate) >= 2 && !looks_like_place).then_some(candidate)
}

fn name_line(buffer: &str) -> Option<String> {
    buffer.lines().map(str::trim).find_map(|line| {
        let letters_only = lazy_regex!(r"^[ก-๙a-zA-Z\s\.]+$").is_match(line);
        let has_place_word = lazy_regex!(r"หมู่|ถนน|ซอย|บ้าน|อำเภอ|เขต|ตำบล|แขวง|จังหวัด").is_match(line);
        (letters_only && char_len(line) >= 4 && !has_place_word).then(|| line.to_string())
    })
}

/// Prompt listing only the fields still missing.
pub fn missing_fields_prompt(missing: &[AddressField]) -> String {
    let mut reply = String::from("รบกวนแจ้งข้อมูลเพิ่มเติมค่ะ:\n");
    let display_order = [AddressField::Name, AddressField::Address, AddressField::Phone];
    for field in display_order.iter().filter(|field| missing.contains(field)) {
        let line = match field {
            AddressField::Name => "👤 ชื่อ-นามสกุลผู้รับ",
            AddressField::Address => "📍 ที่อยู่สำหรับจัดส่ง",
            AddressField::Phone => "📱 เบอร์โทรศัพท์",
        };
        reply.push('\n');
        reply.push_str(line);
    }
    reply.push_str("\n\n📝 พิมพ์ต่อได้เลยนะคะ");
    reply
}
