//! Text canonicalization shared by the classifier and the checkout guards.

pub use regex::Regex;

/// Compiles a literal pattern once and hands back a `&'static Regex`.
///
/// Only use with compile-time constant patterns; every such pattern is
/// exercised by the unit tests of the module that declares it.
#[macro_export]
macro_rules! lazy_regex {
    ($pattern:expr) => {{
        static PATTERN: ::std::sync::OnceLock<$crate::text::Regex> = ::std::sync::OnceLock::new();
        PATTERN.get_or_init(|| {
            $crate::text::Regex::new($pattern).expect("built-in pattern must compile")
        })
    }};
}

/// Lowercases, folds particle spellings and collapses whitespace.
pub fn normalize(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    let folded = lazy_regex!(r"คับ|คัฟ").replace_all(&lowered, "ครับ");
    let folded = lazy_regex!(r"\b(?:krub|krup)\b").replace_all(&folded, "ครับ");
    let folded = lazy_regex!(r"\bka\b").replace_all(&folded, "ค่ะ");
    let folded = lazy_regex!(r"มั้ย|มั๊ย").replace_all(&folded, "ไหม");
    let folded = lazy_regex!(r"เหรอ|หรอ").replace_all(&folded, "หรือ");
    lazy_regex!(r"\s+").replace_all(folded.trim(), " ").into_owned()
}

/// Character count, not byte count. Thai text is three bytes per character.
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// True when the whole message is a catalog product code such as `RLX-SUB-001`,
/// `GLD-NCK` or `ABC1234`.
pub fn is_structured_product_code(text: &str) -> bool {
    lazy_regex!(r"(?i)^(?:[a-z]{2,5}-[a-z0-9]{2,5}(?:-[a-z0-9]{2,5})?|[a-z]{2,5}[0-9]{3,5})$")
        .is_match(text.trim())
}

/// Finds the first product code embedded in a message, upper-cased.
/// Three-group codes are preferred over two-group codes, which are preferred
/// over compact codes.
pub fn find_product_code(text: &str) -> Option<String> {
    let patterns = [
        lazy_regex!(r"(?i)[a-z]{2,5}-[a-z0-9]{2,5}-[a-z0-9]{2,5}"),
        lazy_regex!(r"(?i)[a-z]{2,5}-[a-z0-9]{2,5}"),
        lazy_regex!(r"(?i)[a-z]{2,5}[0-9]{3,5}"),
    ];
    patterns
        .iter()
        .find_map(|pattern| pattern.find(text))
        .map(|found| found.as_str().to_ascii_uppercase())
        .filter(|code| code.len() >= 5)
}
