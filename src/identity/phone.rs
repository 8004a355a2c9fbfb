use std::sync::OnceLock;

use regex::Regex;

fn e164() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\+[1-9]\d{7,14}$").ok()).as_ref()
}

/// Canonical E.164 form of `raw`, or `None` if it cannot be one.
///
/// Spaces, dashes and parentheses are dropped and a leading `00` becomes `+`.
pub fn canonical_phone(raw: &str) -> Option<String> {
    let mut s: String = raw.trim().chars().filter(|c| !matches!(c, ' ' | '-' | '(' | ')')).collect();
    if let Some(rest) = s.strip_prefix("00") {
        s = format!("+{rest}");
    }
    e164().map_or(false, |re| re.is_match(&s)).then_some(s)
}
