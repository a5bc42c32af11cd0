//! Korean phone number normalization
//!
//! Accepts the landline/mobile conventions the source site exposes
//! (02-XXX(X)-XXXX Seoul, 0XX area codes, 01X mobiles, 15XX/16XX/18XX
//! service numbers). Anything else is dropped, never treated as fatal.

/// Area codes outside Seoul (three digits), plus internet phone 070
const AREA_CODES_3: &[&str] = &[
    "031", "032", "033", "041", "042", "043", "044", "051", "052", "053", "054", "055", "061",
    "062", "063", "064", "070",
];

const MOBILE_PREFIXES: &[&str] = &["010", "011", "016", "017", "018", "019"];

/// Normalize a scraped phone string to canonical hyphenated form
///
/// Returns None when the digits do not form a recognizable Korean number.
/// A missing leading zero (a common scrape defect) is repaired before
/// validation.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() < 8 || digits.len() > 11 {
        return None;
    }

    // Service numbers: 1544-1234 style, no leading zero by design
    if digits.len() == 8
        && (digits.starts_with("15") || digits.starts_with("16") || digits.starts_with("18"))
    {
        return Some(format!("{}-{}", &digits[..4], &digits[4..]));
    }

    // Repair a dropped leading zero ("2-123-4567" scraped as "21234567")
    let digits = if !digits.starts_with('0') && (digits.starts_with('2') || digits.starts_with('1'))
    {
        format!("0{}", digits)
    } else {
        digits
    };

    if !digits.starts_with('0') {
        return None;
    }

    // Seoul: 02 + 7 or 8 subscriber digits
    if let Some(rest) = digits.strip_prefix("02") {
        return format_subscriber("02", rest);
    }

    // Mobiles and three-digit area codes
    if digits.len() >= 10 {
        let prefix = &digits[..3];
        if MOBILE_PREFIXES.contains(&prefix) || AREA_CODES_3.contains(&prefix) {
            return format_subscriber(prefix, &digits[3..]);
        }
    }

    None
}

/// Hyphenate the subscriber part: 7 digits → XXX-XXXX, 8 → XXXX-XXXX
fn format_subscriber(prefix: &str, rest: &str) -> Option<String> {
    match rest.len() {
        7 => Some(format!("{}-{}-{}", prefix, &rest[..3], &rest[3..])),
        8 => Some(format!("{}-{}-{}", prefix, &rest[..4], &rest[4..])),
        _ => None,
    }
}
