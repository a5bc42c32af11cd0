//! Price text normalization
//!
//! The source site mixes formats freely: "15,000원", "1만5천원", "2만원대",
//! "런치 2만원, 디너 3만원", bare digits, and spelled-out numerals ("이만원").
//! Currency and unit tokens are discarded; non-numeric remnants are stripped.

use once_cell::sync::Lazy;
use refill_common::models::PriceInfo;
use regex::Regex;

/// Any single amount: "N만(M천)원", "N천원", "15,000원", "15000원"
static AMOUNT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)
        (?P<man>\d+)\s*만(?:\s*(?P<cheon>\d+)\s*천)?\s*원?
        | (?P<cheon_only>\d+)\s*천\s*원
        | (?P<arabic>\d{1,3}(?:,\d{3})+|\d+)\s*원
        ",
    )
    .expect("amount pattern")
});

/// Bracket price: "2만원대" → 20,000 ~ 29,999
static RANGE_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?P<man>\d+)\s*만\s*원?\s*대").expect("range-suffix pattern"));

/// Spelled-out numerals: "이만원", "만오천원"
static KOREAN_NUMERAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([일이삼사오육칠팔구십백천만]+)\s*원").expect("numeral pattern"));

/// Parse one price string into numeric bounds plus the raw text
///
/// Multiple amounts in one string (lunch/dinner splits, explicit ranges)
/// collapse to min/max bounds. Returns None when no amount is recognizable.
pub fn parse_price_text(text: &str) -> Option<PriceInfo> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }

    // Bare numeric field, e.g. "15000"
    let bare: String = trimmed.chars().filter(|c| *c != ',').collect();
    if !bare.is_empty() && bare.chars().all(|c| c.is_ascii_digit()) {
        let amount: u32 = bare.parse().ok()?;
        if amount == 0 {
            return None;
        }
        return Some(PriceInfo {
            min_price: amount,
            max_price: amount,
            raw: trimmed.to_string(),
        });
    }

    // Bracket form takes priority: "2만원대" is a range, not a point
    if let Some(caps) = RANGE_SUFFIX.captures(trimmed) {
        let man: u32 = caps["man"].parse().ok()?;
        return Some(PriceInfo {
            min_price: man * 10_000,
            max_price: (man + 1) * 10_000 - 1,
            raw: trimmed.to_string(),
        });
    }

    let mut amounts: Vec<u32> = AMOUNT
        .captures_iter(trimmed)
        .filter_map(|caps| {
            if let Some(man) = caps.name("man") {
                let man: u32 = man.as_str().parse().ok()?;
                let cheon: u32 = caps
                    .name("cheon")
                    .and_then(|c| c.as_str().parse().ok())
                    .unwrap_or(0);
                Some(man * 10_000 + cheon * 1_000)
            } else if let Some(cheon) = caps.name("cheon_only") {
                let cheon: u32 = cheon.as_str().parse().ok()?;
                Some(cheon * 1_000)
            } else {
                let digits: String = caps["arabic"].chars().filter(|c| *c != ',').collect();
                digits.parse().ok()
            }
        })
        .filter(|a| *a > 0)
        .collect();

    // Spelled-out numerals only when nothing else matched
    if amounts.is_empty() {
        if let Some(caps) = KOREAN_NUMERAL.captures(trimmed) {
            if let Some(amount) = parse_korean_numeral(&caps[1]) {
                amounts.push(amount);
            }
        }
    }

    if amounts.is_empty() {
        return None;
    }

    amounts.sort_unstable();
    Some(PriceInfo {
        min_price: amounts[0],
        max_price: *amounts.last().expect("non-empty"),
        raw: trimmed.to_string(),
    })
}

/// Pick one price from the alternative representations, in precedence order
///
/// An exact price field wins over a range field, which wins over menu text.
pub fn choose_price(candidates: &[Option<&str>]) -> Option<PriceInfo> {
    candidates
        .iter()
        .flatten()
        .find_map(|text| parse_price_text(text))
}

/// Convert a spelled-out Korean numeral below 억 to its value
fn parse_korean_numeral(text: &str) -> Option<u32> {
    let digit = |c: char| -> Option<u32> {
        Some(match c {
            '일' => 1,
            '이' => 2,
            '삼' => 3,
            '사' => 4,
            '오' => 5,
            '육' => 6,
            '칠' => 7,
            '팔' => 8,
            '구' => 9,
            _ => return None,
        })
    };

    let mut result: u32 = 0; // completed 만-sections
    let mut section: u32 = 0; // value below 만
    let mut current: u32 = 0; // pending digit

    for c in text.chars() {
        if let Some(d) = digit(c) {
            current = d;
        } else {
            match c {
                '십' => {
                    section += current.max(1) * 10;
                    current = 0;
                }
                '백' => {
                    section += current.max(1) * 100;
                    current = 0;
                }
                '천' => {
                    section += current.max(1) * 1_000;
                    current = 0;
                }
                '만' => {
                    section += current;
                    result += section.max(1) * 10_000;
                    section = 0;
                    current = 0;
                }
                _ => return None,
            }
        }
    }

    let total = result + section + current;
    if total == 0 {
        None
    } else {
        Some(total)
    }
}
