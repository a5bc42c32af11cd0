//! Operating-hours text parsing
//!
//! Best-effort extraction of open/close, break period, last order and weekly
//! closed days from the free-form hours block. The raw text is always kept
//! by the caller; this module only fills the structured form when the text
//! matches a recognizable pattern.

use chrono::NaiveTime;
use once_cell::sync::Lazy;
use refill_common::models::StructuredHours;
use regex::Regex;

static LAST_ORDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(?:라스트\s*오더|L\.?O\.?|주문\s*마감|마지막\s*주문)\s*[:：]?\s*(\d{1,2}):(\d{2})",
    )
    .expect("last-order pattern")
});

static BREAK_TIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?:브레이크\s*타임?|휴게\s*시간|쉬는\s*시간)\s*[:：]?\s*(\d{1,2}):(\d{2})\s*[-~～]\s*(\d{1,2}):(\d{2})",
    )
    .expect("break pattern")
});

static RANGE_HHMM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{1,2}):(\d{2})\s*[-~～]\s*(\d{1,2}):(\d{2})").expect("hh:mm range pattern")
});

static RANGE_AMPM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"오전\s*(\d{1,2})\s*시?\s*[-~～]\s*오후\s*(\d{1,2})\s*시?").expect("ampm pattern")
});

static RANGE_SI: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,2})\s*시\s*[-~～]\s*(\d{1,2})\s*시").expect("si pattern"));

static CLOSED_DAY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:매주\s*)?([월화수목금토일])\s*요일?\s*휴무|휴무일?\s*[:：]?\s*([월화수목금토일])(?:요일)?")
        .expect("closed-day pattern")
});

/// Parse an hours block into structured fields
///
/// Returns None when nothing recognizable was found; the caller keeps the
/// raw text either way.
pub fn parse_hours(text: &str) -> Option<StructuredHours> {
    let mut hours = StructuredHours::default();

    if let Some(caps) = LAST_ORDER.captures(text) {
        hours.last_order = time_from(&caps[1], &caps[2]);
    }

    let break_span = BREAK_TIME.captures(text).and_then(|caps| {
        hours.break_start = time_from(&caps[1], &caps[2]);
        hours.break_end = time_from(&caps[3], &caps[4]);
        caps.get(0).map(|whole| (whole.start(), whole.end()))
    });

    // Opening range: first hh:mm range that is not the break period
    for (whole, caps) in RANGE_HHMM
        .captures_iter(text)
        .filter_map(|caps| caps.get(0).map(|w| (w, caps)))
    {
        if let Some((bs, be)) = break_span {
            if whole.start() < be && whole.end() > bs {
                continue;
            }
        }
        // Last-order times are single, never ranges; no overlap possible
        hours.open = time_from(&caps[1], &caps[2]);
        hours.close = time_from(&caps[3], &caps[4]);
        break;
    }

    // Looser forms only when no hh:mm range matched
    if hours.open.is_none() {
        if let Some(caps) = RANGE_AMPM.captures(text) {
            let open_h: u32 = caps[1].parse().ok()?;
            let close_h: u32 = caps[2].parse().ok()?;
            hours.open = NaiveTime::from_hms_opt(open_h % 24, 0, 0);
            let close_h = if close_h == 12 { 12 } else { close_h + 12 };
            hours.close = NaiveTime::from_hms_opt(close_h % 24, 0, 0);
        } else if let Some(caps) = RANGE_SI.captures(text) {
            let open_h: u32 = caps[1].parse().ok()?;
            let close_h: u32 = caps[2].parse().ok()?;
            hours.open = NaiveTime::from_hms_opt(open_h % 24, 0, 0);
            hours.close = NaiveTime::from_hms_opt(close_h % 24, 0, 0);
        }
    }

    for caps in CLOSED_DAY.captures_iter(text) {
        let day = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str().to_string());
        if let Some(day) = day {
            if !hours.closed_days.contains(&day) {
                hours.closed_days.push(day);
            }
        }
    }

    if hours.is_empty() {
        None
    } else {
        Some(hours)
    }
}

/// "24:00" folds to midnight; out-of-range fields yield None
fn time_from(h: &str, m: &str) -> Option<NaiveTime> {
    let h: u32 = h.parse().ok()?;
    let m: u32 = m.parse().ok()?;
    NaiveTime::from_hms_opt(h % 24, m, 0)
}
