//! Text → typed value parsers for the summary panel fields.
//!
//! Every parser is total: malformed text yields `None`, never an error.

const NBSP: char = '\u{a0}';

/// Default marker found in the class list of the "down" arrow icon.
pub const DEFAULT_DOWN_MARKER: &str = "icon-arrowdown";

/// Default unit suffix of the traded-value field ("tỷ" = billion).
pub const DEFAULT_VALUE_UNIT: &str = "tỷ";

// ── Number scanning ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
struct NumberToken {
    value: f64,
    start: usize,
    end: usize,
    /// Immediately followed by `%`.
    percent: bool,
}

/// Finds every `[-+]?digits(.digits)?` run, left to right.
fn scan_numbers(s: &str) -> Vec<NumberToken> {
    let b = s.as_bytes();
    let mut out = Vec::new();
    let mut i = 0;

    while i < b.len() {
        let signed = (b[i] == b'-' || b[i] == b'+') && b.get(i + 1).is_some_and(u8::is_ascii_digit);
        if !signed && !b[i].is_ascii_digit() {
            i += 1;
            continue;
        }

        let start = i;
        if signed {
            i += 1;
        }
        while i < b.len() && b[i].is_ascii_digit() {
            i += 1;
        }
        if i + 1 < b.len() && b[i] == b'.' && b[i + 1].is_ascii_digit() {
            i += 1;
            while i < b.len() && b[i].is_ascii_digit() {
                i += 1;
            }
        }

        if let Ok(value) = s[start..i].parse::<f64>() {
            out.push(NumberToken {
                value,
                start,
                end: i,
                percent: b.get(i) == Some(&b'%'),
            });
        }
    }

    out
}

fn strip_separators(s: &str) -> String {
    s.chars().filter(|c| *c != ',' && *c != NBSP).collect()
}

// ── Scalar parsers ────────────────────────────────────────────────────────────

/// First signed decimal in the text.
/// "1,234.56" → 1234.56 | "-1.55%" → -1.55 | "N/A" → None
pub fn parse_float(s: &str) -> Option<f64> {
    let cleaned = strip_separators(s);
    let cleaned = cleaned.trim();
    let cleaned = cleaned.strip_suffix('%').unwrap_or(cleaned);
    scan_numbers(cleaned).first().map(|t| t.value)
}

/// First run of digits, separators removed. Signs are ignored.
/// "1,234,567" → 1234567 | "Tăng: 215" → 215
pub fn parse_int(s: &str) -> Option<u64> {
    let cleaned = strip_separators(s);
    let digits: String = cleaned
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

/// Drops a unit suffix without rescaling. "12,345.678 tỷ" → 12345.678
pub fn parse_magnitude_with_unit(s: &str, unit: &str) -> Option<f64> {
    if unit.is_empty() {
        return parse_float(s);
    }
    let without_unit = s
        .replace(&format!(" {}", unit), "")
        .replace(&format!("{}{}", NBSP, unit), "")
        .replace(unit, "");
    parse_float(&without_unit)
}

// ── Direction ─────────────────────────────────────────────────────────────────

/// True when the indicator (e.g. an icon class list) carries the down marker.
/// Absent indicators count as up.
pub fn is_negative_direction(indicator: Option<&str>, down_marker: &str) -> bool {
    if down_marker.is_empty() {
        return false;
    }
    let marker = down_marker.to_lowercase();
    indicator.is_some_and(|s| s.to_lowercase().contains(&marker))
}

// ── Spread pair ───────────────────────────────────────────────────────────────

/// Point change and percent change, read from one element.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SpreadPair {
    pub spread: Option<f64>,
    pub percent: Option<f64>,
}

impl SpreadPair {
    pub fn is_empty(&self) -> bool {
        self.spread.is_none() && self.percent.is_none()
    }
}

/// Pulls both numbers out of the spread text, signs as written.
///
/// Tried in order:
/// 1. `"16.55 1.55%"`: a number, whitespace, then a percent number
/// 2. `"16.55/1.55%"`: split on the first `/`
/// 3. first non-percent number and first percent number, independently
pub fn extract_spread_pair(s: &str) -> SpreadPair {
    let cleaned: String = s
        .chars()
        .filter(|c| *c != ',')
        .map(|c| if c == NBSP { ' ' } else { c })
        .collect();
    let tokens = scan_numbers(&cleaned);

    for w in tokens.windows(2) {
        let (a, b) = (w[0], w[1]);
        let gap = &cleaned[a.end..b.start];
        if !a.percent && b.percent && !gap.is_empty() && gap.chars().all(char::is_whitespace) {
            return SpreadPair {
                spread: Some(a.value),
                percent: Some(b.value),
            };
        }
    }

    if let Some((left, right)) = cleaned.split_once('/') {
        let pair = SpreadPair {
            spread: parse_float(left),
            percent: parse_float(right),
        };
        if !pair.is_empty() {
            return pair;
        }
    }

    SpreadPair {
        spread: tokens.iter().find(|t| !t.percent).map(|t| t.value),
        percent: tokens.iter().find(|t| t.percent).map(|t| t.value),
    }
}

/// Forces both numbers negative on a down day; leaves them untouched otherwise.
pub fn apply_direction(pair: SpreadPair, is_negative: bool) -> SpreadPair {
    if !is_negative {
        return pair;
    }
    SpreadPair {
        spread: pair.spread.map(|v| -v.abs()),
        percent: pair.percent.map(|v| -v.abs()),
    }
}

pub fn parse_spread_pair(s: &str, is_negative: bool) -> SpreadPair {
    apply_direction(extract_spread_pair(s), is_negative)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_float() {
        assert_eq!(parse_float("1,234.56"), Some(1234.56));
        assert_eq!(parse_float("-1.55%"), Some(-1.55));
        assert_eq!(parse_float("+3"), Some(3.0));
        assert_eq!(parse_float(" 1\u{a0}250.5 "), Some(1250.5));
        assert_eq!(parse_float("VNIndex 1,285.12 điểm"), Some(1285.12));
        assert_eq!(parse_float("N/A"), None);
        assert_eq!(parse_float(""), None);
        assert_eq!(parse_float("-"), None);
    }

    #[test]
    fn test_parse_int() {
        assert_eq!(parse_int("1,234,567"), Some(1_234_567));
        assert_eq!(parse_int("215"), Some(215));
        assert_eq!(parse_int("(42)"), Some(42));
        assert_eq!(parse_int("12.5"), Some(12));
        assert_eq!(parse_int("—"), None);
        assert_eq!(parse_int("99999999999999999999999"), None);
    }

    #[test]
    fn test_parse_magnitude_with_unit() {
        assert_eq!(parse_magnitude_with_unit("12.345 tỷ", "tỷ"), Some(12.345));
        assert_eq!(parse_magnitude_with_unit("21,456.789 tỷ", "tỷ"), Some(21456.789));
        assert_eq!(parse_magnitude_with_unit("980tỷ", "tỷ"), Some(980.0));
        assert_eq!(parse_magnitude_with_unit("7.5", ""), Some(7.5));
        assert_eq!(parse_magnitude_with_unit("tỷ", "tỷ"), None);
    }

    #[test]
    fn test_parsers_are_total_on_odd_input() {
        let long = "9".repeat(400);
        let inputs = [
            "", " ", "%", "-", "+", ".", "-.5", "1.", "..1", "1e5", "∞", "tỷ tỷ",
            "--5", "+-", "\u{a0}", "١٢٣", "1/2/3", "%%%1", long.as_str(),
        ];
        for s in inputs {
            let _ = parse_float(s);
            let _ = parse_int(s);
            let _ = parse_magnitude_with_unit(s, "tỷ");
            let _ = parse_spread_pair(s, true);
        }
        assert_eq!(parse_float("--5"), Some(-5.0));
        assert_eq!(parse_float("-.5"), Some(5.0));
    }

    #[test]
    fn test_direction_marker() {
        let m = DEFAULT_DOWN_MARKER;
        assert!(is_negative_direction(Some("icon icon-arrowdown red"), m));
        assert!(is_negative_direction(Some("ICON-ArrowDown"), m));
        assert!(!is_negative_direction(Some("icon icon-arrowup"), m));
        assert!(!is_negative_direction(None, m));
        assert!(!is_negative_direction(Some("anything"), ""));
    }

    #[test]
    fn test_spread_pair_up() {
        let p = parse_spread_pair("16.55 1.55%", false);
        assert_eq!(p.spread, Some(16.55));
        assert_eq!(p.percent, Some(1.55));
    }

    #[test]
    fn test_spread_pair_down_forces_negative() {
        let p = parse_spread_pair("16.55 1.55%", true);
        assert_eq!(p.spread, Some(-16.55));
        assert_eq!(p.percent, Some(-1.55));

        // already-signed text stays negative, never flips back
        let p = parse_spread_pair("-16.55 -1.55%", true);
        assert_eq!(p.spread, Some(-16.55));
        assert_eq!(p.percent, Some(-1.55));

        // a stray plus sign is overridden too
        let p = parse_spread_pair("+2.10 +0.17%", true);
        assert_eq!(p.spread, Some(-2.10));
        assert_eq!(p.percent, Some(-0.17));
    }

    #[test]
    fn test_spread_pair_up_keeps_text_sign() {
        let p = parse_spread_pair("-3.2 -0.25%", false);
        assert_eq!(p.spread, Some(-3.2));
        assert_eq!(p.percent, Some(-0.25));
    }

    #[test]
    fn test_spread_pair_slash_form() {
        let p = parse_spread_pair("16.55/1.55%", false);
        assert_eq!(p.spread, Some(16.55));
        assert_eq!(p.percent, Some(1.55));

        let p = parse_spread_pair("1,016.55 / 1.55 %", true);
        assert_eq!(p.spread, Some(-1016.55));
        assert_eq!(p.percent, Some(-1.55));
    }

    #[test]
    fn test_spread_pair_nbsp_separator() {
        let p = parse_spread_pair("16.55\u{a0}1.55%", false);
        assert_eq!(p.spread, Some(16.55));
        assert_eq!(p.percent, Some(1.55));
    }

    #[test]
    fn test_spread_pair_fallback() {
        let p = extract_spread_pair("(1.55%) change 16.55");
        assert_eq!(p.spread, Some(16.55));
        assert_eq!(p.percent, Some(1.55));

        let p = extract_spread_pair("16.55");
        assert_eq!(p.spread, Some(16.55));
        assert_eq!(p.percent, None);

        let p = extract_spread_pair("0.8%");
        assert_eq!(p.spread, None);
        assert_eq!(p.percent, Some(0.8));

        assert!(extract_spread_pair("N/A").is_empty());
        assert!(parse_spread_pair("--", true).is_empty());
    }

    #[test]
    fn test_direction_override_property() {
        let samples = ["16.55 1.55%", "-4 -0.3%", "+7.1/0.6%", "2.5", "x 9%", "0 0%"];
        for s in samples {
            let down = parse_spread_pair(s, true);
            assert!(down.spread.is_none_or(|v| v <= 0.0), "{}", s);
            assert!(down.percent.is_none_or(|v| v <= 0.0), "{}", s);

            let up = parse_spread_pair(s, false);
            assert_eq!(up, extract_spread_pair(s), "{}", s);
        }
    }
}
