//! Duplicate detection between a fresh snapshot and the last stored row.
//!
//! Two policies exist because tables in the wild were written by both a
//! text-comparing and a number-comparing writer. Pick one per table and keep it.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::models::ComparisonKey;

pub const FLOAT_TOLERANCE: f64 = 1e-6;
pub const NOT_AVAILABLE: &str = "N/A";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
pub enum CompareStrategy {
    /// Canonical strings: integers without decimals, floats to 3 places.
    #[default]
    #[serde(rename = "string", alias = "string_normalized")]
    #[value(name = "string")]
    StringNormalized,
    /// Typed values, floats within `FLOAT_TOLERANCE`.
    #[serde(rename = "numeric", alias = "typed_numeric")]
    #[value(name = "numeric")]
    TypedNumeric,
}

impl CompareStrategy {
    /// `false` whenever there is no previous row.
    pub fn is_duplicate(&self, candidate: &ComparisonKey, last: Option<&ComparisonKey>) -> bool {
        let Some(last) = last else { return false };
        match self {
            CompareStrategy::StringNormalized => canonical_key(candidate) == canonical_key(last),
            CompareStrategy::TypedNumeric => numeric_eq(candidate, last),
        }
    }
}

// ── String-normalized ─────────────────────────────────────────────────────────

/// Trimmed, thousands separators removed.
pub fn canonical_text(s: &str) -> String {
    s.trim().replace(',', "")
}

pub fn canonical_float(v: Option<f64>) -> String {
    match v {
        Some(v) if v.is_finite() && v.fract() == 0.0 => {
            // -0.0 renders as "0"
            format!("{:.0}", v + 0.0)
        }
        Some(v) if v.is_finite() => format!("{:.3}", v),
        _ => NOT_AVAILABLE.to_string(),
    }
}

pub fn canonical_int(v: Option<u64>) -> String {
    v.map(|n| n.to_string()).unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

pub fn canonical_key(k: &ComparisonKey) -> [String; 8] {
    [
        canonical_float(k.index_value),
        canonical_float(k.spread),
        canonical_float(k.spread_percent),
        canonical_float(k.traded_value),
        canonical_int(k.traded_volume),
        canonical_int(k.count_up),
        canonical_int(k.count_down),
        canonical_int(k.count_unchanged),
    ]
}

// ── Typed-numeric ─────────────────────────────────────────────────────────────

fn float_eq(a: Option<f64>, b: Option<f64>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => (a - b).abs() <= FLOAT_TOLERANCE,
        _ => false,
    }
}

fn numeric_eq(a: &ComparisonKey, b: &ComparisonKey) -> bool {
    float_eq(a.index_value, b.index_value)
        && float_eq(a.spread, b.spread)
        && float_eq(a.spread_percent, b.spread_percent)
        && float_eq(a.traded_value, b.traded_value)
        && a.traded_volume == b.traded_volume
        && a.count_up == b.count_up
        && a.count_down == b.count_down
        && a.count_unchanged == b.count_unchanged
}
