use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

// ── Field identifiers ─────────────────────────────────────────────────────────

/// One readable item on the market-summary panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldId {
    IndexValue,
    Spread,
    /// Only read when the page shows the percentage in its own element.
    SpreadPercent,
    TradedValue,
    TradedVolume,
    CountUp,
    CountDown,
    CountUnchanged,
    /// Up/down arrow next to the spread; read as a class attribute.
    Direction,
}

impl FieldId {
    #[cfg(test)]
    pub const ALL: [FieldId; 9] = [
        FieldId::IndexValue,
        FieldId::Spread,
        FieldId::SpreadPercent,
        FieldId::TradedValue,
        FieldId::TradedVolume,
        FieldId::CountUp,
        FieldId::CountDown,
        FieldId::CountUnchanged,
        FieldId::Direction,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldId::IndexValue => "index_value",
            FieldId::Spread => "spread",
            FieldId::SpreadPercent => "spread_percent",
            FieldId::TradedValue => "traded_value",
            FieldId::TradedVolume => "traded_volume",
            FieldId::CountUp => "count_up",
            FieldId::CountDown => "count_down",
            FieldId::CountUnchanged => "count_unchanged",
            FieldId::Direction => "direction",
        }
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Raw capture ───────────────────────────────────────────────────────────────

/// Why a field could not be read off the page.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldError {
    #[error("no selector configured")]
    NotConfigured,

    #[error("invalid selector `{selector}`: {reason}")]
    InvalidSelector { selector: String, reason: String },

    #[error("no element matches `{selector}`")]
    NotFound { selector: String },

    #[error("attribute `{attr}` missing on `{selector}`")]
    MissingAttribute { selector: String, attr: String },

    #[error("element is empty")]
    Empty,

    #[error("field was not captured")]
    Missing,
}

pub type FieldRead = Result<String, FieldError>;

/// Raw displayed text per field, as handed over by a page reader.
/// Built once per capture and not mutated by the pipeline.
#[derive(Debug, Clone, Default)]
pub struct RawFieldMap {
    fields: BTreeMap<FieldId, FieldRead>,
}

impl RawFieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: FieldId, read: FieldRead) {
        self.fields.insert(field, read);
    }

    #[cfg(test)]
    pub fn with_text(mut self, field: FieldId, text: impl Into<String>) -> Self {
        self.fields.insert(field, Ok(text.into()));
        self
    }

    pub fn get(&self, field: FieldId) -> Result<&str, FieldError> {
        match self.fields.get(&field) {
            Some(Ok(text)) => Ok(text.as_str()),
            Some(Err(e)) => Err(e.clone()),
            None => Err(FieldError::Missing),
        }
    }

    /// Text if present, `None` on any read failure.
    pub fn text(&self, field: FieldId) -> Option<&str> {
        self.get(field).ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FieldId, &FieldRead)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Per-field diagnostic collected while assembling a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldIssue {
    /// The page reader could not produce text.
    Unavailable { field: FieldId, error: FieldError },
    /// Text was present but held no number.
    Unparseable { field: FieldId, text: String },
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldIssue::Unavailable { field, error } => write!(f, "{}: {}", field, error),
            FieldIssue::Unparseable { field, text } => {
                write!(f, "{}: cannot parse {:?}", field, text)
            }
        }
    }
}

// ── Snapshot ──────────────────────────────────────────────────────────────────

/// Fields used for duplicate detection: everything except the trading date.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ComparisonKey {
    pub index_value: Option<f64>,
    pub spread: Option<f64>,
    pub spread_percent: Option<f64>,
    /// In the page's native unit (billions VND), never rescaled.
    pub traded_value: Option<f64>,
    pub traded_volume: Option<u64>,
    pub count_up: Option<u64>,
    pub count_down: Option<u64>,
    pub count_unchanged: Option<u64>,
}

/// One parsed market-summary record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub trading_date: NaiveDate,
    #[serde(flatten)]
    pub values: ComparisonKey,
}

pub const DATE_FORMAT: &str = "%d/%m/%Y";

impl Snapshot {
    pub fn key(&self) -> ComparisonKey {
        self.values
    }

    /// `DD/MM/YYYY`, as stored in the date column.
    pub fn date_label(&self) -> String {
        self.trading_date.format(DATE_FORMAT).to_string()
    }
}
