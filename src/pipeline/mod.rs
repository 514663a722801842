//! Pipeline orchestrator: raw field text → snapshot → duplicate check → table.
//!
//! ## Steps of `run()`
//!   1. Resolve the market direction from the arrow indicator
//!   2. Parse every field; failures become unknown values plus a `FieldIssue`
//!   3. Stamp the trading date for the current wall-clock time
//!   4. Compare against the table's last row with the configured strategy
//!   5. Append unless it is a duplicate
//!
//! Idempotent: re-running while the market is closed appends nothing.

use crate::calendar::{trading_date, wall_clock};
use crate::compare::CompareStrategy;
use crate::config::{PipelineConfig, StorageConfig};
use crate::models::{ComparisonKey, FieldId, FieldIssue, RawFieldMap, Snapshot};
use crate::scraper::cleaner::{
    apply_direction, is_negative_direction, parse_float, parse_int, parse_magnitude_with_unit,
    parse_spread_pair,
};
use crate::storage::{AppendMode, SnapshotStore};
use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Identical to the last stored row; nothing written.
    Skipped,
    Appended(AppendMode),
}

#[derive(Debug)]
pub struct RunReport {
    pub outcome: Outcome,
    pub snapshot: Snapshot,
    pub issues: Vec<FieldIssue>,
}

pub struct Pipeline {
    store: SnapshotStore,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(store: SnapshotStore, config: PipelineConfig) -> Self {
        Self { store, config }
    }

    pub fn from_config(storage: &StorageConfig, config: PipelineConfig) -> Result<Self> {
        let store = SnapshotStore::open(&storage.table_path, &storage.columns)
            .with_context(|| format!("Failed to open table {:?}", storage.table_path))?;
        Ok(Self::new(store, config))
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub fn strategy(&self) -> CompareStrategy {
        self.config.strategy
    }

    /// Runs against the current wall-clock time.
    pub fn run(&self, raw: &RawFieldMap) -> Result<RunReport> {
        self.run_at(raw, wall_clock(self.config.utc_offset_minutes))
    }

    /// Only errors when even the full rewrite of the table fails.
    pub fn run_at(&self, raw: &RawFieldMap, now: NaiveDateTime) -> Result<RunReport> {
        let (snapshot, issues) = self.assemble(raw, now);
        for issue in &issues {
            warn!("{}", issue);
        }

        let last = self.store.read_last();
        if self.config.strategy.is_duplicate(&snapshot.key(), last.as_ref()) {
            info!(
                "Snapshot for {} matches the last stored row; already up to date (market likely closed)",
                snapshot.date_label()
            );
            return Ok(RunReport { outcome: Outcome::Skipped, snapshot, issues });
        }

        let mode = self
            .store
            .append(&snapshot)
            .with_context(|| format!("Failed to write {:?}", self.store.path()))?;
        info!("Saved snapshot for {} to {:?} ({:?})", snapshot.date_label(), self.store.path(), mode);

        Ok(RunReport { outcome: Outcome::Appended(mode), snapshot, issues })
    }

    /// Parses every field and stamps the trading date for `now`.
    pub fn assemble(&self, raw: &RawFieldMap, now: NaiveDateTime) -> (Snapshot, Vec<FieldIssue>) {
        let mut issues = Vec::new();

        // arrow lookup failing just means "not down"
        let indicator = raw.text(FieldId::Direction);
        if indicator.is_none() {
            debug!("No direction indicator; treating spread as non-negative");
        }
        let is_negative = is_negative_direction(indicator, &self.config.direction_marker);

        let index_value = parse_field(raw, FieldId::IndexValue, &mut issues, parse_float);
        let traded_value = parse_field(raw, FieldId::TradedValue, &mut issues, |s| {
            parse_magnitude_with_unit(s, &self.config.value_unit)
        });
        let traded_volume = parse_field(raw, FieldId::TradedVolume, &mut issues, parse_int);
        let count_up = parse_field(raw, FieldId::CountUp, &mut issues, parse_int);
        let count_down = parse_field(raw, FieldId::CountDown, &mut issues, parse_int);
        let count_unchanged = parse_field(raw, FieldId::CountUnchanged, &mut issues, parse_int);

        let mut pair = match raw.get(FieldId::Spread) {
            Ok(text) => {
                let pair = parse_spread_pair(text, is_negative);
                if pair.is_empty() {
                    issues.push(FieldIssue::Unparseable {
                        field: FieldId::Spread,
                        text: text.to_string(),
                    });
                }
                pair
            }
            Err(error) => {
                issues.push(FieldIssue::Unavailable { field: FieldId::Spread, error });
                Default::default()
            }
        };
        // percentage shown in its own element on some layouts
        if pair.percent.is_none() {
            if let Some(text) = raw.text(FieldId::SpreadPercent) {
                pair.percent = parse_float(text);
                pair = apply_direction(pair, is_negative);
            }
        }

        let snapshot = Snapshot {
            trading_date: trading_date(now, self.config.opening_hour),
            values: ComparisonKey {
                index_value,
                spread: pair.spread,
                spread_percent: pair.percent,
                traded_value,
                traded_volume,
                count_up,
                count_down,
                count_unchanged,
            },
        };
        (snapshot, issues)
    }
}

fn parse_field<T>(
    raw: &RawFieldMap,
    id: FieldId,
    issues: &mut Vec<FieldIssue>,
    parse: impl Fn(&str) -> Option<T>,
) -> Option<T> {
    match raw.get(id) {
        Ok(text) => {
            let v = parse(text);
            if v.is_none() {
                issues.push(FieldIssue::Unparseable { field: id, text: text.to_string() });
            }
            v
        }
        Err(error) => {
            issues.push(FieldIssue::Unavailable { field: id, error });
            None
        }
    }
}
