//! Append-only CSV table of snapshots.
//!
//! The table has one header row naming the nine columns in snapshot order
//! (date first). Rows are only ever appended; a table whose header does not
//! match is replaced wholesale on the next write.

use crate::compare::{canonical_text, NOT_AVAILABLE};
use crate::models::{ComparisonKey, Snapshot};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("header mismatch: found {found:?}")]
    HeaderMismatch { found: Vec<String> },

    #[error("column `{0}` not in header")]
    MissingColumn(String),

    #[error("column `{column}`: cannot read {value:?} as a number")]
    BadCell { column: String, value: String },

    #[error("expected {expected} column labels, got {got}")]
    LabelCount { expected: usize, got: usize },

    #[error("duplicate column label `{0}`")]
    DuplicateLabel(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

// ── Column labels ─────────────────────────────────────────────────────────────

pub const COLUMN_COUNT: usize = 9;

const ENGLISH: [&str; COLUMN_COUNT] = [
    "Date", "VNIndex", "Spread", "Spread%", "Value", "Volume",
    "Meigara_Up", "Meigara_Down", "Meigara_Unchanged",
];

const VIETNAMESE: [&str; COLUMN_COUNT] = [
    "ThoiGian", "VNIndex", "Spread", "Spread%", "Value", "Volume",
    "CP_Tang", "CP_Giam", "CP_KhongDoi",
];

const JAPANESE: [&str; COLUMN_COUNT] = [
    "取引日", "VN指数", "前日比(ポイント)", "前日比(%)", "売買代金", "出来高",
    "上昇銘柄数", "下落銘柄数", "変わらず銘柄数",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnPreset {
    #[default]
    English,
    Vietnamese,
    Japanese,
}

/// Either a named preset or nine custom labels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColumnSpec {
    Preset(ColumnPreset),
    Custom(Vec<String>),
}

impl Default for ColumnSpec {
    fn default() -> Self {
        ColumnSpec::Preset(ColumnPreset::default())
    }
}

impl ColumnSpec {
    pub fn labels(&self) -> StoreResult<Vec<String>> {
        let labels: Vec<String> = match self {
            ColumnSpec::Preset(ColumnPreset::English) => ENGLISH.map(String::from).to_vec(),
            ColumnSpec::Preset(ColumnPreset::Vietnamese) => VIETNAMESE.map(String::from).to_vec(),
            ColumnSpec::Preset(ColumnPreset::Japanese) => JAPANESE.map(String::from).to_vec(),
            ColumnSpec::Custom(labels) => labels.clone(),
        };

        if labels.len() != COLUMN_COUNT {
            return Err(StoreError::LabelCount { expected: COLUMN_COUNT, got: labels.len() });
        }
        for (i, l) in labels.iter().enumerate() {
            if labels[..i].contains(l) {
                return Err(StoreError::DuplicateLabel(l.clone()));
            }
        }
        Ok(labels)
    }
}

// ── Cell codec ────────────────────────────────────────────────────────────────

fn strip_bom(s: &str) -> &str {
    s.trim_start_matches('\u{feff}')
}

/// Lenient form used to locate columns on read.
fn clean_header(s: &str) -> String {
    strip_bom(s).trim().to_string()
}

fn fmt_float(v: Option<f64>) -> String {
    match v {
        Some(v) if v.is_finite() => v.to_string(),
        _ => NOT_AVAILABLE.to_string(),
    }
}

fn fmt_int(v: Option<u64>) -> String {
    v.map(|n| n.to_string()).unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

fn is_blank(t: &str) -> bool {
    t.is_empty() || t.eq_ignore_ascii_case(NOT_AVAILABLE) || t.eq_ignore_ascii_case("nan")
}

fn read_float(column: &str, raw: &str) -> StoreResult<Option<f64>> {
    let t = canonical_text(raw);
    if is_blank(&t) {
        return Ok(None);
    }
    t.parse::<f64>()
        .map(Some)
        .map_err(|_| StoreError::BadCell { column: column.to_string(), value: raw.to_string() })
}

/// Integers may have been saved as whole floats ("512.0") by spreadsheet tools.
fn read_int(column: &str, raw: &str) -> StoreResult<Option<u64>> {
    let t = canonical_text(raw);
    if is_blank(&t) {
        return Ok(None);
    }
    if let Ok(n) = t.parse::<u64>() {
        return Ok(Some(n));
    }
    match t.parse::<f64>() {
        Ok(f) if f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 => {
            Ok(Some(f as u64))
        }
        _ => Err(StoreError::BadCell { column: column.to_string(), value: raw.to_string() }),
    }
}

// ── Store ─────────────────────────────────────────────────────────────────────

/// How a row ended up on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendMode {
    /// No table existed; created with header + row.
    Created,
    /// Row added after the existing rows.
    Appended,
    /// Existing table discarded; rewritten with header + row.
    Recreated,
}

pub struct SnapshotStore {
    path: PathBuf,
    header: Vec<String>,
}

impl SnapshotStore {
    pub fn open(path: &Path, columns: &ColumnSpec) -> StoreResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        Ok(Self {
            path: path.to_path_buf(),
            header: columns.labels()?,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // ── Read ──────────────────────────────────────────────────────────────────

    /// Last row's comparison fields. `None` when there is no usable history,
    /// including when the file cannot be read or parsed.
    pub fn read_last(&self) -> Option<ComparisonKey> {
        if !self.path.is_file() {
            debug!("No table at {:?} yet", self.path);
            return None;
        }
        match self.try_read_last() {
            Ok(key) => key,
            Err(e) => {
                warn!("Cannot read last row of {:?} ({}), skipping duplicate check", self.path, e);
                None
            }
        }
    }

    fn try_read_last(&self) -> StoreResult<Option<ComparisonKey>> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(&self.path)?;

        let found: Vec<String> = rdr.headers()?.iter().map(clean_header).collect();
        if found.iter().all(|h| h.is_empty()) {
            return Ok(None);
        }

        // compare columns located by label, so reordered tables still work
        let positions = self.header[1..]
            .iter()
            .map(|label| {
                found
                    .iter()
                    .position(|h| h == label)
                    .ok_or_else(|| StoreError::MissingColumn(label.clone()))
            })
            .collect::<StoreResult<Vec<usize>>>()?;

        let mut last = None;
        for record in rdr.records() {
            let record = record?;
            if record.iter().all(|c| c.trim().is_empty()) {
                continue;
            }
            last = Some(record);
        }
        let Some(record) = last else { return Ok(None) };

        let cell = |i: usize| (self.header[i + 1].as_str(), record.get(positions[i]).unwrap_or(""));
        let float = |i: usize| {
            let (col, raw) = cell(i);
            read_float(col, raw)
        };
        let int = |i: usize| {
            let (col, raw) = cell(i);
            read_int(col, raw)
        };

        Ok(Some(ComparisonKey {
            index_value: float(0)?,
            spread: float(1)?,
            spread_percent: float(2)?,
            traded_value: float(3)?,
            traded_volume: int(4)?,
            count_up: int(5)?,
            count_down: int(6)?,
            count_unchanged: int(7)?,
        }))
    }

    /// Number of non-empty data rows; 0 when the table is absent.
    pub fn row_count(&self) -> StoreResult<usize> {
        if !self.path.is_file() {
            return Ok(0);
        }
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(&self.path)?;
        let mut n = 0;
        for record in rdr.records() {
            if !record?.iter().all(|c| c.trim().is_empty()) {
                n += 1;
            }
        }
        Ok(n)
    }

    /// Header labels as written; only a leading BOM is dropped.
    fn read_header(&self) -> StoreResult<Vec<String>> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(&self.path)?;
        match rdr.records().next() {
            Some(record) => Ok(record?.iter().map(|h| strip_bom(h).to_string()).collect()),
            None => Ok(Vec::new()),
        }
    }

    // ── Write ─────────────────────────────────────────────────────────────────

    fn row(&self, snap: &Snapshot) -> [String; COLUMN_COUNT] {
        let v = &snap.values;
        [
            snap.date_label(),
            fmt_float(v.index_value),
            fmt_float(v.spread),
            fmt_float(v.spread_percent),
            fmt_float(v.traded_value),
            fmt_int(v.traded_volume),
            fmt_int(v.count_up),
            fmt_int(v.count_down),
            fmt_int(v.count_unchanged),
        ]
    }

    /// Adds one row. Falls back to rewriting the table with only this row
    /// when the header differs or the append fails; prior rows are lost then.
    pub fn append(&self, snap: &Snapshot) -> StoreResult<AppendMode> {
        if !self.path.exists() {
            self.rewrite(snap)?;
            info!("Created {:?}", self.path);
            return Ok(AppendMode::Created);
        }

        match self.try_append(snap) {
            Ok(()) => Ok(AppendMode::Appended),
            Err(e) => {
                warn!("Append to {:?} failed ({}), rewriting table with the new row only", self.path, e);
                self.rewrite(snap)?;
                Ok(AppendMode::Recreated)
            }
        }
    }

    fn try_append(&self, snap: &Snapshot) -> StoreResult<()> {
        let found = self.read_header()?;
        if found != self.header {
            return Err(StoreError::HeaderMismatch { found });
        }

        let mut file = OpenOptions::new().read(true).append(true).open(&self.path)?;

        // previous writer may have left the last line unterminated
        if file.metadata()?.len() > 0 {
            file.seek(SeekFrom::End(-1))?;
            let mut last = [0u8; 1];
            file.read_exact(&mut last)?;
            if last[0] != b'\n' {
                file.write_all(b"\n")?;
            }
        }

        let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        wtr.write_record(self.row(snap))?;
        wtr.flush()?;
        Ok(())
    }

    fn rewrite(&self, snap: &Snapshot) -> StoreResult<()> {
        let mut wtr = csv::Writer::from_path(&self.path)?;
        wtr.write_record(&self.header)?;
        wtr.write_record(self.row(snap))?;
        wtr.flush()?;
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compare::CompareStrategy;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn snap(day: u32, index: f64) -> Snapshot {
        Snapshot {
            trading_date: NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
            values: ComparisonKey {
                index_value: Some(index),
                spread: Some(-16.55),
                spread_percent: Some(-1.55),
                traded_value: Some(12.345),
                traded_volume: Some(812_345_600),
                count_up: Some(120),
                count_down: Some(250),
                count_unchanged: None,
            },
        }
    }

    fn store(dir: &TempDir) -> SnapshotStore {
        SnapshotStore::open(&dir.path().join("vnindex.csv"), &ColumnSpec::default()).unwrap()
    }

    #[test]
    fn test_missing_table_has_no_history() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        assert_eq!(s.read_last(), None);
        assert_eq!(s.row_count().unwrap(), 0);
    }

    #[test]
    fn test_create_then_append() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);

        assert_eq!(s.append(&snap(6, 1280.0)).unwrap(), AppendMode::Created);
        assert_eq!(s.append(&snap(7, 1285.12)).unwrap(), AppendMode::Appended);
        assert_eq!(s.row_count().unwrap(), 2);

        let text = fs::read_to_string(s.path()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], ENGLISH.join(","));
        assert_eq!(lines[1], "06/03/2024,1280,-16.55,-1.55,12.345,812345600,120,250,N/A");
        assert_eq!(lines[2], "07/03/2024,1285.12,-16.55,-1.55,12.345,812345600,120,250,N/A");
    }

    #[test]
    fn test_round_trip_within_tolerance() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        let original = snap(8, 1234.5678901);
        s.append(&original).unwrap();

        let back = s.read_last().unwrap();
        assert!(CompareStrategy::TypedNumeric.is_duplicate(&original.key(), Some(&back)));
        assert!(CompareStrategy::StringNormalized.is_duplicate(&original.key(), Some(&back)));
    }

    #[test]
    fn test_header_mismatch_recreates_with_single_row() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        fs::write(s.path(), "a,b,c\n1,2,3\n4,5,6\n").unwrap();

        assert_eq!(s.append(&snap(8, 1300.0)).unwrap(), AppendMode::Recreated);
        assert_eq!(s.row_count().unwrap(), 1);
        assert_eq!(s.read_header().unwrap(), s.header);
        assert_eq!(s.read_last().unwrap().index_value, Some(1300.0));
    }

    #[test]
    fn test_other_preset_header_is_a_mismatch() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("t.csv");
        let en = SnapshotStore::open(&path, &ColumnSpec::default()).unwrap();
        en.append(&snap(6, 1.0)).unwrap();
        en.append(&snap(7, 2.0)).unwrap();

        let jp = SnapshotStore::open(&path, &ColumnSpec::Preset(ColumnPreset::Japanese)).unwrap();
        assert_eq!(jp.append(&snap(8, 3.0)).unwrap(), AppendMode::Recreated);
        assert_eq!(jp.row_count().unwrap(), 1);
        assert!(fs::read_to_string(&path).unwrap().starts_with("取引日,VN指数"));
    }

    #[test]
    fn test_unreadable_header_recreates() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        let mut bytes = ENGLISH.join(",").into_bytes();
        bytes.extend_from_slice(b"\xff\n05/03/2024,1,2,3,4,5,6,7,8\n");
        fs::write(s.path(), bytes).unwrap();

        // a read error, not a mismatch, still takes the rewrite path
        assert!(matches!(s.try_append(&snap(6, 1.0)), Err(StoreError::Csv(_))));
        assert_eq!(s.append(&snap(6, 1280.0)).unwrap(), AppendMode::Recreated);
        assert_eq!(s.row_count().unwrap(), 1);
        assert_eq!(s.read_header().unwrap(), s.header);
        assert_eq!(s.read_last().unwrap().index_value, Some(1280.0));
    }

    #[test]
    fn test_open_creates_missing_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a/b/t.csv");
        let s = SnapshotStore::open(&path, &ColumnSpec::default()).unwrap();
        assert!(dir.path().join("a/b").is_dir());

        assert_eq!(s.append(&snap(6, 1280.0)).unwrap(), AppendMode::Created);
        assert_eq!(s.row_count().unwrap(), 1);
    }

    #[test]
    fn test_padded_header_label_is_a_mismatch() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        let padded = ENGLISH.join(",").replacen("Date", "Date ", 1);
        fs::write(s.path(), format!("{padded}\n05/03/2024,1,2,3,4,5,6,7,8\n")).unwrap();

        // still readable as history, but not appended to
        assert_eq!(s.read_last().unwrap().index_value, Some(1.0));
        assert_eq!(s.append(&snap(6, 1280.0)).unwrap(), AppendMode::Recreated);
        assert_eq!(s.row_count().unwrap(), 1);
    }

    #[test]
    fn test_bom_header_still_appends() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        fs::write(s.path(), format!("\u{feff}{}\n05/03/2024,1,2,3,4,5,6,7,8\n", ENGLISH.join(","))).unwrap();

        assert_eq!(s.append(&snap(6, 1280.0)).unwrap(), AppendMode::Appended);
        assert_eq!(s.row_count().unwrap(), 2);
    }

    #[test]
    fn test_empty_file_is_no_history_and_gets_recreated() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        fs::write(s.path(), "").unwrap();

        assert_eq!(s.read_last(), None);
        assert_eq!(s.append(&snap(6, 1.0)).unwrap(), AppendMode::Recreated);
        assert_eq!(s.row_count().unwrap(), 1);
    }

    #[test]
    fn test_header_only_is_no_history() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        fs::write(s.path(), format!("{}\n", ENGLISH.join(","))).unwrap();
        assert_eq!(s.read_last(), None);
        assert_eq!(s.append(&snap(6, 1.0)).unwrap(), AppendMode::Appended);
    }

    #[test]
    fn test_append_after_unterminated_line() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        fs::write(
            s.path(),
            format!("{}\n05/03/2024,1,2,3,4,5,6,7,8", ENGLISH.join(",")),
        )
        .unwrap();

        s.append(&snap(6, 1280.0)).unwrap();
        assert_eq!(s.row_count().unwrap(), 2);
        assert_eq!(s.read_last().unwrap().index_value, Some(1280.0));
    }

    #[test]
    fn test_reads_spreadsheet_style_cells() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        fs::write(
            s.path(),
            format!(
                "\u{feff}{}\n08/03/2024,\"1,285.12\",-16.55,-1.55,\"21,456.789\",812345600.0,120,250,\n",
                ENGLISH.join(",")
            ),
        )
        .unwrap();

        let k = s.read_last().unwrap();
        assert_eq!(k.index_value, Some(1285.12));
        assert_eq!(k.traded_value, Some(21456.789));
        assert_eq!(k.traded_volume, Some(812_345_600));
        assert_eq!(k.count_unchanged, None);
    }

    #[test]
    fn test_reordered_columns_still_read() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        fs::write(
            s.path(),
            "VNIndex,Date,Spread,Spread%,Value,Volume,Meigara_Up,Meigara_Down,Meigara_Unchanged\n\
             1285.12,08/03/2024,1,0.1,10,100,1,2,3\n",
        )
        .unwrap();
        assert_eq!(s.read_last().unwrap().index_value, Some(1285.12));
    }

    #[test]
    fn test_malformed_last_row_is_no_history() {
        let dir = TempDir::new().unwrap();
        let s = store(&dir);
        fs::write(
            s.path(),
            format!("{}\n08/03/2024,abc,1,1,1,1,1,1,1\n", ENGLISH.join(",")),
        )
        .unwrap();
        assert_eq!(s.read_last(), None);
    }

    #[test]
    fn test_column_spec_validation() {
        assert!(matches!(
            ColumnSpec::Custom(vec!["a".into()]).labels(),
            Err(StoreError::LabelCount { expected: 9, got: 1 })
        ));
        let dup: Vec<String> = ["d", "x", "x", "a", "b", "c", "e", "f", "g"].map(String::from).to_vec();
        assert!(matches!(ColumnSpec::Custom(dup).labels(), Err(StoreError::DuplicateLabel(_))));
        assert_eq!(
            ColumnSpec::Preset(ColumnPreset::Vietnamese).labels().unwrap()[0],
            "ThoiGian"
        );
    }

    #[test]
    fn test_column_spec_deserializes_preset_or_list() {
        let p: ColumnSpec = serde_json::from_str("\"japanese\"").unwrap();
        assert_eq!(p, ColumnSpec::Preset(ColumnPreset::Japanese));
        let c: ColumnSpec = serde_json::from_str(r#"["a","b","c","d","e","f","g","h","i"]"#).unwrap();
        assert!(matches!(c, ColumnSpec::Custom(ref v) if v.len() == 9));
    }
}
