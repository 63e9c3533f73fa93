//! Flat CSV export of ingested quotes, one line per `FlatRecord`.

use std::io::{self, Write};
use std::path::Path;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::FlatRecord;

pub const CSV_HEADER: [&str; 15] = [
    "event_id",
    "sport_key",
    "sport_title",
    "home_team",
    "away_team",
    "commence_time",
    "subject",
    "prop_type",
    "outcome_name",
    "price",
    "line",
    "bookmaker_key",
    "bookmaker_title",
    "last_update",
    "ingested_at",
];

fn needs_quotes(field: &str) -> bool {
    field.contains(',') || field.contains('"') || field.contains('\n') || field.contains('\r')
}

/// Write one comma-separated row, quoting fields that need it.
pub fn write_row<W: Write, S: AsRef<str>>(mut w: W, row: &[S]) -> io::Result<()> {
    let mut first = true;
    for cell in row {
        let cell = cell.as_ref();
        if !first {
            write!(w, ",")?;
        } else {
            first = false;
        }
        if needs_quotes(cell) {
            write!(w, "\"{}\"", cell.replace('"', "\"\""))?;
        } else {
            write!(w, "{cell}")?;
        }
    }
    writeln!(w)
}

fn time_cell(t: Option<DateTime<Utc>>) -> String {
    t.map(|t| t.to_rfc3339()).unwrap_or_default()
}

fn number_cell(v: Option<f64>) -> String {
    v.map(|v| v.to_string()).unwrap_or_default()
}

/// Missing prices, lines and timestamps are empty cells.
pub fn record_row(r: &FlatRecord) -> [String; 15] {
    [
        r.event_id.clone(),
        r.sport_key.clone(),
        r.sport_title.clone(),
        r.home_team.clone(),
        r.away_team.clone(),
        time_cell(r.commence_time),
        r.subject.clone(),
        r.prop_type.clone(),
        r.outcome_name.clone(),
        number_cell(r.price),
        number_cell(r.line),
        r.bookmaker_key.clone(),
        r.bookmaker_title.clone(),
        time_cell(r.last_update),
        r.ingested_at.to_rfc3339(),
    ]
}

pub fn write_records<W: Write>(mut w: W, records: &[FlatRecord]) -> io::Result<()> {
    write_row(&mut w, &CSV_HEADER)?;
    for r in records {
        write_row(&mut w, &record_row(r))?;
    }
    Ok(())
}

/// Write `records` to `path`, creating the parent directory if needed.
pub async fn save_csv(path: &Path, records: &[FlatRecord]) -> Result<()> {
    let mut buf = Vec::new();
    write_records(&mut buf, records)?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    tokio::fs::write(path, buf).await?;
    Ok(())
}
